use std::env;
use std::fmt;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

/// Settings for the vision provider and image preparation.
#[derive(Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_s: f64,
    pub transport_retries: usize,
    pub retry_backoff_s: f64,
    pub max_image_dim: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("request_timeout_s", &self.request_timeout_s)
            .field("transport_retries", &self.transport_retries)
            .field("retry_backoff_s", &self.retry_backoff_s)
            .field("max_image_dim", &self.max_image_dim)
            .finish()
    }
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset and
    /// numeric values are clamped to their allowed ranges.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            api_base: read("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            api_key: read("GEMINI_API_KEY").or_else(|| read("GOOGLE_API_KEY")),
            model: read("FORESTWATCH_GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            request_timeout_s: value_as_f64(read("FORESTWATCH_REQUEST_TIMEOUT"), 90.0, 15.0, 300.0),
            transport_retries: value_as_f64(read("FORESTWATCH_TRANSPORT_RETRIES"), 2.0, 0.0, 4.0)
                .round() as usize,
            retry_backoff_s: value_as_f64(read("FORESTWATCH_RETRY_BACKOFF"), 1.2, 0.1, 10.0),
            max_image_dim: value_as_f64(read("FORESTWATCH_MAX_IMAGE_DIM"), 1024.0, 128.0, 4096.0)
                .round() as u32,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.map(|value| value.trim().to_string()) {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.map(|value| value.trim().to_string()) {
            if !model.is_empty() {
                self.model = model;
            }
        }
        self
    }
}

fn value_as_f64(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|text| text.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
