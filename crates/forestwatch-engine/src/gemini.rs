use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::AnalyzerConfig;
use crate::images::PreparedImage;
use crate::provider::{ProviderReply, VisionProvider};

const PING_PROMPT: &str = "Hello, are you working?";

/// Gemini `generateContent` transport.
pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    model: String,
    request_timeout_s: f64,
    transport_retries: usize,
    retry_backoff_s: f64,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            request_timeout_s: config.request_timeout_s,
            transport_retries: config.transport_retries,
            retry_backoff_s: config.retry_backoff_s,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set"),
        }
    }

    fn generate_text(&self, payload: &Value, warnings: &mut Vec<String>) -> Result<(String, Value)> {
        let api_key = self.api_key()?;
        let endpoint = self.endpoint();
        let response = self.post_with_transport_retries(&endpoint, api_key, payload, warnings)?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let text = extract_reply_text(&response_payload);
        if text.trim().is_empty() {
            let reason = response_payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
                .unwrap_or("no text parts");
            bail!("Gemini returned an empty reply ({reason})");
        }
        Ok((text, response_payload))
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;
        loop {
            let sent = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(Duration::from_secs_f64(self.request_timeout_s))
                .json(payload)
                .send();
            let raw = match sent {
                Ok(response) => return Ok(response),
                Err(raw) => raw,
            };
            let err = anyhow::Error::new(raw.without_url())
                .context(format!("Gemini request failed ({endpoint})"));
            if !is_retryable_transport_error(&err) || attempt >= self.transport_retries {
                return Err(err);
            }
            attempt += 1;
            let message = format!(
                "Gemini transport retry {}/{} after transient request failure.",
                attempt, self.transport_retries
            );
            let rendered = format!("{err:#}");
            warn!(error = %rendered, "{message}");
            if !warnings.contains(&message) {
                warnings.push(message);
            }
            thread::sleep(Duration::from_secs_f64(
                self.retry_backoff_s * attempt as f64,
            ));
        }
    }
}

impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn display_name(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn compare(&self, instruction: &str, images: &[PreparedImage]) -> Result<ProviderReply> {
        let payload = build_comparison_payload(instruction, images);
        let mut warnings = Vec::new();
        let (text, response_payload) = self.generate_text(&payload, &mut warnings)?;
        debug!(
            reply_chars = text.chars().count(),
            head = %truncate_text(&text, 200),
            "gemini reply received"
        );
        Ok(ProviderReply {
            text,
            model: response_payload
                .get("modelVersion")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.model.clone()),
            usage: response_payload.get("usageMetadata").cloned(),
            warnings,
        })
    }

    fn ping(&self) -> Result<String> {
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": PING_PROMPT }],
            }],
        });
        let mut warnings = Vec::new();
        let (text, _) = self.generate_text(&payload, &mut warnings)?;
        Ok(text)
    }
}

/// Instruction text first, then one inline part per image.
fn build_comparison_payload(instruction: &str, images: &[PreparedImage]) -> Value {
    let mut parts = vec![json!({ "text": instruction })];
    for image in images {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.upload_mime_type,
                "data": BASE64.encode(&image.upload_bytes),
            }
        }));
    }
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
    })
}

/// Concatenates the text parts of every candidate.
fn extract_reply_text(response_payload: &Value) -> String {
    let mut chunks: Vec<&str> = Vec::new();
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        chunks.extend(
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str)),
        );
    }
    chunks.concat()
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use serde_json::json;

    use forestwatch_contracts::receipts::ImageDigest;

    use super::{
        build_comparison_payload, extract_reply_text, is_retryable_transport_error,
        truncate_text, GeminiProvider, BASE64,
    };
    use crate::config::AnalyzerConfig;
    use crate::images::PreparedImage;
    use crate::provider::VisionProvider;

    fn image(mime: &str, bytes: &[u8]) -> PreparedImage {
        PreparedImage {
            digest: ImageDigest {
                path: "x.png".to_string(),
                sha256: String::new(),
                bytes: bytes.len() as u64,
                mime_type: mime.to_string(),
            },
            upload_mime_type: mime.to_string(),
            upload_bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn endpoint_adds_models_prefix_once() {
        let config = AnalyzerConfig::default();
        let provider = GeminiProvider::new(&config);
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );

        let config = AnalyzerConfig::default().with_model(Some("models/gemini-1.5-pro".to_string()));
        let provider = GeminiProvider::new(&config);
        assert!(provider
            .endpoint()
            .ends_with("/v1beta/models/gemini-1.5-pro:generateContent"));
    }

    #[test]
    fn payload_puts_instruction_before_images() -> anyhow::Result<()> {
        let payload = build_comparison_payload(
            "compare",
            &[image("image/jpeg", b"before"), image("image/png", b"after")],
        );
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        assert_eq!(parts[0]["text"], json!("compare"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[2]["inlineData"]["mimeType"], json!("image/png"));
        let data = parts[2]["inlineData"]["data"].as_str().unwrap_or_default();
        assert_eq!(BASE64.decode(data)?, b"after".to_vec());
        Ok(())
    }

    #[test]
    fn reply_text_joins_candidate_parts() {
        let payload = json!({
            "candidates": [
                {"content": {"parts": [{"text": "```json\n{\"a\":"}, {"text": " 1}\n```"}]}},
                {"content": {"parts": [{"inlineData": {"data": "AA=="}}]}}
            ]
        });
        assert_eq!(extract_reply_text(&payload), "```json\n{\"a\": 1}\n```");
        assert_eq!(extract_reply_text(&json!({"promptFeedback": {}})), "");
    }

    #[test]
    fn compare_without_key_fails_before_network() {
        let provider = GeminiProvider::new(&AnalyzerConfig::default());
        let err = provider
            .compare("compare", &[])
            .expect_err("missing key must fail");
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert!(!is_retryable_transport_error(&err));
    }

    #[test]
    fn provider_names_itself_for_messages() {
        let provider = GeminiProvider::new(&AnalyzerConfig::default());
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.display_name(), "Gemini");
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
