use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::decode::DecodeStrategy;

/// Lifecycle of one analysis, one JSONL line per variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    AnalysisRequested {
        analysis_id: String,
        context_label: String,
        provider: String,
        model: String,
        image_before: String,
        image_after: String,
    },
    AnalysisDecoded {
        analysis_id: String,
        strategy: DecodeStrategy,
        degraded: bool,
        reply_chars: usize,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    AnalysisFailed {
        analysis_id: String,
        error: String,
    },
}

/// Append-only analysis log (`events.jsonl`).
///
/// Every line carries `type`, `session_id` and `ts`; appends from clones of
/// the same log are serialized.
#[derive(Debug, Clone)]
pub struct AnalysisLog {
    inner: Arc<AnalysisLogInner>,
}

#[derive(Debug)]
struct AnalysisLogInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl AnalysisLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AnalysisLogInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn append(&self, event: &AnalysisEvent) -> anyhow::Result<Value> {
        let Value::Object(fields) = serde_json::to_value(event)? else {
            anyhow::bail!("analysis event did not serialize to an object");
        };
        let mut line = Map::new();
        line.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        line.insert("ts".to_string(), Value::String(now_utc_iso()));
        line.extend(fields);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let encoded = serde_json::to_string(&line)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("analysis log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(encoded.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(line))
    }
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
