use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisPayload;
use crate::decode::DecodeStrategy;
use crate::events::now_utc_iso;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDigest {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub mime_type: String,
}

/// Everything needed to audit one analysis after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReceipt {
    pub schema_version: u64,
    pub analysis_id: String,
    pub created_at: String,
    pub area: String,
    pub point_name: String,
    pub images: Vec<ImageDigest>,
    pub provider: String,
    pub model: String,
    pub strategy: DecodeStrategy,
    pub degraded: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub result: AnalysisPayload,
}

impl AnalysisReceipt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analysis_id: &str,
        area: &str,
        point_name: &str,
        images: Vec<ImageDigest>,
        provider: &str,
        model: &str,
        strategy: DecodeStrategy,
        result: AnalysisPayload,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            analysis_id: analysis_id.to_string(),
            created_at: now_utc_iso(),
            area: area.to_string(),
            point_name: point_name.to_string(),
            images,
            provider: provider.to_string(),
            model: model.to_string(),
            strategy,
            degraded: result.parse_error.is_some(),
            warnings,
            result,
        }
    }

    pub fn file_name(&self) -> String {
        format!("receipt-{}.json", self.analysis_id)
    }
}

/// Writes the receipt as pretty JSON under `dir` and returns its path.
pub fn write_receipt(dir: &Path, receipt: &AnalysisReceipt) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(receipt.file_name());
    std::fs::write(&path, serde_json::to_string_pretty(receipt)?)?;
    Ok(path)
}

pub fn read_receipt(path: &Path) -> anyhow::Result<AnalysisReceipt> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{read_receipt, write_receipt, AnalysisReceipt, ImageDigest, RECEIPT_SCHEMA_VERSION};
    use crate::analysis::RawModelReply;
    use crate::decode::{DecodeStrategy, ResponseDecoder};

    #[test]
    fn receipt_roundtrips_through_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut record = ResponseDecoder::default().decode(&RawModelReply::new(
            "no structured answer",
            "Congo - East",
        ));
        record.score_before = 0.8;
        record.score_after = 0.5;
        record.loss_fraction = 0.25;
        record.confidence = 0.75;
        let receipt = AnalysisReceipt::new(
            "a-42",
            "Congo",
            "East",
            vec![ImageDigest {
                path: "before.png".to_string(),
                sha256: "ab".repeat(32),
                bytes: 1024,
                mime_type: "image/png".to_string(),
            }],
            "gemini",
            "gemini-2.0-flash-exp",
            DecodeStrategy::SyntheticFallback,
            record.to_payload(),
            vec!["retried once".to_string()],
        );

        let path = write_receipt(&temp.path().join("receipts"), &receipt)?;
        assert!(path.ends_with("receipt-a-42.json"));

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["schema_version"], json!(RECEIPT_SCHEMA_VERSION));
        assert_eq!(parsed["strategy"], json!("synthetic_fallback"));
        assert_eq!(parsed["degraded"], json!(true));
        assert!(parsed["result"]["parse_error"].is_string());

        assert_eq!(read_receipt(&path)?, receipt);
        Ok(())
    }
}
