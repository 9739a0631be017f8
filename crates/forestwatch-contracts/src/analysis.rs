use serde::{Deserialize, Serialize};

/// Free text returned by the vision model for one before/after comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawModelReply {
    pub text: String,
    pub context_label: String,
}

impl RawModelReply {
    pub fn new(text: impl Into<String>, context_label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context_label: context_label.into(),
        }
    }
}

/// Decoded comparison of two forest images.
///
/// Scores, loss and confidence are fractions in `[0, 1]`. Records parsed from
/// the reply carry the reply's percentages divided by 100; records built by the
/// synthetic fallback have `degraded` set and a `fallback_reason`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationComparison {
    pub score_before: f64,
    pub score_after: f64,
    pub loss_fraction: f64,
    pub health_description_before: String,
    pub health_description_after: String,
    pub land_use_changes: String,
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub key_findings: Vec<String>,
    pub raw_text: String,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl VegetationComparison {
    pub fn to_payload(&self) -> AnalysisPayload {
        AnalysisPayload::from(self)
    }
}

/// Response body shape of the `/api/analyze-vegetation` route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub vegetation_score_image1: f64,
    pub vegetation_score_image2: f64,
    pub vegetation_loss: f64,
    pub vegetation_health_image1: String,
    pub vegetation_health_image2: String,
    pub land_use_changes: String,
    pub analysis_summary: String,
    pub recommendations: Vec<String>,
    pub confidence_score: f64,
    pub key_findings: Vec<String>,
    pub raw_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl From<&VegetationComparison> for AnalysisPayload {
    fn from(record: &VegetationComparison) -> Self {
        Self {
            vegetation_score_image1: record.score_before,
            vegetation_score_image2: record.score_after,
            vegetation_loss: record.loss_fraction,
            vegetation_health_image1: record.health_description_before.clone(),
            vegetation_health_image2: record.health_description_after.clone(),
            land_use_changes: record.land_use_changes.clone(),
            analysis_summary: record.summary.clone(),
            recommendations: record.recommendations.clone(),
            confidence_score: record.confidence,
            key_findings: record.key_findings.clone(),
            raw_response: record.raw_text.clone(),
            parse_error: record
                .degraded
                .then(|| {
                    record
                        .fallback_reason
                        .clone()
                        .unwrap_or_else(|| "Could not parse JSON response".to_string())
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::VegetationComparison;

    fn sample(degraded: bool) -> VegetationComparison {
        VegetationComparison {
            score_before: 0.8,
            score_after: 0.6,
            loss_fraction: 0.25,
            health_description_before: "Healthy".to_string(),
            health_description_after: "Stressed".to_string(),
            land_use_changes: "Logging".to_string(),
            summary: "Decline".to_string(),
            recommendations: vec!["Replant".to_string()],
            confidence: 0.9,
            key_findings: vec!["Loss detected".to_string()],
            raw_text: "{}".to_string(),
            degraded,
            fallback_reason: degraded.then(|| "no JSON object found".to_string()),
        }
    }

    #[test]
    fn payload_uses_route_field_names() -> anyhow::Result<()> {
        let payload = serde_json::to_value(sample(false).to_payload())?;
        assert_eq!(payload["vegetation_score_image1"], json!(0.8));
        assert_eq!(payload["vegetation_score_image2"], json!(0.6));
        assert_eq!(payload["vegetation_loss"], json!(0.25));
        assert_eq!(payload["vegetation_health_image2"], json!("Stressed"));
        assert_eq!(payload["analysis_summary"], json!("Decline"));
        assert_eq!(payload["confidence_score"], json!(0.9));
        assert_eq!(payload["key_findings"], json!(["Loss detected"]));
        assert_eq!(payload["raw_response"], json!("{}"));
        assert!(payload.get("parse_error").is_none());
        Ok(())
    }

    #[test]
    fn degraded_payload_carries_parse_error() -> anyhow::Result<()> {
        let payload = serde_json::to_value(sample(true).to_payload())?;
        assert_eq!(payload["parse_error"], json!("no JSON object found"));

        let mut record = sample(true);
        record.fallback_reason = None;
        let payload = serde_json::to_value(record.to_payload())?;
        assert!(payload
            .get("parse_error")
            .and_then(Value::as_str)
            .is_some_and(|text| !text.is_empty()));
        Ok(())
    }

    #[test]
    fn record_roundtrips_without_fallback_reason() -> anyhow::Result<()> {
        let record = sample(false);
        let encoded = serde_json::to_value(&record)?;
        assert!(encoded.get("fallback_reason").is_none());
        let decoded: VegetationComparison = serde_json::from_value(encoded)?;
        assert_eq!(decoded, record);
        Ok(())
    }
}
