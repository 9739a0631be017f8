use serde_json::{Map, Value};

use super::error::DecodeError;
use super::DecodeStrategy;
use crate::analysis::VegetationComparison;

pub(crate) const SCORE_BEFORE_KEY: &str = "vegetation_score_image1";
pub(crate) const SCORE_AFTER_KEY: &str = "vegetation_score_image2";
pub(crate) const LOSS_KEY: &str = "vegetation_loss_percentage";
pub(crate) const CONFIDENCE_KEY: &str = "confidence_score";
const HEALTH_BEFORE_KEY: &str = "vegetation_health_image1";
const HEALTH_AFTER_KEY: &str = "vegetation_health_image2";
const LAND_USE_KEY: &str = "land_use_changes";
const SUMMARY_KEY: &str = "analysis_summary";
const RECOMMENDATIONS_KEY: &str = "recommendations";
const KEY_FINDINGS_KEY: &str = "key_findings";

/// Fields read from one candidate document, numbers already scaled to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedComparison {
    score_before: f64,
    score_after: f64,
    loss_fraction: f64,
    confidence: f64,
    health_description_before: String,
    health_description_after: String,
    land_use_changes: String,
    summary: String,
    recommendations: Vec<String>,
    key_findings: Vec<String>,
}

impl ParsedComparison {
    pub(crate) fn into_record(self, raw_text: &str) -> VegetationComparison {
        VegetationComparison {
            score_before: self.score_before,
            score_after: self.score_after,
            loss_fraction: self.loss_fraction,
            health_description_before: self.health_description_before,
            health_description_after: self.health_description_after,
            land_use_changes: self.land_use_changes,
            summary: self.summary,
            recommendations: self.recommendations,
            confidence: self.confidence,
            key_findings: self.key_findings,
            raw_text: raw_text.to_string(),
            degraded: false,
            fallback_reason: None,
        }
    }
}

/// Parses `candidate` as a JSON object and validates it.
///
/// The four percentage fields are mandatory; narrative fields fall back to
/// empty values rather than failing the candidate.
pub(crate) fn parse_candidate(
    candidate: &str,
    strategy: DecodeStrategy,
) -> Result<ParsedComparison, DecodeError> {
    let parsed: Value = serde_json::from_str(candidate.trim())
        .map_err(|err| DecodeError::structural(strategy, err.to_string()))?;
    let Value::Object(document) = parsed else {
        return Err(DecodeError::structural(
            strategy,
            "top-level value is not an object",
        ));
    };

    Ok(ParsedComparison {
        score_before: percentage(&document, SCORE_BEFORE_KEY, strategy)?,
        score_after: percentage(&document, SCORE_AFTER_KEY, strategy)?,
        loss_fraction: percentage(&document, LOSS_KEY, strategy)?,
        confidence: percentage(&document, CONFIDENCE_KEY, strategy)?,
        health_description_before: text_field(&document, HEALTH_BEFORE_KEY),
        health_description_after: text_field(&document, HEALTH_AFTER_KEY),
        land_use_changes: text_field(&document, LAND_USE_KEY),
        summary: text_field(&document, SUMMARY_KEY),
        recommendations: text_list(document.get(RECOMMENDATIONS_KEY)),
        key_findings: text_list(document.get(KEY_FINDINGS_KEY)),
    })
}

fn percentage(
    document: &Map<String, Value>,
    key: &'static str,
    strategy: DecodeStrategy,
) -> Result<f64, DecodeError> {
    let value = document
        .get(key)
        .ok_or_else(|| DecodeError::field(strategy, key, "is missing"))?;
    let number = parse_value_to_f64(value)
        .ok_or_else(|| DecodeError::field(strategy, key, format!("is not a number: {value}")))?;
    if !number.is_finite() || !(0.0..=100.0).contains(&number) {
        return Err(DecodeError::field(
            strategy,
            key,
            format!("is outside the 0-100 percentage range: {number}"),
        ));
    }
    Ok(number / 100.0)
}

fn parse_value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(raw) => raw.as_f64(),
        Value::String(raw) => raw.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn text_field(document: &Map<String, Value>, key: &str) -> String {
    document
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn text_list(value: Option<&Value>) -> Vec<String> {
    let raw_items: Vec<&str> = match value {
        Some(Value::Array(rows)) => rows.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(text)) => text.split(',').collect(),
        _ => Vec::new(),
    };
    raw_items
        .into_iter()
        .map(|item| item.split_whitespace().collect::<Vec<&str>>().join(" "))
        .filter(|item| !item.is_empty())
        .collect()
}
