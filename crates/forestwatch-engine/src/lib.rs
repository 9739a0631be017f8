//! Before/after vegetation comparison against a vision model.
//!
//! [`VegetationAnalyzer`] prepares both images, asks a [`VisionProvider`] for a
//! comparison, and decodes the reply with
//! [`forestwatch_contracts::ResponseDecoder`]. Only image and transport
//! failures are errors; an unreadable reply becomes a degraded record.

pub mod config;
mod gemini;
pub mod images;
pub mod prompt;
pub mod provider;

use std::path::PathBuf;

use anyhow::{Context, Result};
use forestwatch_contracts::events::{AnalysisEvent, AnalysisLog};
use forestwatch_contracts::receipts::{write_receipt, AnalysisReceipt, ImageDigest};
use forestwatch_contracts::{
    AnalysisPayload, DecodeStrategy, RawModelReply, ResponseDecoder, VegetationComparison,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

pub use config::AnalyzerConfig;
pub use gemini::GeminiProvider;
pub use images::{prepare_image, PreparedImage};
pub use provider::{ProviderReply, VisionProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRequest {
    pub before: PathBuf,
    pub after: PathBuf,
    pub area: String,
    pub point_name: String,
}

impl ComparisonRequest {
    pub fn context_label(&self) -> String {
        format!("{} - {}", self.area.trim(), self.point_name.trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub analysis_id: String,
    pub record: VegetationComparison,
    pub strategy: DecodeStrategy,
    pub model: String,
    pub images: Vec<ImageDigest>,
    pub warnings: Vec<String>,
    pub receipt_path: Option<PathBuf>,
}

impl AnalysisOutcome {
    pub fn payload(&self) -> AnalysisPayload {
        self.record.to_payload()
    }
}

/// Result of the provider connection probe, shaped like the test route body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct VegetationAnalyzer {
    provider: Box<dyn VisionProvider>,
    decoder: ResponseDecoder,
    max_image_dim: u32,
    log: Option<AnalysisLog>,
    receipts_dir: Option<PathBuf>,
}

impl VegetationAnalyzer {
    pub fn new(provider: impl VisionProvider + 'static, config: &AnalyzerConfig) -> Self {
        Self {
            provider: Box::new(provider),
            decoder: ResponseDecoder::default(),
            max_image_dim: config.max_image_dim,
            log: None,
            receipts_dir: None,
        }
    }

    pub fn gemini(config: &AnalyzerConfig) -> Self {
        Self::new(GeminiProvider::new(config), config)
    }

    pub fn with_decoder(mut self, decoder: ResponseDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_log(mut self, log: AnalysisLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_receipts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.receipts_dir = Some(dir.into());
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn analyze(&self, request: &ComparisonRequest) -> Result<AnalysisOutcome> {
        let mut rng = StdRng::from_entropy();
        self.analyze_with_rng(request, &mut rng)
    }

    pub fn analyze_with_rng<R: Rng>(
        &self,
        request: &ComparisonRequest,
        rng: &mut R,
    ) -> Result<AnalysisOutcome> {
        let analysis_id = uuid::Uuid::new_v4().to_string();
        let context_label = request.context_label();
        let before = prepare_image(&request.before, self.max_image_dim)
            .context("before image unavailable")?;
        let after = prepare_image(&request.after, self.max_image_dim)
            .context("after image unavailable")?;

        self.emit(&AnalysisEvent::AnalysisRequested {
            analysis_id: analysis_id.clone(),
            context_label: context_label.clone(),
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            image_before: before.digest.path.clone(),
            image_after: after.digest.path.clone(),
        })?;
        info!(
            analysis_id = %analysis_id,
            context = %context_label,
            provider = self.provider.name(),
            "requesting vegetation comparison"
        );

        let instruction = prompt::comparison_instruction(&context_label);
        let prepared = [before, after];
        let reply = match self.provider.compare(&instruction, &prepared) {
            Ok(reply) => reply,
            Err(err) => {
                let rendered = format!("{err:#}");
                warn!(analysis_id = %analysis_id, error = %rendered, "vision provider failed");
                if let Err(log_err) = self.emit(&AnalysisEvent::AnalysisFailed {
                    analysis_id: analysis_id.clone(),
                    error: rendered,
                }) {
                    let log_rendered = format!("{log_err:#}");
                    warn!(
                        analysis_id = %analysis_id,
                        error = %log_rendered,
                        "failed recording analysis failure"
                    );
                }
                return Err(err.context(format!(
                    "{} comparison failed for {context_label}",
                    self.provider.name()
                )));
            }
        };

        let decoded = self
            .decoder
            .decode_outcome(&RawModelReply::new(reply.text.as_str(), context_label.as_str()), rng);
        if decoded.record.degraded {
            warn!(
                analysis_id = %analysis_id,
                reason = decoded.record.fallback_reason.as_deref().unwrap_or_default(),
                "reply could not be decoded; returning generated analysis"
            );
        }
        self.emit(&AnalysisEvent::AnalysisDecoded {
            analysis_id: analysis_id.clone(),
            strategy: decoded.strategy,
            degraded: decoded.record.degraded,
            reply_chars: reply.text.chars().count(),
            warnings: reply.warnings.clone(),
        })?;

        let images: Vec<ImageDigest> = prepared.into_iter().map(|image| image.digest).collect();
        let receipt_path = match self.receipts_dir.as_deref() {
            Some(dir) => {
                let receipt = AnalysisReceipt::new(
                    &analysis_id,
                    &request.area,
                    &request.point_name,
                    images.clone(),
                    self.provider.name(),
                    &reply.model,
                    decoded.strategy,
                    decoded.record.to_payload(),
                    reply.warnings.clone(),
                );
                Some(write_receipt(dir, &receipt).context("failed writing analysis receipt")?)
            }
            None => None,
        };

        Ok(AnalysisOutcome {
            analysis_id,
            record: decoded.record,
            strategy: decoded.strategy,
            model: reply.model,
            images,
            warnings: reply.warnings,
            receipt_path,
        })
    }

    pub fn test_connection(&self) -> ConnectionStatus {
        match self.provider.ping() {
            Ok(response) => ConnectionStatus {
                success: true,
                message: Some(format!(
                    "{} API connection successful",
                    self.provider.display_name()
                )),
                response: Some(response),
                error: None,
            },
            Err(err) => ConnectionStatus {
                success: false,
                message: None,
                response: None,
                error: Some(format!("{err:#}")),
            },
        }
    }

    fn emit(&self, event: &AnalysisEvent) -> Result<()> {
        if let Some(log) = &self.log {
            log.append(event)
                .with_context(|| format!("failed appending to {}", log.path().display()))?;
        }
        Ok(())
    }
}
