use thiserror::Error;

use super::DecodeStrategy;

/// Why a single strategy gave up on a reply. Never surfaced past the decoder;
/// any variant escalates to the next strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("{strategy}: candidate is not a JSON object ({reason})")]
    StructuralParse {
        strategy: DecodeStrategy,
        reason: String,
    },
    #[error("{strategy}: field `{field}` {reason}")]
    FieldValidation {
        strategy: DecodeStrategy,
        field: &'static str,
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn structural(strategy: DecodeStrategy, reason: impl Into<String>) -> Self {
        Self::StructuralParse {
            strategy,
            reason: reason.into(),
        }
    }

    pub(crate) fn field(
        strategy: DecodeStrategy,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::FieldValidation {
            strategy,
            field,
            reason: reason.into(),
        }
    }

    pub fn strategy(&self) -> DecodeStrategy {
        match self {
            Self::StructuralParse { strategy, .. } | Self::FieldValidation { strategy, .. } => {
                *strategy
            }
        }
    }
}
