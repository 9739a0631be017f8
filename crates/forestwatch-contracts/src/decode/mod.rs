//! Tolerant decoding of a vision model's comparison reply.
//!
//! Strategies run strict to permissive and the first one that yields a valid
//! document wins:
//! 1. direct parse of the outer `{...}` span after dropping code-fence lines
//! 2. regex extraction, trying three object patterns in order
//! 3. line scan that balances braces from the first `{`
//! 4. synthetic fallback, flagged `degraded`
//!
//! Decoding never fails. Strategy errors are logged and escalate.

mod error;
mod extract;
mod fallback;
mod fields;

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{RawModelReply, VegetationComparison};

pub use error::DecodeError;
pub use fallback::{Bounds, FallbackRanges};

use extract::{balanced_line_block, outer_object_span, pattern_candidates, strip_code_fences};
use fields::{parse_candidate, ParsedComparison};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    DirectParse,
    RegexExtraction,
    BraceScan,
    SyntheticFallback,
}

impl DecodeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectParse => "direct_parse",
            Self::RegexExtraction => "regex_extraction",
            Self::BraceScan => "brace_scan",
            Self::SyntheticFallback => "synthetic_fallback",
        }
    }
}

impl fmt::Display for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type StrategyFn = fn(&str) -> Result<ParsedComparison, DecodeError>;

const PARSING_STRATEGIES: [(DecodeStrategy, StrategyFn); 3] = [
    (DecodeStrategy::DirectParse, direct_parse),
    (DecodeStrategy::RegexExtraction, regex_extraction),
    (DecodeStrategy::BraceScan, brace_scan),
];

/// Record produced for a reply, plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub record: VegetationComparison,
    pub strategy: DecodeStrategy,
    /// Failures of the strategies tried before `strategy`, in order.
    pub failures: Vec<DecodeError>,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseDecoder {
    ranges: FallbackRanges,
}

impl ResponseDecoder {
    pub fn new(ranges: FallbackRanges) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &FallbackRanges {
        &self.ranges
    }

    /// Decodes with a freshly seeded local generator for the fallback path.
    pub fn decode(&self, reply: &RawModelReply) -> VegetationComparison {
        let mut rng = StdRng::from_entropy();
        self.decode_with_rng(reply, &mut rng)
    }

    pub fn decode_with_rng<R: Rng>(
        &self,
        reply: &RawModelReply,
        rng: &mut R,
    ) -> VegetationComparison {
        self.decode_outcome(reply, rng).record
    }

    pub fn decode_outcome<R: Rng>(&self, reply: &RawModelReply, rng: &mut R) -> DecodeOutcome {
        let mut failures = Vec::new();
        for (strategy, run) in PARSING_STRATEGIES {
            match run(&reply.text) {
                Ok(parsed) => {
                    info!(
                        strategy = %strategy,
                        context = %reply.context_label,
                        skipped = failures.len(),
                        "decoded vegetation comparison"
                    );
                    return DecodeOutcome {
                        record: parsed.into_record(&reply.text),
                        strategy,
                        failures,
                    };
                }
                Err(err) => {
                    debug!(error = %err, "decode strategy failed");
                    failures.push(err);
                }
            }
        }

        let reason = match failures.last() {
            Some(last) => format!(
                "Could not parse JSON response, using generated analysis ({last})"
            ),
            None => "Could not parse JSON response, using generated analysis".to_string(),
        };
        warn!(
            context = %reply.context_label,
            reply_chars = reply.text.chars().count(),
            "no strategy parsed the reply; using synthetic fallback"
        );
        DecodeOutcome {
            record: fallback::synthesize(
                &self.ranges,
                &reply.context_label,
                &reply.text,
                reason,
                rng,
            ),
            strategy: DecodeStrategy::SyntheticFallback,
            failures,
        }
    }
}

fn direct_parse(text: &str) -> Result<ParsedComparison, DecodeError> {
    let cleaned = strip_code_fences(text.trim());
    let candidate = outer_object_span(&cleaned).ok_or_else(|| {
        DecodeError::structural(DecodeStrategy::DirectParse, "no object boundaries found")
    })?;
    parse_candidate(candidate, DecodeStrategy::DirectParse)
}

fn regex_extraction(text: &str) -> Result<ParsedComparison, DecodeError> {
    let mut last_error =
        DecodeError::structural(DecodeStrategy::RegexExtraction, "no object pattern matched");
    for candidate in pattern_candidates(text) {
        match parse_candidate(candidate, DecodeStrategy::RegexExtraction) {
            Ok(parsed) => return Ok(parsed),
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}

fn brace_scan(text: &str) -> Result<ParsedComparison, DecodeError> {
    let block = balanced_line_block(text).ok_or_else(|| {
        DecodeError::structural(DecodeStrategy::BraceScan, "no line opens an object")
    })?;
    parse_candidate(&block, DecodeStrategy::BraceScan)
}
