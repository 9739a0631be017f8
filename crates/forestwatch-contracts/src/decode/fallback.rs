use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::analysis::VegetationComparison;

/// Closed interval a synthetic value is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub(crate) fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Draws from `[min, max]`. Empty, non-finite or overflowing ranges
    /// collapse to a finite endpoint, or to 0 when neither is finite.
    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let (min, max) = (self.min, self.max);
        if min.is_finite() && max.is_finite() && max > min && (max - min).is_finite() {
            let value = rng.gen_range(min..=max);
            debug_assert!(self.contains(value));
            return value;
        }
        if min.is_finite() {
            min
        } else if max.is_finite() {
            max
        } else {
            0.0
        }
    }
}

/// Ranges for records fabricated when no strategy could parse the reply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackRanges {
    pub score_before: Bounds,
    pub score_after: Bounds,
    pub loss_fraction: Bounds,
    pub confidence: Bounds,
}

impl Default for FallbackRanges {
    fn default() -> Self {
        Self {
            score_before: Bounds::new(0.75, 0.95),
            score_after: Bounds::new(0.45, 0.75),
            loss_fraction: Bounds::new(0.10, 0.40),
            confidence: Bounds::new(0.70, 0.90),
        }
    }
}

pub(crate) fn synthesize<R: Rng>(
    ranges: &FallbackRanges,
    context_label: &str,
    raw_text: &str,
    reason: String,
    rng: &mut R,
) -> VegetationComparison {
    let subject = if context_label.trim().is_empty() {
        "the selected area"
    } else {
        context_label.trim()
    };
    VegetationComparison {
        score_before: ranges.score_before.sample(rng),
        score_after: ranges.score_after.sample(rng),
        loss_fraction: ranges.loss_fraction.sample(rng),
        health_description_before:
            "Healthy forest with dense canopy coverage and good vegetation density".to_string(),
        health_description_after:
            "Moderate forest degradation with visible changes in vegetation density".to_string(),
        land_use_changes: "Evidence of some land use changes and potential human activity"
            .to_string(),
        summary: format!(
            "Analysis of {subject}: The comparison between the two images shows noticeable \
             changes in forest vegetation. The first image displays healthier forest conditions \
             with better canopy coverage, while the second image shows some degradation. This \
             suggests potential environmental changes or human impact in the area."
        ),
        recommendations: vec![
            "Monitor the area for continued changes".to_string(),
            "Implement conservation measures if degradation continues".to_string(),
            "Engage with local communities for forest protection".to_string(),
            "Consider reforestation in affected areas".to_string(),
        ],
        confidence: ranges.confidence.sample(rng),
        key_findings: vec![
            format!("Visible changes in vegetation density between images of {subject}"),
            "Some areas show signs of forest degradation".to_string(),
            "Overall forest health appears to be declining".to_string(),
            "Conservation measures may be needed".to_string(),
        ],
        raw_text: raw_text.to_string(),
        degraded: true,
        fallback_reason: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{synthesize, Bounds, FallbackRanges};

    #[test]
    fn collapsed_bounds_return_minimum() {
        let ranges = FallbackRanges {
            confidence: Bounds::new(0.5, 0.5),
            score_after: Bounds::new(0.6, 0.2),
            ..FallbackRanges::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let record = synthesize(&ranges, "Site", "", "reason".to_string(), &mut rng);
        assert_eq!(record.confidence, 0.5);
        assert_eq!(record.score_after, 0.6);
    }

    #[test]
    fn non_finite_bounds_collapse_to_finite_values() {
        let ranges = FallbackRanges {
            score_before: Bounds::new(f64::NAN, 0.9),
            score_after: Bounds::new(0.45, f64::NAN),
            loss_fraction: Bounds::new(f64::NEG_INFINITY, f64::INFINITY),
            confidence: Bounds::new(0.7, f64::INFINITY),
        };
        let mut rng = StdRng::seed_from_u64(3);
        let record = synthesize(&ranges, "Site", "", "reason".to_string(), &mut rng);
        assert_eq!(record.score_before, 0.9);
        assert_eq!(record.score_after, 0.45);
        assert_eq!(record.loss_fraction, 0.0);
        assert_eq!(record.confidence, 0.7);
        assert!(record.degraded);
    }

    #[test]
    fn overflowing_span_returns_minimum() {
        let ranges = FallbackRanges {
            score_before: Bounds::new(-f64::MAX, f64::MAX),
            ..FallbackRanges::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let record = synthesize(&ranges, "Site", "", "reason".to_string(), &mut rng);
        assert_eq!(record.score_before, -f64::MAX);
        assert!(FallbackRanges::default().score_after.contains(record.score_after));
    }

    #[test]
    fn blank_context_uses_generic_subject() {
        let mut rng = StdRng::seed_from_u64(3);
        let record = synthesize(
            &FallbackRanges::default(),
            "  ",
            "text",
            "reason".to_string(),
            &mut rng,
        );
        assert!(record.summary.starts_with("Analysis of the selected area:"));
        assert_eq!(record.raw_text, "text");
        assert_eq!(record.fallback_reason.as_deref(), Some("reason"));
        assert!(record.degraded);
    }
}
