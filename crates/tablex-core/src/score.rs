//! Confidence scoring.
//!
//! Three signals fold into one 0–100 score: the classifier's
//! confidence (primary), structural consistency derived from
//! validation flags, and a learned prior from the pattern store. The
//! combination is a bounded weighted sum clamped to [0, 100]; when the
//! store is unavailable the prior term is omitted and the remaining
//! weights renormalized, so scores stay on the same scale.

use crate::config::ScoringWeights;
use crate::validate::ValidationFlag;

/// Structural-consistency penalty applied for an entirely novel,
/// unvalidated shape.
pub const NOVELTY_PENALTY: f64 = 15.0;

/// Learned-prior input to one score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriorSignal {
    /// Store missing or unreadable: omit the prior term entirely.
    Unavailable,
    /// Shape not seen before: small negative adjustment.
    Novel,
    /// Shape matches a learned pattern carrying this prior bias
    /// (roughly −25 to +25).
    Matched(f64),
}

/// Per-signal breakdown of one confidence score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Classifier confidence, 0–100.
    pub classifier: f64,
    /// Structural consistency after flag penalties, 0–100.
    pub structural: f64,
    /// Prior term on the 0–100 scale, when present.
    pub prior: Option<f64>,
    /// Final clamped score.
    pub total: f64,
}

/// Structural-consistency score: 100 minus the accumulated flag
/// penalties, floored at 0.
#[must_use]
pub fn structural_score(flags: &[ValidationFlag]) -> f64 {
    let penalty: f64 = flags.iter().map(|flag| flag.penalty()).sum();
    (100.0 - penalty).max(0.0)
}

/// Combine the three signals into a final confidence.
#[must_use]
pub fn score(
    classifier_confidence: f64,
    flags: &[ValidationFlag],
    prior: PriorSignal,
    weights: &ScoringWeights,
) -> ScoreBreakdown {
    let classifier = classifier_confidence.clamp(0.0, 100.0);
    let structural = structural_score(flags);

    let prior_term = match prior {
        PriorSignal::Unavailable => None,
        PriorSignal::Novel => Some((50.0 - NOVELTY_PENALTY).clamp(0.0, 100.0)),
        PriorSignal::Matched(bias) => Some((50.0 + bias).clamp(0.0, 100.0)),
    };

    let total = match prior_term {
        Some(prior_value) => {
            weights.classifier * classifier
                + weights.structural * structural
                + weights.prior * prior_value
        }
        None => {
            let base = weights.classifier + weights.structural;
            if base > 0.0 {
                (weights.classifier * classifier + weights.structural * structural) / base
            } else {
                0.0
            }
        }
    };

    ScoreBreakdown {
        classifier,
        structural,
        prior: prior_term,
        total: total.clamp(0.0, 100.0),
    }
}
