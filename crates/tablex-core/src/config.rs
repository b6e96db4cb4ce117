//! Extraction configuration.
//!
//! All options are optional with stated defaults; [`ExtractionConfig::default`]
//! reproduces them. Configurations are validated once at engine
//! construction — an invalid configuration is a first-class error, not a
//! runtime surprise.

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// Relative weights of the three confidence signals.
///
/// The exact weighting is an implementation detail tuned per corpus;
/// boundary behavior (clamping, threshold gating) is what callers may
/// rely on. Weights must be non-negative and sum to approximately 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the classifier confidence (primary signal).
    pub classifier: f64,
    /// Weight of structural consistency derived from validation flags.
    pub structural: f64,
    /// Weight of the learned prior from the pattern store.
    pub prior: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            classifier: 0.70,
            structural: 0.25,
            prior: 0.05,
        }
    }
}

/// Configuration for one extraction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum confidence score (0–100) for a table to appear in the
    /// output sequence.
    pub confidence_threshold: f64,
    /// Suppress bands whose text repeats across pages in the page
    /// margins (running headers/footers, letterheads).
    pub exclude_headers: bool,
    /// Resolve titles, capture notes, and build the cross-reference
    /// graph.
    pub capture_context: bool,
    /// Write to the pattern store in `extract_and_learn`.
    pub enable_learning: bool,
    /// Upper bound on concurrent classifier calls per document.
    pub parallel_agents: usize,

    /// Per-call classifier timeout in milliseconds.
    pub classify_timeout_ms: u64,
    /// Retries per region after the first classifier failure.
    pub classify_max_retries: u32,
    /// Vertical whitespace gap (points) that separates layout bands.
    pub gap_threshold_pt: f32,
    /// How far above/below a region (points) context text is searched.
    pub context_distance_pt: f32,
    /// Minimum line count for a band to become a region candidate.
    pub min_rows: usize,
    /// Minimum column count for a band to become a region candidate.
    pub min_columns: usize,
    /// Tables at or below this many data rows *and* columns are flagged
    /// as suspiciously small.
    pub size_floor: usize,
    /// Signal weights for the confidence scorer.
    pub weights: ScoringWeights,
    /// Capacity cap of the pattern store before eviction.
    pub max_patterns: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 95.0,
            exclude_headers: true,
            capture_context: true,
            enable_learning: true,
            parallel_agents: 5,
            classify_timeout_ms: 30_000,
            classify_max_retries: 2,
            gap_threshold_pt: 18.0,
            context_distance_pt: 72.0,
            min_rows: 2,
            min_columns: 2,
            size_floor: 2,
            weights: ScoringWeights::default(),
            max_patterns: 4096,
        }
    }
}

impl ExtractionConfig {
    /// Check the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(ExtractError::InvalidConfig {
                reason: format!(
                    "confidence_threshold must be within 0-100, got {}",
                    self.confidence_threshold
                ),
            });
        }
        if self.parallel_agents == 0 {
            return Err(ExtractError::InvalidConfig {
                reason: "parallel_agents must be at least 1".to_string(),
            });
        }
        if self.min_columns < 1 || self.min_rows < 1 {
            return Err(ExtractError::InvalidConfig {
                reason: "min_rows and min_columns must be at least 1".to_string(),
            });
        }
        let weights = &self.weights;
        if weights.classifier < 0.0 || weights.structural < 0.0 || weights.prior < 0.0 {
            return Err(ExtractError::InvalidConfig {
                reason: "scoring weights must be non-negative".to_string(),
            });
        }
        let sum = weights.classifier + weights.structural + weights.prior;
        if (sum - 1.0).abs() > 0.01 {
            return Err(ExtractError::InvalidConfig {
                reason: format!("scoring weights must sum to 1.0, got {sum:.3}"),
            });
        }
        if self.max_patterns == 0 {
            return Err(ExtractError::InvalidConfig {
                reason: "max_patterns must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ExtractionConfig::default().validate().is_ok());
    }

    #[test]
    fn default_values_match_contract() {
        let config = ExtractionConfig::default();
        assert_eq!(config.confidence_threshold, 95.0);
        assert!(config.exclude_headers);
        assert!(config.capture_context);
        assert!(config.enable_learning);
        assert_eq!(config.parallel_agents, 5);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ExtractionConfig {
            parallel_agents: 0,
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ExtractError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn unbalanced_weights_rejected() {
        let config = ExtractionConfig {
            weights: ScoringWeights {
                classifier: 0.9,
                structural: 0.9,
                prior: 0.0,
            },
            ..ExtractionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"confidence_threshold": 80.0}"#).unwrap();
        assert_eq!(config.confidence_threshold, 80.0);
        assert_eq!(config.parallel_agents, 5);
    }
}
