//! Classifier capability and the adapter wrapping it.
//!
//! Whether a region really is a table is a semantic judgment delegated
//! to an external reasoning collaborator. That collaborator is modeled
//! as the [`Classifier`] capability — any backend satisfying
//! `classify(region) -> verdict` is interchangeable: the deterministic
//! [`HeuristicClassifier`] below, the remote LLM backend in
//! `tablex-remote`, or a test double.
//!
//! [`ClassifierAdapter`] is the stability layer: per-call timeout,
//! bounded retries with exponential backoff, and a fail-closed fallback
//! (`is_table = false`, confidence 0) once the bound is exhausted. One
//! region's misbehaving backend call never aborts the document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::error::ClassifyError;
use crate::fingerprint::CellType;
use crate::scanner::RegionView;

/// Base delay of the exponential backoff between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Verdict of one classification call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the region is a genuine data table.
    pub is_table: bool,
    /// Title suggested by the backend, empty when none was seen.
    pub title_hint: String,
    /// Backend confidence in the verdict, 0–100.
    pub classifier_confidence: f64,
}

impl Verdict {
    /// The fail-closed verdict used when a region's classification
    /// cannot be completed.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            is_table: false,
            title_hint: String::new(),
            classifier_confidence: 0.0,
        }
    }

    fn sanitized(mut self) -> Self {
        self.classifier_confidence = self.classifier_confidence.clamp(0.0, 100.0);
        self
    }
}

/// The `{classify}` capability.
///
/// Implementations must tolerate concurrent calls and should be
/// idempotent for the same region.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Judge whether the region is a table.
    async fn classify(&self, region: &RegionView) -> Result<Verdict, ClassifyError>;
}

/// Wraps a [`Classifier`] backend behind timeout, retry, and fallback.
pub struct ClassifierAdapter {
    backend: Arc<dyn Classifier>,
    timeout: Duration,
    max_retries: u32,
}

impl ClassifierAdapter {
    /// Build an adapter from the engine configuration.
    #[must_use]
    pub fn new(backend: Arc<dyn Classifier>, config: &ExtractionConfig) -> Self {
        Self {
            backend,
            timeout: Duration::from_millis(config.classify_timeout_ms),
            max_retries: config.classify_max_retries,
        }
    }

    /// Classify a region, absorbing all backend failure modes.
    ///
    /// Never returns an error: after `max_retries` additional attempts
    /// the region fails closed with [`Verdict::fallback`].
    pub async fn classify(&self, region: &RegionView) -> Verdict {
        for attempt in 0..=self.max_retries {
            match tokio::time::timeout(self.timeout, self.backend.classify(region)).await {
                Ok(Ok(verdict)) => return verdict.sanitized(),
                Ok(Err(err)) => {
                    debug!(page = region.page, attempt, %err, "classifier call failed");
                }
                Err(_elapsed) => {
                    debug!(page = region.page, attempt, "classifier call timed out");
                }
            }
            if attempt < self.max_retries {
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt)).await;
            }
        }
        warn!(
            page = region.page,
            "classifier exhausted retries, treating region as non-table"
        );
        Verdict::fallback()
    }
}

/// Deterministic local backend scoring layout regularity.
///
/// Not a substitute for semantic judgment — it exists so the pipeline
/// runs without network access and so tests have a reproducible
/// baseline. Signals: how many lines have multiple cells, how stable
/// the cell count is across lines, and whether data-typed cells
/// (numbers, currency) appear below the first line.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, region: &RegionView) -> Result<Verdict, ClassifyError> {
        let cells_per_line: Vec<usize> = region
            .lines
            .iter()
            .map(|line| line.split(" | ").count())
            .collect();
        if cells_per_line.is_empty() {
            return Ok(Verdict::fallback());
        }

        let multi_cell = cells_per_line.iter().filter(|&&n| n >= 2).count();
        let multi_ratio = multi_cell as f64 / cells_per_line.len() as f64;

        let max_cells = cells_per_line.iter().copied().max().unwrap_or(1);
        let modal = modal_count(&cells_per_line);
        let consistency = cells_per_line.iter().filter(|&&n| n == modal).count() as f64
            / cells_per_line.len() as f64;

        let data_cells = region
            .lines
            .iter()
            .skip(1)
            .flat_map(|line| line.split(" | "))
            .filter(|cell| {
                matches!(
                    CellType::of_cell(cell),
                    CellType::Numeric | CellType::Currency
                )
            })
            .count();
        let data_signal = if data_cells > 0 { 1.0 } else { 0.4 };

        let score = if max_cells < 2 {
            0.0
        } else {
            multi_ratio * 0.45 + consistency * 0.35 + data_signal * 0.2
        };

        let title_hint = region
            .lines
            .first()
            .filter(|line| !line.contains(" | ") && looks_like_heading(line))
            .cloned()
            .unwrap_or_default();

        Ok(Verdict {
            is_table: score >= 0.55,
            title_hint,
            classifier_confidence: (score * 100.0).round().clamp(0.0, 100.0),
        })
    }
}

fn modal_count(counts: &[usize]) -> usize {
    let mut best = (0usize, 0usize);
    for &candidate in counts {
        let occurrences = counts.iter().filter(|&&n| n == candidate).count();
        if occurrences > best.1 || (occurrences == best.1 && candidate > best.0) {
            best = (candidate, occurrences);
        }
    }
    best.0
}

fn looks_like_heading(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    lower.starts_with("table ") || lower.starts_with("exhibit ") || lower.starts_with("schedule ")
}
