//! Orchestrator: drives one document through the pipeline.
//!
//! scan → classify (bounded-parallel) → extract → link contexts →
//! validate → score → threshold gate → record to the pattern store →
//! assemble the result.
//!
//! Classification is the only suspending stage and the only one that
//! runs concurrently; everything downstream of it needs whole-document
//! visibility (the context linker resolves cross-references between
//! tables on different pages) and runs in reading order. Output is
//! deterministic regardless of `parallel_agents`: verdicts are joined
//! back in region order, never completion order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::classify::{Classifier, ClassifierAdapter, Verdict};
use crate::config::ExtractionConfig;
use crate::context::ContextLinker;
use crate::error::{ExtractError, Result};
use crate::extract::{TableDraft, TableExtractor};
use crate::layout::Document;
use crate::patterns::{PatternStore, ValidationOutcome};
use crate::scanner::{Region, RegionScanner};
use crate::score::{score, PriorSignal};
use crate::table::{ExtractionResult, QualityMetrics, RejectedCandidate};
use crate::validate::validate;

/// Cooperative cancellation handle for a document extraction.
///
/// Cancelling stops new classifier calls from being issued; in-flight
/// calls drain. A cancelled extraction returns
/// [`ExtractError::Cancelled`] and no partial result.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Session counters across all documents an engine has processed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Documents successfully processed.
    pub documents_processed: u64,
    /// Tables emitted above threshold.
    pub tables_extracted: u64,
    /// Candidates excluded by threshold gating.
    pub candidates_rejected: u64,
    /// Novel patterns learned.
    pub patterns_learned: u64,
}

/// The extraction engine.
///
/// Stateless per document apart from session counters; the pattern
/// store — the system's only shared mutable state — is passed in
/// explicitly and may be shared across engines and documents.
pub struct Engine {
    config: ExtractionConfig,
    classifier: Arc<dyn Classifier>,
    store: Option<Arc<PatternStore>>,
    documents_processed: AtomicU64,
    tables_extracted: AtomicU64,
    candidates_rejected: AtomicU64,
    patterns_learned: AtomicU64,
}

impl Engine {
    /// Create an engine with a validated configuration and a
    /// classifier backend. No pattern store is attached; scoring runs
    /// with the prior term omitted until [`Engine::with_store`].
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidConfig`] when the configuration
    /// fails validation.
    pub fn new(config: ExtractionConfig, classifier: Arc<dyn Classifier>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            classifier,
            store: None,
            documents_processed: AtomicU64::new(0),
            tables_extracted: AtomicU64::new(0),
            candidates_rejected: AtomicU64::new(0),
            patterns_learned: AtomicU64::new(0),
        })
    }

    /// Attach a pattern store for priors and learning.
    #[must_use]
    pub fn with_store(mut self, store: Arc<PatternStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Persist the attached pattern store, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::StoreUnavailable`] when the store's
    /// backing file cannot be written.
    pub fn persist_store(&self) -> Result<()> {
        match &self.store {
            Some(store) => store.persist(),
            None => Ok(()),
        }
    }

    /// Snapshot of the session counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            tables_extracted: self.tables_extracted.load(Ordering::Relaxed),
            candidates_rejected: self.candidates_rejected.load(Ordering::Relaxed),
            patterns_learned: self.patterns_learned.load(Ordering::Relaxed),
        }
    }

    /// Extract all tables from a document. Read-only with respect to
    /// learning state: the pattern store is consulted for priors but
    /// never written.
    ///
    /// # Errors
    ///
    /// Only [`ExtractError::DocumentFailure`] is surfaced; every other
    /// failure mode degrades to lower-confidence or excluded output.
    pub async fn extract(&self, document: &Document) -> Result<ExtractionResult> {
        self.run(document, false, None).await
    }

    /// Extract all tables and record their shapes into the pattern
    /// store. Emits the same table content as [`Engine::extract`] for
    /// the same document and configuration — learning biases future
    /// scoring, never extraction structure.
    ///
    /// # Errors
    ///
    /// Same surface as [`Engine::extract`].
    pub async fn extract_and_learn(&self, document: &Document) -> Result<ExtractionResult> {
        self.run(document, true, None).await
    }

    /// [`Engine::extract`] with a cancellation token.
    ///
    /// # Errors
    ///
    /// Additionally returns [`ExtractError::Cancelled`] when the token
    /// fires before the document completes.
    pub async fn extract_with_cancellation(
        &self,
        document: &Document,
        token: &CancellationToken,
    ) -> Result<ExtractionResult> {
        self.run(document, false, Some(token)).await
    }

    /// [`Engine::extract_and_learn`] with a cancellation token.
    ///
    /// # Errors
    ///
    /// Same surface as [`Engine::extract_with_cancellation`].
    pub async fn extract_and_learn_with_cancellation(
        &self,
        document: &Document,
        token: &CancellationToken,
    ) -> Result<ExtractionResult> {
        self.run(document, true, Some(token)).await
    }

    async fn run(
        &self,
        document: &Document,
        learn: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<ExtractionResult> {
        if document.pages.is_empty() {
            return Err(ExtractError::DocumentFailure {
                reason: format!("no layout primitives for document '{}'", document.name),
            });
        }

        let regions = RegionScanner::new(&self.config).scan_document(document);
        let verdicts = self.classify_regions(&regions, cancel).await;
        if let Some(token) = cancel {
            if token.is_cancelled() {
                info!(document = %document.name, "extraction cancelled");
                return Err(ExtractError::Cancelled);
            }
        }

        let extractor = TableExtractor::new(&self.config);
        let mut drafts: Vec<TableDraft> = regions
            .iter()
            .zip(&verdicts)
            .filter(|(_, verdict)| verdict.is_table)
            .map(|(region, verdict)| extractor.extract(region, verdict))
            .collect();
        let confirmed = drafts.len();
        debug!(
            document = %document.name,
            candidates = regions.len(),
            confirmed,
            "classification complete"
        );

        if self.config.capture_context {
            ContextLinker::new(&self.config).link(document, &regions, &mut drafts);
        }

        // Validate and score in reading order; all lookups happen
        // before any store write so scores inside one run never depend
        // on what the same run learns.
        let mut kept: Vec<(TableDraft, usize)> = Vec::new();
        let mut rejected: Vec<RejectedCandidate> = Vec::new();
        let mut structural_sum = 0.0;
        for mut draft in drafts {
            let flags = validate(&draft, &self.config);
            let prior = match &self.store {
                None => PriorSignal::Unavailable,
                Some(store) => match store.lookup(&draft.table.structural_fingerprint) {
                    Some(pattern) => PriorSignal::Matched(pattern.confidence_prior),
                    None => PriorSignal::Novel,
                },
            };
            let breakdown = score(
                draft.classifier_confidence,
                &flags,
                prior,
                &self.config.weights,
            );
            draft.table.confidence = round1(breakdown.total);

            if draft.table.confidence >= self.config.confidence_threshold {
                structural_sum += breakdown.structural;
                kept.push((draft, flags.len()));
            } else {
                debug!(
                    page = draft.table.page,
                    confidence = draft.table.confidence,
                    "candidate below threshold, excluded"
                );
                rejected.push(RejectedCandidate {
                    page: draft.table.page,
                    title: draft.table.title.clone(),
                    confidence: draft.table.confidence,
                    flags,
                });
            }
        }

        let mut novel_patterns: Vec<String> = Vec::new();
        if learn && self.config.enable_learning {
            if let Some(store) = &self.store {
                for (draft, flag_count) in &kept {
                    let outcome = ValidationOutcome {
                        final_confidence: draft.table.confidence,
                        flag_count: *flag_count,
                    };
                    let recorded = store.record(&draft.table.structural_fingerprint, outcome);
                    if recorded.novel && !novel_patterns.contains(&recorded.key) {
                        novel_patterns.push(recorded.key);
                    }
                }
            } else {
                warn!(
                    document = %document.name,
                    "learning requested but no pattern store attached"
                );
            }
        }

        let tables: Vec<_> = kept
            .into_iter()
            .enumerate()
            .map(|(idx, (mut draft, _))| {
                draft.table.table_id = idx + 1;
                draft.table
            })
            .collect();

        let quality_metrics = quality_metrics(&tables, confirmed, structural_sum);

        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.tables_extracted
            .fetch_add(tables.len() as u64, Ordering::Relaxed);
        self.candidates_rejected
            .fetch_add(rejected.len() as u64, Ordering::Relaxed);
        self.patterns_learned
            .fetch_add(novel_patterns.len() as u64, Ordering::Relaxed);

        info!(
            document = %document.name,
            tables = tables.len(),
            rejected = rejected.len(),
            novel = novel_patterns.len(),
            "extraction complete"
        );

        Ok(ExtractionResult {
            document: document.name.clone(),
            document_id: document.id(),
            extraction_timestamp: Utc::now().to_rfc3339(),
            tables_found: tables.len(),
            tables,
            quality_metrics,
            novel_patterns,
            rejected,
        })
    }

    /// Classify all regions with bounded parallelism, preserving
    /// region order in the returned verdicts.
    async fn classify_regions(
        &self,
        regions: &[Region],
        cancel: Option<&CancellationToken>,
    ) -> Vec<Verdict> {
        let adapter = ClassifierAdapter::new(Arc::clone(&self.classifier), &self.config);
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_agents));
        let adapter_ref = &adapter;

        join_all(regions.iter().map(|region| {
            let semaphore = Arc::clone(&semaphore);
            let view = region.view();
            async move {
                let _permit = semaphore.acquire().await;
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    return Verdict::fallback();
                }
                adapter_ref.classify(&view).await
            }
        }))
        .await
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn quality_metrics(
    tables: &[crate::table::ExtractedTable],
    confirmed: usize,
    structural_sum: f64,
) -> QualityMetrics {
    let completeness = if confirmed == 0 {
        100.0
    } else {
        tables.len() as f64 / confirmed as f64 * 100.0
    };
    let structural_integrity = if tables.is_empty() {
        100.0
    } else {
        structural_sum / tables.len() as f64
    };
    let title_accuracy = if tables.is_empty() {
        100.0
    } else {
        tables.iter().filter(|table| !table.title.is_empty()).count() as f64
            / tables.len() as f64
            * 100.0
    };
    QualityMetrics {
        completeness: round1(completeness),
        structural_integrity: round1(structural_integrity),
        title_accuracy: round1(title_accuracy),
    }
}
