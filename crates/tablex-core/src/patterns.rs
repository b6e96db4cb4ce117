//! Pattern store: the learning engine.
//!
//! The only process-wide mutable state in the system. Every other
//! component is stateless per invocation; the store is passed
//! explicitly into the engine as a context object so multiple isolated
//! stores can coexist (per tenant, per test run).
//!
//! Novelty is decided by similarity, not exact equality: fingerprints
//! within a small structural distance collapse onto one learned
//! pattern, which keeps trivial variation (one more header level, a
//! few more rows) from fragmenting the store. Growth is monotonic up
//! to a capacity cap; past the cap the least-recently-recorded pattern
//! is evicted.
//!
//! Locking: `lookup` takes the shared read lock and may proceed
//! concurrently; `record` takes the exclusive write lock, which
//! serializes all occurrence-count updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};
use crate::fingerprint::StructuralFingerprint;

/// Maximum structural distance at which two fingerprints are treated
/// as the same pattern.
pub const SIMILARITY_TOLERANCE: u32 = 1;

/// Half-range of the learned confidence prior bias.
const PRIOR_SPAN: f64 = 25.0;

/// Smoothing factor of the prior's exponential moving average.
const PRIOR_SMOOTHING: f64 = 0.2;

/// A persisted record of a previously validated table shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    /// The shape this pattern stands for.
    pub fingerprint: StructuralFingerprint,
    /// Store key of the fingerprint.
    pub key: String,
    /// When the shape was first recorded.
    pub first_seen_at: DateTime<Utc>,
    /// When the shape was last recorded.
    pub last_seen_at: DateTime<Utc>,
    /// How many times the shape has been recorded. Never decreases.
    pub occurrence_count: u64,
    /// Scoring bias learned from validation outcomes, within ±25.
    pub confidence_prior: f64,
}

/// What the scorer decided about a table, fed back for learning.
#[derive(Debug, Clone, Copy)]
pub struct ValidationOutcome {
    /// Final confidence of the table, 0–100.
    pub final_confidence: f64,
    /// Number of validation flags raised against the table.
    pub flag_count: usize,
}

/// Result of one `record` call.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// True when the fingerprint was not matched by any stored pattern
    /// and a new one was inserted.
    pub novel: bool,
    /// Key of the pattern that absorbed the record.
    pub key: String,
}

/// Summary counters over the store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PatternStoreStats {
    /// Number of learned patterns currently held.
    pub patterns: usize,
    /// Sum of occurrence counts across all patterns.
    pub total_occurrences: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot {
    pattern: LearnedPattern,
    /// Logical clock value of the last record against this pattern;
    /// drives least-recently-recorded eviction.
    last_recorded: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreInner {
    patterns: HashMap<String, Slot>,
    clock: u64,
}

impl StoreInner {
    /// Key of the stored pattern closest to `fingerprint`, within
    /// tolerance. Exact key hits win; ties break on the smaller key so
    /// matching is deterministic.
    fn find_match(&self, fingerprint: &StructuralFingerprint) -> Option<String> {
        let exact = fingerprint.key();
        if self.patterns.contains_key(&exact) {
            return Some(exact);
        }
        let mut best: Option<(u32, &str)> = None;
        for (key, slot) in &self.patterns {
            let distance = fingerprint.distance(&slot.pattern.fingerprint);
            if distance > SIMILARITY_TOLERANCE {
                continue;
            }
            let better = match best {
                Some((best_distance, best_key)) => {
                    distance < best_distance
                        || (distance == best_distance && key.as_str() < best_key)
                }
                None => true,
            };
            if better {
                best = Some((distance, key));
            }
        }
        best.map(|(_, key)| key.to_string())
    }
}

/// Thread-safe store of learned table shapes.
#[derive(Debug)]
pub struct PatternStore {
    inner: RwLock<StoreInner>,
    path: Option<PathBuf>,
    capacity: usize,
}

impl PatternStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            path: None,
            capacity: capacity.max(1),
        }
    }

    /// Open a store backed by a JSON file. A missing file yields an
    /// empty store; an unreadable or corrupt file is a
    /// [`ExtractError::StoreUnavailable`] the caller may choose to
    /// degrade on.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|err| {
                ExtractError::StoreUnavailable {
                    reason: format!("cannot read {}: {err}", path.display()),
                }
            })?;
            serde_json::from_str(&raw).map_err(|err| ExtractError::StoreUnavailable {
                reason: format!("cannot parse {}: {err}", path.display()),
            })?
        } else {
            StoreInner::default()
        };
        Ok(Self {
            inner: RwLock::new(inner),
            path: Some(path),
            capacity: capacity.max(1),
        })
    }

    /// Look up the learned pattern matching a fingerprint, within the
    /// similarity tolerance.
    #[must_use]
    pub fn lookup(&self, fingerprint: &StructuralFingerprint) -> Option<LearnedPattern> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = inner.find_match(fingerprint)?;
        inner.patterns.get(&key).map(|slot| slot.pattern.clone())
    }

    /// Record a validated table shape: increment the matched pattern
    /// (recomputing its prior) or insert a new one and report novelty.
    pub fn record(
        &self,
        fingerprint: &StructuralFingerprint,
        outcome: ValidationOutcome,
    ) -> RecordOutcome {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.clock += 1;
        let clock = inner.clock;
        let now = Utc::now();
        let signal = prior_signal(outcome);

        if let Some(key) = inner.find_match(fingerprint) {
            if let Some(slot) = inner.patterns.get_mut(&key) {
                slot.pattern.occurrence_count += 1;
                slot.pattern.last_seen_at = now;
                slot.pattern.confidence_prior = ((1.0 - PRIOR_SMOOTHING)
                    * slot.pattern.confidence_prior
                    + PRIOR_SMOOTHING * signal)
                    .clamp(-PRIOR_SPAN, PRIOR_SPAN);
                slot.last_recorded = clock;
            }
            return RecordOutcome { novel: false, key };
        }

        let key = fingerprint.key();
        debug!(%key, "learned novel table shape");
        inner.patterns.insert(
            key.clone(),
            Slot {
                pattern: LearnedPattern {
                    fingerprint: fingerprint.clone(),
                    key: key.clone(),
                    first_seen_at: now,
                    last_seen_at: now,
                    occurrence_count: 1,
                    confidence_prior: (PRIOR_SMOOTHING * signal).clamp(-PRIOR_SPAN, PRIOR_SPAN),
                },
                last_recorded: clock,
            },
        );
        self.evict_over_capacity(&mut inner);
        RecordOutcome { novel: true, key }
    }

    /// Summary counters.
    #[must_use]
    pub fn stats(&self) -> PatternStoreStats {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        PatternStoreStats {
            patterns: inner.patterns.len(),
            total_occurrences: inner
                .patterns
                .values()
                .map(|slot| slot.pattern.occurrence_count)
                .sum(),
        }
    }

    /// All learned patterns, ordered by key.
    #[must_use]
    pub fn patterns(&self) -> Vec<LearnedPattern> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut patterns: Vec<LearnedPattern> = inner
            .patterns
            .values()
            .map(|slot| slot.pattern.clone())
            .collect();
        patterns.sort_by(|a, b| a.key.cmp(&b.key));
        patterns
    }

    /// Persist the store to its backing file, if it has one.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let raw = serde_json::to_string_pretty(&*inner).map_err(|err| {
            ExtractError::StoreUnavailable {
                reason: format!("cannot serialize store: {err}"),
            }
        })?;
        std::fs::write(path, raw).map_err(|err| ExtractError::StoreUnavailable {
            reason: format!("cannot write {}: {err}", path.display()),
        })?;
        Ok(())
    }

    fn evict_over_capacity(&self, inner: &mut StoreInner) {
        while inner.patterns.len() > self.capacity {
            let Some(victim) = inner
                .patterns
                .iter()
                .min_by_key(|(key, slot)| (slot.last_recorded, (*key).clone()))
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            warn!(key = %victim, "pattern store over capacity, evicting");
            inner.patterns.remove(&victim);
        }
    }
}

fn prior_signal(outcome: ValidationOutcome) -> f64 {
    let centered = (outcome.final_confidence.clamp(0.0, 100.0) / 100.0 - 0.5) * 2.0 * PRIOR_SPAN;
    let flag_drag = outcome.flag_count as f64 * 2.0;
    (centered - flag_drag).clamp(-PRIOR_SPAN, PRIOR_SPAN)
}
