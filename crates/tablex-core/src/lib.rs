//! # tablex-core — structured table extraction pipeline
//!
//! Extracts structured tables (title, headers, rows, contextual notes,
//! cross-references) from parsed document layout, distinguishing
//! genuine data tables from visual noise such as letterheads and
//! running headers/footers.
//!
//! The pipeline: region scanning → delegated semantic classification →
//! structural extraction → context linking → validation → confidence
//! scoring → pattern learning. Raw document parsing and the semantic
//! judgment itself are external collaborators: the parser hands over a
//! [`Document`] of positioned text blocks, and classification goes
//! through the [`Classifier`] capability, satisfied by any backend.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tablex_core::{Document, Engine, ExtractionConfig, HeuristicClassifier, PatternStore};
//!
//! # async fn example(document: Document) -> tablex_core::Result<()> {
//! let store = Arc::new(PatternStore::in_memory(4096));
//! let engine = Engine::new(ExtractionConfig::default(), Arc::new(HeuristicClassifier))?
//!     .with_store(store);
//!
//! let result = engine.extract_and_learn(&document).await?;
//! for table in &result.tables {
//!     println!("{} ({}% confidence)", table.title, table.confidence);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Every emitted row has exactly the header leaf column count.
//! - No table below `confidence_threshold` appears in a result.
//! - Output ordering is document reading order, independent of the
//!   classifier concurrency bound.
//! - Only a document the parser could not read at all fails; every
//!   other problem degrades to lower-confidence or excluded output.

pub mod classify;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod layout;
pub mod patterns;
pub mod scanner;
pub mod score;
pub mod table;
pub mod validate;

pub use classify::{Classifier, ClassifierAdapter, HeuristicClassifier, Verdict};
pub use config::{ExtractionConfig, ScoringWeights};
pub use engine::{CancellationToken, Engine, EngineStats};
pub use error::{ClassifyError, ExtractError, Result};
pub use fingerprint::{CellType, StructuralFingerprint};
pub use layout::{BoundingBox, Document, Page, TextBlock};
pub use patterns::{
    LearnedPattern, PatternStore, PatternStoreStats, RecordOutcome, ValidationOutcome,
};
pub use scanner::{Region, RegionScanner, RegionView};
pub use table::{
    ExtractedTable, ExtractionResult, HeaderGroup, QualityMetrics, RejectedCandidate,
    Relationships,
};
pub use validate::ValidationFlag;
