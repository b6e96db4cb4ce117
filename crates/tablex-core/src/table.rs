//! Output types — the wire contract.
//!
//! Field names and nesting here are what callers depend on; they follow
//! the shape of the original extraction service and must not drift.
//! Everything serializes with `serde_json` and deserializes back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fingerprint::StructuralFingerprint;
use crate::validate::ValidationFlag;

/// One header entry: a cell group covering an inclusive range of leaf
/// columns.
///
/// A flat header is a group spanning a single column with no children.
/// A level-1 cell spanning columns 2–4 with three sub-labels under it
/// becomes one group with `columns: [2, 4]` and three `children`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderGroup {
    /// Header cell text.
    pub label: String,
    /// Inclusive 1-based leaf column range `[start, end]`.
    pub columns: [usize; 2],
    /// Sub-labels of the second header level, empty for flat headers.
    pub children: Vec<String>,
}

impl HeaderGroup {
    /// Number of leaf columns this group covers.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.columns[1].saturating_sub(self.columns[0]) + 1
    }

    /// Label of the leaf column at `offset` within this group.
    #[must_use]
    pub fn leaf_label(&self, offset: usize) -> &str {
        self.children
            .get(offset)
            .map_or(self.label.as_str(), String::as_str)
    }
}

/// Total leaf column count of a header sequence.
#[must_use]
pub fn leaf_column_count(headers: &[HeaderGroup]) -> usize {
    headers.iter().map(HeaderGroup::leaf_count).sum()
}

/// Cross-reference links of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships {
    /// Coarse document section this table belongs to.
    pub document_section: String,
    /// Identifiers of tables related to this one (symmetric: if A lists
    /// B here, B lists A).
    pub related_tables: Vec<String>,
    /// Table labels this table's title or notes mention.
    pub references: Vec<String>,
}

/// One extracted, validated, scored table. Immutable once emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// 1-based position in the document's reading order.
    pub table_id: usize,
    /// 1-based page number the table starts on.
    pub page: usize,
    /// Resolved title; empty when no title could be attributed.
    pub title: String,
    /// Final aggregate confidence, 0–100.
    pub confidence: f64,
    /// Header cell groups, left to right.
    pub headers: Vec<HeaderGroup>,
    /// Rectangular data grid: every row has exactly the leaf column
    /// count of `headers`.
    #[serde(rename = "data")]
    pub rows: Vec<Vec<String>>,
    /// One-line description of where the table sits in the document.
    pub context: String,
    /// Text captured immediately after the table.
    pub notes: Vec<String>,
    /// Cross-reference links.
    pub relationships: Relationships,
    /// Totals row lifted out of the data grid, keyed by header label.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub totals: Option<BTreeMap<String, String>>,
    /// Shape summary used as the learning key. Derived, not part of the
    /// wire contract.
    #[serde(skip)]
    pub structural_fingerprint: StructuralFingerprint,
}

/// Quality aggregates for one document, each 0–100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Share of confirmed table candidates that survived gating.
    pub completeness: f64,
    /// Mean structural-consistency score of the emitted tables.
    pub structural_integrity: f64,
    /// Share of emitted tables that carry a title.
    pub title_accuracy: f64,
}

/// A candidate excluded by threshold gating, kept for diagnostics.
///
/// Not part of the wire output: exclusion is silent to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    /// 1-based page number of the candidate.
    pub page: usize,
    /// Title the candidate would have carried.
    pub title: String,
    /// Score that fell short of the threshold.
    pub confidence: f64,
    /// Validation flags raised against the candidate.
    pub flags: Vec<ValidationFlag>,
}

/// Per-document extraction result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Display name of the document.
    pub document: String,
    /// Stable document identifier.
    pub document_id: String,
    /// RFC 3339 timestamp of this extraction run.
    pub extraction_timestamp: String,
    /// Number of tables in `tables`.
    pub tables_found: usize,
    /// Extracted tables in document reading order.
    pub tables: Vec<ExtractedTable>,
    /// Quality aggregates for the document.
    pub quality_metrics: QualityMetrics,
    /// Fingerprint keys newly learned this run (extract-and-learn only).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub novel_patterns: Vec<String>,
    /// Diagnostics log of candidates excluded by gating.
    #[serde(skip)]
    pub rejected: Vec<RejectedCandidate>,
}

impl ExtractionResult {
    /// Equality over extraction content: tables, metrics, and novel
    /// patterns. The run timestamp is excluded — two runs over the same
    /// document and configuration are idempotent under this relation.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        self.document == other.document
            && self.document_id == other.document_id
            && self.tables_found == other.tables_found
            && self.tables == other.tables
            && self.quality_metrics == other.quality_metrics
            && self.novel_patterns == other.novel_patterns
    }
}
