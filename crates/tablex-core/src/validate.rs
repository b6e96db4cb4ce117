//! Structural validation.
//!
//! Each check produces a named flag rather than failing outright; the
//! flags feed the confidence scorer, which is where their weight is
//! decided. The validator never discards a table itself — even a badly
//! damaged grid stays visible (below threshold) for diagnosis.

use serde::{Deserialize, Serialize};

use crate::config::ExtractionConfig;
use crate::extract::TableDraft;
use crate::table::leaf_column_count;

/// Named structural findings against one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    /// A data row's cell count differs from the header leaf count.
    /// Enforced upstream by the extractor, re-verified here.
    RowLengthMismatch,
    /// Two or more identical data rows.
    DuplicateRows,
    /// No data rows and no header labels worth keeping.
    EmptyTable,
    /// At or below the configured size floor in both dimensions;
    /// likely a false positive.
    BelowSizeFloor,
    /// Cells were padded during extraction to restore rectangularity.
    RepairedCells,
    /// Notes were captured but the table links to nothing.
    OrphanNotes,
}

impl ValidationFlag {
    /// Penalty subtracted from the structural-consistency score.
    #[must_use]
    pub fn penalty(self) -> f64 {
        match self {
            Self::RowLengthMismatch => 40.0,
            Self::DuplicateRows => 10.0,
            Self::EmptyTable => 15.0,
            Self::BelowSizeFloor => 25.0,
            Self::RepairedCells => 15.0,
            Self::OrphanNotes => 5.0,
        }
    }
}

/// Run every structural check against a draft.
#[must_use]
pub fn validate(draft: &TableDraft, config: &ExtractionConfig) -> Vec<ValidationFlag> {
    let table = &draft.table;
    let mut flags = Vec::new();

    let leaves = leaf_column_count(&table.headers);
    if table.rows.iter().any(|row| row.len() != leaves) {
        flags.push(ValidationFlag::RowLengthMismatch);
    }

    if has_duplicate_rows(&table.rows) {
        flags.push(ValidationFlag::DuplicateRows);
    }

    let headers_empty = table.headers.iter().all(|group| {
        group.label.is_empty() && group.children.iter().all(String::is_empty)
    });
    if table.rows.is_empty() && headers_empty {
        flags.push(ValidationFlag::EmptyTable);
    }

    if table.rows.len() <= config.size_floor && leaves <= config.size_floor {
        flags.push(ValidationFlag::BelowSizeFloor);
    }

    if draft.repaired_cells > 0 {
        flags.push(ValidationFlag::RepairedCells);
    }

    if !table.notes.is_empty()
        && table.relationships.references.is_empty()
        && table.relationships.related_tables.is_empty()
    {
        flags.push(ValidationFlag::OrphanNotes);
    }

    flags
}

fn has_duplicate_rows(rows: &[Vec<String>]) -> bool {
    for (idx, row) in rows.iter().enumerate() {
        if rows[idx + 1..].contains(row) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::StructuralFingerprint;
    use crate::layout::BoundingBox;
    use crate::table::{ExtractedTable, HeaderGroup};

    fn draft_with(headers: Vec<HeaderGroup>, rows: Vec<Vec<String>>) -> TableDraft {
        let structural_fingerprint = StructuralFingerprint::of_grid(&headers, &rows);
        TableDraft {
            page_index: 0,
            ordinal: 0,
            bbox: BoundingBox::default(),
            classifier_confidence: 95.0,
            table: ExtractedTable {
                headers,
                rows,
                structural_fingerprint,
                ..ExtractedTable::default()
            },
            repaired_cells: 0,
        }
    }

    fn headers(labels: &[&str]) -> Vec<HeaderGroup> {
        labels
            .iter()
            .enumerate()
            .map(|(idx, label)| HeaderGroup {
                label: (*label).to_string(),
                columns: [idx + 1, idx + 1],
                children: Vec::new(),
            })
            .collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn clean_table_has_no_flags() {
        let draft = draft_with(
            headers(&["A", "B", "C"]),
            vec![
                row(&["1", "x", "$5"]),
                row(&["2", "y", "$6"]),
                row(&["3", "z", "$7"]),
            ],
        );
        let config = ExtractionConfig::default();
        assert!(validate(&draft, &config).is_empty());
    }

    #[test]
    fn ragged_row_flagged() {
        let mut draft = draft_with(
            headers(&["A", "B", "C"]),
            vec![row(&["1", "x", "$5"]), row(&["2", "y", "$6"]), row(&["3"])],
        );
        draft.table.rows[2] = row(&["3"]);
        let config = ExtractionConfig::default();
        assert!(validate(&draft, &config).contains(&ValidationFlag::RowLengthMismatch));
    }

    #[test]
    fn duplicate_rows_flagged() {
        let draft = draft_with(
            headers(&["A", "B", "C"]),
            vec![
                row(&["1", "x", "$5"]),
                row(&["1", "x", "$5"]),
                row(&["3", "z", "$7"]),
            ],
        );
        let config = ExtractionConfig::default();
        assert!(validate(&draft, &config).contains(&ValidationFlag::DuplicateRows));
    }

    #[test]
    fn tiny_table_flagged() {
        let draft = draft_with(headers(&["A", "B"]), vec![row(&["1", "2"])]);
        let config = ExtractionConfig::default();
        assert!(validate(&draft, &config).contains(&ValidationFlag::BelowSizeFloor));
    }

    #[test]
    fn header_only_table_is_not_empty() {
        let draft = draft_with(headers(&["A", "B", "C"]), Vec::new());
        let config = ExtractionConfig::default();
        let flags = validate(&draft, &config);
        assert!(!flags.contains(&ValidationFlag::EmptyTable));
    }

    #[test]
    fn repaired_cells_flagged() {
        let mut draft = draft_with(
            headers(&["A", "B", "C"]),
            vec![
                row(&["1", "x", ""]),
                row(&["2", "y", "$6"]),
                row(&["3", "z", "$7"]),
            ],
        );
        draft.repaired_cells = 1;
        let config = ExtractionConfig::default();
        assert!(validate(&draft, &config).contains(&ValidationFlag::RepairedCells));
    }

    #[test]
    fn orphan_notes_flagged() {
        let mut draft = draft_with(
            headers(&["A", "B", "C"]),
            vec![
                row(&["1", "x", "$5"]),
                row(&["2", "y", "$6"]),
                row(&["3", "z", "$7"]),
            ],
        );
        draft.table.notes.push("A note".to_string());
        let config = ExtractionConfig::default();
        assert!(validate(&draft, &config).contains(&ValidationFlag::OrphanNotes));
    }
}
