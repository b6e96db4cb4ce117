//! Structural fingerprints: the learning key.
//!
//! A fingerprint summarizes a table's *shape* — never its content — so
//! two structurally equivalent tables share one fingerprint regardless
//! of what their cells say, and the same document produces the same
//! fingerprints on every run.
//!
//! Row counts are stored as a log₂ bucket rather than raw counts:
//! a 14-row and a 15-row rendition of the same report should land on
//! the same learned pattern, and the similarity merge in the pattern
//! store operates on bucket distance.

use serde::{Deserialize, Serialize};

use crate::table::HeaderGroup;

/// Coarse classification of a column's dominant cell content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    /// Column is mostly empty cells.
    Empty,
    /// Column is mostly bare numbers.
    Numeric,
    /// Column is mostly currency-formatted amounts.
    Currency,
    /// Anything else.
    #[default]
    Text,
}

impl CellType {
    /// Classify one cell's text.
    #[must_use]
    pub fn of_cell(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if is_currency(trimmed) {
            return Self::Currency;
        }
        if is_numeric(trimmed) {
            return Self::Numeric;
        }
        Self::Text
    }

    fn code(self) -> char {
        match self {
            Self::Empty => 'e',
            Self::Numeric => 'n',
            Self::Currency => 'c',
            Self::Text => 't',
        }
    }
}

fn is_currency(text: &str) -> bool {
    let stripped = text.trim_start_matches(['$', '€', '£', '¥', '(']);
    stripped != text && is_numeric(stripped.trim_end_matches(')'))
}

fn is_numeric(text: &str) -> bool {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '%'))
        .collect();
    !cleaned.is_empty() && cleaned.parse::<f64>().is_ok()
}

/// Content-independent summary of a table's shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuralFingerprint {
    /// Leaf column count.
    pub column_count: usize,
    /// log₂ bucket of the data row count (0 for an empty table).
    pub row_bucket: u8,
    /// Header nesting depth (1 for flat headers, 2 for grouped).
    pub header_depth: u8,
    /// Dominant cell type per leaf column, left to right.
    pub column_types: Vec<CellType>,
}

impl StructuralFingerprint {
    /// Derive the fingerprint of an extracted grid.
    #[must_use]
    pub fn of_grid(headers: &[HeaderGroup], rows: &[Vec<String>]) -> Self {
        let column_count = headers.iter().map(HeaderGroup::leaf_count).sum();
        let header_depth = if headers.iter().any(|g| !g.children.is_empty()) {
            2
        } else {
            1
        };

        let mut column_types = Vec::with_capacity(column_count);
        for col in 0..column_count {
            let mut counts = [0usize; 4];
            for row in rows {
                let cell = row.get(col).map_or("", String::as_str);
                match CellType::of_cell(cell) {
                    CellType::Empty => counts[0] += 1,
                    CellType::Numeric => counts[1] += 1,
                    CellType::Currency => counts[2] += 1,
                    CellType::Text => counts[3] += 1,
                }
            }
            let dominant = match counts
                .iter()
                .enumerate()
                .max_by_key(|&(idx, count)| (*count, idx))
            {
                Some((0, _)) => CellType::Empty,
                Some((1, _)) => CellType::Numeric,
                Some((2, _)) => CellType::Currency,
                _ => CellType::Text,
            };
            column_types.push(if rows.is_empty() {
                CellType::Empty
            } else {
                dominant
            });
        }

        Self {
            column_count,
            row_bucket: row_bucket(rows.len()),
            header_depth,
            column_types,
        }
    }

    /// Stable, human-readable store key, e.g. `c3-r2-h1-tnc`.
    #[must_use]
    pub fn key(&self) -> String {
        let types: String = self.column_types.iter().map(|t| t.code()).collect();
        format!(
            "c{}-r{}-h{}-{}",
            self.column_count, self.row_bucket, self.header_depth, types
        )
    }

    /// Structural distance to another fingerprint.
    ///
    /// Fingerprints with different column structure are never the same
    /// pattern; otherwise distance is the header-depth difference plus
    /// the row-bucket difference. Distance ≤ 1 counts as the same
    /// pattern for novelty purposes.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        if self.column_count != other.column_count || self.column_types != other.column_types {
            return u32::MAX;
        }
        let depth = u32::from(self.header_depth.abs_diff(other.header_depth));
        let rows = u32::from(self.row_bucket.abs_diff(other.row_bucket));
        depth + rows
    }
}

fn row_bucket(rows: usize) -> u8 {
    if rows == 0 {
        return 0;
    }
    // bucket 1 covers 1 row, 2 covers 2-3, 3 covers 4-7, ...
    (usize::BITS - rows.leading_zeros()) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::HeaderGroup;

    fn flat_headers(labels: &[&str]) -> Vec<HeaderGroup> {
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

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| (*c).to_string()).collect())
            .collect()
    }

    #[test]
    fn cell_type_classification() {
        assert_eq!(CellType::of_cell(""), CellType::Empty);
        assert_eq!(CellType::of_cell("42"), CellType::Numeric);
        assert_eq!(CellType::of_cell("1,250.75"), CellType::Numeric);
        assert_eq!(CellType::of_cell("$212,000"), CellType::Currency);
        assert_eq!(CellType::of_cell("Design Review"), CellType::Text);
    }

    #[test]
    fn fingerprint_depends_on_shape_not_content() {
        let headers = flat_headers(&["Task", "Description", "Cost"]);
        let a = StructuralFingerprint::of_grid(
            &headers,
            &rows(&[&["100", "Design", "$5"], &["200", "Audit", "$7"]]),
        );
        let b = StructuralFingerprint::of_grid(
            &headers,
            &rows(&[&["900", "Other", "$1"], &["800", "Thing", "$2"]]),
        );
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn fingerprint_distinguishes_column_types() {
        let headers = flat_headers(&["A", "B"]);
        let numeric =
            StructuralFingerprint::of_grid(&headers, &rows(&[&["1", "2"], &["3", "4"]]));
        let textual =
            StructuralFingerprint::of_grid(&headers, &rows(&[&["x", "y"], &["z", "w"]]));
        assert_eq!(numeric.distance(&textual), u32::MAX);
    }

    #[test]
    fn nearby_row_counts_share_bucket() {
        let headers = flat_headers(&["A", "B"]);
        let rows_14: Vec<Vec<String>> = (0..14).map(|_| vec!["1".into(), "2".into()]).collect();
        let rows_15: Vec<Vec<String>> = (0..15).map(|_| vec!["1".into(), "2".into()]).collect();
        let a = StructuralFingerprint::of_grid(&headers, &rows_14);
        let b = StructuralFingerprint::of_grid(&headers, &rows_15);
        assert_eq!(a.distance(&b), 0);
    }

    #[test]
    fn header_depth_one_apart_is_same_pattern() {
        let flat = flat_headers(&["A", "B"]);
        let grouped = vec![HeaderGroup {
            label: "Group".to_string(),
            columns: [1, 2],
            children: vec!["A".to_string(), "B".to_string()],
        }];
        let data = rows(&[&["1", "2"], &["3", "4"]]);
        let a = StructuralFingerprint::of_grid(&flat, &data);
        let b = StructuralFingerprint::of_grid(&grouped, &data);
        assert_eq!(a.distance(&b), 1);
    }

    #[test]
    fn empty_table_has_zero_bucket() {
        let headers = flat_headers(&["A", "B"]);
        let fp = StructuralFingerprint::of_grid(&headers, &[]);
        assert_eq!(fp.row_bucket, 0);
        assert_eq!(fp.column_types, vec![CellType::Empty, CellType::Empty]);
    }
}
