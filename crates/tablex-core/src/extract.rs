//! Table extractor: confirmed region → structured grid.
//!
//! Column boundaries come from clustering block left edges across the
//! region's lines; header depth is detected from the leading non-data
//! lines (capped at two levels). A level-1 header cell that
//! geometrically overlaps several leaf columns becomes one
//! [`HeaderGroup`] carrying its column range and the level-2 labels
//! under it. Data cells spanning rows or columns are duplicated into
//! every spanned position so the emitted grid is always rectangular;
//! cells that are genuinely absent are padded with empty strings and
//! the repair count is reported for validation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::classify::Verdict;
use crate::config::ExtractionConfig;
use crate::fingerprint::{CellType, StructuralFingerprint};
use crate::layout::{BoundingBox, TextBlock};
use crate::scanner::Region;
use crate::table::{ExtractedTable, HeaderGroup, Relationships};

/// Tolerance (points) when clustering left edges into columns.
const COLUMN_EDGE_TOLERANCE: f32 = 12.0;

/// Fraction of a column's width a block must overlap to count as
/// occupying that column.
const SPAN_OVERLAP_FRACTION: f32 = 0.3;

/// Vertical slack (points) when deciding whether a block extends down
/// into the next row (row-span fill-down).
const ROW_SPAN_SLACK: f32 = 2.0;

static TOTALS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(grand\s+)?(totals?|sum)\b").expect("static pattern"));

/// An extracted table before context linking, validation, and scoring.
#[derive(Debug, Clone)]
pub struct TableDraft {
    /// Zero-based page index the source region sat on.
    pub page_index: usize,
    /// Reading-order position of the source region.
    pub ordinal: usize,
    /// Bounding box of the source region.
    pub bbox: BoundingBox,
    /// Confidence the classifier reported for the region.
    pub classifier_confidence: f64,
    /// The table under construction. `title` holds the classifier's
    /// hint until the context linker confirms or replaces it.
    pub table: ExtractedTable,
    /// Cells padded with empty strings to restore rectangularity.
    pub repaired_cells: usize,
}

/// Converts confirmed regions into structured grids.
#[derive(Debug)]
pub struct TableExtractor<'a> {
    #[allow(dead_code)]
    config: &'a ExtractionConfig,
}

impl<'a> TableExtractor<'a> {
    /// Create an extractor bound to a configuration.
    #[must_use]
    pub fn new(config: &'a ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract the grid of a region the classifier confirmed.
    #[must_use]
    pub fn extract(&self, region: &Region, verdict: &Verdict) -> TableDraft {
        let columns = column_bounds(region);
        let header_depth = detect_header_depth(region, &columns);
        let headers = build_headers(region, &columns, header_depth);
        let (mut rows, repaired_cells) = build_rows(region, &columns, header_depth);
        let totals = lift_totals(&headers, &mut rows);

        debug!(
            page = region.page_index + 1,
            ordinal = region.ordinal,
            columns = columns.len(),
            header_depth,
            data_rows = rows.len(),
            "extracted table grid"
        );

        let structural_fingerprint = StructuralFingerprint::of_grid(&headers, &rows);
        TableDraft {
            page_index: region.page_index,
            ordinal: region.ordinal,
            bbox: region.bbox,
            classifier_confidence: verdict.classifier_confidence,
            table: ExtractedTable {
                table_id: 0,
                page: region.page_index + 1,
                title: verdict.title_hint.clone(),
                confidence: 0.0,
                headers,
                rows,
                context: String::new(),
                notes: Vec::new(),
                relationships: Relationships::default(),
                totals,
                structural_fingerprint,
            },
            repaired_cells,
        }
    }
}

/// Inclusive horizontal bounds of one leaf column.
#[derive(Debug, Clone, Copy)]
struct ColumnBound {
    left: f32,
    right: f32,
}

/// Leaf column intervals from left-edge clusters that recur on at
/// least two lines.
fn column_bounds(region: &Region) -> Vec<ColumnBound> {
    let mut edges: Vec<(f32, usize)> = Vec::new();
    for (line_idx, line) in region.lines.iter().enumerate() {
        for block in line {
            edges.push((block.bbox.l, line_idx));
        }
    }
    edges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut starts: Vec<f32> = Vec::new();
    let mut cluster_lines: Vec<usize> = Vec::new();
    let mut cluster_start = f32::MIN;
    for (edge, line_idx) in edges {
        if edge - cluster_start > COLUMN_EDGE_TOLERANCE {
            if cluster_lines.len() >= 2 {
                starts.push(cluster_start);
            }
            cluster_lines.clear();
            cluster_start = edge;
        }
        if !cluster_lines.contains(&line_idx) {
            cluster_lines.push(line_idx);
        }
    }
    if cluster_lines.len() >= 2 {
        starts.push(cluster_start);
    }

    if starts.is_empty() {
        // Degenerate region; treat everything as one column.
        return vec![ColumnBound {
            left: region.bbox.l,
            right: region.bbox.r,
        }];
    }

    let mut bounds = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let right = starts
            .get(idx + 1)
            .map_or(region.bbox.r, |next| next - COLUMN_EDGE_TOLERANCE / 2.0);
        bounds.push(ColumnBound { left: start, right });
    }
    bounds
}

/// Columns a block occupies, by geometric overlap.
fn spanned_columns(block: &TextBlock, columns: &[ColumnBound]) -> Vec<usize> {
    let mut spanned: Vec<usize> = Vec::new();
    for (idx, column) in columns.iter().enumerate() {
        let width = (column.right - column.left).max(1.0);
        let overlap = block.bbox.x_overlap(column.left, column.right);
        if overlap >= width * SPAN_OVERLAP_FRACTION {
            spanned.push(idx);
        }
    }
    if spanned.is_empty() {
        // Fall back to the column with the largest overlap, then to the
        // nearest column by center distance.
        let best = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let overlap = block.bbox.x_overlap(column.left, column.right);
                (idx, overlap)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((idx, overlap)) = best {
            if overlap > 0.0 {
                spanned.push(idx);
            } else {
                let center = (block.bbox.l + block.bbox.r) / 2.0;
                let nearest = columns
                    .iter()
                    .enumerate()
                    .min_by(|a, b| {
                        let da = (center - (a.1.left + a.1.right) / 2.0).abs();
                        let db = (center - (b.1.left + b.1.right) / 2.0).abs();
                        da.total_cmp(&db)
                    })
                    .map(|(idx, _)| idx);
                spanned.extend(nearest);
            }
        }
    }
    spanned
}

/// Number of leading header lines (1 or 2).
///
/// The first line is always a header. A second header line is assumed
/// when data-typed cells (numbers, currency) first appear on line 2 or
/// later *and* the first line leaves leaf columns uncovered — the
/// signature of a spanning group row above a label row.
fn detect_header_depth(region: &Region, columns: &[ColumnBound]) -> usize {
    if region.lines.len() < 3 {
        return 1;
    }
    let first_data = region.lines.iter().position(|line| {
        line.iter().any(|block| {
            matches!(
                CellType::of_cell(&block.text),
                CellType::Numeric | CellType::Currency
            )
        })
    });
    match first_data {
        Some(idx) if idx >= 2 => {
            let covered: usize = region.lines[0]
                .iter()
                .flat_map(|block| spanned_columns(block, columns))
                .collect::<std::collections::BTreeSet<_>>()
                .len();
            if covered < columns.len() || spans_multiple(&region.lines[0], columns) {
                2
            } else {
                1
            }
        }
        _ => 1,
    }
}

fn spans_multiple(line: &[TextBlock], columns: &[ColumnBound]) -> bool {
    line.iter()
        .any(|block| spanned_columns(block, columns).len() > 1)
}

/// Text of the block(s) covering each leaf column in one line.
fn line_cells(line: &[TextBlock], columns: &[ColumnBound]) -> Vec<String> {
    let mut cells = vec![String::new(); columns.len()];
    for block in line {
        for col in spanned_columns(block, columns) {
            if !cells[col].is_empty() {
                cells[col].push(' ');
            }
            cells[col].push_str(block.text.trim());
        }
    }
    cells
}

/// Build header groups from the leading header line(s).
fn build_headers(region: &Region, columns: &[ColumnBound], depth: usize) -> Vec<HeaderGroup> {
    let leaf_line = &region.lines[depth - 1];
    let leaf_labels = line_cells(leaf_line, columns);

    if depth == 1 {
        return leaf_labels
            .into_iter()
            .enumerate()
            .map(|(idx, label)| HeaderGroup {
                label,
                columns: [idx + 1, idx + 1],
                children: Vec::new(),
            })
            .collect();
    }

    // Two levels: walk leaf columns, merging under level-1 spans.
    let top_line = &region.lines[0];
    let mut groups: Vec<HeaderGroup> = Vec::new();
    let mut col = 0usize;
    while col < columns.len() {
        let covering = top_line
            .iter()
            .map(|block| (block, spanned_columns(block, columns)))
            .find(|(_, spanned)| spanned.contains(&col));
        match covering {
            Some((block, spanned)) => {
                let start = *spanned.first().unwrap_or(&col);
                let end = *spanned.last().unwrap_or(&col);
                let children: Vec<String> = if end > start {
                    (start..=end)
                        .map(|leaf| leaf_labels.get(leaf).cloned().unwrap_or_default())
                        .collect()
                } else {
                    leaf_labels
                        .get(col)
                        .filter(|label| !label.is_empty())
                        .map(|label| vec![label.clone()])
                        .unwrap_or_default()
                };
                groups.push(HeaderGroup {
                    label: block.text.trim().to_string(),
                    columns: [start + 1, end + 1],
                    children,
                });
                col = end + 1;
            }
            None => {
                groups.push(HeaderGroup {
                    label: leaf_labels.get(col).cloned().unwrap_or_default(),
                    columns: [col + 1, col + 1],
                    children: Vec::new(),
                });
                col += 1;
            }
        }
    }
    groups
}

/// Build the rectangular data grid with fill-down and padding repair.
fn build_rows(
    region: &Region,
    columns: &[ColumnBound],
    depth: usize,
) -> (Vec<Vec<String>>, usize) {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut repaired = 0usize;
    // Last block seen per column, for row-span fill-down.
    let mut carry: Vec<Option<TextBlock>> = vec![None; columns.len()];

    for line in region.lines.iter().skip(depth) {
        let row_top = line.iter().fold(f32::MAX, |acc, b| acc.min(b.bbox.t));
        let mut cells = vec![String::new(); columns.len()];
        let mut filled = vec![false; columns.len()];

        for block in line {
            for col in spanned_columns(block, columns) {
                if !cells[col].is_empty() {
                    cells[col].push(' ');
                }
                cells[col].push_str(block.text.trim());
                filled[col] = true;
                carry[col] = Some(block.clone());
            }
        }

        for col in 0..columns.len() {
            if filled[col] {
                continue;
            }
            match &carry[col] {
                // A block from an earlier line that visually extends
                // into this row is a row span: fill its text down.
                Some(prev) if prev.bbox.b + ROW_SPAN_SLACK >= row_top => {
                    cells[col] = prev.text.trim().to_string();
                }
                _ => {
                    repaired += 1;
                }
            }
        }

        rows.push(cells);
    }
    (rows, repaired)
}

/// Lift a trailing totals row out of the grid into a labeled map.
fn lift_totals(
    headers: &[HeaderGroup],
    rows: &mut Vec<Vec<String>>,
) -> Option<BTreeMap<String, String>> {
    let last = rows.last()?;
    let label_col = last.iter().position(|cell| !cell.is_empty())?;
    if !TOTALS_LABEL.is_match(&last[label_col]) {
        return None;
    }

    let leaf_labels: Vec<String> = headers
        .iter()
        .flat_map(|group| (0..group.leaf_count()).map(|offset| group.leaf_label(offset).to_string()))
        .collect();

    let mut totals = BTreeMap::new();
    for (col, cell) in last.iter().enumerate() {
        if col == label_col || cell.is_empty() {
            continue;
        }
        let key = leaf_labels
            .get(col)
            .filter(|label| !label.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("column_{}", col + 1));
        totals.insert(key, cell.clone());
    }
    if totals.is_empty() {
        return None;
    }
    rows.pop();
    Some(totals)
}
