//! Region scanner: finds candidate table regions in page layout.
//!
//! A pure transform over the read-only document: pages are split into
//! vertical bands on whitespace gaps, and each band is kept as a
//! [`Region`] candidate only if it passes cheap structural filters —
//! enough lines, enough columns, sane aspect ratio, and (optionally)
//! not a running header/footer repeated across pages. Pages with no
//! tabular layout produce zero regions; that is a normal outcome, not
//! an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::layout::{group_into_lines, BoundingBox, Document, TextBlock};

/// Margin fraction of page height considered "top" or "bottom" for the
/// running header/footer repetition filter.
const MARGIN_FRACTION: f32 = 0.15;

/// Pages a band's text must recur on before it is treated as a running
/// header/footer. For two-page documents, recurrence on both pages is
/// enough.
const REPEAT_PAGE_FLOOR: usize = 3;

/// Horizontal tolerance (points) when clustering block left edges into
/// columns.
const COLUMN_EDGE_TOLERANCE: f32 = 12.0;

/// A candidate rectangular area holding an ordered sequence of layout
/// primitives. Consumed by classification and extraction, then
/// discarded.
#[derive(Debug, Clone)]
pub struct Region {
    /// Zero-based page index.
    pub page_index: usize,
    /// Position of this region in document reading order.
    pub ordinal: usize,
    /// Bounding box around the region's blocks.
    pub bbox: BoundingBox,
    /// Blocks grouped into visual lines, top-to-bottom.
    pub lines: Vec<Vec<TextBlock>>,
}

impl Region {
    /// Serializable snapshot handed to classifier backends.
    #[must_use]
    pub fn view(&self) -> RegionView {
        RegionView {
            page: self.page_index + 1,
            bbox: self.bbox,
            lines: self
                .lines
                .iter()
                .map(|line| {
                    line.iter()
                        .map(|block| block.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect(),
        }
    }

    /// All blocks of the region in reading order.
    #[must_use]
    pub fn blocks(&self) -> Vec<&TextBlock> {
        self.lines.iter().flatten().collect()
    }
}

/// What a classifier backend sees of a region: page, position, and the
/// region's text rendered line by line with `|` column separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionView {
    /// 1-based page number.
    pub page: usize,
    /// Region position on the page.
    pub bbox: BoundingBox,
    /// Region text, one entry per visual line.
    pub lines: Vec<String>,
}

/// Scans documents for candidate table regions.
#[derive(Debug)]
pub struct RegionScanner<'a> {
    config: &'a ExtractionConfig,
}

impl<'a> RegionScanner<'a> {
    /// Create a scanner bound to a configuration.
    #[must_use]
    pub fn new(config: &'a ExtractionConfig) -> Self {
        Self { config }
    }

    /// Scan every page and return candidates ordered by reading
    /// position (page, then top-to-bottom).
    #[must_use]
    pub fn scan_document(&self, document: &Document) -> Vec<Region> {
        let repeated = if self.config.exclude_headers {
            repeated_margin_texts(document)
        } else {
            Vec::new()
        };

        let mut regions = Vec::new();
        for page in &document.pages {
            let bands = split_into_bands(&page.blocks, self.config.gap_threshold_pt);
            for band in bands {
                if !self.band_qualifies(&band, page.height, &repeated) {
                    continue;
                }
                let bbox = band_bbox(&band);
                regions.push(Region {
                    page_index: page.index,
                    ordinal: regions.len(),
                    bbox,
                    lines: band,
                });
            }
        }
        debug!(
            candidates = regions.len(),
            pages = document.pages.len(),
            "region scan complete"
        );
        regions
    }

    fn band_qualifies(
        &self,
        band: &[Vec<TextBlock>],
        page_height: f32,
        repeated: &[String],
    ) -> bool {
        if band.len() < self.config.min_rows {
            return false;
        }
        if column_count(band) < self.config.min_columns {
            return false;
        }
        let bbox = band_bbox(band);
        let aspect = bbox.width() / bbox.height().max(1.0);
        if !(0.05..=40.0).contains(&aspect) {
            return false;
        }
        if self.config.exclude_headers && in_margin(&bbox, page_height) {
            // A margin band made up entirely of lines that recur across
            // pages is a running header/footer, not a table.
            let all_repeated = band.iter().all(|line| {
                let text = normalized_band_text(std::slice::from_ref(line));
                repeated.contains(&text)
            });
            if all_repeated {
                return false;
            }
        }
        true
    }
}

/// Split a page's blocks into vertical bands: consecutive lines whose
/// gap exceeds the threshold start a new band.
fn split_into_bands(blocks: &[TextBlock], gap_threshold: f32) -> Vec<Vec<Vec<TextBlock>>> {
    let lines = group_into_lines(blocks);
    if lines.is_empty() {
        return Vec::new();
    }

    let mut bands: Vec<Vec<Vec<TextBlock>>> = Vec::new();
    let mut current: Vec<Vec<TextBlock>> = vec![lines[0].clone()];

    for line in lines.into_iter().skip(1) {
        let prev_bottom = current
            .last()
            .map(|prev| prev.iter().fold(f32::MIN, |acc, b| acc.max(b.bbox.b)))
            .unwrap_or(f32::MIN);
        let top = line.iter().fold(f32::MAX, |acc, b| acc.min(b.bbox.t));
        if top - prev_bottom > gap_threshold {
            bands.push(std::mem::take(&mut current));
        }
        current.push(line);
    }
    bands.push(current);
    bands
}

/// Estimate the column count of a band by clustering block left edges.
/// Only edges that recur on at least two lines count as columns, so a
/// paragraph of ragged text does not read as multi-column.
fn column_count(band: &[Vec<TextBlock>]) -> usize {
    let mut edges: Vec<(f32, usize)> = Vec::new();
    for (line_idx, line) in band.iter().enumerate() {
        for block in line {
            edges.push((block.bbox.l, line_idx));
        }
    }
    edges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut columns = 0usize;
    let mut cluster_lines: Vec<usize> = Vec::new();
    let mut cluster_start = f32::MIN;
    for (edge, line_idx) in edges {
        if edge - cluster_start > COLUMN_EDGE_TOLERANCE {
            if cluster_lines.len() >= 2 {
                columns += 1;
            }
            cluster_lines.clear();
            cluster_start = edge;
        }
        if !cluster_lines.contains(&line_idx) {
            cluster_lines.push(line_idx);
        }
    }
    if cluster_lines.len() >= 2 {
        columns += 1;
    }
    columns
}

fn band_bbox(band: &[Vec<TextBlock>]) -> BoundingBox {
    let mut bbox: Option<BoundingBox> = None;
    for block in band.iter().flatten() {
        bbox = Some(match bbox {
            Some(current) => current.union(&block.bbox),
            None => block.bbox,
        });
    }
    bbox.unwrap_or_default()
}

fn in_margin(bbox: &BoundingBox, page_height: f32) -> bool {
    let margin = page_height * MARGIN_FRACTION;
    bbox.b <= margin || bbox.t >= page_height - margin
}

fn normalized_band_text(band: &[Vec<TextBlock>]) -> String {
    let mut text = String::new();
    for block in band.iter().flatten() {
        for word in block.text.split_whitespace() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&word.to_lowercase());
        }
    }
    text
}

/// Texts that recur in the page margins across enough pages to be
/// treated as running headers/footers.
fn repeated_margin_texts(document: &Document) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for page in &document.pages {
        let mut seen_on_page: Vec<String> = Vec::new();
        for band in split_into_bands(&page.blocks, f32::MAX) {
            // gap = MAX keeps whole page as one band; use per-line texts
            for line in &band {
                let bbox = band_bbox(std::slice::from_ref(line));
                if !in_margin(&bbox, page.height) {
                    continue;
                }
                let text = normalized_band_text(std::slice::from_ref(line));
                if !text.is_empty() && !seen_on_page.contains(&text) {
                    seen_on_page.push(text);
                }
            }
        }
        for text in seen_on_page {
            *counts.entry(text).or_insert(0) += 1;
        }
    }

    let floor = REPEAT_PAGE_FLOOR.min(document.pages.len().max(1));
    let mut repeated: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count >= floor && floor >= 2)
        .map(|(text, _)| text)
        .collect();
    repeated.sort();
    repeated
}
