//! Context linker: titles, notes, and the cross-reference graph.
//!
//! Runs after every region of the document has been extracted — a
//! later table can reference an earlier one and vice versa, so the
//! relationship graph needs whole-document visibility.
//!
//! Title resolution searches the text immediately preceding a region
//! (within a bounded distance) for a heading-like line; each heading is
//! consumed by at most one table. Note capture takes the text
//! immediately following a table, stopping at the next region.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::extract::TableDraft;
use crate::layout::{group_into_lines, BoundingBox, Document};
use crate::scanner::Region;

/// Heading-like line: label + number + separator + descriptive text.
static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*((?:table|exhibit|schedule)\s+\d+(?:\.\d+)*)\s*[:\-–—]\s*(\S.*)$")
        .expect("static pattern")
});

/// Cross-reference token: a table label such as "Table 3.1".
static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:table|exhibit|schedule)\s+\d+(?:\.\d+)*").expect("static pattern")
});

/// Slack (points) for "immediately" adjacent text.
const ADJACENCY_SLACK: f32 = 2.0;

/// A page line outside every scanned region, available as context.
#[derive(Debug)]
struct FreeLine {
    page_index: usize,
    text: String,
    bbox: BoundingBox,
    consumed: bool,
}

/// Links titles, notes, and relationships onto extracted tables.
#[derive(Debug)]
pub struct ContextLinker<'a> {
    config: &'a ExtractionConfig,
}

impl<'a> ContextLinker<'a> {
    /// Create a linker bound to a configuration.
    #[must_use]
    pub fn new(config: &'a ExtractionConfig) -> Self {
        Self { config }
    }

    /// Resolve titles and notes, then build the symmetric relationship
    /// graph across all drafts.
    pub fn link(&self, document: &Document, regions: &[Region], drafts: &mut [TableDraft]) {
        let mut free_lines = collect_free_lines(document, regions);

        self.resolve_titles(&mut free_lines, drafts);
        self.capture_notes(&mut free_lines, regions, drafts);
        link_relationships(drafts);

        for draft in drafts.iter_mut() {
            let table = &mut draft.table;
            table.relationships.document_section = classify_section(&table.title);
            if table.context.is_empty() {
                table.context = describe_context(&table.title, &table.relationships.document_section);
            }
        }
    }

    fn resolve_titles(&self, free_lines: &mut [FreeLine], drafts: &mut [TableDraft]) {
        for draft in drafts.iter_mut() {
            if !draft.table.title.is_empty() {
                continue;
            }
            // Nearest unconsumed heading above the region, within range.
            let mut best: Option<usize> = None;
            for (idx, line) in free_lines.iter().enumerate() {
                if line.consumed || line.page_index != draft.page_index {
                    continue;
                }
                let gap = draft.bbox.t - line.bbox.b;
                if !(-ADJACENCY_SLACK..=self.config.context_distance_pt).contains(&gap) {
                    continue;
                }
                if !HEADING.is_match(line.text.trim()) {
                    continue;
                }
                let better = match best {
                    Some(current) => line.bbox.b > free_lines[current].bbox.b,
                    None => true,
                };
                if better {
                    best = Some(idx);
                }
            }
            if let Some(idx) = best {
                let line = &mut free_lines[idx];
                line.consumed = true;
                draft.table.title = line.text.trim().to_string();
                if let Some(caps) = HEADING.captures(&draft.table.title) {
                    if let Some(descr) = caps.get(2) {
                        draft.table.context = descr.as_str().to_string();
                    }
                }
                debug!(
                    page = draft.page_index + 1,
                    title = %draft.table.title,
                    "resolved table title from preceding heading"
                );
            }
        }
    }

    fn capture_notes(
        &self,
        free_lines: &mut [FreeLine],
        regions: &[Region],
        drafts: &mut [TableDraft],
    ) {
        for draft in drafts.iter_mut() {
            // Notes stop where the next region on the same page starts.
            let next_region_top = regions
                .iter()
                .filter(|region| {
                    region.page_index == draft.page_index && region.bbox.t > draft.bbox.b
                })
                .map(|region| region.bbox.t)
                .fold(f32::MAX, f32::min);

            let mut captured: Vec<(f32, usize)> = Vec::new();
            for (idx, line) in free_lines.iter().enumerate() {
                if line.consumed || line.page_index != draft.page_index {
                    continue;
                }
                let gap = line.bbox.t - draft.bbox.b;
                if !(-ADJACENCY_SLACK..=self.config.context_distance_pt).contains(&gap) {
                    continue;
                }
                if line.bbox.t >= next_region_top {
                    continue;
                }
                captured.push((line.bbox.t, idx));
            }
            captured.sort_by(|a, b| a.0.total_cmp(&b.0));
            for (_, idx) in captured {
                let line = &mut free_lines[idx];
                line.consumed = true;
                draft.table.notes.push(line.text.trim().to_string());
            }
        }
    }
}

/// Page lines that belong to no region.
fn collect_free_lines(document: &Document, regions: &[Region]) -> Vec<FreeLine> {
    let mut free = Vec::new();
    for page in &document.pages {
        for line in group_into_lines(&page.blocks) {
            let bbox = line
                .iter()
                .skip(1)
                .fold(line[0].bbox, |acc, block| acc.union(&block.bbox));
            let inside = regions.iter().any(|region| {
                region.page_index == page.index
                    && bbox.y_overlap(region.bbox.t, region.bbox.b) > bbox.height() * 0.5
            });
            if inside {
                continue;
            }
            let text = line
                .iter()
                .map(|block| block.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                continue;
            }
            free.push(FreeLine {
                page_index: page.index,
                text,
                bbox,
                consumed: false,
            });
        }
    }
    free
}

/// Normalized label of a table ("table 1") and its display form
/// ("Table 1"), from its title.
fn label_of(title: &str) -> Option<(String, String)> {
    let caps = HEADING.captures(title.trim())?;
    let display = normalize_label(caps.get(1)?.as_str());
    Some((display.to_lowercase(), display))
}

fn normalize_label(raw: &str) -> String {
    let mut words = raw.split_whitespace();
    let kind = words.next().unwrap_or_default();
    let number = words.next().unwrap_or_default();
    let mut kind_cased = String::new();
    let mut chars = kind.chars();
    if let Some(first) = chars.next() {
        kind_cased.extend(first.to_uppercase());
        kind_cased.extend(chars.flat_map(char::to_lowercase));
    }
    format!("{kind_cased} {number}")
}

/// Build the symmetric cross-reference graph over all drafts.
fn link_relationships(drafts: &mut [TableDraft]) {
    let labels: Vec<Option<(String, String)>> = drafts
        .iter()
        .map(|draft| label_of(&draft.table.title))
        .collect();
    let idents: Vec<String> = drafts
        .iter()
        .map(|draft| {
            if draft.table.title.is_empty() {
                format!("Untitled table (page {})", draft.table.page)
            } else {
                draft.table.title.clone()
            }
        })
        .collect();

    // Labels mentioned in each draft's searchable text.
    let mentions: Vec<Vec<String>> = drafts
        .iter()
        .map(|draft| {
            let mut text = draft.table.title.clone();
            for note in &draft.table.notes {
                text.push('\n');
                text.push_str(note);
            }
            text.push('\n');
            text.push_str(&draft.table.context);
            REFERENCE
                .find_iter(&text)
                .map(|token| normalize_label(token.as_str()).to_lowercase())
                .collect()
        })
        .collect();

    let count = drafts.len();
    for i in 0..count {
        for j in 0..count {
            if i == j {
                continue;
            }
            let Some((key_j, display_j)) = labels[j].as_ref() else {
                continue;
            };
            let own_label = labels[i].as_ref().map(|(key, _)| key.as_str());
            if own_label == Some(key_j.as_str()) {
                continue;
            }
            if mentions[i].iter().any(|m| m == key_j) {
                push_unique(&mut drafts[i].table.relationships.references, display_j.clone());
                let ident_j = idents[j].clone();
                let ident_i = idents[i].clone();
                push_unique(&mut drafts[i].table.relationships.related_tables, ident_j);
                push_unique(&mut drafts[j].table.relationships.related_tables, ident_i);
            }
        }
    }

    for draft in drafts.iter_mut() {
        draft.table.relationships.references.sort();
        draft.table.relationships.related_tables.sort();
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Coarse document section from title keywords.
fn classify_section(title: &str) -> String {
    let lower = title.to_lowercase();
    if ["cost", "budget", "price", "fee"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        "Financial Summary".to_string()
    } else if ["milestone", "schedule", "timeline", "date"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        "Project Timeline".to_string()
    } else {
        "Technical Details".to_string()
    }
}

fn describe_context(title: &str, section: &str) -> String {
    if let Some(caps) = HEADING.captures(title.trim()) {
        if let Some(descr) = caps.get(2) {
            return descr.as_str().to_string();
        }
    }
    if title.is_empty() {
        String::new()
    } else {
        format!("{section}: {title}")
    }
}
