//! Read-only layout model handed over by the external document parser.
//!
//! The pipeline never inspects raw document bytes. Its input is a
//! [`Document`]: page geometry plus positioned text blocks, produced by
//! whatever parser the caller uses and deserialized from its JSON
//! output. Coordinates use a top-left origin (y increases downward),
//! measured in points.

use serde::{Deserialize, Serialize};

/// Rectangular region on a page, top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left x-coordinate
    pub l: f32,
    /// Top y-coordinate
    pub t: f32,
    /// Right x-coordinate
    pub r: f32,
    /// Bottom y-coordinate
    pub b: f32,
}

impl BoundingBox {
    /// Width of the box (never negative).
    #[inline]
    #[must_use]
    pub fn width(&self) -> f32 {
        (self.r - self.l).max(0.0)
    }

    /// Height of the box (never negative).
    #[inline]
    #[must_use]
    pub fn height(&self) -> f32 {
        (self.b - self.t).max(0.0)
    }

    /// Vertical center of the box.
    #[inline]
    #[must_use]
    pub fn y_center(&self) -> f32 {
        (self.t + self.b) / 2.0
    }

    /// Length of the horizontal overlap with `[left, right]`.
    #[must_use]
    pub fn x_overlap(&self, left: f32, right: f32) -> f32 {
        (self.r.min(right) - self.l.max(left)).max(0.0)
    }

    /// Length of the vertical overlap with `[top, bottom]`.
    #[must_use]
    pub fn y_overlap(&self, top: f32, bottom: f32) -> f32 {
        (self.b.min(bottom) - self.t.max(top)).max(0.0)
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            l: self.l.min(other.l),
            t: self.t.min(other.t),
            r: self.r.max(other.r),
            b: self.b.max(other.b),
        }
    }
}

/// One positioned run of text on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Text content of the block.
    pub text: String,
    /// Position of the block on its page.
    pub bbox: BoundingBox,
}

/// One page of layout primitives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page index.
    pub index: usize,
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    /// Text blocks on the page, in no guaranteed order.
    pub blocks: Vec<TextBlock>,
}

/// A parsed document: the session-lifetime, read-only input to the
/// pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Display name of the document (file name or caller-chosen label).
    pub name: String,
    /// Pages in order.
    pub pages: Vec<Page>,
}

impl Document {
    /// Stable 12-hex-character identifier derived from the document
    /// name. Content-independent so repeated runs agree.
    #[must_use]
    pub fn id(&self) -> String {
        let hash = fnv1a(self.name.as_bytes());
        format!("{hash:016x}")[..12].to_string()
    }
}

/// FNV-1a over a byte slice. Used for non-adversarial identifiers only.
#[must_use]
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Group blocks into visual lines by top-edge alignment.
///
/// Blocks whose top edges sit within half a median block height of
/// each other share a line; anchoring on the top edge keeps a tall
/// cell that spans several rows attached to the first row it starts
/// on. Returned lines are ordered top-to-bottom and each line's blocks
/// left-to-right (reading order).
#[must_use]
pub(crate) fn group_into_lines(blocks: &[TextBlock]) -> Vec<Vec<TextBlock>> {
    if blocks.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<TextBlock> = blocks.to_vec();
    sorted.sort_by(|a, b| a.bbox.t.total_cmp(&b.bbox.t).then(a.bbox.l.total_cmp(&b.bbox.l)));

    let mut heights: Vec<f32> = sorted.iter().map(|blk| blk.bbox.height()).collect();
    heights.sort_by(f32::total_cmp);
    let median_height = heights[heights.len() / 2].max(1.0);
    let tolerance = median_height / 2.0;

    let mut lines: Vec<Vec<TextBlock>> = Vec::new();
    let mut current: Vec<TextBlock> = vec![sorted[0].clone()];
    let mut current_top = sorted[0].bbox.t;

    for block in sorted.into_iter().skip(1) {
        let top = block.bbox.t;
        if (top - current_top).abs() <= tolerance {
            current.push(block);
        } else {
            current.sort_by(|a, b| a.bbox.l.total_cmp(&b.bbox.l));
            lines.push(current);
            current = vec![block];
            current_top = top;
        }
    }
    current.sort_by(|a, b| a.bbox.l.total_cmp(&b.bbox.l));
    lines.push(current);

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn block(text: &str, l: f32, t: f32, r: f32, b: f32) -> TextBlock {
        TextBlock {
            text: text.to_string(),
            bbox: BoundingBox { l, t, r, b },
        }
    }

    #[test]
    fn bbox_dimensions() {
        let bbox = BoundingBox {
            l: 10.0,
            t: 20.0,
            r: 110.0,
            b: 50.0,
        };
        assert_eq!(bbox.width(), 100.0);
        assert_eq!(bbox.height(), 30.0);
        assert_eq!(bbox.y_center(), 35.0);
    }

    #[test]
    fn bbox_overlap() {
        let bbox = BoundingBox {
            l: 10.0,
            t: 0.0,
            r: 30.0,
            b: 10.0,
        };
        assert_eq!(bbox.x_overlap(20.0, 50.0), 10.0);
        assert_eq!(bbox.x_overlap(40.0, 50.0), 0.0);
    }

    #[test]
    fn document_id_is_stable() {
        let doc = Document {
            name: "proposal.pdf".to_string(),
            pages: Vec::new(),
        };
        assert_eq!(doc.id(), doc.id());
        assert_eq!(doc.id().len(), 12);

        let other = Document {
            name: "other.pdf".to_string(),
            pages: Vec::new(),
        };
        assert_ne!(doc.id(), other.id());
    }

    #[test]
    fn lines_group_by_vertical_position() {
        let blocks = vec![
            block("b", 100.0, 10.0, 150.0, 20.0),
            block("a", 10.0, 10.0, 50.0, 20.0),
            block("c", 10.0, 40.0, 50.0, 50.0),
        ];
        let lines = group_into_lines(&blocks);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][0].text, "a");
        assert_eq!(lines[0][1].text, "b");
        assert_eq!(lines[1][0].text, "c");
    }

    #[test]
    fn lines_empty_input() {
        assert!(group_into_lines(&[]).is_empty());
    }
}
