//! Offset ranges - half-open byte spans into a source text
//!
//! Every extractor and the correlator speak in `OffsetRange`s. Line/column
//! positions only exist for display and are produced by `LineIndex`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open `[start, end)` byte range into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: usize,
    pub end: usize,
}

impl OffsetRange {
    /// Create a range, swapping the bounds if they arrive reversed so that
    /// `start <= end` always holds.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// A zero-width range at `offset`
    pub fn point(offset: usize) -> Self {
        Self { start: offset, end: offset }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` falls inside the range (end exclusive)
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Whether two ranges share at least one position.
    ///
    /// Zero-width ranges overlap anything that strictly contains their offset.
    pub fn overlaps(&self, other: &OffsetRange) -> bool {
        if self.is_empty() {
            return other.contains(self.start);
        }
        if other.is_empty() {
            return self.contains(other.start);
        }
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Offset → (line, column) lookup for a single source text.
///
/// Lines and columns are 1-indexed; columns count characters, not bytes.
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, line_starts }
    }

    /// Resolve a byte offset to a 1-based (line, column) pair
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .text
            .get(line_start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset - line_start);
        (line as u32 + 1, column as u32 + 1)
    }

    /// Start offset of the line containing `offset`
    pub fn line_start(&self, offset: usize) -> usize {
        let offset = offset.min(self.text.len());
        match self.line_starts.binary_search(&offset) {
            Ok(line) => self.line_starts[line],
            Err(next) => self.line_starts[next - 1],
        }
    }

    /// End offset (exclusive, before any `\r\n` / `\n`) of the line containing `offset`
    pub fn line_end(&self, offset: usize) -> usize {
        let offset = offset.min(self.text.len());
        let end = match self.line_starts.binary_search(&offset) {
            Ok(line) => self.line_starts.get(line + 1).map(|s| s - 1),
            Err(next) => self.line_starts.get(next).map(|s| s - 1),
        }
        .unwrap_or(self.text.len());
        if end > 0 && self.text.as_bytes().get(end - 1) == Some(&b'\r') {
            end - 1
        } else {
            end
        }
    }

    /// Render a range as `line:col-line:col` for humans
    pub fn describe(&self, range: OffsetRange) -> String {
        let (start_line, start_col) = self.position(range.start);
        let (end_line, end_col) = self.position(range.end);
        if start_line == end_line {
            format!("{}:{}-{}", start_line, start_col, end_col)
        } else {
            format!("{}:{}-{}:{}", start_line, start_col, end_line, end_col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_orders_bounds() {
        let range = OffsetRange::new(9, 3);
        assert_eq!(range, OffsetRange { start: 3, end: 9 });
        assert_eq!(range.len(), 6);
    }

    #[test]
    fn test_overlaps_half_open() {
        let a = OffsetRange::new(0, 5);
        assert!(a.overlaps(&OffsetRange::new(4, 8)));
        assert!(!a.overlaps(&OffsetRange::new(5, 8)));
        assert!(a.overlaps(&OffsetRange::point(2)));
        assert!(!a.overlaps(&OffsetRange::point(5)));
    }

    #[test]
    fn test_line_index_positions() {
        let text = "ab\ncdé\r\nf";
        let index = LineIndex::new(text);
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(3), (2, 1));
        // 'é' is two bytes; the column after it is still 4 characters in
        assert_eq!(index.position(7), (2, 4));
        assert_eq!(index.line_end(4), 7);
        assert_eq!(index.line_start(5), 3);
        assert_eq!(index.line_end(text.len()), text.len());
    }
}
