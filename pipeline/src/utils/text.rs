//! Word-boundary text segmentation for the chunk stage
//!
//! Splits a document into overlapping windows of roughly `chunk_size`
//! characters. Cuts land on whitespace so no word is split across chunks;
//! the single exception is a run of non-whitespace longer than the chunk
//! size, which is hard-cut. Produced lazily so large documents never
//! materialize a full chunk list.

/// One produced segment with character offsets into the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub index: usize,
    pub text: String,
    /// Inclusive character offset of the first character
    pub char_start: usize,
    /// Exclusive character offset past the last character
    pub char_end: usize,
    /// Rough token estimate (chars / 4, rounded up)
    pub token_count: usize,
}

/// Splitter configuration; validated at construction.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    /// Panics if `chunk_size` is zero or `overlap >= chunk_size`; config
    /// validation rejects those values before a splitter is built.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Lazily segment `text`.
    pub fn segments(&self, text: &str) -> Segments {
        Segments {
            chars: text.chars().collect(),
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            cursor: 0,
            index: 0,
            done: false,
        }
    }
}

/// Iterator over [`TextSegment`]s.
pub struct Segments {
    chars: Vec<char>,
    chunk_size: usize,
    overlap: usize,
    cursor: usize,
    index: usize,
    done: bool,
}

impl Segments {
    fn emit(&mut self, start: usize, end: usize) -> Option<TextSegment> {
        // Trim whitespace at the edges, adjusting offsets to match.
        let mut s = start;
        let mut e = end;
        while s < e && self.chars[s].is_whitespace() {
            s += 1;
        }
        while e > s && self.chars[e - 1].is_whitespace() {
            e -= 1;
        }
        if s == e {
            return None;
        }
        let text: String = self.chars[s..e].iter().collect();
        let token_count = text.chars().count().div_ceil(4);
        let segment = TextSegment {
            index: self.index,
            text,
            char_start: s,
            char_end: e,
            token_count,
        };
        self.index += 1;
        Some(segment)
    }
}

impl Iterator for Segments {
    type Item = TextSegment;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.cursor >= self.chars.len() {
                return None;
            }

            let start = self.cursor;
            let len = self.chars.len();
            let mut end = (start + self.chunk_size).min(len);

            if end < len {
                // Back off to the last whitespace inside the window so the
                // cut never lands mid-word.
                if let Some(ws) = (start + 1..end).rev().find(|&i| self.chars[i].is_whitespace())
                {
                    end = ws;
                }
                // No whitespace in the window: hard cut through the long run.
            }

            if end >= len {
                self.done = true;
            } else {
                // Step back by the overlap, then forward to the next word
                // start so the overlap region also begins on a boundary.
                let mut next = end.saturating_sub(self.overlap).max(start + 1);
                while next < end && next > 0 && !self.chars[next - 1].is_whitespace() {
                    next += 1;
                }
                // Degenerate overlap (no boundary found): continue from the cut.
                self.cursor = next.max(start + 1);
            }

            if self.done {
                self.cursor = len;
            }

            // Whitespace-only windows produce nothing; keep scanning.
            match self.emit(start, end) {
                Some(segment) => return Some(segment),
                None if self.done => return None,
                None => continue,
            }
        }
    }
}

impl TextSplitter {
    /// Convenience wrapper used by tests and small callers.
    pub fn split(&self, text: &str) -> Vec<TextSegment> {
        self.segments(text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{:03}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_text_single_segment() {
        let splitter = TextSplitter::new(500, 50);
        let segments = splitter.split("P0301 means cylinder 1 misfire.");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].index, 0);
        assert_eq!(segments[0].char_start, 0);
        assert_eq!(segments[0].text, "P0301 means cylinder 1 misfire.");
    }

    #[test]
    fn test_no_mid_word_cuts() {
        let splitter = TextSplitter::new(50, 10);
        let text = words(40);
        for segment in splitter.split(&text) {
            assert!(!segment.text.starts_with(char::is_whitespace));
            assert!(!segment.text.ends_with(char::is_whitespace));
            // Every boundary char in the source around the segment is whitespace
            // or the text edge, i.e. the cut landed between words.
            assert!(segment.text.split_whitespace().all(|w| w.starts_with("word")));
            assert!(
                segment
                    .text
                    .split_whitespace()
                    .all(|w| w.len() == 7),
                "split word in {:?}",
                segment.text
            );
        }
    }

    #[test]
    fn test_segments_overlap() {
        let splitter = TextSplitter::new(50, 10);
        let text = words(40);
        let segments = splitter.split(&text);
        assert!(segments.len() > 1);
        for pair in segments.windows(2) {
            assert!(pair[1].char_start < pair[0].char_end, "no overlap between segments");
            assert!(pair[1].char_start > pair[0].char_start, "no forward progress");
        }
    }

    #[test]
    fn test_offsets_index_source_chars() {
        let splitter = TextSplitter::new(50, 10);
        let text = words(40);
        let chars: Vec<char> = text.chars().collect();
        for segment in splitter.split(&text) {
            let slice: String = chars[segment.char_start..segment.char_end].iter().collect();
            assert_eq!(slice, segment.text);
        }
    }

    #[test]
    fn test_long_unbroken_run_is_hard_cut() {
        let splitter = TextSplitter::new(20, 5);
        let text = "x".repeat(55);
        let segments = splitter.split(&text);
        assert!(segments.len() >= 3);
        assert_eq!(segments[0].text.len(), 20);
    }

    #[test]
    fn test_indexes_are_sequential() {
        let splitter = TextSplitter::new(50, 10);
        let segments = splitter.split(&words(40));
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i);
        }
    }

    #[test]
    fn test_token_count_estimate() {
        let splitter = TextSplitter::new(500, 50);
        let segments = splitter.split("abcdefgh");
        assert_eq!(segments[0].token_count, 2);
    }

    #[test]
    fn test_whitespace_only_input() {
        let splitter = TextSplitter::new(50, 10);
        assert!(splitter.split("   \n\t  ").is_empty());
    }

    #[test]
    fn test_unicode_offsets() {
        let splitter = TextSplitter::new(500, 50);
        let text = "Kühlmitteltemperatursensor defekt — Fehlercode P0117.";
        let segments = splitter.split(text);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].char_end, text.chars().count());
    }

    #[test]
    #[should_panic]
    fn test_overlap_must_be_smaller_than_chunk() {
        TextSplitter::new(50, 50);
    }
}
