//! Renderer contract consumed by page composition, plus a fixed-metrics
//! reference implementation.

use core::ops::Range;

use crate::text::{Alignment, FontStyle, TextBlock};

/// A word placed on a line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedWord {
    pub text: String,
    pub style: FontStyle,
    /// Horizontal offset from the line origin in pixels.
    pub x: u16,
}

/// One wrapped line of a text block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Line {
    pub words: Vec<PlacedWord>,
    pub alignment: Alignment,
}

impl Line {
    /// Words joined by single spaces.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (idx, word) in self.words.iter().enumerate() {
            if idx > 0 {
                out.push(' ');
            }
            out.push_str(&word.text);
        }
        out
    }
}

/// Line produced by [`TextRenderer::wrap_words`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedLine {
    pub line: Line,
    /// Indices of the block words that appear, fully or partly, on this line.
    pub source: Range<usize>,
}

/// Line-wrapping and font-metric capability.
pub trait TextRenderer {
    /// Unscaled line height of `font_id` in pixels.
    fn line_height(&self, font_id: i32) -> u16;

    /// Wrap the block's words into lines no wider than `max_width`.
    ///
    /// `max_lines` stops wrapping early once that many lines exist.
    fn wrap_words(
        &self,
        font_id: i32,
        block: &TextBlock,
        max_width: u16,
        max_lines: Option<usize>,
    ) -> Vec<WrappedLine>;
}

impl<T: TextRenderer + ?Sized> TextRenderer for &T {
    fn line_height(&self, font_id: i32) -> u16 {
        (**self).line_height(font_id)
    }

    fn wrap_words(
        &self,
        font_id: i32,
        block: &TextBlock,
        max_width: u16,
        max_lines: Option<usize>,
    ) -> Vec<WrappedLine> {
        (**self).wrap_words(font_id, block, max_width, max_lines)
    }
}

/// Greedy line breaker with fixed per-character advances.
///
/// Every character advances `char_width` regardless of font or style, which
/// makes layout deterministic for tooling and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedMetricsRenderer {
    char_width: u16,
    space_width: u16,
    line_height: u16,
}

impl Default for FixedMetricsRenderer {
    fn default() -> Self {
        Self::new(10, 5, 24)
    }
}

impl FixedMetricsRenderer {
    /// Zero advances are clamped to one pixel.
    pub fn new(char_width: u16, space_width: u16, line_height: u16) -> Self {
        Self {
            char_width: char_width.max(1),
            space_width: space_width.max(1),
            line_height: line_height.max(1),
        }
    }

    fn text_width(&self, text: &str) -> u32 {
        text.chars().count() as u32 * self.char_width as u32
    }

    fn first_line_indent(&self, block: &TextBlock) -> u32 {
        if block.is_continued() || !matches!(block.alignment(), Alignment::Left | Alignment::Justify)
        {
            return 0;
        }
        block.indent_level() as u32 * 2 * self.char_width as u32
    }

    /// Split an overlong word into chunks that each fit `max_width`,
    /// every chunk but the last ending in `-`.
    fn hyphenate<'a>(&self, text: &'a str, max_width: u32) -> Vec<(&'a str, bool)> {
        let per_chunk = (max_width / self.char_width as u32).saturating_sub(1).max(1) as usize;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut count = 0usize;
        for (idx, _) in text.char_indices() {
            if count == per_chunk {
                chunks.push((&text[start..idx], true));
                start = idx;
                count = 0;
            }
            count += 1;
        }
        chunks.push((&text[start..], false));
        chunks
    }
}

struct Pending {
    text: String,
    style: FontStyle,
    width: u32,
}

impl TextRenderer for FixedMetricsRenderer {
    fn line_height(&self, _font_id: i32) -> u16 {
        self.line_height
    }

    fn wrap_words(
        &self,
        _font_id: i32,
        block: &TextBlock,
        max_width: u16,
        max_lines: Option<usize>,
    ) -> Vec<WrappedLine> {
        let max_width = max_width as u32;
        let space = self.space_width as u32;
        let indent = self.first_line_indent(block);
        let mut lines = Vec::new();
        let mut pending: Vec<Pending> = Vec::new();
        let mut pending_width = 0u32;
        let mut first_word = 0usize;
        let mut last_word = 0usize;

        for (idx, word) in block.words().iter().enumerate() {
            let whole = self.text_width(&word.text);
            let pieces = if block.hyphenation() && whole > max_width {
                self.hyphenate(&word.text, max_width)
            } else {
                vec![(word.text.as_str(), false)]
            };
            for (piece, hyphen) in pieces {
                let mut text = String::with_capacity(piece.len() + 1);
                text.push_str(piece);
                if hyphen {
                    text.push('-');
                }
                let width = self.text_width(&text);
                let available = if lines.is_empty() {
                    max_width.saturating_sub(indent)
                } else {
                    max_width
                };
                if !pending.is_empty() && pending_width + space + width > available {
                    let first_line = lines.is_empty();
                    lines.push(self.place(
                        core::mem::take(&mut pending),
                        pending_width,
                        block,
                        first_line,
                        false,
                        indent,
                        max_width,
                        first_word..last_word + 1,
                    ));
                    if max_lines.is_some_and(|max| lines.len() >= max) {
                        return lines;
                    }
                }
                if pending.is_empty() {
                    first_word = idx;
                    pending_width = width;
                } else {
                    pending_width += space + width;
                }
                last_word = idx;
                pending.push(Pending {
                    text,
                    style: word.style,
                    width,
                });
            }
        }
        if !pending.is_empty() {
            let first_line = lines.is_empty();
            lines.push(self.place(
                pending,
                pending_width,
                block,
                first_line,
                true,
                indent,
                max_width,
                first_word..last_word + 1,
            ));
        }
        lines
    }
}

impl FixedMetricsRenderer {
    #[allow(clippy::too_many_arguments)]
    fn place(
        &self,
        pending: Vec<Pending>,
        content_width: u32,
        block: &TextBlock,
        first_line: bool,
        last_line: bool,
        indent: u32,
        max_width: u32,
        source: Range<usize>,
    ) -> WrappedLine {
        let origin = if first_line { indent } else { 0 };
        let available = max_width.saturating_sub(origin);
        let slack = available.saturating_sub(content_width);
        let gaps = pending.len().saturating_sub(1) as u32;
        let space = self.space_width as u32;
        let (mut x, extra_per_gap, extra_rem) = match block.alignment() {
            Alignment::Left => (origin, 0, 0),
            Alignment::Right => (origin + slack, 0, 0),
            Alignment::Center => (origin + slack / 2, 0, 0),
            Alignment::Justify if last_line || gaps == 0 => (origin, 0, 0),
            Alignment::Justify => (origin, slack / gaps, slack % gaps),
        };
        let mut words = Vec::with_capacity(pending.len());
        for (gap, word) in pending.into_iter().enumerate() {
            words.push(PlacedWord {
                text: word.text,
                style: word.style,
                x: u16::try_from(x).unwrap_or(u16::MAX),
            });
            let bonus = if (gap as u32) < extra_rem { 1 } else { 0 };
            x = x + word.width + space + extra_per_gap + bonus;
        }
        WrappedLine {
            line: Line {
                words,
                alignment: block.alignment(),
            },
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::Word;

    fn block_of(alignment: Alignment, words: &[&str]) -> TextBlock {
        let mut block = TextBlock::new(alignment, 0, false);
        for word in words {
            block.push_word(Word::new(*word, FontStyle::Regular));
        }
        block
    }

    #[test]
    fn greedy_wrap_respects_width() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let block = block_of(Alignment::Left, &["word"; 9]);
        let lines = renderer.wrap_words(0, &block, 200, None);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line.words.len(), 4);
        assert_eq!(lines[0].source, 0..4);
        assert_eq!(lines[1].source, 4..8);
        assert_eq!(lines[2].source, 8..9);
        let xs: Vec<u16> = lines[0].line.words.iter().map(|w| w.x).collect();
        assert_eq!(xs, vec![0, 50, 100, 150]);
    }

    #[test]
    fn max_lines_stops_early() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let block = block_of(Alignment::Left, &["word"; 20]);
        let lines = renderer.wrap_words(0, &block, 200, Some(2));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn alignment_offsets() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let right = renderer.wrap_words(0, &block_of(Alignment::Right, &["ab"]), 100, None);
        assert_eq!(right[0].line.words[0].x, 80);
        let center = renderer.wrap_words(0, &block_of(Alignment::Center, &["ab"]), 100, None);
        assert_eq!(center[0].line.words[0].x, 40);
    }

    #[test]
    fn justify_spreads_all_but_last_line() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let block = block_of(Alignment::Justify, &["aaa", "bbb", "ccc", "ddd"]);
        let lines = renderer.wrap_words(0, &block, 75, None);
        assert_eq!(lines.len(), 2);
        // 75px wide, two 30px words plus one 10px space leaves 5px of slack.
        assert_eq!(lines[0].line.words[1].x, 45);
        assert_eq!(lines[1].line.words[1].x, 40);
    }

    #[test]
    fn first_line_indent_skips_continued_blocks() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let mut block = TextBlock::new(Alignment::Left, 1, false);
        for _ in 0..3 {
            block.push_word(Word::new("w", FontStyle::Regular));
        }
        let lines = renderer.wrap_words(0, &block, 200, None);
        assert_eq!(lines[0].line.words[0].x, 20);
        block.consume_front(1);
        let lines = renderer.wrap_words(0, &block, 200, None);
        assert_eq!(lines[0].line.words[0].x, 0);
    }

    #[test]
    fn hyphenation_chunks_overlong_words() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let mut block = TextBlock::new(Alignment::Left, 0, true);
        block.push_word(Word::new("abcdefghij", FontStyle::Regular));
        block.push_word(Word::new("k", FontStyle::Regular));
        let lines = renderer.wrap_words(0, &block, 50, None);
        let texts: Vec<String> = lines.iter().map(|l| l.line.text()).collect();
        assert_eq!(texts, vec!["abcd-", "efgh-", "ij k"]);
        assert_eq!(lines[0].source, 0..1);
        assert_eq!(lines[1].source, 0..1);
        assert_eq!(lines[2].source, 0..2);
    }

    #[test]
    fn overlong_word_without_hyphenation_gets_its_own_line() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let block = block_of(Alignment::Left, &["a", "abcdefghij", "b"]);
        let lines = renderer.wrap_words(0, &block, 50, None);
        let texts: Vec<String> = lines.iter().map(|l| l.line.text()).collect();
        assert_eq!(texts, vec!["a", "abcdefghij", "b"]);
        assert_eq!(lines[1].source, 1..2);
    }
}
