//! Page composition: wraps text blocks into lines and packs lines into
//! viewport-bounded pages.
//!
//! At most one block and one in-progress page are resident. Sealed pages are
//! moved into the caller's `on_page` callback and never touched again.

use crate::render_config::RenderConfig;
use crate::renderer::{Line, TextRenderer};
use crate::text::{Alignment, TextBlock, Word};

/// A line placed on a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLine {
    pub line: Line,
    pub x: u16,
    pub y: u16,
}

/// One display page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub lines: Vec<PageLine>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Text of every line, top to bottom.
    pub fn line_texts(&self) -> Vec<String> {
        self.lines.iter().map(|placed| placed.line.text()).collect()
    }
}

/// Streaming page composer driven by [`crate::TextAccumulator`].
pub struct PageComposer<'r, R: TextRenderer + ?Sized> {
    renderer: &'r R,
    config: RenderConfig,
    line_height: u32,
    block: Option<TextBlock>,
    page: Option<Page>,
    cursor_y: u32,
    pages_sealed: usize,
}

impl<'r, R: TextRenderer + ?Sized> PageComposer<'r, R> {
    pub fn new(renderer: &'r R, config: RenderConfig) -> Self {
        let line_height = config.scaled_line_height(renderer.line_height(config.font_id));
        Self {
            renderer,
            config,
            line_height,
            block: None,
            page: None,
            cursor_y: 0,
            pages_sealed: 0,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Scaled line advance in pixels.
    pub fn line_height(&self) -> u32 {
        self.line_height
    }

    /// Y position where the next line will be placed.
    pub fn cursor_y(&self) -> u32 {
        self.cursor_y
    }

    /// Pages handed to `on_page` so far.
    pub fn pages_sealed(&self) -> usize {
        self.pages_sealed
    }

    /// The block currently accumulating words, if any.
    pub fn current_block(&self) -> Option<&TextBlock> {
        self.block.as_ref()
    }

    /// Words resident in the current block.
    pub fn block_len(&self) -> usize {
        self.block.as_ref().map_or(0, TextBlock::len)
    }

    /// Begin a new block.
    ///
    /// An empty current block is reused with the new alignment; a block with
    /// words is laid out first.
    pub fn start_block<F>(&mut self, alignment: Alignment, on_page: &mut F)
    where
        F: FnMut(Page),
    {
        if let Some(block) = self.block.as_mut() {
            if block.is_empty() {
                block.set_alignment(alignment);
                return;
            }
            self.complete_block(on_page);
        }
        self.block = Some(TextBlock::new(
            alignment,
            self.config.indent_level,
            self.config.hyphenation,
        ));
    }

    /// Append a word to the current block, opening a body block if needed.
    pub fn add_word(&mut self, word: Word) {
        let config = &self.config;
        self.block
            .get_or_insert_with(|| {
                TextBlock::new(
                    config.paragraph_alignment(),
                    config.indent_level,
                    config.hyphenation,
                )
            })
            .push_word(word);
    }

    /// Lay out every word of the current block, then add paragraph spacing.
    /// Returns the number of lines placed.
    pub fn complete_block<F>(&mut self, on_page: &mut F) -> usize
    where
        F: FnMut(Page),
    {
        let Some(block) = self.block.take() else {
            log::warn!("no text block to lay out");
            return 0;
        };
        self.ensure_page();
        let lines = self.renderer.wrap_words(
            self.config.font_id,
            &block,
            self.config.viewport_width,
            None,
        );
        let placed = lines.len();
        for wrapped in lines {
            self.append_line(wrapped.line, on_page);
        }
        self.cursor_y += self.paragraph_spacing();
        placed
    }

    /// Lay out the current block early to bound resident memory.
    ///
    /// With `partial`, every line except the last is placed and its words are
    /// dropped from the block; accumulation continues in the same block.
    /// Without `partial` this is [`complete_block`](Self::complete_block).
    /// Returns the number of lines placed.
    pub fn force_layout<F>(&mut self, partial: bool, on_page: &mut F) -> usize
    where
        F: FnMut(Page),
    {
        if !partial {
            return self.complete_block(on_page);
        }
        let Some(block) = self.block.as_ref() else {
            return 0;
        };
        let lines = self.renderer.wrap_words(
            self.config.font_id,
            block,
            self.config.viewport_width,
            None,
        );
        let Some(keep_from) = lines.last().map(|last| last.source.start) else {
            return 0;
        };
        if keep_from == 0 {
            return 0;
        }
        self.ensure_page();
        let mut placed = 0usize;
        for wrapped in lines {
            if wrapped.source.end > keep_from {
                break;
            }
            self.append_line(wrapped.line, on_page);
            placed += 1;
        }
        if let Some(block) = self.block.as_mut() {
            block.consume_front(keep_from);
        }
        placed
    }

    /// Place one line at the cursor, sealing the page first when the line
    /// would overflow the viewport.
    pub fn append_line<F>(&mut self, line: Line, on_page: &mut F)
    where
        F: FnMut(Page),
    {
        if self.cursor_y + self.line_height > self.config.viewport_height as u32 {
            if let Some(page) = self.page.take() {
                self.seal(page, on_page);
            }
            self.cursor_y = 0;
        }
        let y = u16::try_from(self.cursor_y).unwrap_or(u16::MAX);
        self.page
            .get_or_insert_with(Page::new)
            .lines
            .push(PageLine { line, x: 0, y });
        self.cursor_y += self.line_height;
    }

    /// Lay out what is left and seal the last page.
    pub fn finish<F>(&mut self, on_page: &mut F)
    where
        F: FnMut(Page),
    {
        if self.block.as_ref().is_some_and(|block| !block.is_empty()) {
            self.complete_block(on_page);
        }
        self.block = None;
        if let Some(page) = self.page.take() {
            self.seal(page, on_page);
        }
    }

    fn ensure_page(&mut self) {
        if self.page.is_none() {
            self.page = Some(Page::new());
            self.cursor_y = 0;
        }
    }

    fn seal<F>(&mut self, page: Page, on_page: &mut F)
    where
        F: FnMut(Page),
    {
        self.pages_sealed += 1;
        on_page(page);
    }

    /// Extra space after a completed block.
    ///
    /// Only levels 1 and 3 add space; every other level adds none.
    fn paragraph_spacing(&self) -> u32 {
        match self.config.spacing_level {
            1 => self.line_height / 4,
            3 => self.line_height,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::FixedMetricsRenderer;
    use crate::text::FontStyle;

    fn config(spacing_level: u8) -> RenderConfig {
        RenderConfig::for_viewport(200, 100)
            .with_indent_level(0)
            .with_spacing_level(spacing_level)
            .with_paragraph_alignment(Alignment::Left)
    }

    fn add_words(composer: &mut PageComposer<'_, FixedMetricsRenderer>, count: usize) {
        for _ in 0..count {
            composer.add_word(Word::new("word", FontStyle::Regular));
        }
    }

    #[test]
    fn lines_overflowing_viewport_seal_the_page() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let mut composer = PageComposer::new(&renderer, config(0));
        let mut pages = Vec::new();
        composer.start_block(Alignment::Left, &mut |page| pages.push(page));
        // 4 words per line, 5 lines per page.
        add_words(&mut composer, 24);
        composer.finish(&mut |page| pages.push(page));
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines.len(), 5);
        assert_eq!(pages[1].lines.len(), 1);
        let ys: Vec<u16> = pages[0].lines.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![0, 20, 40, 60, 80]);
        assert_eq!(pages[1].lines[0].y, 0);
        assert_eq!(composer.pages_sealed(), 2);
    }

    #[test]
    fn empty_block_is_reused_with_new_alignment() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let mut composer = PageComposer::new(&renderer, config(0));
        let mut pages = Vec::new();
        composer.start_block(Alignment::Left, &mut |page| pages.push(page));
        composer.start_block(Alignment::Center, &mut |page| pages.push(page));
        assert_eq!(
            composer.current_block().map(TextBlock::alignment),
            Some(Alignment::Center)
        );
        assert_eq!(composer.cursor_y(), 0);
        assert!(pages.is_empty());
    }

    #[test]
    fn spacing_levels_one_and_three_only() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        for (level, expected) in [(0u8, 20u32), (1, 25), (2, 20), (3, 40), (4, 20)] {
            let mut composer = PageComposer::new(&renderer, config(level));
            let mut sink = |_page: Page| {};
            composer.start_block(Alignment::Left, &mut sink);
            add_words(&mut composer, 1);
            composer.complete_block(&mut sink);
            assert_eq!(
                composer.cursor_y(),
                expected,
                "spacing level {} should advance {}px",
                level,
                expected
            );
        }
    }

    #[test]
    fn partial_layout_keeps_last_line_words() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let mut composer = PageComposer::new(&renderer, config(1));
        let mut pages = Vec::new();
        composer.start_block(Alignment::Left, &mut |page| pages.push(page));
        add_words(&mut composer, 10);
        let placed = composer.force_layout(true, &mut |page| pages.push(page));
        assert_eq!(placed, 2);
        assert_eq!(composer.block_len(), 2);
        // No paragraph spacing after a partial layout.
        assert_eq!(composer.cursor_y(), 40);
        assert!(composer
            .current_block()
            .is_some_and(TextBlock::is_continued));
        composer.finish(&mut |page| pages.push(page));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines.len(), 3);
    }

    #[test]
    fn partial_layout_of_single_line_is_a_no_op() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let mut composer = PageComposer::new(&renderer, config(0));
        let mut sink = |_page: Page| {};
        composer.start_block(Alignment::Left, &mut sink);
        add_words(&mut composer, 3);
        assert_eq!(composer.force_layout(true, &mut sink), 0);
        assert_eq!(composer.block_len(), 3);
    }

    #[test]
    fn finish_without_content_emits_nothing() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let mut composer = PageComposer::new(&renderer, config(0));
        let mut pages = Vec::new();
        composer.start_block(Alignment::Left, &mut |page| pages.push(page));
        composer.finish(&mut |page| pages.push(page));
        assert!(pages.is_empty());
    }
}
