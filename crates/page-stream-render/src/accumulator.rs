//! Event-driven text accumulation.
//!
//! Turns document events into styled words inside the composer's current
//! block. Malformed nesting never errors: style depths saturate at zero.

use page_stream::{BlockKind, DocumentEvent, SpanKind, TextKind};

use crate::composer::{Page, PageComposer};
use crate::renderer::TextRenderer;
use crate::text::{Alignment, FontStyle, StyleState, Word, MAX_BLOCK_WORDS, MAX_WORD_BYTES};

const BULLET: &str = "\u{2022}";
const RULE: &str = "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}";

/// Point in the event stream where cancellation may be polled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Checkpoint {
    /// Mid-block; keep going.
    None,
    /// A block just started.
    BlockBoundary,
    /// An overlong block was laid out early.
    ForcedLayout {
        /// Words resident before the layout ran.
        words: usize,
    },
}

impl Checkpoint {
    pub fn is_poll_point(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Streaming word builder.
pub struct TextAccumulator {
    style: StyleState,
    word: heapless::String<MAX_WORD_BYTES>,
    in_list_item: bool,
    first_list_item_word: bool,
}

impl Default for TextAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAccumulator {
    pub fn new() -> Self {
        Self {
            style: StyleState::default(),
            word: heapless::String::new(),
            in_list_item: false,
            first_list_item_word: false,
        }
    }

    /// Consume one event.
    pub fn on_event<R, F>(
        &mut self,
        event: DocumentEvent<'_>,
        composer: &mut PageComposer<'_, R>,
        on_page: &mut F,
    ) -> Checkpoint
    where
        R: TextRenderer + ?Sized,
        F: FnMut(Page),
    {
        match event {
            DocumentEvent::BlockStart(kind) => {
                self.enter_block(kind, composer, on_page);
                Checkpoint::BlockBoundary
            }
            DocumentEvent::BlockEnd(kind) => {
                self.leave_block(kind, composer);
                Checkpoint::None
            }
            DocumentEvent::SpanStart(kind) => {
                self.enter_span(kind, composer);
                Checkpoint::None
            }
            DocumentEvent::SpanEnd(kind) => {
                self.leave_span(kind);
                Checkpoint::None
            }
            DocumentEvent::Text { text, kind } => self.on_text(text, kind, composer, on_page),
        }
    }

    /// Flush the pending word and lay out whatever is left.
    pub fn finish<R, F>(&mut self, composer: &mut PageComposer<'_, R>, on_page: &mut F)
    where
        R: TextRenderer + ?Sized,
        F: FnMut(Page),
    {
        self.flush(composer);
        composer.finish(on_page);
    }

    fn enter_block<R, F>(
        &mut self,
        kind: BlockKind,
        composer: &mut PageComposer<'_, R>,
        on_page: &mut F,
    ) where
        R: TextRenderer + ?Sized,
        F: FnMut(Page),
    {
        match kind {
            BlockKind::Document => {
                let alignment = composer.config().paragraph_alignment();
                composer.start_block(alignment, on_page);
            }
            BlockKind::Heading { .. } => {
                self.flush(composer);
                composer.start_block(Alignment::Center, on_page);
                self.style.enter_bold();
            }
            BlockKind::Paragraph => {
                self.flush(composer);
                let alignment = composer.config().paragraph_alignment();
                composer.start_block(alignment, on_page);
            }
            BlockKind::Quote => {
                self.flush(composer);
                composer.start_block(Alignment::Left, on_page);
                self.style.enter_italic();
            }
            BlockKind::ListItem => {
                self.flush(composer);
                composer.start_block(Alignment::Left, on_page);
                self.in_list_item = true;
                self.first_list_item_word = true;
            }
            BlockKind::Code => {
                self.flush(composer);
                composer.start_block(Alignment::Left, on_page);
                composer.add_word(Word::new("[Code:", FontStyle::Italic));
            }
            BlockKind::Rule => {
                self.flush(composer);
                composer.start_block(Alignment::Center, on_page);
                composer.add_word(Word::new(RULE, FontStyle::Regular));
            }
            BlockKind::Table => {
                self.flush(composer);
                composer.start_block(Alignment::Center, on_page);
                composer.add_word(Word::new("[Table", FontStyle::Italic));
                composer.add_word(Word::new("omitted]", FontStyle::Italic));
            }
            BlockKind::List { .. } | BlockKind::Raw => {}
        }
    }

    fn leave_block<R>(&mut self, kind: BlockKind, composer: &mut PageComposer<'_, R>)
    where
        R: TextRenderer + ?Sized,
    {
        match kind {
            BlockKind::Heading { .. } => {
                self.flush(composer);
                self.style.leave_bold();
            }
            BlockKind::Paragraph | BlockKind::ListItem => {
                self.flush(composer);
                self.in_list_item = false;
                self.first_list_item_word = false;
            }
            BlockKind::Quote => {
                self.flush(composer);
                self.style.leave_italic();
            }
            BlockKind::Code => {
                self.flush(composer);
                composer.add_word(Word::new("]", FontStyle::Italic));
            }
            _ => {}
        }
    }

    fn enter_span<R>(&mut self, kind: SpanKind, composer: &mut PageComposer<'_, R>)
    where
        R: TextRenderer + ?Sized,
    {
        match kind {
            SpanKind::Strong => self.style.enter_bold(),
            SpanKind::Emphasis | SpanKind::Code => self.style.enter_italic(),
            SpanKind::Image => {
                self.flush(composer);
                composer.add_word(Word::new("[Image]", FontStyle::Italic));
            }
            SpanKind::Link | SpanKind::Strikethrough => {}
        }
    }

    fn leave_span(&mut self, kind: SpanKind) {
        match kind {
            SpanKind::Strong => self.style.leave_bold(),
            SpanKind::Emphasis | SpanKind::Code => self.style.leave_italic(),
            _ => {}
        }
    }

    fn on_text<R, F>(
        &mut self,
        text: &str,
        kind: TextKind,
        composer: &mut PageComposer<'_, R>,
        on_page: &mut F,
    ) -> Checkpoint
    where
        R: TextRenderer + ?Sized,
        F: FnMut(Page),
    {
        match kind {
            TextKind::LineBreak | TextKind::SoftBreak => {
                self.flush(composer);
                return Checkpoint::None;
            }
            TextKind::Code => {
                composer.add_word(Word::new("...", FontStyle::Italic));
                return Checkpoint::None;
            }
            TextKind::Raw => return Checkpoint::None,
            TextKind::Entity => {
                self.on_entity(text, composer);
                return Checkpoint::None;
            }
            TextKind::Plain => {}
        }

        if self.in_list_item && self.first_list_item_word {
            composer.add_word(Word::new(BULLET, FontStyle::Regular));
            self.first_list_item_word = false;
        }

        let style = self.style.resolve();
        for ch in text.chars() {
            if matches!(ch, ' ' | '\r' | '\n' | '\t') {
                self.flush_as(composer, style);
                continue;
            }
            if self.word.push(ch).is_err() {
                self.flush_as(composer, style);
                let _ = self.word.push(ch);
            }
        }

        let words = composer.block_len();
        if words > MAX_BLOCK_WORDS {
            log::warn!(
                "text block holds {} words; laying out early to bound memory",
                words
            );
            composer.force_layout(true, on_page);
            return Checkpoint::ForcedLayout { words };
        }
        Checkpoint::None
    }

    fn on_entity<R>(&mut self, entity: &str, composer: &mut PageComposer<'_, R>)
    where
        R: TextRenderer + ?Sized,
    {
        let decoded = match entity {
            "&nbsp;" => {
                self.flush(composer);
                return;
            }
            "&quot;" => '"',
            "&amp;" => '&',
            "&lt;" => '<',
            "&gt;" => '>',
            _ => return,
        };
        // A full buffer drops the character.
        let _ = self.word.push(decoded);
    }

    fn flush<R>(&mut self, composer: &mut PageComposer<'_, R>)
    where
        R: TextRenderer + ?Sized,
    {
        let style = self.style.resolve();
        self.flush_as(composer, style);
    }

    fn flush_as<R>(&mut self, composer: &mut PageComposer<'_, R>, style: FontStyle)
    where
        R: TextRenderer + ?Sized,
    {
        if self.word.is_empty() {
            return;
        }
        composer.add_word(Word::new(self.word.as_str(), style));
        self.word.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_config::RenderConfig;
    use crate::renderer::FixedMetricsRenderer;
    use page_stream::TextKind;

    fn config() -> RenderConfig {
        RenderConfig::for_viewport(200, 100)
            .with_indent_level(0)
            .with_spacing_level(0)
            .with_paragraph_alignment(Alignment::Left)
    }

    fn run(events: &[DocumentEvent<'_>]) -> Vec<Page> {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let config = config();
        let mut composer = PageComposer::new(&renderer, config);
        let mut accumulator = TextAccumulator::new();
        let mut pages = Vec::new();
        let mut on_page = |page: Page| pages.push(page);
        for event in events {
            accumulator.on_event(*event, &mut composer, &mut on_page);
        }
        accumulator.finish(&mut composer, &mut on_page);
        pages
    }

    fn words(pages: &[Page]) -> Vec<(String, FontStyle)> {
        pages
            .iter()
            .flat_map(|page| page.lines.iter())
            .flat_map(|line| line.line.words.iter())
            .map(|word| (word.text.clone(), word.style))
            .collect()
    }

    fn text(text: &str) -> DocumentEvent<'_> {
        DocumentEvent::text(text)
    }

    #[test]
    fn spans_resolve_word_styles() {
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Document),
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            text("plain "),
            DocumentEvent::SpanStart(SpanKind::Strong),
            text("bold "),
            DocumentEvent::SpanStart(SpanKind::Emphasis),
            text("both "),
            DocumentEvent::SpanEnd(SpanKind::Strong),
            text("tilted slanted"),
            DocumentEvent::SpanEnd(SpanKind::Emphasis),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        assert_eq!(
            words(&pages),
            vec![
                ("plain".to_string(), FontStyle::Regular),
                ("bold".to_string(), FontStyle::Bold),
                ("both".to_string(), FontStyle::BoldItalic),
                ("tilted".to_string(), FontStyle::Italic),
                ("slanted".to_string(), FontStyle::Regular),
            ]
        );
    }

    #[test]
    fn unmatched_span_end_is_absorbed() {
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            DocumentEvent::SpanEnd(SpanKind::Strong),
            DocumentEvent::SpanEnd(SpanKind::Emphasis),
            text("calm"),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        assert_eq!(words(&pages), vec![("calm".to_string(), FontStyle::Regular)]);
    }

    #[test]
    fn heading_is_bold_and_centered() {
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Heading { level: 2 }),
            text("Title"),
            DocumentEvent::BlockEnd(BlockKind::Heading { level: 2 }),
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            text("body"),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        assert_eq!(pages.len(), 1);
        let heading = &pages[0].lines[0].line;
        assert_eq!(heading.alignment, Alignment::Center);
        assert_eq!(heading.words[0].style, FontStyle::Bold);
        assert_eq!(pages[0].lines[1].line.words[0].style, FontStyle::Regular);
    }

    #[test]
    fn list_items_get_a_bullet_once() {
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::List { ordered: false }),
            DocumentEvent::BlockStart(BlockKind::ListItem),
            text("one "),
            text("more"),
            DocumentEvent::BlockEnd(BlockKind::ListItem),
            DocumentEvent::BlockEnd(BlockKind::List { ordered: false }),
        ]);
        let texts: Vec<String> = words(&pages).into_iter().map(|(t, _)| t).collect();
        assert_eq!(texts, vec!["\u{2022}", "one", "more"]);
    }

    #[test]
    fn placeholders_for_code_rule_table_and_image() {
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Code),
            DocumentEvent::Text {
                text: "let x = 1;",
                kind: TextKind::Code,
            },
            DocumentEvent::BlockEnd(BlockKind::Code),
            DocumentEvent::BlockStart(BlockKind::Rule),
            DocumentEvent::BlockEnd(BlockKind::Rule),
            DocumentEvent::BlockStart(BlockKind::Table),
            DocumentEvent::BlockEnd(BlockKind::Table),
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            DocumentEvent::SpanStart(SpanKind::Image),
            DocumentEvent::SpanEnd(SpanKind::Image),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        let texts: Vec<String> = words(&pages).into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            texts,
            vec!["[Code:", "...", "]", RULE, "[Table", "omitted]", "[Image]"]
        );
    }

    #[test]
    fn entity_allowlist() {
        let entity = |text| DocumentEvent::Text {
            text,
            kind: TextKind::Entity,
        };
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            text("a"),
            entity("&amp;"),
            text("b"),
            entity("&nbsp;"),
            entity("&lt;"),
            text("c"),
            entity("&gt;"),
            entity("&copy;"),
            entity("&quot;"),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        let texts: Vec<String> = words(&pages).into_iter().map(|(t, _)| t).collect();
        assert_eq!(texts, vec!["a&b", "<c>\""]);
    }

    #[test]
    fn raw_text_is_skipped() {
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            DocumentEvent::Text {
                text: "<span>",
                kind: TextKind::Raw,
            },
            text("kept"),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        let texts: Vec<String> = words(&pages).into_iter().map(|(t, _)| t).collect();
        assert_eq!(texts, vec!["kept"]);
    }

    #[test]
    fn overlong_word_is_force_split_at_buffer_size() {
        let long = "x".repeat(MAX_WORD_BYTES * 2 + 5);
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            text(&long),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        let lens: Vec<usize> = words(&pages).into_iter().map(|(t, _)| t.len()).collect();
        assert_eq!(lens, vec![MAX_WORD_BYTES, MAX_WORD_BYTES, 5]);
    }

    #[test]
    fn multibyte_split_never_cuts_a_char() {
        // 'é' is two bytes; 101 of them exceed the buffer by one char.
        let long = "\u{e9}".repeat(101);
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            text(&long),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        let lens: Vec<usize> = words(&pages).into_iter().map(|(t, _)| t.len()).collect();
        assert_eq!(lens, vec![200, 2]);
    }

    #[test]
    fn style_for_whitespace_flush_is_captured_at_text_start() {
        let pages = run(&[
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            DocumentEvent::SpanStart(SpanKind::Strong),
            text("glued"),
            DocumentEvent::SpanEnd(SpanKind::Strong),
            text("tail next"),
            DocumentEvent::BlockEnd(BlockKind::Paragraph),
        ]);
        assert_eq!(
            words(&pages),
            vec![
                ("gluedtail".to_string(), FontStyle::Regular),
                ("next".to_string(), FontStyle::Regular),
            ]
        );
    }

    #[test]
    fn oversized_block_triggers_forced_layout() {
        let renderer = FixedMetricsRenderer::new(10, 10, 20);
        let config = config();
        let mut composer = PageComposer::new(&renderer, config);
        let mut accumulator = TextAccumulator::new();
        let mut pages = Vec::new();
        let mut on_page = |page: Page| pages.push(page);
        accumulator.on_event(
            DocumentEvent::BlockStart(BlockKind::Paragraph),
            &mut composer,
            &mut on_page,
        );
        let mut forced = None;
        for _ in 0..(MAX_BLOCK_WORDS + 1) {
            let checkpoint = accumulator.on_event(text("word "), &mut composer, &mut on_page);
            if let Checkpoint::ForcedLayout { words } = checkpoint {
                forced = Some(words);
            }
        }
        assert_eq!(forced, Some(MAX_BLOCK_WORDS + 1));
        assert!(composer.block_len() <= 4);
        accumulator.finish(&mut composer, &mut on_page);
        drop(on_page);
        let total: usize = pages
            .iter()
            .map(|page| page.lines.iter().map(|l| l.line.words.len()).sum::<usize>())
            .sum();
        assert_eq!(total, MAX_BLOCK_WORDS + 1);
    }
}
