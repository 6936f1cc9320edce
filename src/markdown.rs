//! Markdown document source backed by `pulldown-cmark`.

use std::fs;
use std::io;
use std::path::Path;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::event::{
    emit, BlockKind, DocumentEvent, DocumentEventSource, ParseError, ParseOutcome, SpanKind,
    TextKind,
};

/// Markdown source holding the document text.
///
/// CommonMark parsing needs the whole text up front (link reference
/// definitions may appear anywhere), so the source keeps one copy of the
/// document and replays it on every pass.
#[derive(Clone, Debug)]
pub struct MarkdownSource {
    text: String,
    options: Options,
}

impl MarkdownSource {
    /// Wrap Markdown text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH,
        }
    }

    /// Read a Markdown file into memory.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(fs::read_to_string(path)?))
    }

    /// Document length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the document is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl DocumentEventSource for MarkdownSource {
    fn parse(
        &mut self,
        sink: &mut dyn FnMut(DocumentEvent<'_>) -> core::ops::ControlFlow<()>,
    ) -> Result<ParseOutcome, ParseError> {
        if self.text.is_empty() {
            return Err(ParseError::new("EMPTY_DOCUMENT", "markdown document is empty"));
        }

        emit!(sink, DocumentEvent::BlockStart(BlockKind::Document));
        let mut in_code_block = false;
        let text = self.text.as_str();
        for (event, range) in Parser::new_ext(text, self.options).into_offset_iter() {
            match event {
                Event::Start(tag) => {
                    if let Some(mapped) = start_event(&tag) {
                        if matches!(tag, Tag::CodeBlock(_)) {
                            in_code_block = true;
                        }
                        emit!(sink, mapped);
                    }
                }
                Event::End(tag) => {
                    match tag {
                        TagEnd::TableCell => emit!(
                            sink,
                            DocumentEvent::Text {
                                text: " ",
                                kind: TextKind::SoftBreak,
                            }
                        ),
                        TagEnd::CodeBlock => in_code_block = false,
                        _ => {}
                    }
                    if let Some(mapped) = end_event(tag) {
                        emit!(sink, mapped);
                    }
                }
                Event::Text(decoded) => {
                    // Entities are decoded by the parser; pass the reference itself through.
                    let entity = text.get(range).and_then(entity_reference);
                    if let (Some(entity), false) = (entity, in_code_block) {
                        emit!(
                            sink,
                            DocumentEvent::Text {
                                text: entity,
                                kind: TextKind::Entity,
                            }
                        );
                        continue;
                    }
                    let kind = if in_code_block {
                        TextKind::Code
                    } else {
                        TextKind::Plain
                    };
                    emit!(sink, DocumentEvent::Text { text: &decoded, kind });
                }
                Event::Code(code) => {
                    emit!(sink, DocumentEvent::SpanStart(SpanKind::Code));
                    emit!(
                        sink,
                        DocumentEvent::Text {
                            text: &code,
                            kind: TextKind::Code,
                        }
                    );
                    emit!(sink, DocumentEvent::SpanEnd(SpanKind::Code));
                }
                Event::Html(html) | Event::InlineHtml(html) => {
                    emit!(
                        sink,
                        DocumentEvent::Text {
                            text: &html,
                            kind: TextKind::Raw,
                        }
                    );
                }
                Event::SoftBreak => {
                    emit!(
                        sink,
                        DocumentEvent::Text {
                            text: "\n",
                            kind: TextKind::SoftBreak,
                        }
                    );
                }
                Event::HardBreak => {
                    emit!(
                        sink,
                        DocumentEvent::Text {
                            text: "\n",
                            kind: TextKind::LineBreak,
                        }
                    );
                }
                Event::Rule => {
                    emit!(sink, DocumentEvent::BlockStart(BlockKind::Rule));
                    emit!(sink, DocumentEvent::BlockEnd(BlockKind::Rule));
                }
                _ => {}
            }
        }
        emit!(sink, DocumentEvent::BlockEnd(BlockKind::Document));
        Ok(ParseOutcome::Finished)
    }
}

fn start_event(tag: &Tag<'_>) -> Option<DocumentEvent<'static>> {
    let event = match tag {
        Tag::Paragraph => DocumentEvent::BlockStart(BlockKind::Paragraph),
        Tag::Heading { level, .. } => DocumentEvent::BlockStart(BlockKind::Heading {
            level: *level as u8,
        }),
        Tag::BlockQuote(_) => DocumentEvent::BlockStart(BlockKind::Quote),
        Tag::CodeBlock(_) => DocumentEvent::BlockStart(BlockKind::Code),
        Tag::HtmlBlock => DocumentEvent::BlockStart(BlockKind::Raw),
        Tag::List(start) => DocumentEvent::BlockStart(BlockKind::List {
            ordered: start.is_some(),
        }),
        Tag::Item => DocumentEvent::BlockStart(BlockKind::ListItem),
        Tag::Table(_) => DocumentEvent::BlockStart(BlockKind::Table),
        Tag::Emphasis => DocumentEvent::SpanStart(SpanKind::Emphasis),
        Tag::Strong => DocumentEvent::SpanStart(SpanKind::Strong),
        Tag::Strikethrough => DocumentEvent::SpanStart(SpanKind::Strikethrough),
        Tag::Link { .. } => DocumentEvent::SpanStart(SpanKind::Link),
        Tag::Image { .. } => DocumentEvent::SpanStart(SpanKind::Image),
        _ => return None,
    };
    Some(event)
}

fn end_event(tag: TagEnd) -> Option<DocumentEvent<'static>> {
    let event = match tag {
        TagEnd::Paragraph => DocumentEvent::BlockEnd(BlockKind::Paragraph),
        TagEnd::Heading(level) => DocumentEvent::BlockEnd(BlockKind::Heading {
            level: level as u8,
        }),
        TagEnd::BlockQuote(_) => DocumentEvent::BlockEnd(BlockKind::Quote),
        TagEnd::CodeBlock => DocumentEvent::BlockEnd(BlockKind::Code),
        TagEnd::HtmlBlock => DocumentEvent::BlockEnd(BlockKind::Raw),
        TagEnd::List(ordered) => DocumentEvent::BlockEnd(BlockKind::List { ordered }),
        TagEnd::Item => DocumentEvent::BlockEnd(BlockKind::ListItem),
        TagEnd::Table => DocumentEvent::BlockEnd(BlockKind::Table),
        TagEnd::Emphasis => DocumentEvent::SpanEnd(SpanKind::Emphasis),
        TagEnd::Strong => DocumentEvent::SpanEnd(SpanKind::Strong),
        TagEnd::Strikethrough => DocumentEvent::SpanEnd(SpanKind::Strikethrough),
        TagEnd::Link => DocumentEvent::SpanEnd(SpanKind::Link),
        TagEnd::Image => DocumentEvent::SpanEnd(SpanKind::Image),
        _ => return None,
    };
    Some(event)
}

/// `raw` when it is exactly one `&name;` or `&#NN;` reference.
fn entity_reference(raw: &str) -> Option<&str> {
    let name = raw.strip_prefix('&')?.strip_suffix(';')?;
    let valid = !name.is_empty() && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '#');
    valid.then_some(raw)
}
