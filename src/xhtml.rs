//! Streaming XHTML document source backed by `quick-xml`.
//!
//! Only structural and inline-style elements are mapped; attributes are not
//! read. `head`, `script`, and `style` subtrees are skipped entirely.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::event::{
    emit, BlockKind, DocumentEvent, DocumentEventSource, ParseError, ParseOutcome, SpanKind,
    TextKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Element {
    Block(BlockKind),
    Span(SpanKind),
    LineBreak,
    Cell,
    Skip,
    Other,
}

const ELEMENTS: &[(&[u8], Element)] = &[
    (b"p", Element::Block(BlockKind::Paragraph)),
    (b"div", Element::Block(BlockKind::Paragraph)),
    (b"h1", Element::Block(BlockKind::Heading { level: 1 })),
    (b"h2", Element::Block(BlockKind::Heading { level: 2 })),
    (b"h3", Element::Block(BlockKind::Heading { level: 3 })),
    (b"h4", Element::Block(BlockKind::Heading { level: 4 })),
    (b"h5", Element::Block(BlockKind::Heading { level: 5 })),
    (b"h6", Element::Block(BlockKind::Heading { level: 6 })),
    (b"blockquote", Element::Block(BlockKind::Quote)),
    (b"ul", Element::Block(BlockKind::List { ordered: false })),
    (b"ol", Element::Block(BlockKind::List { ordered: true })),
    (b"li", Element::Block(BlockKind::ListItem)),
    (b"pre", Element::Block(BlockKind::Code)),
    (b"hr", Element::Block(BlockKind::Rule)),
    (b"table", Element::Block(BlockKind::Table)),
    (b"b", Element::Span(SpanKind::Strong)),
    (b"strong", Element::Span(SpanKind::Strong)),
    (b"i", Element::Span(SpanKind::Emphasis)),
    (b"em", Element::Span(SpanKind::Emphasis)),
    (b"code", Element::Span(SpanKind::Code)),
    (b"a", Element::Span(SpanKind::Link)),
    (b"img", Element::Span(SpanKind::Image)),
    (b"image", Element::Span(SpanKind::Image)),
    (b"s", Element::Span(SpanKind::Strikethrough)),
    (b"del", Element::Span(SpanKind::Strikethrough)),
    (b"strike", Element::Span(SpanKind::Strikethrough)),
    (b"br", Element::LineBreak),
    (b"td", Element::Cell),
    (b"th", Element::Cell),
    (b"head", Element::Skip),
    (b"script", Element::Skip),
    (b"style", Element::Skip),
];

fn classify(local_name: &[u8]) -> Element {
    ELEMENTS
        .iter()
        .find(|(tag, _)| tag.eq_ignore_ascii_case(local_name))
        .map(|(_, element)| *element)
        .unwrap_or(Element::Other)
}

/// Streaming XHTML source over any seekable buffered reader.
#[derive(Debug)]
pub struct XhtmlSource<R> {
    reader: R,
    buf: Vec<u8>,
    entity_buf: String,
}

impl XhtmlSource<BufReader<File>> {
    /// Open an XHTML file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead + Seek> XhtmlSource<R> {
    /// Wrap a reader; every pass rewinds to the start.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            entity_buf: String::with_capacity(16),
        }
    }
}

impl<R: BufRead + Seek> DocumentEventSource for XhtmlSource<R> {
    fn parse(
        &mut self,
        sink: &mut dyn FnMut(DocumentEvent<'_>) -> core::ops::ControlFlow<()>,
    ) -> Result<ParseOutcome, ParseError> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|err| ParseError::io(&err).with_source("rewind"))?;
        let mut reader = Reader::from_reader(&mut self.reader);
        reader.config_mut().trim_text(false);
        let buf = &mut self.buf;
        let entity_buf = &mut self.entity_buf;
        let mut skip_depth = 0usize;
        let mut pre_depth = 0usize;

        emit!(sink, DocumentEvent::BlockStart(BlockKind::Document));
        loop {
            buf.clear();
            let event = match reader.read_event_into(buf) {
                Ok(event) => event,
                Err(err) => {
                    return Err(ParseError::new("XHTML_SYNTAX", format!("XML error: {}", err))
                        .with_source("xml tokenizer")
                        .with_offset(reader_offset(reader.buffer_position())));
                }
            };
            match event {
                Event::Start(e) => {
                    let element = classify(e.local_name().as_ref());
                    if element == Element::Skip {
                        skip_depth += 1;
                        continue;
                    }
                    if skip_depth > 0 {
                        continue;
                    }
                    match element {
                        Element::Block(kind) => {
                            if kind == BlockKind::Code {
                                pre_depth += 1;
                            }
                            emit!(sink, DocumentEvent::BlockStart(kind));
                        }
                        Element::Span(SpanKind::Code) if pre_depth > 0 => {}
                        Element::Span(kind) => emit!(sink, DocumentEvent::SpanStart(kind)),
                        Element::LineBreak => emit!(sink, line_break()),
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    match classify(e.local_name().as_ref()) {
                        Element::Block(kind) => {
                            emit!(sink, DocumentEvent::BlockStart(kind));
                            emit!(sink, DocumentEvent::BlockEnd(kind));
                        }
                        Element::Span(kind) => {
                            emit!(sink, DocumentEvent::SpanStart(kind));
                            emit!(sink, DocumentEvent::SpanEnd(kind));
                        }
                        Element::LineBreak => emit!(sink, line_break()),
                        _ => {}
                    }
                }
                Event::End(e) => {
                    let element = classify(e.local_name().as_ref());
                    if element == Element::Skip {
                        skip_depth = skip_depth.saturating_sub(1);
                        continue;
                    }
                    if skip_depth > 0 {
                        continue;
                    }
                    match element {
                        Element::Block(kind) => {
                            if kind == BlockKind::Code {
                                pre_depth = pre_depth.saturating_sub(1);
                            }
                            emit!(sink, DocumentEvent::BlockEnd(kind));
                        }
                        Element::Span(SpanKind::Code) if pre_depth > 0 => {}
                        Element::Span(kind) => emit!(sink, DocumentEvent::SpanEnd(kind)),
                        Element::Cell => emit!(
                            sink,
                            DocumentEvent::Text {
                                text: " ",
                                kind: TextKind::SoftBreak,
                            }
                        ),
                        _ => {}
                    }
                }
                Event::Text(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let text = e.decode().map_err(|err| {
                        ParseError::new("XHTML_DECODE", format!("Decode error: {:?}", err))
                            .with_source("text node decode")
                            .with_offset(reader_offset(reader.buffer_position()))
                    })?;
                    emit!(sink, text_event(&text, pre_depth));
                }
                Event::CData(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let text = reader.decoder().decode(&e).map_err(|err| {
                        ParseError::new("XHTML_DECODE", format!("Decode error: {:?}", err))
                            .with_source("cdata decode")
                            .with_offset(reader_offset(reader.buffer_position()))
                    })?;
                    emit!(sink, text_event(&text, pre_depth));
                }
                Event::GeneralRef(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let name = e.decode().map_err(|err| {
                        ParseError::new("XHTML_DECODE", format!("Decode error: {:?}", err))
                            .with_source("entity decode")
                            .with_offset(reader_offset(reader.buffer_position()))
                    })?;
                    match char_reference(&name) {
                        Some('\u{a0}') => {
                            emit!(sink, entity_event(entity_buf, "nbsp"));
                        }
                        Some(ch) => {
                            entity_buf.clear();
                            entity_buf.push(ch);
                            emit!(sink, text_event(entity_buf, pre_depth));
                        }
                        None => {
                            emit!(sink, entity_event(entity_buf, &name));
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        emit!(sink, DocumentEvent::BlockEnd(BlockKind::Document));
        Ok(ParseOutcome::Finished)
    }
}

fn line_break() -> DocumentEvent<'static> {
    DocumentEvent::Text {
        text: "\n",
        kind: TextKind::LineBreak,
    }
}

fn text_event<'a>(text: &'a str, pre_depth: usize) -> DocumentEvent<'a> {
    DocumentEvent::Text {
        text,
        kind: if pre_depth > 0 {
            TextKind::Code
        } else {
            TextKind::Plain
        },
    }
}

fn entity_event<'a>(entity_buf: &'a mut String, name: &str) -> DocumentEvent<'a> {
    entity_buf.clear();
    entity_buf.push('&');
    entity_buf.push_str(name);
    entity_buf.push(';');
    DocumentEvent::Text {
        text: entity_buf.as_str(),
        kind: TextKind::Entity,
    }
}

fn char_reference(name: &Cow<'_, str>) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

fn reader_offset(position: u64) -> usize {
    usize::try_from(position).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ops::ControlFlow;
    use std::io::Cursor;

    fn collect(xhtml: &str) -> Result<Vec<String>, (Vec<String>, ParseError)> {
        let mut source = XhtmlSource::new(Cursor::new(xhtml.as_bytes()));
        let mut out = Vec::new();
        let result = source.parse(&mut |event| {
            out.push(match event {
                DocumentEvent::BlockStart(kind) => format!("+{:?}", kind),
                DocumentEvent::BlockEnd(kind) => format!("-{:?}", kind),
                DocumentEvent::SpanStart(kind) => format!("<{:?}", kind),
                DocumentEvent::SpanEnd(kind) => format!(">{:?}", kind),
                DocumentEvent::Text { text, kind } => format!("{:?}:{}", kind, text),
            });
            ControlFlow::Continue(())
        });
        match result {
            Ok(_) => Ok(out),
            Err(err) => Err((out, err)),
        }
    }

    #[test]
    fn maps_structure_and_skips_head() {
        let events = collect(
            "<html><head><title>T</title></head><body><h2>Hi</h2><p>a <b>b</b></p></body></html>",
        )
        .expect("xhtml should parse");
        assert_eq!(
            events,
            vec![
                "+Document",
                "+Heading { level: 2 }",
                "Plain:Hi",
                "-Heading { level: 2 }",
                "+Paragraph",
                "Plain:a ",
                "<Strong",
                "Plain:b",
                ">Strong",
                "-Paragraph",
                "-Document",
            ]
        );
    }

    #[test]
    fn entities_and_char_refs() {
        let events = collect("<p>x&amp;y&#160;z&#65;</p>").expect("xhtml should parse");
        assert!(events.contains(&"Entity:&amp;".to_string()));
        assert!(events.contains(&"Entity:&nbsp;".to_string()));
        assert!(events.contains(&"Plain:A".to_string()));
    }

    #[test]
    fn preformatted_text_is_code() {
        let events =
            collect("<pre><code>fn main() {}</code></pre>").expect("xhtml should parse");
        assert_eq!(
            events,
            vec!["+Document", "+Code", "Code:fn main() {}", "-Code", "-Document"]
        );
    }

    #[test]
    fn empty_elements_open_and_close() {
        let events = collect("<p>a<br/>b<img src=\"x.png\"/></p><hr/>").expect("xhtml parse");
        assert!(events.contains(&"LineBreak:\n".to_string()));
        let image = events
            .iter()
            .position(|e| e == "<Image")
            .expect("image span should open");
        assert_eq!(events[image + 1], ">Image");
        let rule = events
            .iter()
            .position(|e| e == "+Rule")
            .expect("rule should open");
        assert_eq!(events[rule + 1], "-Rule");
    }

    #[test]
    fn mismatched_end_tag_fails_after_earlier_events() {
        let (events, err) =
            collect("<p>fine</p><p>broken</q>").expect_err("mismatched tags should fail");
        assert_eq!(err.code, "XHTML_SYNTAX");
        assert!(err.offset.is_some());
        assert!(events.contains(&"Plain:fine".to_string()));
    }
}
