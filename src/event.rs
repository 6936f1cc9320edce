//! Document event model shared by every format source.
//!
//! A source replays its document as a flat sequence of [`DocumentEvent`]s.
//! Block and span events nest; text events carry borrowed slices that are
//! only valid for the duration of the callback.

use core::fmt;
use core::ops::ControlFlow;

/// Structural block kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// Whole document.
    Document,
    /// Heading with level `1..=6`.
    Heading {
        /// Heading level.
        level: u8,
    },
    /// Paragraph.
    Paragraph,
    /// Block quote.
    Quote,
    /// Ordered or unordered list container.
    List {
        /// `true` for numbered lists.
        ordered: bool,
    },
    /// One list item.
    ListItem,
    /// Fenced, indented, or preformatted code.
    Code,
    /// Thematic break / horizontal rule.
    Rule,
    /// Table.
    Table,
    /// Raw markup block (embedded HTML and similar).
    Raw,
}

/// Inline span kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// Strong emphasis (bold).
    Strong,
    /// Emphasis (italic).
    Emphasis,
    /// Inline code.
    Code,
    /// Hyperlink.
    Link,
    /// Image.
    Image,
    /// Strikethrough.
    Strikethrough,
}

/// Text payload kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKind {
    /// Ordinary prose.
    Plain,
    /// Hard line break.
    LineBreak,
    /// Soft line break.
    SoftBreak,
    /// Code text.
    Code,
    /// Raw markup text.
    Raw,
    /// Named or numeric character entity, including `&` and `;`.
    Entity,
}

/// One event from a document source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentEvent<'a> {
    /// A block opens.
    BlockStart(BlockKind),
    /// A block closes.
    BlockEnd(BlockKind),
    /// A span opens.
    SpanStart(SpanKind),
    /// A span closes.
    SpanEnd(SpanKind),
    /// Text content.
    Text {
        /// Text slice, borrowed from the source.
        text: &'a str,
        /// Kind of text.
        kind: TextKind,
    },
}

impl<'a> DocumentEvent<'a> {
    /// Plain text event.
    pub fn text(text: &'a str) -> Self {
        Self::Text {
            text,
            kind: TextKind::Plain,
        }
    }
}

/// How a parse pass ended without a hard error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The whole document was delivered.
    Finished,
    /// The sink asked to stop early.
    Stopped,
}

/// Format-agnostic document event stream.
///
/// Each call to [`parse`](Self::parse) replays the document from its first
/// event. Replay must be deterministic: the same document yields the same
/// events, so a consumer can resume a previous pass by skipping what it has
/// already consumed.
pub trait DocumentEventSource {
    /// Push every event into `sink` until the document ends or `sink` breaks.
    fn parse(
        &mut self,
        sink: &mut dyn FnMut(DocumentEvent<'_>) -> ControlFlow<()>,
    ) -> Result<ParseOutcome, ParseError>;
}

impl<T: DocumentEventSource + ?Sized> DocumentEventSource for &mut T {
    fn parse(
        &mut self,
        sink: &mut dyn FnMut(DocumentEvent<'_>) -> ControlFlow<()>,
    ) -> Result<ParseOutcome, ParseError> {
        (**self).parse(sink)
    }
}

/// Push one event into a sink and return `Stopped` from the caller on break.
macro_rules! emit {
    ($sink:expr, $event:expr) => {
        if $sink($event).is_break() {
            return Ok($crate::event::ParseOutcome::Stopped);
        }
    };
}
pub(crate) use emit;

/// Structured error raised by a document source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: Box<str>,
    /// Optional byte offset in the source document.
    pub offset: Option<usize>,
    /// Optional context (tokenizer phase, path, ...).
    pub source: Option<Box<str>>,
}

impl ParseError {
    /// Create an error with a stable code and message.
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into().into_boxed_str(),
            offset: None,
            source: None,
        }
    }

    /// Wrap an I/O failure from the underlying reader.
    pub fn io(err: &std::io::Error) -> Self {
        Self::new("SOURCE_IO", format!("read failed: {}", err))
    }

    /// Attach a byte offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach free-form context.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into().into_boxed_str());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(source) = self.source.as_deref() {
            write!(f, " [source={}]", source)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " [offset={}]", offset)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
