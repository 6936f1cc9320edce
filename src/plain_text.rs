//! Plain-text document source.
//!
//! Runs of non-blank lines become paragraphs; line ends inside a paragraph
//! become soft breaks. The reader is streamed line by line, so only one line
//! is resident at a time.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::event::{
    emit, BlockKind, DocumentEvent, DocumentEventSource, ParseError, ParseOutcome, TextKind,
};

/// Streaming plain-text source over any seekable buffered reader.
#[derive(Debug)]
pub struct PlainTextSource<R> {
    reader: R,
    line: Vec<u8>,
}

impl PlainTextSource<BufReader<File>> {
    /// Open a plain-text file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead + Seek> PlainTextSource<R> {
    /// Wrap a reader positioned anywhere; every pass rewinds to the start.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(128),
        }
    }

    /// Give back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead + Seek> DocumentEventSource for PlainTextSource<R> {
    fn parse(
        &mut self,
        sink: &mut dyn FnMut(DocumentEvent<'_>) -> core::ops::ControlFlow<()>,
    ) -> Result<ParseOutcome, ParseError> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|err| ParseError::io(&err).with_source("rewind"))?;

        emit!(sink, DocumentEvent::BlockStart(BlockKind::Document));
        let mut in_paragraph = false;
        let mut offset = 0usize;
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .map_err(|err| ParseError::io(&err).with_offset(offset))?;
            if read == 0 {
                break;
            }
            let text = core::str::from_utf8(&self.line).map_err(|err| {
                ParseError::new("PLAIN_UTF8", "invalid UTF-8 in text document")
                    .with_offset(offset + err.valid_up_to())
            })?;
            offset += read;

            let content = text.trim_end_matches(['\n', '\r']);
            if content.trim().is_empty() {
                if in_paragraph {
                    emit!(sink, DocumentEvent::BlockEnd(BlockKind::Paragraph));
                    in_paragraph = false;
                }
                continue;
            }
            if !in_paragraph {
                emit!(sink, DocumentEvent::BlockStart(BlockKind::Paragraph));
                in_paragraph = true;
            }
            emit!(sink, DocumentEvent::text(content));
            emit!(
                sink,
                DocumentEvent::Text {
                    text: "\n",
                    kind: TextKind::SoftBreak,
                }
            );
        }
        if in_paragraph {
            emit!(sink, DocumentEvent::BlockEnd(BlockKind::Paragraph));
        }
        emit!(sink, DocumentEvent::BlockEnd(BlockKind::Document));
        Ok(ParseOutcome::Finished)
    }
}
