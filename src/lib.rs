//! page-stream -- Streaming document event sources for paginated page caches
//!
//! Turns plain text, Markdown, and XHTML documents into one ordered stream of
//! block/span/text events. Pagination and the on-disk page cache live in
//! `page-stream-render`, which consumes only the [`DocumentEventSource`] contract.
//!
//! # Features
//!
//! - `markdown` (default) -- Markdown source backed by `pulldown-cmark`
//! - `xhtml` (default) -- streaming XHTML source backed by `quick-xml`

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]
#![warn(missing_docs)]

pub mod event;
pub mod plain_text;

#[cfg(feature = "markdown")]
pub mod markdown;

#[cfg(feature = "xhtml")]
pub mod xhtml;

pub use event::{
    BlockKind, DocumentEvent, DocumentEventSource, ParseError, ParseOutcome, SpanKind, TextKind,
};
#[cfg(feature = "markdown")]
pub use markdown::MarkdownSource;
pub use plain_text::PlainTextSource;
#[cfg(feature = "xhtml")]
pub use xhtml::XhtmlSource;
