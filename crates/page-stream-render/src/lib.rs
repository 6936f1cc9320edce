//! Page composition and random-access page cache for `page-stream`.

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

mod accumulator;
mod composer;
mod error;
mod page_cache;
mod page_store;
mod render_config;
mod renderer;
mod storage;
mod text;

pub use accumulator::{Checkpoint, TextAccumulator};
pub use composer::{Page, PageComposer, PageLine};
pub use error::PageCacheError;
pub use page_cache::{
    BuildReport, CacheDiagnostic, CacheState, CancelToken, NeverCancel, PageCache, StopReason,
};
pub use page_store::{
    BuildHandle, CacheHeader, PageStore, RawCacheInfo, CACHE_FORMAT_VERSION, HEADER_SIZE,
    MAX_PAGE_BLOB_BYTES,
};
pub use render_config::RenderConfig;
pub use renderer::{FixedMetricsRenderer, Line, PlacedWord, TextRenderer, WrappedLine};
pub use storage::{CacheStorage, CappedFile, FsStorage};
pub use text::{
    Alignment, FontStyle, StyleState, TextBlock, Word, MAX_BLOCK_WORDS, MAX_WORD_BYTES,
};
