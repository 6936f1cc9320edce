use std::io;

use page_stream::ParseError;

/// Page cache error.
#[derive(Debug)]
pub enum PageCacheError {
    /// Cache file was written by a different format version.
    VersionStale { found: u8, expected: u8 },
    /// Cache file was built under a different render configuration.
    ConfigStale,
    /// Storage open/read/write/seek failed.
    Io(io::Error),
    /// A buffer reservation failed.
    AllocationFailure { kind: &'static str, requested: usize },
    /// Event source failed before any page was produced.
    Parse(ParseError),
    /// Build was cancelled. Retained pages stay readable as a partial cache.
    Aborted { pages_retained: u16 },
    /// Cache bytes are structurally invalid.
    Corrupt(&'static str),
    /// Document produced no pages.
    EmptyDocument,
    /// Requested page does not exist.
    PageOutOfRange { index: usize, page_count: u16 },
    /// A size cap was exceeded.
    LimitExceeded {
        kind: &'static str,
        actual: usize,
        limit: usize,
    },
}

impl PageCacheError {
    /// Whether a rebuild, not the caller, should handle this error.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::VersionStale { .. } | Self::ConfigStale)
    }
}

impl core::fmt::Display for PageCacheError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::VersionStale { found, expected } => write!(
                f,
                "cache format version stale (found={} expected={})",
                found, expected
            ),
            Self::ConfigStale => write!(f, "cache built with a different render config"),
            Self::Io(err) => write!(f, "cache io failed: {}", err),
            Self::AllocationFailure { kind, requested } => write!(
                f,
                "allocation failed: {} (requested={})",
                kind, requested
            ),
            Self::Parse(err) => write!(f, "document parse failed: {}", err),
            Self::Aborted { pages_retained } => {
                write!(f, "build aborted (pages_retained={})", pages_retained)
            }
            Self::Corrupt(what) => write!(f, "cache corrupt: {}", what),
            Self::EmptyDocument => write!(f, "document produced no pages"),
            Self::PageOutOfRange { index, page_count } => write!(
                f,
                "page {} out of range (page_count={})",
                index, page_count
            ),
            Self::LimitExceeded {
                kind,
                actual,
                limit,
            } => write!(
                f,
                "cache limit exceeded: {} (actual={} limit={})",
                kind, actual, limit
            ),
        }
    }
}

impl std::error::Error for PageCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PageCacheError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ParseError> for PageCacheError {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<postcard::Error> for PageCacheError {
    fn from(value: postcard::Error) -> Self {
        log::warn!("page blob codec failed: {}", value);
        Self::Corrupt("page blob encoding")
    }
}
