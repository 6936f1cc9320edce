//! Page cache lifecycle: full build, page-budgeted partial build, extension
//! of a partial build, validation and invalidation.
//!
//! Resume is replay: every pass re-parses the document from its first event
//! and lays out the pages already cached again without serializing them.
//! Layout is deterministic for a fixed configuration, so the first new page of
//! an extend pass is exactly the page a longer build would have written next.

use std::io::{Read, Seek, Write};
use std::ops::ControlFlow;
use std::time::Instant;

use page_stream::{DocumentEventSource, ParseError};

use crate::accumulator::{Checkpoint, TextAccumulator};
use crate::composer::{Page, PageComposer};
use crate::error::PageCacheError;
use crate::page_store::{BuildHandle, CacheHeader, PageStore};
use crate::render_config::RenderConfig;
use crate::renderer::TextRenderer;
use crate::storage::{remove_quiet, CacheStorage};

/// Cancellation hook polled at block boundaries and forced layouts.
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Never-cancel token for default call paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F: Fn() -> bool> CancelToken for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Runtime diagnostics from cache builds and loads.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheDiagnostic {
    CacheHit {
        page_count: u16,
        is_partial: bool,
    },
    CacheMiss {
        reason: &'static str,
    },
    ForcedLayout {
        words: usize,
    },
    PageWritten {
        index: usize,
        offset: u32,
    },
    BuildFinished {
        page_count: u16,
        is_partial: bool,
        elapsed_ms: u32,
    },
    Aborted {
        pages_retained: u16,
    },
}

type DiagnosticSink = Option<Box<dyn FnMut(CacheDiagnostic) + Send + 'static>>;

fn emit(sink: &mut DiagnosticSink, diagnostic: CacheDiagnostic) {
    if let Some(sink) = sink.as_mut() {
        sink(diagnostic);
    }
}

/// Lifecycle state of a page cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing loaded or built yet.
    #[default]
    Absent,
    Building,
    /// Every page of the document is cached.
    Complete,
    /// A prefix is cached; `extend` can add more.
    PartialIncomplete,
    Failed,
}

/// Why a build or extend pass stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The document was fully consumed.
    Finished,
    /// The page budget was used up. Content may or may not remain; the next
    /// `extend` settles it.
    BudgetReached,
    /// The source failed after pages were produced; they are kept.
    ParseFailed(ParseError),
    /// An extend pass added nothing. The cache was marked complete and the
    /// document content after the last page is unreachable through it.
    NoProgress,
}

/// Result of a successful `create` or `extend`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildReport {
    pub page_count: u16,
    pub pages_added: u16,
    pub is_partial: bool,
    pub state: CacheState,
    pub stop: StopReason,
}

/// Page cache for one document and one cache file.
pub struct PageCache<S: CacheStorage> {
    store: PageStore<S>,
    page_count: u16,
    is_partial: bool,
    state: CacheState,
    diagnostic_sink: DiagnosticSink,
}

impl<S: CacheStorage> PageCache<S> {
    pub fn new(storage: S) -> Self {
        Self {
            store: PageStore::new(storage),
            page_count: 0,
            is_partial: false,
            state: CacheState::Absent,
            diagnostic_sink: None,
        }
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(CacheDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Box::new(sink));
    }

    pub fn store(&self) -> &PageStore<S> {
        &self.store
    }

    pub fn page_count(&self) -> u16 {
        self.page_count
    }

    pub fn is_partial(&self) -> bool {
        self.is_partial
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Adopt an existing cache file if it was built for `config`.
    ///
    /// A stale file is deleted. Returns whether a usable cache is loaded.
    pub fn load(&mut self, config: &RenderConfig) -> Result<bool, PageCacheError> {
        if !self.store.exists() {
            self.reset(CacheState::Absent);
            emit(
                &mut self.diagnostic_sink,
                CacheDiagnostic::CacheMiss { reason: "missing" },
            );
            return Ok(false);
        }
        match self.store.validate(config) {
            Ok(header) => {
                self.adopt(&header);
                emit(
                    &mut self.diagnostic_sink,
                    CacheDiagnostic::CacheHit {
                        page_count: header.page_count,
                        is_partial: header.is_partial,
                    },
                );
                Ok(true)
            }
            Err(err) if err.is_stale() || matches!(err, PageCacheError::Corrupt(_)) => {
                log::warn!("discarding page cache: {}", err);
                let reason = match err {
                    PageCacheError::VersionStale { .. } => "version",
                    PageCacheError::ConfigStale => "config",
                    _ => "corrupt",
                };
                emit(
                    &mut self.diagnostic_sink,
                    CacheDiagnostic::CacheMiss { reason },
                );
                self.clear()?;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Build the cache from the start of the document.
    ///
    /// `page_budget = 0` builds every page; otherwise at most `page_budget`
    /// pages are cached and a pass that reaches the budget leaves the cache
    /// partial.
    pub fn create<D, R, C>(
        &mut self,
        source: &mut D,
        renderer: &R,
        config: RenderConfig,
        page_budget: u16,
        cancel: &C,
    ) -> Result<BuildReport, PageCacheError>
    where
        D: DocumentEventSource + ?Sized,
        R: TextRenderer + ?Sized,
        C: CancelToken + ?Sized,
    {
        let started = Instant::now();
        self.reset(CacheState::Building);
        let mut handle = match self.store.begin_build(config) {
            Ok(handle) => handle,
            Err(err) => {
                remove_quiet(self.store.storage());
                return Err(self.fail(err));
            }
        };
        let limit = if page_budget == 0 {
            u16::MAX
        } else {
            page_budget
        };
        let (end, write_error) = {
            let mut writer =
                PageWriter::new(&mut handle, &mut self.diagnostic_sink, 0, limit as usize);
            let end = run_pass(source, renderer, config, cancel, &mut writer);
            (end, writer.error.take())
        };
        if let Some(err) = write_error {
            self.store.discard(handle);
            return Err(self.fail(err));
        }
        if handle.appended() == 0 {
            self.store.discard(handle);
            let err = match end {
                PassEnd::Cancelled => {
                    emit(
                        &mut self.diagnostic_sink,
                        CacheDiagnostic::Aborted { pages_retained: 0 },
                    );
                    PageCacheError::Aborted { pages_retained: 0 }
                }
                PassEnd::ParseFailed(err) => PageCacheError::Parse(err),
                PassEnd::Finished | PassEnd::BudgetReached => PageCacheError::EmptyDocument,
            };
            return Err(self.fail(err));
        }
        self.conclude(handle, end, started)
    }

    /// Append pages to a partial cache.
    ///
    /// `additional = 0` runs to the end of the document. A cache that is not
    /// partial is left alone and reported as is. A pass that adds no page
    /// marks the cache complete and reports [`StopReason::NoProgress`], so a
    /// deterministic source failure cannot cause endless retries.
    pub fn extend<D, R, C>(
        &mut self,
        source: &mut D,
        renderer: &R,
        config: RenderConfig,
        additional: u16,
        cancel: &C,
    ) -> Result<BuildReport, PageCacheError>
    where
        D: DocumentEventSource + ?Sized,
        R: TextRenderer + ?Sized,
        C: CancelToken + ?Sized,
    {
        if self.state != CacheState::PartialIncomplete {
            return Ok(BuildReport {
                page_count: self.page_count,
                pages_added: 0,
                is_partial: self.is_partial,
                state: self.state,
                stop: StopReason::Finished,
            });
        }
        let started = Instant::now();
        let mut handle = self.store.resume_build(&config)?;
        self.state = CacheState::Building;
        let base = handle.base_count();
        let headroom = (u16::MAX as usize).saturating_sub(base);
        let limit = if additional == 0 {
            headroom
        } else {
            (additional as usize).min(headroom)
        };
        let (end, write_error) = {
            let mut writer = PageWriter::new(&mut handle, &mut self.diagnostic_sink, base, limit);
            let end = run_pass(source, renderer, config, cancel, &mut writer);
            (end, writer.error.take())
        };
        if let Some(err) = write_error {
            self.store.discard(handle);
            return Err(self.fail(err));
        }
        if handle.appended() > 0 {
            return self.conclude(handle, end, started);
        }

        if matches!(end, PassEnd::Cancelled) {
            drop(handle);
            self.state = CacheState::PartialIncomplete;
            emit(
                &mut self.diagnostic_sink,
                CacheDiagnostic::Aborted {
                    pages_retained: self.page_count,
                },
            );
            return Err(PageCacheError::Aborted {
                pages_retained: self.page_count,
            });
        }
        if let PassEnd::ParseFailed(err) = &end {
            log::warn!("extend stopped by source error: {}", err);
        }
        log::warn!(
            "extend made no progress past page {}; marking cache complete",
            base
        );
        self.commit(handle, false)?;
        Ok(self.report(0, StopReason::NoProgress, started))
    }

    /// Delete the cache file.
    pub fn clear(&mut self) -> Result<(), PageCacheError> {
        self.store.remove()?;
        self.reset(CacheState::Absent);
        log::info!("page cache cleared");
        Ok(())
    }

    /// Load one cached page.
    pub fn page(&self, index: usize) -> Result<Page, PageCacheError> {
        self.store.fetch_page(index)
    }

    fn conclude(
        &mut self,
        handle: BuildHandle<S::File>,
        end: PassEnd,
        started: Instant,
    ) -> Result<BuildReport, PageCacheError> {
        let added = handle.appended();
        let (is_partial, stop) = match end {
            PassEnd::Finished => (false, Some(StopReason::Finished)),
            PassEnd::BudgetReached => (true, Some(StopReason::BudgetReached)),
            PassEnd::ParseFailed(err) => {
                log::warn!(
                    "source failed after {} pages, keeping them: {}",
                    handle.page_count(),
                    err
                );
                (true, Some(StopReason::ParseFailed(err)))
            }
            PassEnd::Cancelled => (true, None),
        };
        let header = self.commit(handle, is_partial)?;
        match stop {
            Some(stop) => Ok(self.report(added, stop, started)),
            None => {
                log::info!(
                    "page cache build aborted; {} pages retained",
                    header.page_count
                );
                emit(
                    &mut self.diagnostic_sink,
                    CacheDiagnostic::Aborted {
                        pages_retained: header.page_count,
                    },
                );
                Err(PageCacheError::Aborted {
                    pages_retained: header.page_count,
                })
            }
        }
    }

    fn commit(
        &mut self,
        handle: BuildHandle<S::File>,
        is_partial: bool,
    ) -> Result<CacheHeader, PageCacheError> {
        match self.store.finalize(handle, is_partial) {
            Ok(header) => {
                self.adopt(&header);
                Ok(header)
            }
            Err(err) => {
                remove_quiet(self.store.storage());
                Err(self.fail(err))
            }
        }
    }

    fn report(&mut self, added: usize, stop: StopReason, started: Instant) -> BuildReport {
        let elapsed_ms = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
        log::info!(
            "page cache ready: {} pages (partial={}, added={}, stop={:?}) in {}ms",
            self.page_count,
            self.is_partial,
            added,
            stop,
            elapsed_ms
        );
        emit(
            &mut self.diagnostic_sink,
            CacheDiagnostic::BuildFinished {
                page_count: self.page_count,
                is_partial: self.is_partial,
                elapsed_ms,
            },
        );
        BuildReport {
            page_count: self.page_count,
            pages_added: u16::try_from(added).unwrap_or(u16::MAX),
            is_partial: self.is_partial,
            state: self.state,
            stop,
        }
    }

    fn adopt(&mut self, header: &CacheHeader) {
        self.page_count = header.page_count;
        self.is_partial = header.is_partial;
        self.state = if header.is_partial {
            CacheState::PartialIncomplete
        } else {
            CacheState::Complete
        };
    }

    fn reset(&mut self, state: CacheState) {
        self.page_count = 0;
        self.is_partial = false;
        self.state = state;
    }

    fn fail(&mut self, err: PageCacheError) -> PageCacheError {
        log::warn!("page cache build failed: {}", err);
        self.reset(CacheState::Failed);
        err
    }
}

enum PassEnd {
    Finished,
    BudgetReached,
    Cancelled,
    ParseFailed(ParseError),
}

/// Receives sealed pages during a pass.
///
/// The first `skip` pages are already cached and only counted. Appending the
/// `limit`th page marks the budget as reached and stops the pass, even when
/// the document happens to end there.
struct PageWriter<'a, F> {
    handle: &'a mut BuildHandle<F>,
    sink: &'a mut DiagnosticSink,
    skip: usize,
    limit: usize,
    seen: usize,
    over_budget: bool,
    error: Option<PageCacheError>,
}

impl<'a, F: Read + Write + Seek> PageWriter<'a, F> {
    fn new(
        handle: &'a mut BuildHandle<F>,
        sink: &'a mut DiagnosticSink,
        skip: usize,
        limit: usize,
    ) -> Self {
        Self {
            handle,
            sink,
            skip,
            limit,
            seen: 0,
            over_budget: false,
            error: None,
        }
    }

    fn accept(&mut self, page: Page) {
        self.seen += 1;
        if self.seen <= self.skip || self.should_stop() {
            return;
        }
        match self.handle.write_page(&page) {
            Ok(offset) => {
                let index = self.handle.page_count() - 1;
                log::debug!("page {} written at offset {}", index, offset);
                emit(self.sink, CacheDiagnostic::PageWritten { index, offset });
                if self.handle.appended() >= self.limit {
                    self.over_budget = true;
                }
            }
            Err(err) => self.error = Some(err),
        }
    }

    fn should_stop(&self) -> bool {
        self.over_budget || self.error.is_some()
    }
}

fn run_pass<D, R, C, F>(
    source: &mut D,
    renderer: &R,
    config: RenderConfig,
    cancel: &C,
    writer: &mut PageWriter<'_, F>,
) -> PassEnd
where
    D: DocumentEventSource + ?Sized,
    R: TextRenderer + ?Sized,
    C: CancelToken + ?Sized,
    F: Read + Write + Seek,
{
    let mut composer = PageComposer::new(renderer, config);
    let mut accumulator = TextAccumulator::new();
    let mut cancelled = false;
    let parsed = source.parse(&mut |event| {
        let checkpoint =
            accumulator.on_event(event, &mut composer, &mut |page| writer.accept(page));
        if let Checkpoint::ForcedLayout { words } = checkpoint {
            emit(writer.sink, CacheDiagnostic::ForcedLayout { words });
        }
        if writer.should_stop() {
            return ControlFlow::Break(());
        }
        if checkpoint.is_poll_point() && cancel.is_cancelled() {
            cancelled = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    });
    if cancelled {
        return PassEnd::Cancelled;
    }
    if writer.should_stop() {
        return PassEnd::BudgetReached;
    }
    match parsed {
        Err(err) => PassEnd::ParseFailed(err),
        Ok(_) => {
            accumulator.finish(&mut composer, &mut |page| writer.accept(page));
            if writer.over_budget {
                PassEnd::BudgetReached
            } else {
                PassEnd::Finished
            }
        }
    }
}
