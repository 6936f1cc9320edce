//! Random-access page cache file.
//!
//! Layout, all integers little endian:
//! `[header][len:u32 page0][len:u32 page1]...[lut: u32 * page_count]`.
//! Page blobs are `postcard` encodings of a persisted page mirror. The header is
//! rewritten in place only for `page_count`, `is_partial` and `lut_offset`.

use std::io::{self, Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use crate::composer::{Page, PageLine};
use crate::error::PageCacheError;
use crate::render_config::RenderConfig;
use crate::renderer::{Line, PlacedWord};
use crate::storage::{remove_quiet, CacheStorage};
use crate::text::{Alignment, FontStyle};

/// On-disk format version. Any other value makes a cache stale.
pub const CACHE_FORMAT_VERSION: u8 = 1;
/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 25;
/// Largest page blob accepted on read.
pub const MAX_PAGE_BLOB_BYTES: usize = 256 * 1024;

const PAGE_COUNT_POS: u64 = 18;
const TRAILER_LEN: usize = HEADER_SIZE - PAGE_COUNT_POS as usize;

/// Decoded cache header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheHeader {
    pub version: u8,
    pub config: RenderConfig,
    pub page_count: u16,
    pub is_partial: bool,
    pub lut_offset: u32,
}

impl CacheHeader {
    /// Provisional header written when a build begins.
    pub fn provisional(config: RenderConfig) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            config,
            page_count: 0,
            is_partial: false,
            lut_offset: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let config = &self.config;
        out[0] = self.version;
        out[1..5].copy_from_slice(&config.font_id.to_le_bytes());
        out[5..9].copy_from_slice(&config.line_compression.to_le_bytes());
        out[9] = config.indent_level;
        out[10] = config.spacing_level;
        out[11] = config.paragraph_alignment;
        out[12] = config.hyphenation as u8;
        out[13] = config.show_images as u8;
        out[14..16].copy_from_slice(&config.viewport_width.to_le_bytes());
        out[16..18].copy_from_slice(&config.viewport_height.to_le_bytes());
        out[18..].copy_from_slice(&encode_trailer(
            self.page_count,
            self.is_partial,
            self.lut_offset,
        ));
        out
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let config = RenderConfig {
            font_id: i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            line_compression: f32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
            indent_level: bytes[9],
            spacing_level: bytes[10],
            paragraph_alignment: bytes[11],
            hyphenation: bytes[12] != 0,
            show_images: bytes[13] != 0,
            viewport_width: u16::from_le_bytes([bytes[14], bytes[15]]),
            viewport_height: u16::from_le_bytes([bytes[16], bytes[17]]),
        };
        let (page_count, is_partial, lut_offset) = decode_trailer(&bytes[18..]);
        Self {
            version: bytes[0],
            config,
            page_count,
            is_partial,
            lut_offset,
        }
    }
}

fn encode_trailer(page_count: u16, is_partial: bool, lut_offset: u32) -> [u8; TRAILER_LEN] {
    let mut out = [0u8; TRAILER_LEN];
    out[0..2].copy_from_slice(&page_count.to_le_bytes());
    out[2] = is_partial as u8;
    out[3..7].copy_from_slice(&lut_offset.to_le_bytes());
    out
}

fn decode_trailer(bytes: &[u8]) -> (u16, bool, u32) {
    (
        u16::from_le_bytes([bytes[0], bytes[1]]),
        bytes[2] != 0,
        u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
    )
}

/// Header fields readable without a render configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RawCacheInfo {
    pub version: u8,
    pub page_count: u16,
    pub is_partial: bool,
    pub lut_offset: u32,
}

/// Open build or extend pass.
///
/// Pages are written as they are sealed; their offsets accumulate here until
/// [`PageStore::finalize`] writes the lookup table.
pub struct BuildHandle<F> {
    file: F,
    header: CacheHeader,
    offsets: Vec<u32>,
    base_count: usize,
    cursor: u64,
}

impl<F: Read + Write + Seek> BuildHandle<F> {
    /// Serialize one page at the end of the file and return its offset.
    ///
    /// On failure the `0` sentinel is recorded so the pass can never be
    /// finalized.
    pub fn write_page(&mut self, page: &Page) -> Result<u32, PageCacheError> {
        match self.write_blob(page) {
            Ok(offset) => {
                self.offsets.push(offset);
                Ok(offset)
            }
            Err(err) => {
                log::warn!(
                    "page {} write failed: {}",
                    self.offsets.len(),
                    err
                );
                self.offsets.push(0);
                Err(err)
            }
        }
    }

    fn write_blob(&mut self, page: &Page) -> Result<u32, PageCacheError> {
        if self.offsets.len() >= u16::MAX as usize {
            return Err(PageCacheError::LimitExceeded {
                kind: "page_count",
                actual: self.offsets.len() + 1,
                limit: u16::MAX as usize,
            });
        }
        let blob = postcard::to_allocvec(&PersistedPage::from(page))?;
        if blob.len() > MAX_PAGE_BLOB_BYTES {
            return Err(PageCacheError::LimitExceeded {
                kind: "page_blob_bytes",
                actual: blob.len(),
                limit: MAX_PAGE_BLOB_BYTES,
            });
        }
        let offset = u32::try_from(self.cursor).map_err(|_| PageCacheError::LimitExceeded {
            kind: "cache_offset",
            actual: self.cursor as usize,
            limit: u32::MAX as usize,
        })?;
        self.file.seek(SeekFrom::Start(self.cursor))?;
        self.file.write_all(&(blob.len() as u32).to_le_bytes())?;
        self.file.write_all(&blob)?;
        self.cursor += 4 + blob.len() as u64;
        Ok(offset)
    }

    /// Pages in the file once this pass is finalized.
    pub fn page_count(&self) -> usize {
        self.offsets.len()
    }

    /// Pages appended by this pass.
    pub fn appended(&self) -> usize {
        self.offsets.len() - self.base_count
    }

    /// Pages already cached when the pass began.
    pub fn base_count(&self) -> usize {
        self.base_count
    }

    pub fn page_offsets(&self) -> &[u32] {
        &self.offsets
    }
}

/// Page cache file reader/writer over a [`CacheStorage`].
#[derive(Clone, Debug)]
pub struct PageStore<S> {
    storage: S,
}

impl<S: CacheStorage> PageStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn exists(&self) -> bool {
        self.storage.exists()
    }

    /// Create the cache file and write a provisional header.
    pub fn begin_build(&self, config: RenderConfig) -> Result<BuildHandle<S::File>, PageCacheError> {
        let mut file = self.storage.create()?;
        let header = CacheHeader::provisional(config);
        file.write_all(&header.encode())?;
        Ok(BuildHandle {
            file,
            header,
            offsets: Vec::new(),
            base_count: 0,
            cursor: HEADER_SIZE as u64,
        })
    }

    /// Reopen a finalized cache to append pages after its lookup table.
    pub fn resume_build(&self, config: &RenderConfig) -> Result<BuildHandle<S::File>, PageCacheError> {
        let mut file = self.storage.open_write()?;
        let header = read_header(&mut file)?;
        check_fresh(&header, config)?;
        let offsets = read_lut(&mut file, &header)?;
        let cursor = file.seek(SeekFrom::End(0))?;
        Ok(BuildHandle {
            file,
            header,
            base_count: offsets.len(),
            offsets,
            cursor,
        })
    }

    /// Write the lookup table and patch the header.
    ///
    /// Fails without touching the header when any recorded offset is the `0`
    /// sentinel; the caller must then discard the file. A resumed pass that
    /// appended nothing only patches `page_count` and `is_partial`.
    pub fn finalize(
        &self,
        mut handle: BuildHandle<S::File>,
        is_partial: bool,
    ) -> Result<CacheHeader, PageCacheError> {
        if handle.offsets.contains(&0) {
            return Err(PageCacheError::Corrupt("failed page write recorded"));
        }
        let page_count = u16::try_from(handle.offsets.len()).map_err(|_| {
            PageCacheError::LimitExceeded {
                kind: "page_count",
                actual: handle.offsets.len(),
                limit: u16::MAX as usize,
            }
        })?;
        let mut header = handle.header;
        header.page_count = page_count;
        header.is_partial = is_partial;

        if handle.base_count > 0 && handle.appended() == 0 {
            handle.file.seek(SeekFrom::Start(PAGE_COUNT_POS))?;
            let trailer = encode_trailer(page_count, is_partial, header.lut_offset);
            handle.file.write_all(&trailer[..3])?;
            handle.file.flush()?;
            return Ok(header);
        }

        header.lut_offset =
            u32::try_from(handle.cursor).map_err(|_| PageCacheError::LimitExceeded {
                kind: "cache_offset",
                actual: handle.cursor as usize,
                limit: u32::MAX as usize,
            })?;
        let mut lut = Vec::new();
        lut.try_reserve_exact(handle.offsets.len() * 4)
            .map_err(|_| PageCacheError::AllocationFailure {
                kind: "lut",
                requested: handle.offsets.len() * 4,
            })?;
        for offset in &handle.offsets {
            lut.extend_from_slice(&offset.to_le_bytes());
        }
        handle.file.seek(SeekFrom::Start(handle.cursor))?;
        handle.file.write_all(&lut)?;
        handle.file.seek(SeekFrom::Start(PAGE_COUNT_POS))?;
        handle
            .file
            .write_all(&encode_trailer(page_count, is_partial, header.lut_offset))?;
        handle.file.flush()?;
        Ok(header)
    }

    /// Drop an unfinished pass and delete the file.
    pub fn discard(&self, handle: BuildHandle<S::File>) {
        drop(handle);
        remove_quiet(&self.storage);
    }

    /// Check the version and render configuration of the cache file.
    pub fn validate(&self, config: &RenderConfig) -> Result<CacheHeader, PageCacheError> {
        let mut file = self.storage.open_read()?;
        let header = read_header(&mut file)?;
        check_fresh(&header, config)?;
        Ok(header)
    }

    /// Read page count and partial flag without comparing configuration.
    pub fn load_raw(&self) -> Result<RawCacheInfo, PageCacheError> {
        let mut file = self.storage.open_read()?;
        read_raw(&mut file)
    }

    /// Load one page through the lookup table.
    pub fn fetch_page(&self, index: usize) -> Result<Page, PageCacheError> {
        let mut file = self.storage.open_read()?;
        let info = read_raw(&mut file)?;
        if index >= info.page_count as usize {
            return Err(PageCacheError::PageOutOfRange {
                index,
                page_count: info.page_count,
            });
        }
        file.seek(SeekFrom::Start(info.lut_offset as u64 + index as u64 * 4))?;
        let offset = read_u32(&mut file, "truncated lookup table")?;
        if offset == 0 {
            return Err(PageCacheError::Corrupt("lookup table holds a failed write"));
        }
        file.seek(SeekFrom::Start(offset as u64))?;
        let len = read_u32(&mut file, "truncated page length")? as usize;
        if len > MAX_PAGE_BLOB_BYTES {
            return Err(PageCacheError::LimitExceeded {
                kind: "page_blob_bytes",
                actual: len,
                limit: MAX_PAGE_BLOB_BYTES,
            });
        }
        let mut blob = Vec::new();
        blob.try_reserve_exact(len)
            .map_err(|_| PageCacheError::AllocationFailure {
                kind: "page_blob",
                requested: len,
            })?;
        blob.resize(len, 0);
        read_exact_or_corrupt(&mut file, &mut blob, "truncated page blob")?;
        let persisted: PersistedPage = postcard::from_bytes(&blob)?;
        Page::try_from(persisted)
    }

    /// Read every lookup table entry.
    pub fn read_lut(&self) -> Result<Vec<u32>, PageCacheError> {
        let mut file = self.storage.open_read()?;
        let header = read_header(&mut file)?;
        read_lut(&mut file, &header)
    }

    /// Delete the cache file. A missing file is not an error.
    pub fn remove(&self) -> Result<(), PageCacheError> {
        self.storage.remove()?;
        Ok(())
    }
}

fn check_version(found: u8) -> Result<(), PageCacheError> {
    if found != CACHE_FORMAT_VERSION {
        return Err(PageCacheError::VersionStale {
            found,
            expected: CACHE_FORMAT_VERSION,
        });
    }
    Ok(())
}

fn check_fresh(header: &CacheHeader, config: &RenderConfig) -> Result<(), PageCacheError> {
    check_version(header.version)?;
    if header.config != *config {
        return Err(PageCacheError::ConfigStale);
    }
    Ok(())
}

/// Version byte, then a seek straight to the trailing header fields.
fn read_raw<F: Read + Seek>(file: &mut F) -> Result<RawCacheInfo, PageCacheError> {
    let mut version = [0u8; 1];
    read_exact_or_corrupt(file, &mut version, "truncated header")?;
    check_version(version[0])?;
    file.seek(SeekFrom::Start(PAGE_COUNT_POS))?;
    let mut trailer = [0u8; TRAILER_LEN];
    read_exact_or_corrupt(file, &mut trailer, "truncated header")?;
    let (page_count, is_partial, lut_offset) = decode_trailer(&trailer);
    Ok(RawCacheInfo {
        version: version[0],
        page_count,
        is_partial,
        lut_offset,
    })
}

fn read_header<F: Read>(file: &mut F) -> Result<CacheHeader, PageCacheError> {
    let mut bytes = [0u8; HEADER_SIZE];
    read_exact_or_corrupt(file, &mut bytes[..1], "truncated header")?;
    check_version(bytes[0])?;
    read_exact_or_corrupt(file, &mut bytes[1..], "truncated header")?;
    Ok(CacheHeader::decode(&bytes))
}

fn read_lut<F: Read + Seek>(file: &mut F, header: &CacheHeader) -> Result<Vec<u32>, PageCacheError> {
    let count = header.page_count as usize;
    let mut offsets = Vec::new();
    offsets
        .try_reserve_exact(count)
        .map_err(|_| PageCacheError::AllocationFailure {
            kind: "lut",
            requested: count * 4,
        })?;
    if count == 0 {
        return Ok(offsets);
    }
    file.seek(SeekFrom::Start(header.lut_offset as u64))?;
    for _ in 0..count {
        offsets.push(read_u32(file, "truncated lookup table")?);
    }
    Ok(offsets)
}

fn read_u32<F: Read>(file: &mut F, what: &'static str) -> Result<u32, PageCacheError> {
    let mut bytes = [0u8; 4];
    read_exact_or_corrupt(file, &mut bytes, what)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_exact_or_corrupt<F: Read>(
    file: &mut F,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), PageCacheError> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            Err(PageCacheError::Corrupt(what))
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PersistedPage {
    lines: Vec<PersistedLine>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PersistedLine {
    x: u16,
    y: u16,
    alignment: u8,
    words: Vec<PersistedWord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PersistedWord {
    text: String,
    style: u8,
    x: u16,
}

impl From<&Page> for PersistedPage {
    fn from(page: &Page) -> Self {
        Self {
            lines: page.lines.iter().map(PersistedLine::from).collect(),
        }
    }
}

impl From<&PageLine> for PersistedLine {
    fn from(placed: &PageLine) -> Self {
        Self {
            x: placed.x,
            y: placed.y,
            alignment: placed.line.alignment.to_u8(),
            words: placed
                .line
                .words
                .iter()
                .map(|word| PersistedWord {
                    text: word.text.clone(),
                    style: word.style.to_u8(),
                    x: word.x,
                })
                .collect(),
        }
    }
}

impl TryFrom<PersistedPage> for Page {
    type Error = PageCacheError;

    fn try_from(page: PersistedPage) -> Result<Self, Self::Error> {
        let mut lines = Vec::with_capacity(page.lines.len());
        for line in page.lines {
            let mut words = Vec::with_capacity(line.words.len());
            for word in line.words {
                let style = FontStyle::from_u8(word.style)
                    .ok_or(PageCacheError::Corrupt("unknown font style tag"))?;
                words.push(PlacedWord {
                    text: word.text,
                    style,
                    x: word.x,
                });
            }
            lines.push(PageLine {
                line: Line {
                    words,
                    alignment: Alignment::from_u8(line.alignment),
                },
                x: line.x,
                y: line.y,
            });
        }
        Ok(Page { lines })
    }
}
