//! SqPack Reader (§4.3): opens an `.index`/`.index2`/`.dat{n}` triplet,
//! enumerates the directory entries each index carries, and reads a
//! specific entry's decoded bytes given a `DataLocator`.
//!
//! # Index entry record layout (16 bytes, little-endian)
//! Two-hash (`.index`, `file_segment`):
//! ```text
//! [0..4)   path_hash
//! [4..8)   name_hash
//! [8..12)  locator (raw DataLocator)
//! [12..16) reserved, zero
//! ```
//! One-hash (`.index2`, `file_segment`):
//! ```text
//! [0..4)   full_path_hash
//! [4..8)   locator (raw DataLocator)
//! [8..16)  reserved, zero
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::entry::{self, EntryError, FileEntryType, FILE_ENTRY_HEADER_FIXED_SIZE};
use super::header::{FileKind, HeaderError, IndexSubHeader, IndexType, SqpackHeader};
use super::locator::DataLocator;
use crate::stream::{FileRegionStream, RandomAccessStream};

pub const TWO_HASH_RECORD_SIZE: usize = 16;
pub const ONE_HASH_RECORD_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("header error: {0}")]
    Header(#[from] HeaderError),
    #[error("entry codec error: {0}")]
    Entry(#[from] EntryError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("expected {expected} data spans (per the index sub-header), found {found}")]
    SpanCountMismatch { expected: usize, found: usize },
    #[error("data span {index} reports span_index {actual}, expected {index}")]
    SpanIndexMismatch { index: u32, actual: u32 },
    #[error("data span index {0} does not exist in this archive")]
    SpanOutOfRange(u32),
    #[error("entry at span {span}, offset {offset} is truncated")]
    TruncatedEntry { span: u32, offset: u64 },
    #[error("index file segment size {0} is not a multiple of the {1}-byte record size")]
    MisalignedFileSegment(u32, usize),
    #[error("index sub-header declares the wrong index_type for this file")]
    WrongIndexType,
    #[error("data_files_segment body does not match the sub-header's recorded SHA-1")]
    DataFilesSegmentShaMismatch,
}

#[derive(Debug, Clone, Copy)]
pub struct TwoHashIndexEntry {
    pub path_hash: u32,
    pub name_hash: u32,
    pub locator: DataLocator,
}

#[derive(Debug, Clone, Copy)]
pub struct OneHashIndexEntry {
    pub full_path_hash: u32,
    pub locator: DataLocator,
}

struct DataSpan {
    header: SqpackHeader,
    stream: Arc<dyn RandomAccessStream>,
    post_header_offset: u64,
}

/// A read-only view over one archive's on-disk triplet. Does no writing;
/// the Creator produces these files, this reads them back.
pub struct SqpackReader {
    pub index_header: SqpackHeader,
    pub index_sub_header: IndexSubHeader,
    pub index2_header: SqpackHeader,
    pub index2_sub_header: IndexSubHeader,
    pub two_hash_entries: Vec<TwoHashIndexEntry>,
    pub one_hash_entries: Vec<OneHashIndexEntry>,
    /// Unknown3 segment, preserved bitwise and exposed unparsed for
    /// passthrough writers that need to round-trip it untouched.
    pub unknown3_bytes: Vec<u8>,
    data_spans: Vec<DataSpan>,
}

impl SqpackReader {
    pub fn open(
        index_path: &Path,
        index2_path: &Path,
        data_paths: &[std::path::PathBuf],
    ) -> Result<Self, ReaderError> {
        let (index_header, index_sub_header, raw_two_hash) =
            read_index_file(index_path, FileKind::Index, IndexType::TwoHash)?;
        let (index2_header, index2_sub_header, raw_one_hash) =
            read_index_file(index2_path, FileKind::Index, IndexType::OneHash)?;

        let two_hash_entries = raw_two_hash
            .into_iter()
            .map(|e| match e {
                TwoHashIndexEntryOrOneHash::Two(t) => t,
                TwoHashIndexEntryOrOneHash::One(_) => unreachable!("file_segment kind mismatch"),
            })
            .collect();
        let one_hash_entries = raw_one_hash
            .into_iter()
            .map(|e| match e {
                TwoHashIndexEntryOrOneHash::One(o) => o,
                TwoHashIndexEntryOrOneHash::Two(_) => unreachable!("file_segment kind mismatch"),
            })
            .collect();

        let expected_spans = (index_sub_header.data_files_segment.size as usize)
            / super::DATA_FILE_DESCRIPTOR_SIZE;
        if expected_spans != data_paths.len() {
            return Err(ReaderError::SpanCountMismatch {
                expected: expected_spans,
                found: data_paths.len(),
            });
        }

        let mut unknown3_bytes = vec![0u8; index_sub_header.unknown3_segment.size as usize];
        if !unknown3_bytes.is_empty() {
            let mut f = File::open(index_path)?;
            f.seek(SeekFrom::Start(index_sub_header.unknown3_segment.offset as u64))?;
            f.read_exact(&mut unknown3_bytes)?;
        }

        let mut data_spans = Vec::with_capacity(data_paths.len());
        for (i, path) in data_paths.iter().enumerate() {
            let mut f = File::open(path)?;
            let header = SqpackHeader::read(&mut f, FileKind::Data)?;
            if header.span_index != i as u32 {
                return Err(ReaderError::SpanIndexMismatch {
                    index: i as u32,
                    actual: header.span_index,
                });
            }
            let post_header_offset = super::SQPACK_HEADER_SIZE as u64;
            let total_len = f.metadata()?.len();
            let stream: Arc<dyn RandomAccessStream> = Arc::new(FileRegionStream::new(
                Arc::new(f),
                post_header_offset,
                total_len.saturating_sub(post_header_offset),
                format!("{}", path.display()),
            ));
            data_spans.push(DataSpan {
                header,
                stream,
                post_header_offset,
            });
        }

        Ok(Self {
            index_header,
            index_sub_header,
            index2_header,
            index2_sub_header,
            two_hash_entries,
            one_hash_entries,
            unknown3_bytes,
            data_spans,
        })
    }

    pub fn span_count(&self) -> usize {
        self.data_spans.len()
    }

    /// Read and decode the entry addressed by `locator`.
    pub fn read_entry(&self, locator: DataLocator) -> Result<Vec<u8>, ReaderError> {
        let span_idx = locator.span_index();
        let span = self
            .data_spans
            .get(span_idx as usize)
            .ok_or(ReaderError::SpanOutOfRange(span_idx))?;
        read_entry_from_stream(span.stream.as_ref(), locator.offset(), span_idx)
    }

    pub fn data_span_stream(&self, span_index: u32) -> Option<Arc<dyn RandomAccessStream>> {
        self.data_spans.get(span_index as usize).map(|s| s.stream.clone())
    }

    pub fn data_span_header(&self, span_index: u32) -> Option<&SqpackHeader> {
        self.data_spans.get(span_index as usize).map(|s| &s.header)
    }

    /// Locate an entry's full on-disk extent (header + block table + all
    /// block payloads) without decoding it, for zero-copy passthrough: the
    /// View Assembler can slice this region straight into a merged span
    /// instead of decode-then-recompress round trip.
    pub fn raw_entry_extent(
        &self,
        locator: DataLocator,
    ) -> Result<(Arc<dyn RandomAccessStream>, u64, u64), ReaderError> {
        let span_idx = locator.span_index();
        let span = self
            .data_spans
            .get(span_idx as usize)
            .ok_or(ReaderError::SpanOutOfRange(span_idx))?;
        let total_len = probe_entry_extent(span.stream.as_ref(), locator.offset(), span_idx)?;
        Ok((span.stream.clone(), locator.offset(), total_len as u64))
    }
}

/// Determine the total on-disk byte length of the entry at `offset`,
/// reading only the fixed header and block table (not the payloads).
fn probe_entry_extent(
    stream: &dyn RandomAccessStream,
    offset: u64,
    span_for_errors: u32,
) -> Result<usize, ReaderError> {
    let mut fixed = [0u8; FILE_ENTRY_HEADER_FIXED_SIZE];
    let n = stream.read_partial(offset, &mut fixed)?;
    if n != fixed.len() {
        return Err(ReaderError::TruncatedEntry {
            span: span_for_errors,
            offset,
        });
    }

    let entry_type_raw = u32::from_le_bytes(fixed[4..8].try_into().unwrap());
    let entry_type = FileEntryType::from_u32(entry_type_raw)?;
    if entry_type == FileEntryType::Empty {
        return Ok(fixed.len());
    }

    let number_of_blocks = u32::from_le_bytes(fixed[12..16].try_into().unwrap()) as usize;
    let header_len =
        FILE_ENTRY_HEADER_FIXED_SIZE + entry_type.sub_header_len() + number_of_blocks * 8;

    let mut header_bytes = vec![0u8; header_len];
    let n = stream.read_partial(offset, &mut header_bytes)?;
    if n != header_len {
        return Err(ReaderError::TruncatedEntry {
            span: span_for_errors,
            offset,
        });
    }
    let parsed = entry::FileEntryHeader::read(io::Cursor::new(&header_bytes))?;

    Ok(match parsed.block_table.last() {
        Some(last) => last.compressed_offset as usize + last.compressed_size as usize,
        None => header_len,
    })
}

/// Read a decoded entry directly from any stream (used by the Reader for
/// on-disk spans and reused by the View Assembler for freshly-built ones).
pub fn read_entry_from_stream(
    stream: &dyn RandomAccessStream,
    offset: u64,
    span_for_errors: u32,
) -> Result<Vec<u8>, ReaderError> {
    let total_len = probe_entry_extent(stream, offset, span_for_errors)?;

    let mut fixed = [0u8; FILE_ENTRY_HEADER_FIXED_SIZE];
    stream.read_partial(offset, &mut fixed)?;
    let entry_type_raw = u32::from_le_bytes(fixed[4..8].try_into().unwrap());
    if FileEntryType::from_u32(entry_type_raw)? == FileEntryType::Empty {
        return Ok(Vec::new());
    }

    let mut entry_bytes = vec![0u8; total_len];
    let n = stream.read_partial(offset, &mut entry_bytes)?;
    if n != total_len {
        return Err(ReaderError::TruncatedEntry {
            span: span_for_errors,
            offset,
        });
    }

    Ok(entry::decode_entry(&entry_bytes)?)
}

fn read_index_file(
    path: &Path,
    expected_kind: FileKind,
    expected_index_type: IndexType,
) -> Result<(SqpackHeader, IndexSubHeader, Vec<TwoHashIndexEntryOrOneHash>), ReaderError> {
    let mut f = File::open(path)?;
    let header = SqpackHeader::read(&mut f, expected_kind)?;
    let sub_header = IndexSubHeader::read(&mut f)?;

    if sub_header.index_type != expected_index_type {
        return Err(ReaderError::WrongIndexType);
    }

    let record_size = match expected_index_type {
        IndexType::TwoHash => TWO_HASH_RECORD_SIZE,
        IndexType::OneHash => ONE_HASH_RECORD_SIZE,
    };
    if sub_header.file_segment.size as usize % record_size != 0 {
        return Err(ReaderError::MisalignedFileSegment(
            sub_header.file_segment.size,
            record_size,
        ));
    }

    f.seek(SeekFrom::Start(sub_header.file_segment.offset as u64))?;
    let mut raw = vec![0u8; sub_header.file_segment.size as usize];
    f.read_exact(&mut raw)?;

    if sub_header.data_files_segment.size > 0 {
        f.seek(SeekFrom::Start(sub_header.data_files_segment.offset as u64))?;
        let mut data_files_bytes = vec![0u8; sub_header.data_files_segment.size as usize];
        f.read_exact(&mut data_files_bytes)?;
        if super::header::sha1_digest(&data_files_bytes) != sub_header.data_files_segment.sha1 {
            return Err(ReaderError::DataFilesSegmentShaMismatch);
        }
    }

    let count = raw.len() / record_size;
    let mut entries = Vec::with_capacity(count);
    for chunk in raw.chunks(record_size) {
        entries.push(match expected_index_type {
            IndexType::TwoHash => TwoHashIndexEntryOrOneHash::Two(TwoHashIndexEntry {
                path_hash: u32::from_le_bytes(chunk[0..4].try_into().unwrap()),
                name_hash: u32::from_le_bytes(chunk[4..8].try_into().unwrap()),
                locator: DataLocator::from_raw(u32::from_le_bytes(chunk[8..12].try_into().unwrap())),
            }),
            IndexType::OneHash => TwoHashIndexEntryOrOneHash::One(OneHashIndexEntry {
                full_path_hash: u32::from_le_bytes(chunk[0..4].try_into().unwrap()),
                locator: DataLocator::from_raw(u32::from_le_bytes(chunk[4..8].try_into().unwrap())),
            }),
        });
    }

    Ok((header, sub_header, entries))
}

/// Internal helper: `read_index_file` is shared between the two index
/// kinds, so it returns this until the caller sorts entries into the
/// concrete `Vec<TwoHashIndexEntry>`/`Vec<OneHashIndexEntry>` fields.
enum TwoHashIndexEntryOrOneHash {
    Two(TwoHashIndexEntry),
    One(OneHashIndexEntry),
}
