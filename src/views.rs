//! The View Assembler: turns a `Creator`'s accumulated entries into the
//! frozen, read-only streams an `EngineError`-free consumer (the Handle
//! Table, or a standalone dump) treats as the virtual archive's
//! `.index`/`.index2`/`.dat{n}` files.
//!
//! Freezing is one-shot and produces no on-disk state of its own — every
//! returned stream is either a view over the Creator's providers or a
//! small in-memory header/index buffer built here.

use std::sync::Arc;

use crate::pathspec::PathSpec;
use crate::provider::EntryProvider;
use crate::sqpack::entry::EntryError;
use crate::sqpack::header::{sha1_digest, IndexSubHeader, IndexType, SegmentDescriptor, SqpackHeader};
use crate::sqpack::locator::DataLocator;
use crate::sqpack::{align_up, ALIGNMENT, MAX_DATA_SPANS};
use crate::stream::{ConcatStream, MemoryStream, RandomAccessStream};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewAssemblyError {
    #[error("entry codec error: {0}")]
    Entry(#[from] EntryError),
    #[error("io error while hashing an assembled span: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive would need {needed} data spans, exceeding the {MAX_DATA_SPANS}-span bound")]
    TooManySpans { needed: usize },
}

/// The frozen virtual archive: one index stream, one index2 stream, and
/// however many data span streams the entry set needed.
pub struct SqpackViews {
    pub index: Arc<dyn RandomAccessStream>,
    pub index2: Arc<dyn RandomAccessStream>,
    pub data_spans: Vec<Arc<dyn RandomAccessStream>>,
}

struct PlacedEntry {
    spec: PathSpec,
    span_index: u32,
    offset: u64,
    aligned_len: u64,
}

/// Assemble a frozen [`SqpackViews`] from the Creator's final entry set.
/// `max_span_size` bounds how many bytes of entries (post-alignment) may
/// land in one data span before a new span is opened.
pub fn assemble(
    entries: &[(PathSpec, EntryProvider)],
    max_span_size: u64,
) -> Result<SqpackViews, ViewAssemblyError> {
    let mut span_parts: Vec<Vec<Arc<dyn RandomAccessStream>>> = vec![Vec::new()];
    let mut span_offsets: Vec<u64> = vec![0];
    let mut placed = Vec::with_capacity(entries.len());

    for (spec, provider) in entries {
        let materialized = provider.materialize()?;
        let raw_len = materialized.size();
        let aligned_len = align_up(raw_len, ALIGNMENT);

        let mut span_index = span_parts.len() - 1;
        if span_offsets[span_index] > 0 && span_offsets[span_index] + aligned_len > max_span_size {
            span_index += 1;
            if span_index >= MAX_DATA_SPANS {
                return Err(ViewAssemblyError::TooManySpans {
                    needed: span_index + 1,
                });
            }
            span_parts.push(Vec::new());
            span_offsets.push(0);
        }

        let offset = span_offsets[span_index];
        span_parts[span_index].push(materialized);
        let pad = (aligned_len - raw_len) as usize;
        if pad > 0 {
            span_parts[span_index].push(Arc::new(MemoryStream::new(vec![0u8; pad])));
        }
        span_offsets[span_index] += aligned_len;

        placed.push(PlacedEntry {
            spec: spec.clone(),
            span_index: span_index as u32,
            offset,
            aligned_len,
        });
    }

    let mut data_spans = Vec::with_capacity(span_parts.len());
    for (i, parts) in span_parts.into_iter().enumerate() {
        data_spans.push(build_data_span(i as u32, parts)?);
    }

    let index = build_index_file(IndexType::TwoHash, &placed, data_spans.len())?;
    let index2 = build_index_file(IndexType::OneHash, &placed, data_spans.len())?;

    Ok(SqpackViews {
        index,
        index2,
        data_spans,
    })
}

fn build_data_span(
    span_index: u32,
    parts: Vec<Arc<dyn RandomAccessStream>>,
) -> Result<Arc<dyn RandomAccessStream>, ViewAssemblyError> {
    let body = Arc::new(ConcatStream::new(parts));
    let tail_sha1 = hash_stream(body.as_ref())?;
    let header = SqpackHeader::new_data(1, span_index, body.size() as u32, tail_sha1);
    let mut header_bytes = Vec::new();
    header.write(&mut header_bytes)?;

    let header_stream: Arc<dyn RandomAccessStream> = Arc::new(MemoryStream::new(header_bytes));
    Ok(Arc::new(ConcatStream::new(vec![header_stream, body])))
}

fn build_index_file(
    index_type: IndexType,
    placed: &[PlacedEntry],
    data_span_count: usize,
) -> Result<Arc<dyn RandomAccessStream>, ViewAssemblyError> {
    let mut sorted: Vec<&PlacedEntry> = placed.iter().collect();
    match index_type {
        IndexType::TwoHash => sorted.sort_by_key(|p| p.spec.index_key()),
        IndexType::OneHash => sorted.sort_by_key(|p| p.spec.full_path_hash),
    }

    let record_size = match index_type {
        IndexType::TwoHash => crate::sqpack::reader::TWO_HASH_RECORD_SIZE,
        IndexType::OneHash => crate::sqpack::reader::ONE_HASH_RECORD_SIZE,
    };
    let mut records = Vec::with_capacity(sorted.len() * record_size);
    for p in &sorted {
        let locator = DataLocator::pack(p.span_index, p.offset)
            .expect("View Assembler only ever produces 8-byte aligned, in-range locators");
        match index_type {
            IndexType::TwoHash => {
                records.extend_from_slice(&p.spec.path_hash.to_le_bytes());
                records.extend_from_slice(&p.spec.name_hash.to_le_bytes());
                records.extend_from_slice(&locator.raw().to_le_bytes());
                records.extend_from_slice(&0u32.to_le_bytes());
            }
            IndexType::OneHash => {
                records.extend_from_slice(&p.spec.full_path_hash.to_le_bytes());
                records.extend_from_slice(&locator.raw().to_le_bytes());
                records.extend_from_slice(&[0u8; 8]);
            }
        }
    }

    let mut header_bytes = Vec::new();
    SqpackHeader::new_index(1).write(&mut header_bytes)?;

    let file_segment = SegmentDescriptor {
        count: sorted.len() as u32,
        offset: (header_bytes.len() + crate::sqpack::INDEX_SUBHEADER_SIZE) as u32,
        size: records.len() as u32,
        sha1: sha1_digest(&records),
    };
    let unknown3_segment = SegmentDescriptor {
        count: 0,
        offset: file_segment.offset + file_segment.size,
        size: 0,
        sha1: sha1_digest(&[]),
    };
    let data_files_records = crate::sqpack::header::data_files_segment_records(data_span_count as u32);
    let data_files_segment = SegmentDescriptor {
        count: data_span_count as u32,
        offset: unknown3_segment.offset,
        size: data_files_records.len() as u32,
        sha1: sha1_digest(&data_files_records),
    };
    let sub_header = IndexSubHeader {
        version: 1,
        index_type,
        file_segment,
        data_files_segment,
        unknown3_segment,
        folder_segment: SegmentDescriptor::default(),
    };

    let mut out = header_bytes;
    sub_header.write(&mut out)?;
    out.extend_from_slice(&records);
    out.extend_from_slice(&data_files_records);

    Ok(Arc::new(MemoryStream::new(out)))
}

fn hash_stream(stream: &dyn RandomAccessStream) -> std::io::Result<[u8; 20]> {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 1 << 20];
    let mut offset = 0u64;
    loop {
        let n = stream.read_partial(offset, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        offset += n as u64;
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqpack::reader::SqpackReader;
    use std::sync::Arc as StdArc;
    use tempfile::tempdir;

    #[test]
    fn assembles_single_span_archive() {
        let entries = vec![
            (
                PathSpec::from_path("common/a.txt"),
                EntryProvider::MemoryBinary(StdArc::new(b"alpha".to_vec())),
            ),
            (
                PathSpec::from_path("common/b.txt"),
                EntryProvider::MemoryBinary(StdArc::new(b"beta".to_vec())),
            ),
            (PathSpec::from_path("common/empty.txt"), EntryProvider::Empty),
        ];

        let views = assemble(&entries, crate::sqpack::DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(views.data_spans.len(), 1);
        assert!(views.index.size() > 0);
        assert!(views.index2.size() > 0);
    }

    #[test]
    fn assembled_archive_round_trips_through_reader() {
        let entries = vec![(
            PathSpec::from_path("chara/weapon/w1234.tex"),
            EntryProvider::MemoryBinary(StdArc::new(b"texture bytes go here".to_vec())),
        )];
        let views = assemble(&entries, crate::sqpack::DEFAULT_MAX_FILE_SIZE).unwrap();

        let dir = tempdir().unwrap();
        let index_path = dir.path().join("out.index");
        let index2_path = dir.path().join("out.index2");
        let dat_path = dir.path().join("out.dat0");

        write_stream_to_file(&views.index, &index_path);
        write_stream_to_file(&views.index2, &index2_path);
        write_stream_to_file(&views.data_spans[0], &dat_path);

        let reader = SqpackReader::open(&index_path, &index2_path, &[dat_path]).unwrap();
        assert_eq!(reader.two_hash_entries.len(), 1);
        let locator = reader.two_hash_entries[0].locator;
        let decoded = reader.read_entry(locator).unwrap();
        assert_eq!(decoded, b"texture bytes go here");
    }

    fn write_stream_to_file(stream: &Arc<dyn RandomAccessStream>, path: &std::path::Path) {
        use std::io::Write;
        let mut buf = vec![0u8; stream.size() as usize];
        stream.read_partial(0, &mut buf).unwrap();
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }
}
