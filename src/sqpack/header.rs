//! `SqpackHeader` (every `.index`/`.index2`/`.dat{n}` file starts with one)
//! and `IndexSubHeader` (the second 1024-byte header chained after it in
//! `.index`/`.index2` files only).
//!
//! # `SqpackHeader` on-disk layout (1024 bytes, little-endian)
//! ```text
//! Offset  Size  Field
//!    0      8   magic              = b"SqPack\0\0"
//!    8      4   platform_id
//!   12      4   size               = 1024
//!   16      4   version
//!   20      4   file_type          0 = Index, 2 = Data
//!   24      4   data_size          post-header byte count (Data kind only)
//!   28      4   span_index         this span's index (Data kind only)
//!   32    928   reserved, zero
//!  960     20   sha1_of_struct     SHA-1 of bytes [0..0x3C0)
//!  980     20   tail_sha1          SHA-1 of the post-header region (Data kind)
//! 1000     24   reserved, zero
//! ```
//!
//! # `IndexSubHeader` layout (1024 bytes, little-endian), chained directly
//! after a `SqpackHeader` in `.index`/`.index2`
//! ```text
//! Offset  Size  Field
//!    0      4   size               = 1024
//!    4      4   version
//!    8      4   index_type         0 = two-hash (.index), 1 = one-hash (.index2)
//!   12     32   file_segment       SegmentDescriptor
//!   44     32   data_files_segment SegmentDescriptor
//!   76     32   unknown3_segment   SegmentDescriptor
//!  108     32   folder_segment     SegmentDescriptor
//!  140    820   reserved, zero
//!  960     20   sha1_of_struct     SHA-1 of bytes [0..0x3C0)
//!  980     44   reserved, zero
//! ```
//! Each `SegmentDescriptor` is `{ count: u32, offset: u32, size: u32, sha1: [u8; 20] }`.

use sha1::{Digest, Sha1};
use std::io::{self, Read, Write};
use thiserror::Error;

pub const SQPACK_HEADER_SIZE: usize = super::SQPACK_HEADER_SIZE;
pub const INDEX_SUBHEADER_SIZE: usize = super::INDEX_SUBHEADER_SIZE;

/// Byte count covered by each header's own `sha1_of_struct` field.
pub const SHA1_COVERED_SIZE: usize = 0x3C0;

pub const MAGIC: &[u8; 8] = b"SqPack\0\0";

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("invalid SqpackHeader magic")]
    InvalidMagic,
    #[error("SqpackHeader.file_type {0} does not match expected file kind")]
    WrongFileKind(u32),
    #[error("SqpackHeader sha1_of_struct mismatch — header is corrupt")]
    HeaderShaMismatch,
    #[error("SqpackHeader tail_sha1 mismatch — data span payload is corrupt")]
    TailShaMismatch,
    #[error("data span span_index {actual} does not match expected index {expected}")]
    SpanIndexMismatch { expected: u32, actual: u32 },
    #[error("IndexSubHeader sha1_of_struct mismatch — sub-header is corrupt")]
    SubHeaderShaMismatch,
    #[error("IndexSubHeader data_files segment size is {0}, expected {DATA_FILE_DESCRIPTOR_MULTIPLE}")]
    BadDataFilesSegmentSize(u32),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// `DataFilesSegment` entries must be a multiple of this (one descriptor per
/// data span).
pub const DATA_FILE_DESCRIPTOR_MULTIPLE: u32 = super::DATA_FILE_DESCRIPTOR_SIZE as u32;

/// Build the `DataFilesSegment` body: one 256-byte descriptor per data
/// span, the span's index in its first 4 bytes, the rest reserved/zero.
/// Writers and readers share this shape so the segment's on-disk bytes
/// always match the SHA-1 the sub-header records for it.
pub fn data_files_segment_records(span_count: u32) -> Vec<u8> {
    let mut out = vec![0u8; span_count as usize * super::DATA_FILE_DESCRIPTOR_SIZE];
    for (i, chunk) in out.chunks_mut(super::DATA_FILE_DESCRIPTOR_SIZE).enumerate() {
        chunk[0..4].copy_from_slice(&(i as u32).to_le_bytes());
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Index,
    Data,
}

impl FileKind {
    fn as_u32(self) -> u32 {
        match self {
            FileKind::Index => 0,
            FileKind::Data => 2,
        }
    }

    fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(FileKind::Index),
            2 => Some(FileKind::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqpackHeader {
    pub platform_id: u32,
    pub version: u32,
    pub file_type: FileKind,
    /// Post-header byte count of the data span. Zero for Index kind.
    pub data_size: u32,
    /// This span's index (`archive_offset / 2` half of a DataLocator).
    /// Zero for Index kind.
    pub span_index: u32,
    /// SHA-1 of the post-header region. Only meaningful for Data kind;
    /// `[0u8; 20]` for Index kind (the index's content hashes live in its
    /// segment descriptors instead).
    pub tail_sha1: [u8; 20],
}

impl SqpackHeader {
    pub fn new_index(version: u32) -> Self {
        Self {
            platform_id: 0,
            version,
            file_type: FileKind::Index,
            data_size: 0,
            span_index: 0,
            tail_sha1: [0u8; 20],
        }
    }

    pub fn new_data(version: u32, span_index: u32, data_size: u32, tail_sha1: [u8; 20]) -> Self {
        Self {
            platform_id: 0,
            version,
            file_type: FileKind::Data,
            data_size,
            span_index,
            tail_sha1,
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = [0u8; SQPACK_HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.platform_id.to_le_bytes());
        buf[12..16].copy_from_slice(&(SQPACK_HEADER_SIZE as u32).to_le_bytes());
        buf[16..20].copy_from_slice(&self.version.to_le_bytes());
        buf[20..24].copy_from_slice(&self.file_type.as_u32().to_le_bytes());
        buf[24..28].copy_from_slice(&self.data_size.to_le_bytes());
        buf[28..32].copy_from_slice(&self.span_index.to_le_bytes());

        let sha1_of_struct = sha1_digest(&buf[..SHA1_COVERED_SIZE]);
        buf[960..980].copy_from_slice(&sha1_of_struct);
        buf[980..1000].copy_from_slice(&self.tail_sha1);

        w.write_all(&buf)
    }

    pub fn read<R: Read>(mut r: R, expected_kind: FileKind) -> Result<Self, HeaderError> {
        let mut buf = [0u8; SQPACK_HEADER_SIZE];
        r.read_exact(&mut buf)?;

        if &buf[0..8] != MAGIC {
            return Err(HeaderError::InvalidMagic);
        }

        let stored_sha = &buf[960..980];
        let computed = sha1_digest(&buf[..SHA1_COVERED_SIZE]);
        if stored_sha != computed {
            return Err(HeaderError::HeaderShaMismatch);
        }

        let platform_id = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let version = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        let file_type_raw = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        let file_type =
            FileKind::from_u32(file_type_raw).ok_or(HeaderError::WrongFileKind(file_type_raw))?;
        if file_type != expected_kind {
            return Err(HeaderError::WrongFileKind(file_type_raw));
        }
        let data_size = u32::from_le_bytes(buf[24..28].try_into().unwrap());
        let span_index = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        let mut tail_sha1 = [0u8; 20];
        tail_sha1.copy_from_slice(&buf[980..1000]);

        Ok(Self {
            platform_id,
            version,
            file_type,
            data_size,
            span_index,
            tail_sha1,
        })
    }

    /// Verify `tail_sha1` against the actual post-header bytes (Data kind
    /// only — callers must supply the span's full post-header region).
    pub fn verify_tail(&self, post_header_bytes: &[u8]) -> Result<(), HeaderError> {
        if sha1_digest(post_header_bytes) != self.tail_sha1 {
            return Err(HeaderError::TailShaMismatch);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentDescriptor {
    pub count: u32,
    pub offset: u32,
    pub size: u32,
    pub sha1: [u8; 20],
}

const SEGMENT_DESCRIPTOR_SIZE: usize = 32;

impl SegmentDescriptor {
    fn write(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.count.to_le_bytes());
        buf[4..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..32].copy_from_slice(&self.sha1);
    }

    fn read(buf: &[u8]) -> Self {
        Self {
            count: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            offset: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            sha1: buf[12..32].try_into().unwrap(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// `.index` — two-hash (PathHash, NameHash) directory.
    TwoHash,
    /// `.index2` — one-hash (FullPathHash) directory.
    OneHash,
}

#[derive(Debug, Clone)]
pub struct IndexSubHeader {
    pub version: u32,
    pub index_type: IndexType,
    pub file_segment: SegmentDescriptor,
    pub data_files_segment: SegmentDescriptor,
    pub unknown3_segment: SegmentDescriptor,
    pub folder_segment: SegmentDescriptor,
}

impl IndexSubHeader {
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = [0u8; INDEX_SUBHEADER_SIZE];
        buf[0..4].copy_from_slice(&(INDEX_SUBHEADER_SIZE as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        let index_type_val: u32 = match self.index_type {
            IndexType::TwoHash => 0,
            IndexType::OneHash => 1,
        };
        buf[8..12].copy_from_slice(&index_type_val.to_le_bytes());
        self.file_segment.write(&mut buf[12..44]);
        self.data_files_segment.write(&mut buf[44..76]);
        self.unknown3_segment.write(&mut buf[76..108]);
        self.folder_segment.write(&mut buf[108..140]);

        let sha1_of_struct = sha1_digest(&buf[..SHA1_COVERED_SIZE]);
        buf[960..980].copy_from_slice(&sha1_of_struct);

        w.write_all(&buf)
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self, HeaderError> {
        let mut buf = [0u8; INDEX_SUBHEADER_SIZE];
        r.read_exact(&mut buf)?;

        let stored_sha = &buf[960..980];
        let computed = sha1_digest(&buf[..SHA1_COVERED_SIZE]);
        if stored_sha != computed {
            return Err(HeaderError::SubHeaderShaMismatch);
        }

        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let index_type_raw = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let index_type = match index_type_raw {
            0 => IndexType::TwoHash,
            _ => IndexType::OneHash,
        };
        let file_segment = SegmentDescriptor::read(&buf[12..44]);
        let data_files_segment = SegmentDescriptor::read(&buf[44..76]);
        if data_files_segment.size % DATA_FILE_DESCRIPTOR_MULTIPLE != 0 {
            return Err(HeaderError::BadDataFilesSegmentSize(data_files_segment.size));
        }
        let unknown3_segment = SegmentDescriptor::read(&buf[76..108]);
        let folder_segment = SegmentDescriptor::read(&buf[108..140]);

        Ok(Self {
            version,
            index_type,
            file_segment,
            data_files_segment,
            unknown3_segment,
            folder_segment,
        })
    }
}

pub fn sha1_digest(bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trips() {
        let h = SqpackHeader::new_data(1, 0, 4096, sha1_digest(b"payload"));
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len(), SQPACK_HEADER_SIZE);
        let parsed = SqpackHeader::read(Cursor::new(buf), FileKind::Data).unwrap();
        assert_eq!(parsed.span_index, 0);
        assert_eq!(parsed.data_size, 4096);
    }

    #[test]
    fn header_rejects_wrong_kind() {
        let h = SqpackHeader::new_index(1);
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        let err = SqpackHeader::read(Cursor::new(buf), FileKind::Data).unwrap_err();
        assert!(matches!(err, HeaderError::WrongFileKind(_)));
    }

    #[test]
    fn header_detects_corruption() {
        let h = SqpackHeader::new_index(1);
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        buf[100] ^= 0xFF;
        let err = SqpackHeader::read(Cursor::new(buf), FileKind::Index).unwrap_err();
        assert!(matches!(err, HeaderError::HeaderShaMismatch));
    }

    #[test]
    fn sub_header_round_trips() {
        let sh = IndexSubHeader {
            version: 1,
            index_type: IndexType::TwoHash,
            file_segment: SegmentDescriptor {
                count: 3,
                offset: 2048,
                size: 96,
                sha1: sha1_digest(b"files"),
            },
            data_files_segment: SegmentDescriptor {
                count: 1,
                offset: 4096,
                size: 256,
                sha1: sha1_digest(b"spans"),
            },
            unknown3_segment: SegmentDescriptor::default(),
            folder_segment: SegmentDescriptor {
                count: 1,
                offset: 5000,
                size: 16,
                sha1: sha1_digest(b"folders"),
            },
        };
        let mut buf = Vec::new();
        sh.write(&mut buf).unwrap();
        let parsed = IndexSubHeader::read(Cursor::new(buf)).unwrap();
        assert_eq!(parsed.file_segment.count, 3);
        assert_eq!(parsed.index_type, IndexType::TwoHash);
    }
}
