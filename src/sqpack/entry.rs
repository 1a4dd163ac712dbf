//! Entry framing: `FileEntryHeader`, per-block `BlockHeader`s, and the
//! `deflate`/stored block codec.
//!
//! # Entry layout (as written into a data span, before 128-byte padding)
//! ```text
//! [0..16)                 FileEntryHeader fixed fields
//! [16..16+type_extra)     type-specific sub-header (0 bytes for Binary/Empty,
//!                         12 bytes for Texture/Model — LOD/mip offsets)
//! [.. + 8*n)              BlockTableEntry[n]
//! [.. ]                   block payloads, one BlockHeader (16 bytes) +
//!                         payload (padded to a 4-byte boundary) per block,
//!                         at `compressed_offset` from the entry start
//! ```
//!
//! # `BlockHeader` (16 bytes, little-endian)
//! ```text
//! Offset  Size  Field
//!    0      4   size                 = 16 (this header's own size)
//!    4      4   _unknown             reserved, zero
//!    8      4   compressed_length    `STORED_SENTINEL` (32000) means "stored"
//!   12      4   uncompressed_length
//! ```

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Uncompressed bytes per block. Matches the conventional SqPack chunk size.
pub const BLOCK_CHUNK_SIZE: usize = 16_000;

/// `compressed_length` value meaning "payload is stored verbatim, not
/// deflated" — chosen so it can never collide with a real deflated size of
/// a `BLOCK_CHUNK_SIZE` chunk.
pub const STORED_SENTINEL: u32 = 32_000;

pub const BLOCK_HEADER_SIZE: usize = 16;
pub const FILE_ENTRY_HEADER_FIXED_SIZE: usize = 16;
pub const BLOCK_TABLE_ENTRY_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("unknown FileEntryType {0}")]
    UnknownEntryType(u32),
    #[error("block header size {0} != {BLOCK_HEADER_SIZE}")]
    BadBlockHeaderSize(u32),
    #[error("deflate error: {0}")]
    Deflate(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileEntryType {
    Empty = 1,
    Binary = 2,
    Model = 3,
    Texture = 4,
}

impl FileEntryType {
    pub fn from_u32(v: u32) -> Result<Self, EntryError> {
        match v {
            1 => Ok(FileEntryType::Empty),
            2 => Ok(FileEntryType::Binary),
            3 => Ok(FileEntryType::Model),
            4 => Ok(FileEntryType::Texture),
            other => Err(EntryError::UnknownEntryType(other)),
        }
    }

    /// Byte length of the type-specific sub-header that follows the fixed
    /// `FileEntryHeader` fields (opaque to the engine; preserved bitwise for
    /// passthrough entries, synthesized minimally for memory entries).
    pub fn sub_header_len(self) -> usize {
        match self {
            FileEntryType::Empty | FileEntryType::Binary => 0,
            FileEntryType::Model | FileEntryType::Texture => 12,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlockTableEntry {
    pub compressed_offset: u32,
    pub compressed_size: u16,
    pub uncompressed_size: u16,
}

#[derive(Debug, Clone)]
pub struct FileEntryHeader {
    pub entry_type: FileEntryType,
    pub raw_file_size: u32,
    /// Opaque type-specific sub-header bytes (length given by
    /// `entry_type.sub_header_len()`).
    pub type_extra: Vec<u8>,
    pub block_table: Vec<BlockTableEntry>,
}

impl FileEntryHeader {
    pub fn header_size(&self) -> usize {
        FILE_ENTRY_HEADER_FIXED_SIZE
            + self.type_extra.len()
            + self.block_table.len() * BLOCK_TABLE_ENTRY_SIZE
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let header_size = self.header_size() as u32;
        w.write_all(&header_size.to_le_bytes())?;
        w.write_all(&(self.entry_type as u32).to_le_bytes())?;
        w.write_all(&self.raw_file_size.to_le_bytes())?;
        w.write_all(&(self.block_table.len() as u32).to_le_bytes())?;
        w.write_all(&self.type_extra)?;
        for b in &self.block_table {
            w.write_all(&b.compressed_offset.to_le_bytes())?;
            w.write_all(&b.compressed_size.to_le_bytes())?;
            w.write_all(&b.uncompressed_size.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self, EntryError> {
        let mut fixed = [0u8; FILE_ENTRY_HEADER_FIXED_SIZE];
        r.read_exact(&mut fixed)?;
        let _header_size = u32::from_le_bytes(fixed[0..4].try_into().unwrap());
        let entry_type = FileEntryType::from_u32(u32::from_le_bytes(fixed[4..8].try_into().unwrap()))?;
        let raw_file_size = u32::from_le_bytes(fixed[8..12].try_into().unwrap());
        let number_of_blocks = u32::from_le_bytes(fixed[12..16].try_into().unwrap());

        let mut type_extra = vec![0u8; entry_type.sub_header_len()];
        r.read_exact(&mut type_extra)?;

        let mut block_table = Vec::with_capacity(number_of_blocks as usize);
        for _ in 0..number_of_blocks {
            let mut buf = [0u8; BLOCK_TABLE_ENTRY_SIZE];
            r.read_exact(&mut buf)?;
            block_table.push(BlockTableEntry {
                compressed_offset: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
                compressed_size: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
                uncompressed_size: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
            });
        }

        Ok(Self {
            entry_type,
            raw_file_size,
            type_extra,
            block_table,
        })
    }
}

/// One block's header + its (possibly deflated) payload.
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    pub compressed_length: u32,
    pub uncompressed_length: u32,
    pub payload: Vec<u8>,
}

impl EncodedBlock {
    /// Total bytes this block occupies on disk, including its own
    /// 16-byte header and the 4-byte payload padding.
    pub fn on_disk_len(&self) -> usize {
        BLOCK_HEADER_SIZE + pad4(self.payload.len())
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&(BLOCK_HEADER_SIZE as u32).to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?;
        w.write_all(&self.compressed_length.to_le_bytes())?;
        w.write_all(&self.uncompressed_length.to_le_bytes())?;
        w.write_all(&self.payload)?;
        let pad = pad4(self.payload.len()) - self.payload.len();
        w.write_all(&vec![0u8; pad])?;
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self, EntryError> {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        r.read_exact(&mut header)?;
        let size = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if size != BLOCK_HEADER_SIZE as u32 {
            return Err(EntryError::BadBlockHeaderSize(size));
        }
        let compressed_length = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let uncompressed_length = u32::from_le_bytes(header[12..16].try_into().unwrap());

        let stored_len = if compressed_length == STORED_SENTINEL {
            uncompressed_length as usize
        } else {
            compressed_length as usize
        };
        let mut payload = vec![0u8; stored_len];
        r.read_exact(&mut payload)?;
        let pad = pad4(stored_len) - stored_len;
        let mut discard = vec![0u8; pad];
        r.read_exact(&mut discard)?;

        Ok(Self {
            compressed_length,
            uncompressed_length,
            payload,
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>, EntryError> {
        if self.compressed_length == STORED_SENTINEL {
            Ok(self.payload.clone())
        } else {
            let mut decoder = DeflateDecoder::new(&self.payload[..]);
            let mut out = Vec::with_capacity(self.uncompressed_length as usize);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| EntryError::Deflate(e.to_string()))?;
            Ok(out)
        }
    }
}

fn pad4(len: usize) -> usize {
    (len + 3) / 4 * 4
}

/// Deflate-encode (or store, whichever is smaller) one chunk.
pub fn encode_block(chunk: &[u8]) -> Result<EncodedBlock, EntryError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(chunk)
        .map_err(|e| EntryError::Deflate(e.to_string()))?;
    let deflated = encoder
        .finish()
        .map_err(|e| EntryError::Deflate(e.to_string()))?;

    if deflated.len() < chunk.len() {
        Ok(EncodedBlock {
            compressed_length: deflated.len() as u32,
            uncompressed_length: chunk.len() as u32,
            payload: deflated,
        })
    } else {
        Ok(EncodedBlock {
            compressed_length: STORED_SENTINEL,
            uncompressed_length: chunk.len() as u32,
            payload: chunk.to_vec(),
        })
    }
}

/// Encode arbitrary bytes into a complete Binary-type entry (header, block
/// table, block payloads), not yet padded to the 128-byte archive
/// alignment — that's the View Assembler's job.
pub fn encode_binary_entry(data: &[u8]) -> Result<Vec<u8>, EntryError> {
    encode_typed_entry(data, FileEntryType::Binary, &[])
}

/// Encode into a Texture-type entry with a synthesized single-LOD
/// sub-header (see SPEC_FULL's Open Question on texture/model fidelity).
pub fn encode_texture_entry(data: &[u8]) -> Result<Vec<u8>, EntryError> {
    let mut extra = vec![0u8; 12];
    extra[0..4].copy_from_slice(&0u32.to_le_bytes()); // LOD 0 offset
    encode_typed_entry(data, FileEntryType::Texture, &extra)
}

/// Encode into a Model-type entry with a synthesized single-LOD
/// sub-header.
pub fn encode_model_entry(data: &[u8]) -> Result<Vec<u8>, EntryError> {
    let mut extra = vec![0u8; 12];
    extra[0..4].copy_from_slice(&(data.len() as u32).to_le_bytes()); // LOD 0 size
    encode_typed_entry(data, FileEntryType::Model, &extra)
}

fn encode_typed_entry(
    data: &[u8],
    entry_type: FileEntryType,
    type_extra: &[u8],
) -> Result<Vec<u8>, EntryError> {
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![]
    } else {
        data.chunks(BLOCK_CHUNK_SIZE).collect()
    };

    let mut encoded_blocks = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        encoded_blocks.push(encode_block(chunk)?);
    }

    let header_size =
        FILE_ENTRY_HEADER_FIXED_SIZE + type_extra.len() + encoded_blocks.len() * BLOCK_TABLE_ENTRY_SIZE;

    let mut block_table = Vec::with_capacity(encoded_blocks.len());
    let mut running_offset = header_size as u32;
    for block in &encoded_blocks {
        block_table.push(BlockTableEntry {
            compressed_offset: running_offset,
            compressed_size: block.on_disk_len() as u16,
            uncompressed_size: block.uncompressed_length as u16,
        });
        running_offset += block.on_disk_len() as u32;
    }

    let header = FileEntryHeader {
        entry_type,
        raw_file_size: data.len() as u32,
        type_extra: type_extra.to_vec(),
        block_table,
    };

    let mut out = Vec::with_capacity(running_offset as usize);
    header.write(&mut out)?;
    for block in &encoded_blocks {
        block.write(&mut out)?;
    }
    Ok(out)
}

/// Encode the fixed 128-byte `Empty` entry sentinel (§3: "128-byte
/// sentinel").
pub fn encode_empty_entry() -> Vec<u8> {
    let header = FileEntryHeader {
        entry_type: FileEntryType::Empty,
        raw_file_size: 0,
        type_extra: vec![],
        block_table: vec![],
    };
    let mut out = Vec::with_capacity(crate::sqpack::ALIGNMENT as usize);
    header.write(&mut out).expect("writing to Vec never fails");
    out.resize(crate::sqpack::ALIGNMENT as usize, 0);
    out
}

/// Decode a complete entry (header + all blocks) back to its original
/// bytes, given the raw entry bytes starting at the `FileEntryHeader`.
pub fn decode_entry(entry_bytes: &[u8]) -> Result<Vec<u8>, EntryError> {
    let mut cursor = io::Cursor::new(entry_bytes);
    let header = FileEntryHeader::read(&mut cursor)?;

    if header.entry_type == FileEntryType::Empty {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(header.raw_file_size as usize);
    for bte in &header.block_table {
        let start = bte.compressed_offset as usize;
        let end = start + bte.compressed_size as usize;
        if end > entry_bytes.len() {
            return Err(EntryError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "block extends past entry bytes",
            )));
        }
        let block = EncodedBlock::read(io::Cursor::new(&entry_bytes[start..end]))?;
        out.extend(block.decode()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_entry_round_trips_small() {
        let data = b"hello, sqpack".to_vec();
        let entry = encode_binary_entry(&data).unwrap();
        let decoded = decode_entry(&entry).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn binary_entry_round_trips_multi_block() {
        let data: Vec<u8> = (0..BLOCK_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let entry = encode_binary_entry(&data).unwrap();
        let decoded = decode_entry(&entry).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn incompressible_data_is_stored_not_deflated() {
        // Already-random bytes should round trip via the STORED_SENTINEL path.
        let data: Vec<u8> = (0..4000u32).map(|i| (i.wrapping_mul(2654435761) % 256) as u8).collect();
        let entry = encode_binary_entry(&data).unwrap();
        let decoded = decode_entry(&entry).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn empty_entry_is_128_bytes() {
        let e = encode_empty_entry();
        assert_eq!(e.len(), crate::sqpack::ALIGNMENT as usize);
        assert_eq!(decode_entry(&e).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn texture_entry_preserves_type_extra() {
        let data = vec![7u8; 500];
        let entry = encode_texture_entry(&data).unwrap();
        let header = FileEntryHeader::read(io::Cursor::new(&entry)).unwrap();
        assert_eq!(header.entry_type, FileEntryType::Texture);
        assert_eq!(header.type_extra.len(), 12);
        assert_eq!(decode_entry(&entry).unwrap(), data);
    }
}
