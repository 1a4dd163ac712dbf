//! `EntryProvider` (§4.2): the polymorphic byte source behind every entry
//! the Creator holds, whether it comes straight from an on-disk archive or
//! is synthesized in memory.

use std::sync::Arc;

use crate::sqpack::entry::{self, EntryError};
use crate::stream::{MemoryStream, RandomAccessStream, SubStream};

/// One entry's source of truth. Cheap to clone (everything behind an
/// `Arc`); encoding to on-disk entry bytes is deferred to `materialize`.
#[derive(Clone)]
pub enum EntryProvider {
    /// The canonical zero-byte entry.
    Empty,
    /// A window into an already-encoded entry in some other archive's data
    /// span — copied verbatim, never decoded or recompressed.
    PassthroughFromSqPack {
        source: Arc<dyn RandomAccessStream>,
        offset: u64,
        length: u64,
    },
    /// Raw binary content to be deflate-encoded as a Binary-type entry.
    MemoryBinary(Arc<Vec<u8>>),
    /// Raw texture content, encoded with a synthesized single-LOD
    /// sub-header.
    MemoryTexture(Arc<Vec<u8>>),
    /// Raw model content, encoded with a synthesized single-LOD
    /// sub-header.
    MemoryModel(Arc<Vec<u8>>),
}

impl EntryProvider {
    pub fn passthrough(source: Arc<dyn RandomAccessStream>, offset: u64, length: u64) -> Self {
        EntryProvider::PassthroughFromSqPack {
            source,
            offset,
            length,
        }
    }

    /// Produce the stream of on-disk entry bytes (header + block table +
    /// block payloads), encoding in memory if this provider isn't already
    /// framed. Called once per entry by the View Assembler; the Background
    /// Builder may call it ahead of time to pre-warm memory providers off
    /// the hot path.
    pub fn materialize(&self) -> Result<Arc<dyn RandomAccessStream>, EntryError> {
        match self {
            EntryProvider::Empty => Ok(Arc::new(MemoryStream::new(entry::encode_empty_entry()))),
            EntryProvider::PassthroughFromSqPack {
                source,
                offset,
                length,
            } => Ok(Arc::new(SubStream::new(source.clone(), *offset, *length))),
            EntryProvider::MemoryBinary(data) => {
                Ok(Arc::new(MemoryStream::new(entry::encode_binary_entry(data)?)))
            }
            EntryProvider::MemoryTexture(data) => {
                Ok(Arc::new(MemoryStream::new(entry::encode_texture_entry(data)?)))
            }
            EntryProvider::MemoryModel(data) => {
                Ok(Arc::new(MemoryStream::new(entry::encode_model_entry(data)?)))
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            EntryProvider::Empty => "empty",
            EntryProvider::PassthroughFromSqPack { .. } => "passthrough",
            EntryProvider::MemoryBinary(_) => "memory-binary",
            EntryProvider::MemoryTexture(_) => "memory-texture",
            EntryProvider::MemoryModel(_) => "memory-model",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_materializes_to_sentinel_length() {
        let p = EntryProvider::Empty;
        let s = p.materialize().unwrap();
        assert_eq!(s.size(), crate::sqpack::ALIGNMENT);
    }

    #[test]
    fn memory_binary_round_trips_through_materialize_and_decode() {
        let data = Arc::new(b"some file contents".to_vec());
        let p = EntryProvider::MemoryBinary(data.clone());
        let s = p.materialize().unwrap();
        let mut buf = vec![0u8; s.size() as usize];
        s.read_partial(0, &mut buf).unwrap();
        let decoded = entry::decode_entry(&buf).unwrap();
        assert_eq!(decoded, *data);
    }

    #[test]
    fn passthrough_windows_into_source_without_copying_on_construction() {
        let source: Arc<dyn RandomAccessStream> =
            Arc::new(MemoryStream::new(b"xxxxxENTRYBYTESxxxxx".to_vec()));
        let p = EntryProvider::passthrough(source, 5, 10);
        let s = p.materialize().unwrap();
        assert_eq!(s.size(), 10);
        let mut buf = [0u8; 10];
        s.read_partial(0, &mut buf).unwrap();
        assert_eq!(&buf, b"ENTRYBYTES");
    }
}
