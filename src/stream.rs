//! The `RandomAccessStream` contract (§4.6) and the handful of concrete
//! stream kinds the engine stitches together: an in-memory buffer, a
//! read-only slice of an open file, and a logical concatenation of several
//! sub-streams (used by the View Assembler to expose a whole data span as
//! one stream without copying every entry into it up front).

use std::fs::File;
use std::io;
use std::sync::Arc;

/// Every stream participating in views implements this. Streams are
/// immutable after construction and safe for concurrent readers — no
/// interior stateful cursor.
pub trait RandomAccessStream: Send + Sync {
    fn size(&self) -> u64;

    /// May return fewer bytes than `buf.len()` only at end-of-stream. Never
    /// blocks on anything but this stream's own backing I/O.
    fn read_partial(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Diagnostic only.
    fn describe_state(&self) -> String {
        format!("{} bytes", self.size())
    }
}

/// A stream backed entirely by an in-memory buffer.
pub struct MemoryStream(Arc<Vec<u8>>);

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self(Arc::new(data))
    }

    pub fn from_arc(data: Arc<Vec<u8>>) -> Self {
        Self(data)
    }
}

impl RandomAccessStream for MemoryStream {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_partial(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = &self.0;
        if offset >= data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn describe_state(&self) -> String {
        format!("memory({} bytes)", self.0.len())
    }
}

/// A read-only window `[base_offset, base_offset + length)` over an open
/// file, read via positional (`pread`-style) reads so multiple readers can
/// share one `File` without a cursor lock.
pub struct FileRegionStream {
    file: Arc<File>,
    base_offset: u64,
    length: u64,
    label: String,
}

impl FileRegionStream {
    pub fn new(file: Arc<File>, base_offset: u64, length: u64, label: impl Into<String>) -> Self {
        Self {
            file,
            base_offset,
            length,
            label: label.into(),
        }
    }
}

impl RandomAccessStream for FileRegionStream {
    fn size(&self) -> u64 {
        self.length
    }

    fn read_partial(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.length {
            return Ok(0);
        }
        let want = buf.len().min((self.length - offset) as usize);
        let absolute = self.base_offset + offset;
        read_at_portable(&self.file, absolute, &mut buf[..want])
    }

    fn describe_state(&self) -> String {
        format!(
            "file({}, base={}, len={})",
            self.label, self.base_offset, self.length
        )
    }
}

#[cfg(unix)]
fn read_at_portable(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    // `read_at` may do a short read even mid-file on some filesystems;
    // loop until `buf` is full or we hit EOF, matching `read_exact`-ish
    // semantics while still tolerating a genuine end-of-stream short read.
    let mut total = 0;
    while total < buf.len() {
        match file.read_at(&mut buf[total..], offset + total as u64) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(not(unix))]
fn read_at_portable(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    // Non-unix fallback: no pread, so concurrent readers serialize on a
    // clone of the file handle's cursor via a fresh seek each call. Each
    // `RandomAccessStream::read_partial` call reopens an independent
    // cursor position, so this remains correct (if not lock-free) under
    // concurrent callers as long as the OS allows concurrent seeks on
    // distinct `File` handles to the same path — we take the safer route
    // and serialize through a duplicated handle per call.
    let mut f = file.try_clone()?;
    f.seek(SeekFrom::Start(offset))?;
    let mut total = 0;
    while total < buf.len() {
        match f.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// A read-only window over any other `RandomAccessStream`, used for
/// zero-copy passthrough of an existing entry's bytes into a new archive.
pub struct SubStream {
    inner: Arc<dyn RandomAccessStream>,
    base_offset: u64,
    length: u64,
}

impl SubStream {
    pub fn new(inner: Arc<dyn RandomAccessStream>, base_offset: u64, length: u64) -> Self {
        Self {
            inner,
            base_offset,
            length,
        }
    }
}

impl RandomAccessStream for SubStream {
    fn size(&self) -> u64 {
        self.length
    }

    fn read_partial(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.length {
            return Ok(0);
        }
        let want = buf.len().min((self.length - offset) as usize);
        self.inner.read_partial(self.base_offset + offset, &mut buf[..want])
    }

    fn describe_state(&self) -> String {
        format!(
            "sub(base={}, len={}, inner={})",
            self.base_offset,
            self.length,
            self.inner.describe_state()
        )
    }
}

/// A logical concatenation of sub-streams, each contributing a contiguous
/// range. Used to present a whole data span (header + N lazily-materialized
/// entries) as one `RandomAccessStream` without copying entry bytes into a
/// single buffer up front.
pub struct ConcatStream {
    parts: Vec<(u64, Arc<dyn RandomAccessStream>)>, // (start_offset, stream)
    total_size: u64,
}

impl ConcatStream {
    pub fn new(parts: Vec<Arc<dyn RandomAccessStream>>) -> Self {
        let mut offset = 0u64;
        let mut indexed = Vec::with_capacity(parts.len());
        for p in parts {
            let len = p.size();
            indexed.push((offset, p));
            offset += len;
        }
        Self {
            parts: indexed,
            total_size: offset,
        }
    }
}

impl RandomAccessStream for ConcatStream {
    fn size(&self) -> u64 {
        self.total_size
    }

    fn read_partial(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.total_size || buf.is_empty() {
            return Ok(0);
        }
        // Binary search for the part containing `offset`.
        let idx = match self.parts.binary_search_by(|(start, _)| start.cmp(&offset)) {
            Ok(i) => i,
            Err(0) => return Ok(0),
            Err(i) => i - 1,
        };

        let mut written = 0;
        let mut cursor = offset;
        for (start, stream) in &self.parts[idx..] {
            if written == buf.len() {
                break;
            }
            let part_len = stream.size();
            let part_end = start + part_len;
            if cursor >= part_end {
                continue;
            }
            let local_offset = cursor - start;
            let n = stream.read_partial(local_offset, &mut buf[written..])?;
            if n == 0 {
                break;
            }
            written += n;
            cursor += n as u64;
        }
        Ok(written)
    }

    fn describe_state(&self) -> String {
        format!("concat({} parts, {} bytes)", self.parts.len(), self.total_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stream_reads_within_bounds() {
        let s = MemoryStream::new(b"abcdefgh".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(s.read_partial(2, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"cdef");
    }

    #[test]
    fn memory_stream_short_read_at_eof() {
        let s = MemoryStream::new(b"abc".to_vec());
        let mut buf = [0u8; 8];
        let n = s.read_partial(1, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], b"bc");
    }

    #[test]
    fn concat_stream_stitches_parts() {
        let a: Arc<dyn RandomAccessStream> = Arc::new(MemoryStream::new(b"AAAA".to_vec()));
        let b: Arc<dyn RandomAccessStream> = Arc::new(MemoryStream::new(b"BBBBBB".to_vec()));
        let c: Arc<dyn RandomAccessStream> = Arc::new(MemoryStream::new(b"CC".to_vec()));
        let cat = ConcatStream::new(vec![a, b, c]);
        assert_eq!(cat.size(), 12);

        let mut buf = vec![0u8; 12];
        let n = cat.read_partial(0, &mut buf).unwrap();
        assert_eq!(n, 12);
        assert_eq!(&buf, b"AAAABBBBBBCC");

        let mut buf2 = vec![0u8; 5];
        let n2 = cat.read_partial(3, &mut buf2).unwrap();
        assert_eq!(n2, 5);
        assert_eq!(&buf2, b"ABBBB");
    }

    #[test]
    fn sub_stream_windows_into_inner() {
        let inner: Arc<dyn RandomAccessStream> = Arc::new(MemoryStream::new(b"0123456789".to_vec()));
        let window = SubStream::new(inner, 3, 4);
        assert_eq!(window.size(), 4);
        let mut buf = [0u8; 4];
        assert_eq!(window.read_partial(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn concat_stream_past_end_returns_zero() {
        let a: Arc<dyn RandomAccessStream> = Arc::new(MemoryStream::new(b"AB".to_vec()));
        let cat = ConcatStream::new(vec![a]);
        let mut buf = [0u8; 4];
        assert_eq!(cat.read_partial(10, &mut buf).unwrap(), 0);
    }
}
