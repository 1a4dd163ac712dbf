//! The `OsFileApi` portability seam (§4.1, §9 "Hooking model"): the engine
//! never patches an import table or scans for function signatures itself —
//! a host injects an implementation of this trait and the `Interceptor`
//! decides, per call, whether to route to a synthetic stream or forward to
//! it untouched.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

/// Four OS entry points a host's real file layer must provide so the
/// `Interceptor` can fall through to them.
pub trait OsFileApi: Send + Sync {
    type Handle: Send + Sync;

    fn open(&self, path: &Path) -> io::Result<Self::Handle>;
    fn close(&self, handle: Self::Handle) -> io::Result<()>;
    fn read(&self, handle: &Self::Handle, offset: Option<u64>, buf: &mut [u8]) -> io::Result<usize>;
    fn seek(&self, handle: &Self::Handle, from: SeekFrom) -> io::Result<u64>;
}

/// `std::fs`-backed default/test implementation. A real embedding host
/// instead wraps whatever handle type its own `open`/`read`/`seek` hooks
/// already traffic in.
pub struct NativeOsFileApi;

impl OsFileApi for NativeOsFileApi {
    type Handle = Mutex<File>;

    fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        Ok(Mutex::new(File::open(path)?))
    }

    fn close(&self, _handle: Self::Handle) -> io::Result<()> {
        // Dropping the File closes the descriptor.
        Ok(())
    }

    fn read(&self, handle: &Self::Handle, offset: Option<u64>, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = handle.lock().expect("native file handle mutex poisoned");
        if let Some(offset) = offset {
            file.seek(SeekFrom::Start(offset))?;
        }
        file.read(buf)
    }

    fn seek(&self, handle: &Self::Handle, from: SeekFrom) -> io::Result<u64> {
        let mut file = handle.lock().expect("native file handle mutex poisoned");
        file.seek(from)
    }
}
