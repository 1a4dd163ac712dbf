//! Handle Table (§4.2): the per-handle state an intercepted open allocates
//! and a read/seek looks up. The table itself (the map plus the
//! `index_path -> SqpackViews` cache it shares a mutex with) lives in
//! [`super::interceptor::EngineState`] — this module only holds the value
//! types it stores.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::stream::RandomAccessStream;

/// Which of the three views streams a handle was opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    Index,
    Index2,
    Data(u8),
}

/// One per intercepted open (§3 "OverlayedHandle"). The synthetic handle
/// value used as the map key is not stored inside the value itself — the
/// table returns it at allocation time.
pub struct OverlayedHandle {
    pub original_path: std::path::PathBuf,
    pub path_type: PathType,
    pub stream: Arc<dyn RandomAccessStream>,
    cursor: AtomicU64,
}

impl OverlayedHandle {
    pub fn new(
        original_path: std::path::PathBuf,
        path_type: PathType,
        stream: Arc<dyn RandomAccessStream>,
    ) -> Self {
        Self {
            original_path,
            path_type,
            stream,
            cursor: AtomicU64::new(0),
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn set_cursor(&self, value: u64) {
        self.cursor.store(value, Ordering::SeqCst);
    }
}
