//! The OS I/O Interceptor (§4.1) and its `acquire_views` memoization
//! (§4.4 steps 1-5), wired together over the [`handle_table`] types and the
//! [`OsFileApi`] portability seam.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::engine::handle_table::{OverlayedHandle, PathType};
use crate::engine::os_api::OsFileApi;
use crate::engine::os_error::{ERROR_FILE_NOT_FOUND, ERROR_INVALID_HANDLE, ERROR_READ_FAULT};
use crate::engine::seek::SeekMode;
use crate::views::SqpackViews;

/// Everything an embedding host must supply to describe the triplet a
/// classified path belongs to, for handing to a [`TripletConfigFactory`].
pub struct Triplet {
    pub expac: String,
    pub name: String,
    pub index_path: PathBuf,
    pub index2_path: PathBuf,
    pub data_paths: Vec<PathBuf>,
}

/// The *Configuration Provider* collaborator (§1): given a classified
/// triplet, describes which overlay sources apply to it. This is where a
/// host encodes policy like "only 000000.win32 gets the font pipeline" or
/// "0a0000 gets the Excel merge" (§4.5 items 2 and 5) — the engine itself
/// has no archive-name-specific logic.
pub trait TripletConfigFactory: Send + Sync {
    fn build_config(&self, triplet: &Triplet) -> EngineConfig;
}

enum AcquireOutcome {
    Views(Arc<SqpackViews>),
    Blacklisted,
}

impl Clone for AcquireOutcome {
    fn clone(&self) -> Self {
        match self {
            AcquireOutcome::Views(v) => AcquireOutcome::Views(v.clone()),
            AcquireOutcome::Blacklisted => AcquireOutcome::Blacklisted,
        }
    }
}

/// Guards the Handle Table *and* the `index_path -> SqpackViews` cache
/// under one mutex (§5 `virtual_path_map_mutex`). Held only across
/// map lookup/insert/remove, never across stream I/O or a build.
struct EngineState {
    next_handle: u64,
    handles: HashMap<u64, OverlayedHandle>,
    views: HashMap<PathBuf, AcquireOutcome>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            next_handle: 1,
            handles: HashMap::new(),
            views: HashMap::new(),
        }
    }
}

/// A thread-ID set per hook, preventing the engine's own calls into the
/// real OS API (while synthesizing views) from recursing back through
/// classification (§4.1 "Re-entrancy").
#[derive(Default)]
struct ReentryGuards {
    open: Mutex<HashSet<ThreadId>>,
    close: Mutex<HashSet<ThreadId>>,
    read: Mutex<HashSet<ThreadId>>,
    seek: Mutex<HashSet<ThreadId>>,
}

struct ReentryToken<'a> {
    set: &'a Mutex<HashSet<ThreadId>>,
    owns_entry: bool,
}

impl<'a> ReentryToken<'a> {
    fn enter(set: &'a Mutex<HashSet<ThreadId>>) -> Self {
        let id = std::thread::current().id();
        let mut guard = set.lock().expect("reentry guard mutex poisoned");
        let owns_entry = guard.insert(id);
        Self { set, owns_entry }
    }

    fn already_inside(&self) -> bool {
        !self.owns_entry
    }
}

impl Drop for ReentryToken<'_> {
    fn drop(&mut self) {
        if self.owns_entry {
            let id = std::thread::current().id();
            self.set
                .lock()
                .expect("reentry guard mutex poisoned")
                .remove(&id);
        }
    }
}

/// What an intercepted `open` hands back.
pub enum RoutedHandle<H> {
    /// Classified and backed by a merged view; reads/seeks/close route
    /// through the Handle Table.
    Intercepted(u64),
    /// Not ours — forward the call to the real OS API.
    Native(H),
}

/// Routes `open`/`close`/`read`/`seek` between the Handle Table and a
/// host-provided [`OsFileApi`], per §4.1.
pub struct Interceptor<A: OsFileApi> {
    api: A,
    config_factory: Box<dyn TripletConfigFactory>,
    base_dir: PathBuf,
    state: Mutex<EngineState>,
    reentry: ReentryGuards,
    in_flight: AtomicUsize,
}

impl<A: OsFileApi> Interceptor<A> {
    pub fn new(api: A, base_dir: PathBuf, config_factory: Box<dyn TripletConfigFactory>) -> Self {
        Self {
            api,
            config_factory,
            base_dir,
            state: Mutex::new(EngineState::new()),
            reentry: ReentryGuards::default(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// §4.1 "Open". `read_only`/`open_existing`/`has_template` model the
    /// precondition filter an embedding host's access/disposition/template
    /// flags reduce to.
    pub fn open(
        &self,
        requested_path: &Path,
        read_only: bool,
        open_existing: bool,
        has_template: bool,
    ) -> Result<RoutedHandle<A::Handle>, u32> {
        let _in_flight = InFlightGuard::new(&self.in_flight);
        let token = ReentryToken::enter(&self.reentry.open);
        if token.already_inside() {
            return self.forward_open(requested_path);
        }

        if !(read_only && open_existing && !has_template) {
            return self.forward_open(requested_path);
        }

        let Some(triplet) = self.classify(requested_path) else {
            return self.forward_open(requested_path);
        };

        {
            let state = self.state.lock().expect("engine state mutex poisoned");
            if matches!(state.views.get(&triplet.index_path), Some(AcquireOutcome::Blacklisted)) {
                return self.forward_open(requested_path);
            }
        }

        let path_type = self.path_type_of(requested_path, &triplet);
        let Some(path_type) = path_type else {
            return self.forward_open(requested_path);
        };

        match self.acquire_views(&triplet) {
            Some(views) => {
                let stream = match path_type {
                    PathType::Index => views.index.clone(),
                    PathType::Index2 => views.index2.clone(),
                    PathType::Data(i) => match views.data_spans.get(i as usize) {
                        Some(s) => s.clone(),
                        None => return self.forward_open(requested_path),
                    },
                };
                let handle = OverlayedHandle::new(requested_path.to_path_buf(), path_type, stream);
                let mut state = self.state.lock().expect("engine state mutex poisoned");
                let id = state.next_handle;
                state.next_handle += 1;
                state.handles.insert(id, handle);
                Ok(RoutedHandle::Intercepted(id))
            }
            None => self.forward_open(requested_path),
        }
    }

    fn forward_open(&self, path: &Path) -> Result<RoutedHandle<A::Handle>, u32> {
        self.api
            .open(path)
            .map(RoutedHandle::Native)
            .map_err(|_| ERROR_FILE_NOT_FOUND)
    }

    /// §4.1 "Close". Engine-owned handles always succeed and never touch
    /// the real close.
    pub fn close(&self, handle: RoutedHandle<A::Handle>) -> Result<(), u32> {
        let _in_flight = InFlightGuard::new(&self.in_flight);
        let _token = ReentryToken::enter(&self.reentry.close);
        match handle {
            RoutedHandle::Intercepted(id) => {
                let mut state = self.state.lock().expect("engine state mutex poisoned");
                state.handles.remove(&id);
                Ok(())
            }
            RoutedHandle::Native(native) => self.api.close(native).map_err(|_| ERROR_INVALID_HANDLE),
        }
    }

    /// §4.1 "Read". `overlapped_offset` models an explicit offset supplied
    /// by an overlapped I/O descriptor; when absent the handle's stored
    /// cursor is used and advanced by the bytes actually read.
    pub fn read(
        &self,
        handle: &RoutedHandle<A::Handle>,
        overlapped_offset: Option<u64>,
        buf: &mut [u8],
    ) -> Result<usize, u32> {
        let _in_flight = InFlightGuard::new(&self.in_flight);
        let token = ReentryToken::enter(&self.reentry.read);
        match handle {
            RoutedHandle::Native(native) => {
                self.api.read(native, overlapped_offset, buf).map_err(|_| ERROR_READ_FAULT)
            }
            RoutedHandle::Intercepted(id) => {
                if token.already_inside() {
                    return Err(ERROR_READ_FAULT);
                }
                let stream = {
                    let state = self.state.lock().expect("engine state mutex poisoned");
                    let h = state.handles.get(id).ok_or(ERROR_INVALID_HANDLE)?;
                    (h.stream.clone(), h.cursor())
                };
                let (stream, cursor) = stream;
                let offset = overlapped_offset.unwrap_or(cursor);
                let n = stream.read_partial(offset, buf).map_err(|_| ERROR_READ_FAULT)?;
                if n < buf.len() {
                    log::debug!("short read on intercepted handle {id}: {n} of {} bytes", buf.len());
                }
                if overlapped_offset.is_none() {
                    let state = self.state.lock().expect("engine state mutex poisoned");
                    if let Some(h) = state.handles.get(id) {
                        h.set_cursor(offset + n as u64);
                    }
                }
                Ok(n)
            }
        }
    }

    /// §4.1 "Seek".
    pub fn seek(
        &self,
        handle: &RoutedHandle<A::Handle>,
        mode: u32,
        distance: i64,
    ) -> Result<u64, u32> {
        let _in_flight = InFlightGuard::new(&self.in_flight);
        let _token = ReentryToken::enter(&self.reentry.seek);
        let seek_mode = SeekMode::from_raw(mode, distance)
            .ok_or(crate::engine::os_error::ERROR_INVALID_PARAMETER)?;
        match handle {
            RoutedHandle::Native(native) => {
                let from = match seek_mode {
                    SeekMode::FromBegin(o) => std::io::SeekFrom::Start(o),
                    SeekMode::FromCurrent(d) => std::io::SeekFrom::Current(d),
                    SeekMode::FromEnd(d) => std::io::SeekFrom::End(-d),
                };
                self.api.seek(native, from).map_err(|_| ERROR_READ_FAULT)
            }
            RoutedHandle::Intercepted(id) => {
                let state = self.state.lock().expect("engine state mutex poisoned");
                let h = state.handles.get(id).ok_or(ERROR_INVALID_HANDLE)?;
                let new_cursor = seek_mode.resolve(h.cursor(), h.stream.size());
                h.set_cursor(new_cursor);
                Ok(new_cursor)
            }
        }
    }

    /// §5 "Shutdown": blocks until every in-flight hook invocation has
    /// drained before the caller releases owned state.
    pub fn drain_for_shutdown(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn path_type_of(&self, requested: &Path, triplet: &Triplet) -> Option<PathType> {
        let file_name = requested.file_name()?.to_str()?;
        parse_suffix(file_name).map(|(_, t)| t)
    }

    /// §4.4 steps 1-5, memoized per `index_path`. Returns `None` once a
    /// triplet is blacklisted, either on this call or a prior one.
    fn acquire_views(&self, triplet: &Triplet) -> Option<Arc<SqpackViews>> {
        {
            let state = self.state.lock().expect("engine state mutex poisoned");
            match state.views.get(&triplet.index_path) {
                Some(AcquireOutcome::Views(v)) => return Some(v.clone()),
                Some(AcquireOutcome::Blacklisted) => return None,
                None => {}
            }
        }

        let config = self.config_factory.build_config(triplet);
        let outcome = match config.build_if_contributing() {
            Ok(Some(views)) => AcquireOutcome::Views(Arc::new(views)),
            Ok(None) => AcquireOutcome::Blacklisted,
            Err(e) => {
                log::warn!("acquire_views({:?}) failed, blacklisting: {e}", triplet.index_path);
                AcquireOutcome::Blacklisted
            }
        };

        let mut state = self.state.lock().expect("engine state mutex poisoned");
        // A racing thread may have memoized first; `acquire_views` must be
        // idempotent and linearizable per index_path (§5), so the first
        // write wins.
        let winner = state
            .views
            .entry(triplet.index_path.clone())
            .or_insert(outcome)
            .clone();
        match winner {
            AcquireOutcome::Views(v) => Some(v),
            AcquireOutcome::Blacklisted => None,
        }
    }

    /// §4.1 "Open" path classification: derive the companion triplet under
    /// the engine's base archive directory and check both siblings exist.
    fn classify(&self, requested_path: &Path) -> Option<Triplet> {
        let file_name = requested_path.file_name()?.to_str()?;
        let parent_name = requested_path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())?
            .to_string();

        let (stem, _) = parse_suffix(file_name)?;
        let companion_dir = self.base_dir.join(&parent_name);
        let index_path = companion_dir.join(format!("{stem}.win32.index"));
        let index2_path = companion_dir.join(format!("{stem}.win32.index2"));

        if !index_path.exists() || !index2_path.exists() {
            return None;
        }

        let data_paths = (0u8..8)
            .map(|i| companion_dir.join(format!("{stem}.win32.dat{i}")))
            .filter(|p| p.exists())
            .collect();

        Some(Triplet {
            expac: parent_name,
            name: stem.to_string(),
            index_path,
            index2_path,
            data_paths,
        })
    }
}

/// Splits a SqPack file name into `(stem, path_type)`, e.g.
/// `"0a0000.win32.dat3"` -> `("0a0000", Data(3))`.
fn parse_suffix(file_name: &str) -> Option<(&str, PathType)> {
    if let Some(stem) = file_name.strip_suffix(".win32.index2") {
        return Some((stem, PathType::Index2));
    }
    if let Some(stem) = file_name.strip_suffix(".win32.index") {
        return Some((stem, PathType::Index));
    }
    for i in 0u8..8 {
        let suffix = format!(".win32.dat{i}");
        if let Some(stem) = file_name.strip_suffix(suffix.as_str()) {
            return Some((stem, PathType::Data(i)));
        }
    }
    None
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_suffix_recognizes_every_path_type() {
        assert!(matches!(parse_suffix("0a0000.win32.index"), Some((_, PathType::Index))));
        assert!(matches!(parse_suffix("0a0000.win32.index2"), Some((_, PathType::Index2))));
        assert!(matches!(parse_suffix("0a0000.win32.dat3"), Some((_, PathType::Data(3)))));
        assert!(parse_suffix("readme.txt").is_none());
    }
}
