//! The Background Builder (§4.7 "Background Builder (for overlays 2 and
//! 5)"): drives a bounded `rayon` worker pool over the per-entry work the
//! Excel merge and font configuration overlays need done once, off the
//! interception hot path, writing the result into a TTMP cache via
//! [`CacheBuilder`](crate::overlay::cache::CacheBuilder). Every other
//! overlay source (archive roots, TTMP packs, loose files) runs inline
//! through `EngineConfig::overlay_sources` — only these two synthesize
//! entries expensively enough to warrant background construction.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::overlay::cache::CacheBuilder;
use crate::overlay::OverlayError;

/// Receives progress updates from a running cache build. Implementations
/// must be cheap and non-blocking — they're called from the progress pump
/// thread, not a worker thread doing the actual encoding.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize);
    fn on_finished(&self, result: &EngineResult<()>);
}

/// A `ProgressSink` that does nothing; the default for callers that only
/// want the final result.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_progress(&self, _completed: usize, _total: usize) {}
    fn on_finished(&self, _result: &EngineResult<()>) {}
}

/// One unit of cache-build work: producing the raw entry bytes for
/// `full_path`. Kept as a closure rather than precomputed bytes because
/// both the Excel merge (serializing merged rows) and font generation
/// (the external Font Generator collaborator) do real work per entry that
/// the pool should parallelize, not just the `TTMPD.mpd` append.
pub struct CacheTask {
    pub full_path: String,
    pub work: Box<dyn Fn() -> Result<Vec<u8>, OverlayError> + Send + Sync>,
}

impl CacheTask {
    pub fn new(full_path: impl Into<String>, work: impl Fn() -> Result<Vec<u8>, OverlayError> + Send + Sync + 'static) -> Self {
        Self {
            full_path: full_path.into(),
            work: Box::new(work),
        }
    }
}

/// A handle to a cache build running on its own bounded `rayon` pool.
/// Drop without calling `cancel` lets it run to completion in the
/// background.
pub struct BuildHandle {
    cancelled: Arc<AtomicBool>,
    result: Arc<Mutex<Option<EngineResult<(std::path::PathBuf, std::path::PathBuf)>>>>,
    done: Arc<AtomicBool>,
}

impl BuildHandle {
    /// The UI's cancel event (§4.7): checked at each task entry and before
    /// each writer-lock acquisition.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Block the calling thread until the build finishes, returning the
    /// final `(TTMPL.mpl, TTMPD.mpd)` paths.
    pub fn join(self) -> EngineResult<(std::path::PathBuf, std::path::PathBuf)> {
        while !self.done.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(20));
        }
        self.result
            .lock()
            .expect("build result mutex poisoned")
            .take()
            .expect("build marked done without storing a result")
    }
}

fn clone_error(e: &EngineError) -> EngineError {
    // `EngineError` isn't `Clone` (its sources carry `io::Error`), so the
    // finished-callback gets a lossy stand-in built from the Display text.
    EngineError::Config(e.to_string())
}

/// Spawn a cache build over `tasks` on a worker pool bounded to the host's
/// parallelism. The returned handle can be polled, cancelled, or joined;
/// progress is pumped to `sink` from a dedicated thread every 100 ms (§4.7),
/// separate from the pool so it keeps reporting while every worker is busy.
pub fn spawn_cache_build(
    cache_dir: std::path::PathBuf,
    cache_name: impl Into<String>,
    dat_file_label: impl Into<String>,
    tasks: Vec<CacheTask>,
    sink: Arc<dyn ProgressSink>,
) -> BuildHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let result = Arc::new(Mutex::new(None));
    let completed = Arc::new(AtomicUsize::new(0));
    let total = tasks.len();
    let cache_name = cache_name.into();
    let dat_file_label = dat_file_label.into();

    {
        let sink = sink.clone();
        let completed = completed.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                sink.on_progress(completed.load(Ordering::SeqCst), total);
                std::thread::sleep(Duration::from_millis(100));
            }
            sink.on_progress(completed.load(Ordering::SeqCst), total);
        });
    }

    let build_cancelled = cancelled.clone();
    let build_done = done.clone();
    let build_result = result.clone();
    let build_completed = completed.clone();
    let build_sink = sink.clone();

    rayon::spawn(move || {
        let outcome = run_cache_build(&cache_dir, &cache_name, &dat_file_label, tasks, &build_cancelled, &build_completed);
        let unit_result = outcome.as_ref().map(|_| ()).map_err(clone_error);
        build_sink.on_finished(&unit_result);
        *build_result.lock().expect("build result mutex poisoned") = Some(outcome);
        build_done.store(true, Ordering::SeqCst);
    });

    BuildHandle {
        cancelled,
        result,
        done,
    }
}

/// Bounded worker count for the pool driving one cache build, per §4.7
/// "Drives a bounded worker pool."
fn worker_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn run_cache_build(
    cache_dir: &std::path::Path,
    cache_name: &str,
    dat_file_label: &str,
    tasks: Vec<CacheTask>,
    cancelled: &AtomicBool,
    completed: &AtomicUsize,
) -> EngineResult<(std::path::PathBuf, std::path::PathBuf)> {
    let builder = CacheBuilder::create(cache_dir, cache_name, dat_file_label).map_err(EngineError::from)?;
    let succeeded = AtomicUsize::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count())
        .build()
        .map_err(|e| EngineError::Config(format!("background builder pool: {e}")))?;

    pool.scope(|scope| {
        for task in tasks {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            let builder = &builder;
            let succeeded = &succeeded;
            scope.spawn(move |_| {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                match (task.work)() {
                    Ok(bytes) => {
                        if cancelled.load(Ordering::SeqCst) {
                            return;
                        }
                        // §5 `creator.write_mutex`: serializes the append
                        // into the shared `TTMPD.mpd`; `CacheBuilder::push`
                        // takes it internally.
                        match builder.push(&task.full_path, &bytes) {
                            Ok(()) => {
                                succeeded.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(err) => {
                                log::warn!("cache task for '{}' failed to write and was skipped: {err}", task.full_path);
                            }
                        }
                    }
                    Err(err) => {
                        log::warn!("cache task for '{}' failed and was skipped: {err}", task.full_path);
                    }
                }
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    if cancelled.load(Ordering::SeqCst) {
        builder.discard();
        return Err(EngineError::CancelledByUser);
    }

    // §4.7 "the build as a whole succeeds if at least one task succeeds."
    if completed.load(Ordering::SeqCst) > 0 && succeeded.load(Ordering::SeqCst) == 0 {
        builder.discard();
        return Err(EngineError::Config(format!("background builder '{cache_name}': every task failed")));
    }

    builder.finish().map_err(EngineError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::cache::cache_exists;

    #[test]
    fn successful_tasks_produce_a_finished_cache() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            CacheTask::new("a.fdt", || Ok(b"one".to_vec())),
            CacheTask::new("b.fdt", || Ok(b"two".to_vec())),
        ];
        let handle = spawn_cache_build(dir.path().to_path_buf(), "font-tables", "ffxiv", tasks, Arc::new(NullProgressSink));
        let (mpl, mpd) = handle.join().unwrap();
        assert!(mpl.is_file());
        assert!(mpd.is_file());
        assert!(cache_exists(dir.path(), "font-tables"));
    }

    #[test]
    fn a_failing_task_is_skipped_but_the_build_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            CacheTask::new("a.fdt", || Ok(b"one".to_vec())),
            CacheTask::new("bad.fdt", || Err(OverlayError::FontConfig("boom".to_string()))),
        ];
        let handle = spawn_cache_build(dir.path().to_path_buf(), "font-tables", "ffxiv", tasks, Arc::new(NullProgressSink));
        let result = handle.join();
        assert!(result.is_ok());
    }

    #[test]
    fn every_task_failing_errors_and_discards_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![CacheTask::new("bad.fdt", || Err(OverlayError::FontConfig("boom".to_string())))];
        let handle = spawn_cache_build(dir.path().to_path_buf(), "font-tables", "ffxiv", tasks, Arc::new(NullProgressSink));
        let result = handle.join();
        assert!(result.is_err());
        assert!(!cache_exists(dir.path(), "font-tables"));
    }

    #[test]
    fn cancel_before_join_discards_the_partial_cache() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![CacheTask::new("a.fdt", || {
            std::thread::sleep(Duration::from_millis(50));
            Ok(b"one".to_vec())
        })];
        let handle = spawn_cache_build(dir.path().to_path_buf(), "font-tables", "ffxiv", tasks, Arc::new(NullProgressSink));
        handle.cancel();
        let result = handle.join();
        assert!(matches!(result, Err(EngineError::CancelledByUser)));
        assert!(!cache_exists(dir.path(), "font-tables"));
    }
}
