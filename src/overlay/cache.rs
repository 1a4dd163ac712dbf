//! TTMP cache writer (§6 "TTMP cache format"): serializes a generated
//! entry set to `TTMPL.mpl` + `TTMPD.mpd` under a configured cache
//! directory, atomically via `.tmp` + rename, so the result can be
//! re-ingested as an ordinary TTMP overlay on this and every later run
//! instead of being rebuilt from scratch.
//!
//! [`CacheBuilder::push`] takes its own lock per call, standing in for
//! `creator.write_mutex` (§5): several Background Builder tasks finishing
//! concurrently serialize their `TTMPD.mpd` append through here rather
//! than racing on the file offset.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use super::OverlayError;
use crate::sqpack::entry::encode_binary_entry;

#[derive(Serialize)]
struct MplLineOut<'a> {
    #[serde(rename = "FullPath")]
    full_path: &'a str,
    #[serde(rename = "ModOffset")]
    mod_offset: u64,
    #[serde(rename = "ModSize")]
    mod_size: u64,
    #[serde(rename = "DatFile")]
    dat_file: &'a str,
}

/// Final `(TTMPL.mpl, TTMPD.mpd)` paths a cache with this name would
/// occupy under `cache_dir`, whether or not it has been built yet.
pub fn cache_paths(cache_dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (cache_dir.join(format!("{name}.TTMPL.mpl")), cache_dir.join(format!("{name}.TTMPD.mpd")))
}

/// True when both halves of a named cache already exist on disk — the
/// "subsequent runs reuse the cache" case (§4.5 items 2 and 5).
pub fn cache_exists(cache_dir: &Path, name: &str) -> bool {
    let (mpl, mpd) = cache_paths(cache_dir, name);
    mpl.is_file() && mpd.is_file()
}

/// Accumulates entries for one cache build. Entries may be pushed from
/// multiple threads; the manifest and payload file are only renamed into
/// place on [`finish`](Self::finish), so a reader never observes a
/// half-written cache.
pub struct CacheBuilder {
    mpd_tmp: Mutex<(File, u64)>,
    mpl_lines: Mutex<Vec<u8>>,
    mpl_tmp_path: PathBuf,
    mpd_tmp_path: PathBuf,
    mpl_final_path: PathBuf,
    mpd_final_path: PathBuf,
    dat_file_label: String,
}

impl CacheBuilder {
    pub fn create(cache_dir: &Path, name: &str, dat_file_label: impl Into<String>) -> Result<Self, OverlayError> {
        std::fs::create_dir_all(cache_dir)?;
        let (mpl_final_path, mpd_final_path) = cache_paths(cache_dir, name);
        let mpl_tmp_path = mpl_final_path.with_extension("mpl.tmp");
        let mpd_tmp_path = mpd_final_path.with_extension("mpd.tmp");
        let mpd_file = File::create(&mpd_tmp_path)?;
        Ok(Self {
            mpd_tmp: Mutex::new((mpd_file, 0)),
            mpl_lines: Mutex::new(Vec::new()),
            mpl_tmp_path,
            mpd_tmp_path,
            mpl_final_path,
            mpd_final_path,
            dat_file_label: dat_file_label.into(),
        })
    }

    /// Encode `raw_bytes` into archive-entry framing and append it to the
    /// in-progress `TTMPD.mpd`, recording its manifest line. Safe to call
    /// concurrently — callers don't need their own locking.
    pub fn push(&self, full_path: &str, raw_bytes: &[u8]) -> Result<(), OverlayError> {
        let encoded = encode_binary_entry(raw_bytes)?;

        let offset = {
            let mut mpd = self.mpd_tmp.lock().expect("cache mpd mutex poisoned");
            let offset = mpd.1;
            mpd.0.write_all(&encoded)?;
            mpd.1 += encoded.len() as u64;
            offset
        };

        let line = serde_json::to_string(&MplLineOut {
            full_path,
            mod_offset: offset,
            mod_size: encoded.len() as u64,
            dat_file: &self.dat_file_label,
        })
        .expect("MplLineOut has no non-serializable fields");

        let mut lines = self.mpl_lines.lock().expect("cache mpl-lines mutex poisoned");
        lines.extend_from_slice(line.as_bytes());
        lines.push(b'\n');
        Ok(())
    }

    /// Flush the manifest and atomically rename both halves into place.
    pub fn finish(self) -> Result<(PathBuf, PathBuf), OverlayError> {
        {
            let mpd = self.mpd_tmp.lock().expect("cache mpd mutex poisoned");
            mpd.0.sync_all()?;
        }
        std::fs::write(&self.mpl_tmp_path, &*self.mpl_lines.lock().expect("cache mpl-lines mutex poisoned"))?;
        std::fs::rename(&self.mpl_tmp_path, &self.mpl_final_path)?;
        std::fs::rename(&self.mpd_tmp_path, &self.mpd_final_path)?;
        Ok((self.mpl_final_path, self.mpd_final_path))
    }

    /// Abandon the build: remove the partial `.tmp` files rather than
    /// renaming them (cancellation, or zero surviving tasks).
    pub fn discard(self) {
        let _ = std::fs::remove_file(&self.mpl_tmp_path);
        let _ = std::fs::remove_file(&self.mpd_tmp_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::ttmp::TtmpSource;
    use tempfile::tempdir;

    #[test]
    fn finish_produces_a_reingestible_ttmp_pack() {
        let dir = tempdir().unwrap();
        let builder = CacheBuilder::create(dir.path(), "font-tables", "ffxiv").unwrap();
        builder.push("common/font/font_table.fdt", b"table one").unwrap();
        builder.push("common/font/font_table_jp.fdt", b"table two").unwrap();
        let (mpl_path, mpd_path) = builder.finish().unwrap();

        assert!(cache_exists(dir.path(), "font-tables"));
        let source = TtmpSource::open_from_extracted("cache", mpl_path, mpd_path).unwrap();
        assert_eq!(source.entries().len(), 2);

        let mut creator = crate::sqpack::creator::Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 2);
    }

    #[test]
    fn discard_leaves_no_final_files_behind() {
        let dir = tempdir().unwrap();
        let builder = CacheBuilder::create(dir.path(), "font-tables", "ffxiv").unwrap();
        builder.push("common/font/font_table.fdt", b"table").unwrap();
        builder.discard();

        assert!(!cache_exists(dir.path(), "font-tables"));
        assert!(!dir.path().join("font-tables.TTMPL.mpl.tmp").exists());
        assert!(!dir.path().join("font-tables.TTMPD.mpd.tmp").exists());
    }
}
