//! Loose-file overlay source: a directory tree mirroring the virtual
//! archive's path structure. Every regular file under `root` becomes a
//! `MemoryBinary` entry keyed by its path relative to `root`, using forward
//! slashes regardless of host path separator.

use std::path::{Path, PathBuf};

use super::{OverlayError, OverlaySource};
use crate::pathspec::PathSpec;
use crate::provider::EntryProvider;
use crate::sqpack::creator::{AdditionsReport, Creator, InsertOutcome};

pub struct LooseFileSource {
    label: String,
    root: PathBuf,
}

impl LooseFileSource {
    pub fn new(label: impl Into<String>, root: PathBuf) -> Self {
        Self {
            label: label.into(),
            root,
        }
    }

    fn collect_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        if self.root.is_dir() {
            walk(&self.root, &mut out)?;
        }
        Ok(out)
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

impl OverlaySource for LooseFileSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn apply(&self, creator: &mut Creator) -> Result<AdditionsReport, OverlayError> {
        let mut report = AdditionsReport::default();
        for path in self.collect_files()? {
            let relative = path
                .strip_prefix(&self.root)
                .expect("collect_files only yields paths under root")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");

            // An unreadable loose file is a per-entry error (§7): log it
            // and move on rather than aborting the whole loose-file tree.
            let data = match std::fs::read(&path) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!("skipping unreadable loose file '{}': {err}", path.display());
                    report.skipped += 1;
                    continue;
                }
            };
            let spec = PathSpec::from_path(&relative);
            let provider = EntryProvider::MemoryBinary(std::sync::Arc::new(data));
            // Spec default for loose files is non-overriding: an entry
            // already contributed by an earlier overlay source wins.
            match creator.add_entry(spec, provider, false) {
                Ok(InsertOutcome::Added) => report.added += 1,
                Ok(InsertOutcome::Replaced) => report.replaced += 1,
                Ok(InsertOutcome::SkippedExisting) => report.skipped += 1,
                Err(err) => {
                    log::warn!("skipping loose file '{relative}': {err}");
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn walks_nested_directories_and_adds_entries() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("chara/weapon")).unwrap();
        std::fs::write(dir.path().join("chara/weapon/w1234.tex"), b"loose bytes").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top level").unwrap();

        let source = LooseFileSource::new("loose", dir.path().to_path_buf());
        let mut creator = Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(creator.len(), 2);
    }

    #[test]
    fn empty_root_is_not_an_error() {
        let dir = tempdir().unwrap();
        let source = LooseFileSource::new("loose", dir.path().join("does-not-exist"));
        let mut creator = Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 0);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("good.bin"), b"fine").unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing-target"), dir.path().join("broken.bin")).unwrap();

        let source = LooseFileSource::new("loose", dir.path().to_path_buf());
        let mut creator = Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(creator.len(), 1);
    }
}
