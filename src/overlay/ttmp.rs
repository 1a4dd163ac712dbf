//! TexTools mod pack overlay source.
//!
//! A `.ttmp2` pack is a zip containing `TTMPL.mpl` (one JSON object per
//! line describing a mod entry: virtual path, byte offset and length into
//! `TTMPD.mpd`) and `TTMPD.mpd` (the concatenated, already SqPack-entry-
//! framed payloads). Unpacking the zip container itself is left to the
//! caller (or a future overlay source wrapping the `zip` crate); this
//! source consumes the two files already extracted to disk, which is
//! exactly the shape TexTools leaves behind after an in-place install.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::{OverlayError, OverlaySource};
use crate::pathspec::PathSpec;
use crate::provider::EntryProvider;
use crate::sqpack::creator::{AdditionsReport, Creator, InsertOutcome};
use crate::stream::{FileRegionStream, RandomAccessStream};

#[derive(Debug, Deserialize)]
struct MplLine {
    #[serde(rename = "FullPath")]
    full_path: String,
    #[serde(rename = "ModOffset")]
    mod_offset: u64,
    #[serde(rename = "ModSize")]
    mod_size: u64,
    /// Present on packs this engine's own cache writer produced; absent
    /// from most third-party `.ttmp2` manifests, so it's optional here.
    #[serde(rename = "DatFile", default)]
    #[allow(dead_code)]
    dat_file: Option<String>,
}

/// Recursively finds every `TTMPL.mpl` under `roots` (§4.5 item 3: "for each
/// configured mod-pack directory ... recursively find every `TTMPL.mpl`").
/// A directory containing a `disable` sentinel file is skipped entirely, and
/// results are returned in lexicographic path order so application order is
/// deterministic across runs. Each `TTMPL.mpl` is paired with the sibling
/// `TTMPD.mpd` in the same directory; a pack missing its `.mpd` is logged
/// and skipped rather than failing the whole scan.
pub fn discover_mod_packs(roots: &[PathBuf]) -> Vec<(PathBuf, PathBuf)> {
    let mut mpls = Vec::new();
    for root in roots {
        walk_for_mpl(root, &mut mpls);
    }
    mpls.sort();
    mpls.into_iter()
        .filter_map(|mpl_path| {
            let mpd_path = mpl_path.with_file_name("TTMPD.mpd");
            if mpd_path.is_file() {
                Some((mpl_path, mpd_path))
            } else {
                log::warn!("skipping mod pack '{}': no sibling TTMPD.mpd", mpl_path.display());
                None
            }
        })
        .collect()
}

fn walk_for_mpl(dir: &std::path::Path, out: &mut Vec<PathBuf>) {
    if dir.join("disable").exists() {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(err) => {
            log::warn!("skipping mod pack directory '{}': {err}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_for_mpl(&path, out);
        } else if path.file_name().and_then(|n| n.to_str()) == Some("TTMPL.mpl") {
            out.push(path);
        }
    }
}

pub struct TtmpModEntry {
    pub full_path: String,
    pub mod_offset: u64,
    pub mod_size: u64,
}

pub struct TtmpSource {
    label: String,
    entries: Vec<TtmpModEntry>,
    mpd_file: Arc<File>,
}

impl TtmpSource {
    pub fn open_from_extracted(
        label: impl Into<String>,
        mpl_path: PathBuf,
        mpd_path: PathBuf,
    ) -> Result<Self, OverlayError> {
        let mpl_text = std::fs::read_to_string(&mpl_path)?;
        let entries = parse_mpl(&mpl_text);
        let mpd_file = Arc::new(File::open(&mpd_path)?);
        Ok(Self {
            label: label.into(),
            entries,
            mpd_file,
        })
    }

    pub fn entries(&self) -> &[TtmpModEntry] {
        &self.entries
    }
}

/// A malformed `.mpl` line is a per-entry error (§7): it's logged and
/// skipped, the rest of the manifest still parses.
fn parse_mpl(text: &str) -> Vec<TtmpModEntry> {
    let mut out = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<MplLine>(trimmed) {
            Ok(parsed) => out.push(TtmpModEntry {
                full_path: parsed.full_path,
                mod_offset: parsed.mod_offset,
                mod_size: parsed.mod_size,
            }),
            Err(e) => {
                log::warn!("skipping malformed TTMPL.mpl line {}: {e}", line_no + 1);
            }
        }
    }
    out
}

impl OverlaySource for TtmpSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn apply(&self, creator: &mut Creator) -> Result<AdditionsReport, OverlayError> {
        let mpd_len = self.mpd_file.metadata()?.len();
        let mut report = AdditionsReport::default();

        for entry in &self.entries {
            if entry.mod_offset + entry.mod_size > mpd_len {
                log::warn!(
                    "skipping TTMP entry '{}': extends past end of TTMPD.mpd",
                    entry.full_path
                );
                report.skipped += 1;
                continue;
            }
            let stream: Arc<dyn RandomAccessStream> = Arc::new(FileRegionStream::new(
                self.mpd_file.clone(),
                entry.mod_offset,
                entry.mod_size,
                entry.full_path.clone(),
            ));
            let spec = PathSpec::from_path(&entry.full_path);
            let provider = EntryProvider::passthrough(stream, 0, entry.mod_size);
            match creator.add_entry(spec, provider, true) {
                Ok(InsertOutcome::Added) => report.added += 1,
                Ok(InsertOutcome::Replaced) => report.replaced += 1,
                Ok(InsertOutcome::SkippedExisting) => report.skipped += 1,
                Err(err) => {
                    log::warn!("skipping TTMP entry '{}': {err}", entry.full_path);
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
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parses_and_applies_mpl_entries() {
        let dir = tempdir().unwrap();
        let mpd_path = dir.path().join("TTMPD.mpd");
        let mpl_path = dir.path().join("TTMPL.mpl");

        let payload = crate::sqpack::entry::encode_binary_entry(b"modded texture").unwrap();
        std::fs::write(&mpd_path, &payload).unwrap();

        let line = serde_json::json!({
            "FullPath": "chara/weapon/w1234.tex",
            "ModOffset": 0,
            "ModSize": payload.len(),
        });
        let mut f = File::create(&mpl_path).unwrap();
        writeln!(f, "{}", line).unwrap();

        let source = TtmpSource::open_from_extracted("test-pack", mpl_path, mpd_path).unwrap();
        let mut creator = Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(creator.len(), 1);
    }

    #[test]
    fn entry_extending_past_mpd_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let mpd_path = dir.path().join("TTMPD.mpd");
        let mpl_path = dir.path().join("TTMPL.mpl");
        std::fs::write(&mpd_path, b"short").unwrap();

        let line = serde_json::json!({
            "FullPath": "a/b.tex",
            "ModOffset": 0,
            "ModSize": 9999,
        });
        let mut f = File::create(&mpl_path).unwrap();
        writeln!(f, "{}", line).unwrap();

        let source = TtmpSource::open_from_extracted("bad-pack", mpl_path, mpd_path).unwrap();
        let mut creator = Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(creator.len(), 0);
    }

    #[test]
    fn discover_mod_packs_skips_disabled_and_sorts_lexicographically() {
        let dir = tempdir().unwrap();
        for name in ["zzz", "aaa", "disabled_pack"] {
            let sub = dir.path().join(name);
            std::fs::create_dir_all(&sub).unwrap();
            std::fs::write(sub.join("TTMPL.mpl"), "").unwrap();
            std::fs::write(sub.join("TTMPD.mpd"), "").unwrap();
        }
        std::fs::write(dir.path().join("disabled_pack").join("disable"), "").unwrap();

        let found = discover_mod_packs(&[dir.path().to_path_buf()]);
        let names: Vec<_> = found
            .iter()
            .map(|(mpl, _)| mpl.parent().unwrap().file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["aaa", "zzz"]);
    }

    #[test]
    fn discover_mod_packs_skips_pack_missing_mpd() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("incomplete");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("TTMPL.mpl"), "").unwrap();

        let found = discover_mod_packs(&[dir.path().to_path_buf()]);
        assert!(found.is_empty());
    }

    #[test]
    fn malformed_mpl_line_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let mpd_path = dir.path().join("TTMPD.mpd");
        let mpl_path = dir.path().join("TTMPL.mpl");

        let payload = crate::sqpack::entry::encode_binary_entry(b"modded texture").unwrap();
        std::fs::write(&mpd_path, &payload).unwrap();

        let good_line = serde_json::json!({
            "FullPath": "chara/weapon/w1234.tex",
            "ModOffset": 0,
            "ModSize": payload.len(),
        });
        let mut f = File::create(&mpl_path).unwrap();
        writeln!(f, "{}", good_line).unwrap();
        writeln!(f, "{{ not even valid json").unwrap();

        let source = TtmpSource::open_from_extracted("mixed-pack", mpl_path, mpd_path).unwrap();
        assert_eq!(source.entries().len(), 1);
        let mut creator = Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 1);
    }
}
