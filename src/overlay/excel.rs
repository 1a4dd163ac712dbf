//! The `0a0000` (Excel / string-table) merge special case.
//!
//! A translation or localization root typically carries only the string
//! columns of a sheet, not its structural or numeric ones — the reference
//! (base game) sheet still has to define row shape. Rather than decode the
//! EXH/EXD schema to merge per-column (out of scope for this pass, see
//! `DESIGN.md`), this source merges whole-sheet but never overrides a
//! sheet the base archive already defines: an Excel root can only add rows
//! for sheets missing from the base, not reshape existing ones.
//!
//! Per spec this merge should be cached into the same TTMP shape `font`
//! uses and re-ingested (§4.5 item 2). That round-trip needs a recoverable
//! `FullPath` per entry; the entries here come straight from a foreign
//! [`SqpackReader`]'s raw index, whose [`PathSpec`](crate::pathspec::PathSpec)
//! carries only the path/name hashes (see `PathSpec::from_raw_hashes`) —
//! hashing is one-way, so there is no textual path to write into the
//! cache's manifest. This source is left on the direct-insertion path
//! instead of routing through [`super::cache::CacheBuilder`]; see
//! `DESIGN.md` for the full reasoning.

use std::path::PathBuf;

use super::{OverlayError, OverlaySource};
use crate::sqpack::creator::{AdditionsReport, Creator};
use crate::sqpack::reader::SqpackReader;

pub struct ExcelMergeSource {
    label: String,
    reader: SqpackReader,
}

impl ExcelMergeSource {
    pub fn open(
        label: impl Into<String>,
        index_path: PathBuf,
        index2_path: PathBuf,
        data_paths: Vec<PathBuf>,
    ) -> Result<Self, OverlayError> {
        let reader = SqpackReader::open(&index_path, &index2_path, &data_paths)?;
        Ok(Self {
            label: label.into(),
            reader,
        })
    }
}

impl OverlaySource for ExcelMergeSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn apply(&self, creator: &mut Creator) -> Result<AdditionsReport, OverlayError> {
        // `replace_existing = false`: the reference sheet already in the
        // Creator (from the base archive or an earlier archive root) keeps
        // its row structure; this source only fills rows/sheets absent so far.
        Ok(creator.add_entries_from_sqpack(&self.reader, false)?)
    }
}
