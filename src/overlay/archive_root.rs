//! External archive roots: other complete `.index`/`.index2`/`.dat{n}`
//! triplets merged wholesale, entry-for-entry, as zero-copy passthrough.

use std::path::PathBuf;

use super::{OverlayError, OverlaySource};
use crate::sqpack::creator::{AdditionsReport, Creator};
use crate::sqpack::reader::SqpackReader;

/// One external archive, opened once and merged on every `apply` call
/// (acquisitions are infrequent enough that re-merging a held-open reader
/// is cheap relative to reopening the files). Per spec default, external
/// roots never override an entry a higher-priority source already placed
/// (`replace_existing = false`); callers may still opt into overriding.
pub struct ArchiveRootSource {
    label: String,
    reader: SqpackReader,
    replace_existing: bool,
}

impl ArchiveRootSource {
    pub fn open(
        label: impl Into<String>,
        index_path: PathBuf,
        index2_path: PathBuf,
        data_paths: Vec<PathBuf>,
        replace_existing: bool,
    ) -> Result<Self, OverlayError> {
        let reader = SqpackReader::open(&index_path, &index2_path, &data_paths)?;
        Ok(Self {
            label: label.into(),
            reader,
            replace_existing,
        })
    }
}

impl OverlaySource for ArchiveRootSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn apply(&self, creator: &mut Creator) -> Result<AdditionsReport, OverlayError> {
        Ok(creator.add_entries_from_sqpack(&self.reader, self.replace_existing)?)
    }
}
