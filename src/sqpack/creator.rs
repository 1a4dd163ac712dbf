//! The Creator (§4.4): accumulates `(PathSpec, EntryProvider)` pairs from
//! the base archive and every overlay source in priority order, enforcing
//! invariant I1 (unique identity per `PathSpec`) before handing the set to
//! the View Assembler via [`Creator::freeze`].

use std::collections::HashMap;

use thiserror::Error;

use super::reader::{ReaderError, SqpackReader};
use crate::pathspec::PathSpec;
use crate::provider::EntryProvider;
use crate::views::{self, SqpackViews, ViewAssemblyError};

#[derive(Error, Debug)]
pub enum CreatorError {
    #[error(
        "PathSpec for {new} collides with an existing entry under one key form but not the \
         other ({existing}) — same hash, different identity"
    )]
    HashCollision { new: String, existing: String },
    #[error("per-span size limit {limit} exceeds the archive format's hard ceiling {hard_max}")]
    LimitExceedsFormat { limit: u64, hard_max: u64 },
    #[error("reading source archive: {0}")]
    Source(#[from] ReaderError),
    #[error("assembling views: {0}")]
    Assembly(#[from] ViewAssemblyError),
}

/// Per-span size ceiling the Creator packs entries against. Bounded above
/// by the format's hard limit (see `HARD_MAX_FILE_SIZE`).
#[derive(Debug, Clone, Copy)]
pub struct CreatorLimits {
    pub max_file_size: u64,
}

impl CreatorLimits {
    pub fn new(max_file_size: u64) -> Result<Self, CreatorError> {
        if max_file_size > super::HARD_MAX_FILE_SIZE {
            return Err(CreatorError::LimitExceedsFormat {
                limit: max_file_size,
                hard_max: super::HARD_MAX_FILE_SIZE,
            });
        }
        Ok(Self { max_file_size })
    }
}

impl Default for CreatorLimits {
    fn default() -> Self {
        Self {
            max_file_size: super::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    Replaced,
    SkippedExisting,
}

/// Summary of a bulk passthrough insert, e.g. from `add_entries_from_sqpack`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdditionsReport {
    pub added: usize,
    pub replaced: usize,
    pub skipped: usize,
}

impl AdditionsReport {
    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Added => self.added += 1,
            InsertOutcome::Replaced => self.replaced += 1,
            InsertOutcome::SkippedExisting => self.skipped += 1,
        }
    }
}

/// Accumulates the virtual archive's entry set. Overlay sources are fed in
/// ascending priority order; each call decides, via `replace_existing`,
/// whether a later source may shadow an earlier one's entry at the same
/// path.
pub struct Creator {
    limits: CreatorLimits,
    entries: Vec<(PathSpec, EntryProvider)>,
    by_index_key: HashMap<(u32, u32), usize>,
    by_full_hash: HashMap<u32, usize>,
}

impl Creator {
    pub fn new(limits: CreatorLimits) -> Self {
        Self {
            limits,
            entries: Vec::new(),
            by_index_key: HashMap::new(),
            by_full_hash: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or update one entry. `replace_existing` controls what
    /// happens when `spec` already identifies an entry in this Creator;
    /// when `false` the existing entry wins and `SkippedExisting` is
    /// returned, letting overlay sources add entries only where none yet
    /// exist (used by the loose-file and font-table sources, which are
    /// additive rather than overriding).
    pub fn add_entry(
        &mut self,
        spec: PathSpec,
        provider: EntryProvider,
        replace_existing: bool,
    ) -> Result<InsertOutcome, CreatorError> {
        let by_index = self.by_index_key.get(&spec.index_key()).copied();
        let by_full = self.by_full_hash.get(&spec.full_path_hash).copied();

        match (by_index, by_full) {
            (Some(a), Some(b)) if a == b => {
                if replace_existing {
                    self.entries[a] = (spec, provider);
                    Ok(InsertOutcome::Replaced)
                } else {
                    Ok(InsertOutcome::SkippedExisting)
                }
            }
            (None, None) => {
                let idx = self.entries.len();
                self.by_index_key.insert(spec.index_key(), idx);
                self.by_full_hash.insert(spec.full_path_hash, idx);
                self.entries.push((spec, provider));
                Ok(InsertOutcome::Added)
            }
            (existing_idx, _) => {
                let existing = existing_idx
                    .or(by_full)
                    .map(|i| self.entries[i].0.original_path.clone())
                    .unwrap_or_else(|| "<unknown>".to_string());
                Err(CreatorError::HashCollision {
                    new: spec.original_path,
                    existing,
                })
            }
        }
    }

    /// Bulk-insert every entry from an already-opened archive as
    /// zero-copy passthrough providers. Used to seed the Creator from the
    /// base archive and from each external-archive overlay source.
    ///
    /// A hash collision or a locator that fails to resolve is a per-entry
    /// error: it's logged and that one entry is skipped, the rest of the
    /// archive still ingests (§7 "Local recovery").
    pub fn add_entries_from_sqpack(
        &mut self,
        reader: &SqpackReader,
        replace_existing: bool,
    ) -> Result<AdditionsReport, CreatorError> {
        let mut report = AdditionsReport::default();

        // The two-hash index carries (path_hash, name_hash); pair it with
        // the matching one-hash entry (by locator, since both directories
        // describe the same underlying entries) to recover full_path_hash.
        let mut by_locator: HashMap<u32, u32> = HashMap::new();
        for e in &reader.one_hash_entries {
            by_locator.insert(e.locator.raw(), e.full_path_hash);
        }

        for two in &reader.two_hash_entries {
            let full_path_hash = *by_locator.get(&two.locator.raw()).unwrap_or(&0);
            let spec = PathSpec::from_raw_hashes(two.path_hash, two.name_hash, full_path_hash);
            let (source, offset, length) = match reader.raw_entry_extent(two.locator) {
                Ok(extent) => extent,
                Err(err) => {
                    log::warn!("skipping entry at locator {:?}: {err}", two.locator);
                    report.skipped += 1;
                    continue;
                }
            };
            let provider = EntryProvider::passthrough(source, offset, length);
            match self.add_entry(spec, provider, replace_existing) {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    log::warn!("skipping colliding entry: {err}");
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Freeze the accumulated entry set into read-only views. Consumes
    /// nothing — the Creator can keep accumulating after a freeze, though
    /// in practice the engine freezes once per acquisition.
    pub fn freeze(&self) -> Result<SqpackViews, CreatorError> {
        Ok(views::assemble(&self.entries, self.limits.max_file_size)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn add_entry_reports_added_then_replaced() {
        let mut c = Creator::new(CreatorLimits::default());
        let spec = PathSpec::from_path("a/b.txt");
        let outcome1 = c
            .add_entry(spec.clone(), EntryProvider::MemoryBinary(Arc::new(b"v1".to_vec())), true)
            .unwrap();
        assert_eq!(outcome1, InsertOutcome::Added);

        let outcome2 = c
            .add_entry(spec, EntryProvider::MemoryBinary(Arc::new(b"v2".to_vec())), true)
            .unwrap();
        assert_eq!(outcome2, InsertOutcome::Replaced);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn add_entry_skips_when_not_replacing() {
        let mut c = Creator::new(CreatorLimits::default());
        let spec = PathSpec::from_path("a/b.txt");
        c.add_entry(spec.clone(), EntryProvider::Empty, true).unwrap();
        let outcome = c.add_entry(spec, EntryProvider::Empty, false).unwrap();
        assert_eq!(outcome, InsertOutcome::SkippedExisting);
    }

    #[test]
    fn limits_reject_values_beyond_the_format_ceiling() {
        let err = CreatorLimits::new(super::super::HARD_MAX_FILE_SIZE + 1).unwrap_err();
        assert!(matches!(err, CreatorError::LimitExceedsFormat { .. }));
    }

    #[test]
    fn freeze_produces_views_for_accumulated_entries() {
        let mut c = Creator::new(CreatorLimits::default());
        c.add_entry(
            PathSpec::from_path("a/b.txt"),
            EntryProvider::MemoryBinary(Arc::new(b"hello".to_vec())),
            true,
        )
        .unwrap();
        let views = c.freeze().unwrap();
        assert_eq!(views.data_spans.len(), 1);
    }
}
