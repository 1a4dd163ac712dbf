//! Overlay sources (§5): the ordered set of places the engine pulls
//! additional or replacement entries from, each feeding the same
//! [`Creator`](crate::sqpack::creator::Creator) in increasing priority:
//!
//! 1. [`archive_root`] — other complete SqPack archives, merged wholesale.
//! 2. [`excel`] — the `0a0000` (Excel/string-table) category, merged
//!    non-destructively so a translation root can only add rows the base
//!    game doesn't already define structure for.
//! 3. [`ttmp`] — TexTools mod packs (`.ttmp2`).
//! 4. [`loose`] — a loose-file directory mirroring the virtual path tree.
//! 5. [`font`] — synthesized font tables from engine configuration.

pub mod archive_root;
pub mod cache;
pub mod excel;
pub mod font;
pub mod loose;
pub mod ttmp;

use thiserror::Error;

use crate::sqpack::creator::{AdditionsReport, Creator, CreatorError};
use crate::sqpack::entry::EntryError;
use crate::sqpack::reader::ReaderError;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("reading external archive: {0}")]
    ExternalArchive(#[from] ReaderError),
    #[error("creator rejected an overlay entry: {0}")]
    Creator(#[from] CreatorError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("font table config error: {0}")]
    FontConfig(String),
    #[error("encoding entry payload: {0}")]
    EntryEncoding(#[from] EntryError),
}

/// One overlay source, applied against a `Creator` in priority order.
pub trait OverlaySource {
    /// Short label for logging and `describe_state`-style diagnostics.
    fn name(&self) -> &str;

    fn apply(&self, creator: &mut Creator) -> Result<AdditionsReport, OverlayError>;
}

/// Applies a list of sources in order, summing their reports. A source
/// that errors out is logged and skipped; the remaining sources still run
/// (§7 "Local recovery" — per-source errors never abort the enclosing
/// acquisition, only the base triplet's own corruption does that).
pub fn apply_all(creator: &mut Creator, sources: &[Box<dyn OverlaySource>]) -> AdditionsReport {
    let mut total = AdditionsReport::default();
    for source in sources {
        match source.apply(creator) {
            Ok(report) => {
                total.added += report.added;
                total.replaced += report.replaced;
                total.skipped += report.skipped;
                log::debug!(
                    "overlay source '{}': +{} added, {} replaced, {} skipped",
                    source.name(),
                    report.added,
                    report.replaced,
                    report.skipped
                );
            }
            Err(err) => {
                log::warn!("overlay source '{}' failed and was skipped: {err}", source.name());
            }
        }
    }
    total
}
