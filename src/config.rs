//! `EngineConfig` (§6): declarative description of one acquisition — the
//! base archive plus every overlay source, in application order — and the
//! `serde_json`-backed loader that builds a frozen [`SqpackViews`] from it.
//!
//! This is the single place outside `main.rs` that wires the Creator, the
//! overlay sources, and the View Assembler together; the Handle Table
//! calls through here once per archive it needs a virtual view of.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::overlay::archive_root::ArchiveRootSource;
use crate::overlay::excel::ExcelMergeSource;
use crate::overlay::font::FontTableDefinition;
use crate::overlay::loose::LooseFileSource;
use crate::overlay::ttmp::{discover_mod_packs, TtmpSource};
use crate::overlay::{self, OverlaySource};
use crate::sqpack::creator::{AdditionsReport, Creator, CreatorLimits};
use crate::sqpack::reader::SqpackReader;
use crate::views::SqpackViews;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveTripletConfig {
    pub label: String,
    pub index_path: PathBuf,
    pub index2_path: PathBuf,
    pub data_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtmpPackConfig {
    pub label: String,
    pub mpl_path: PathBuf,
    pub mpd_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub base_archive: ArchiveTripletConfig,
    #[serde(default)]
    pub archive_roots: Vec<ArchiveTripletConfig>,
    #[serde(default)]
    pub excel_roots: Vec<ArchiveTripletConfig>,
    #[serde(default)]
    pub ttmp_packs: Vec<TtmpPackConfig>,
    #[serde(default)]
    pub loose_file_roots: Vec<PathBuf>,
    #[serde(default)]
    pub font_tables: Vec<FontTableDefinition>,
    /// Per-span byte ceiling; defaults to `DEFAULT_MAX_FILE_SIZE` when unset.
    #[serde(default)]
    pub max_file_size: Option<u64>,

    /// Extra mod-pack directories to recursively scan for `TTMPL.mpl`
    /// (§4.5 item 3), in addition to `ttmp_packs`'s explicit entries.
    #[serde(default)]
    pub additional_modpack_directories: Vec<PathBuf>,
    /// Also scan `{archive_parent_parent}/TexToolsMods` and
    /// `{config_dir}/TexToolsMods`.
    #[serde(default)]
    pub use_default_modpack_dir: bool,
    /// Extra loose-file roots searched at `{root}/{expac}/{name}` and
    /// `{root}/{expac}.win32/{name}` (§4.5 item 4), in addition to
    /// `loose_file_roots`'s literal directories.
    #[serde(default)]
    pub additional_loose_root_directories: Vec<PathBuf>,
    /// Also search `{archive_parent_parent}` and
    /// `{config_dir}/ReplacementFileEntries`.
    #[serde(default)]
    pub use_default_loose_root_directory: bool,
    /// Directory the Excel merge and font overlays cache their generated
    /// TTMP packs under (§4.5 items 2 and 5). Also scanned by
    /// `use_default_modpack_dir`'s config-relative neighbor, but never by
    /// the generic mod-pack scan itself — the cache packs self-ingest from
    /// inside `ExcelMergeSource`/`FontSource`, so scanning it too would
    /// ingest them a second time as plain TTMP packs.
    #[serde(default)]
    pub cache_dir: PathBuf,
    /// Directory holding this config file, used to resolve the
    /// config-relative defaults above. `None` disables them.
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
}

/// §4.4 step 1: "Construct a Creator seeded with `(expac =
/// index_path.parent.name, name = index_path.stem.stem)`."
fn expac_and_name(index_path: &std::path::Path) -> (String, String) {
    let expac = index_path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = index_path
        .file_stem()
        .map(std::path::Path::new)
        .and_then(|p| p.file_stem())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (expac, name)
}

impl EngineConfig {
    pub fn load_from_file(path: &std::path::Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(EngineError::OsIoError)?;
        serde_json::from_str(&text).map_err(|e| EngineError::Config(e.to_string()))
    }

    fn creator_limits(&self) -> EngineResult<CreatorLimits> {
        let max = self.max_file_size.unwrap_or(crate::sqpack::DEFAULT_MAX_FILE_SIZE);
        Ok(CreatorLimits::new(max)?)
    }

    pub(crate) fn overlay_sources(&self) -> EngineResult<Vec<Box<dyn OverlaySource>>> {
        let mut sources: Vec<Box<dyn OverlaySource>> = Vec::new();

        for root in &self.archive_roots {
            if !root.index_path.exists() || !root.index2_path.exists() {
                log::debug!("skipping configured archive root '{}': triplet not present on disk", root.label);
                continue;
            }
            sources.push(Box::new(ArchiveRootSource::open(
                root.label.clone(),
                root.index_path.clone(),
                root.index2_path.clone(),
                root.data_paths.clone(),
                false,
            )?));
        }
        for root in &self.excel_roots {
            sources.push(Box::new(ExcelMergeSource::open(
                root.label.clone(),
                root.index_path.clone(),
                root.index2_path.clone(),
                root.data_paths.clone(),
            )?));
        }
        for pack in &self.ttmp_packs {
            sources.push(Box::new(TtmpSource::open_from_extracted(
                pack.label.clone(),
                pack.mpl_path.clone(),
                pack.mpd_path.clone(),
            )?));
        }
        for (i, (mpl_path, mpd_path)) in discover_mod_packs(&self.modpack_scan_roots()).into_iter().enumerate() {
            sources.push(Box::new(TtmpSource::open_from_extracted(
                format!("modpack-{i}"),
                mpl_path,
                mpd_path,
            )?));
        }
        for (i, root) in self.loose_file_roots.iter().enumerate() {
            sources.push(Box::new(LooseFileSource::new(
                format!("loose-{i}"),
                root.clone(),
            )));
        }
        for (i, root) in self.additional_loose_root_directories.iter().enumerate() {
            let (expac, name) = expac_and_name(&self.base_archive.index_path);
            sources.push(Box::new(LooseFileSource::new(
                format!("loose-extra-{i}a"),
                root.join(&expac).join(&name),
            )));
            sources.push(Box::new(LooseFileSource::new(
                format!("loose-extra-{i}b"),
                root.join(format!("{expac}.win32")).join(&name),
            )));
        }
        if self.use_default_loose_root_directory {
            if let Some(parent_parent) = self.base_archive.index_path.parent().and_then(|p| p.parent()) {
                sources.push(Box::new(LooseFileSource::new(
                    "loose-default-archive-parent",
                    parent_parent.to_path_buf(),
                )));
            }
            if let Some(config_dir) = &self.config_dir {
                sources.push(Box::new(LooseFileSource::new(
                    "loose-default-config-replacement-entries",
                    config_dir.join("ReplacementFileEntries"),
                )));
            }
        }
        if !self.font_tables.is_empty() {
            sources.push(Box::new(crate::overlay::font::FontSource::new(
                "font-tables",
                self.font_tables.clone(),
                self.cache_dir.clone(),
            )));
        }

        Ok(sources)
    }

    /// Directories the generic mod-pack scan recurses into: configured
    /// `additional_modpack_directories` plus, when enabled, the two
    /// default neighbors (§6). `cache_dir` is deliberately excluded — see
    /// its doc comment.
    fn modpack_scan_roots(&self) -> Vec<PathBuf> {
        let mut roots = self.additional_modpack_directories.clone();
        if self.use_default_modpack_dir {
            if let Some(parent_parent) = self.base_archive.index_path.parent().and_then(|p| p.parent()) {
                roots.push(parent_parent.join("TexToolsMods"));
            }
            if let Some(config_dir) = &self.config_dir {
                roots.push(config_dir.join("TexToolsMods"));
            }
        }
        roots
    }

    /// Run one full acquisition: open the base archive, seed the Creator,
    /// apply every overlay source in order, and freeze.
    pub fn build(&self) -> EngineResult<SqpackViews> {
        let base = SqpackReader::open(
            &self.base_archive.index_path,
            &self.base_archive.index2_path,
            &self.base_archive.data_paths,
        )?;

        let mut creator = Creator::new(self.creator_limits()?);
        creator.add_entries_from_sqpack(&base, true)?;

        let sources = self.overlay_sources()?;
        overlay::apply_all(&mut creator, &sources);

        Ok(creator.freeze()?)
    }

    /// Same acquisition as [`build`](Self::build), but reports `None`
    /// instead of a views set when no overlay source contributed any
    /// addition or replacement (§4.4 step 4) — the caller blacklists the
    /// index path on `None` rather than ever re-attempting it.
    pub fn build_if_contributing(&self) -> EngineResult<Option<SqpackViews>> {
        let base = SqpackReader::open(
            &self.base_archive.index_path,
            &self.base_archive.index2_path,
            &self.base_archive.data_paths,
        )?;

        let mut creator = Creator::new(self.creator_limits()?);
        creator.add_entries_from_sqpack(&base, true)?;

        let sources = self.overlay_sources()?;
        let report = overlay::apply_all(&mut creator, &sources);
        if report.added == 0 && report.replaced == 0 {
            return Ok(None);
        }
        Ok(Some(creator.freeze()?))
    }

    /// Like [`build`](Self::build), but also returns the aggregated
    /// per-source report — used by the `sqvoe freeze` diagnostic command.
    pub fn build_with_report(&self) -> EngineResult<(SqpackViews, AdditionsReport)> {
        let base = SqpackReader::open(
            &self.base_archive.index_path,
            &self.base_archive.index2_path,
            &self.base_archive.data_paths,
        )?;

        let mut creator = Creator::new(self.creator_limits()?);
        creator.add_entries_from_sqpack(&base, true)?;

        let sources = self.overlay_sources()?;
        let report = overlay::apply_all(&mut creator, &sources);
        Ok((creator.freeze()?, report))
    }

    /// Like [`build_if_contributing`](Self::build_if_contributing), but
    /// also returns the aggregated report — used by the `sqvoe acquire`
    /// diagnostic command to show *why* a triplet would or wouldn't be
    /// blacklisted.
    pub fn build_if_contributing_with_report(
        &self,
    ) -> EngineResult<(Option<SqpackViews>, AdditionsReport)> {
        let base = SqpackReader::open(
            &self.base_archive.index_path,
            &self.base_archive.index2_path,
            &self.base_archive.data_paths,
        )?;

        let mut creator = Creator::new(self.creator_limits()?);
        creator.add_entries_from_sqpack(&base, true)?;

        let sources = self.overlay_sources()?;
        let report = overlay::apply_all(&mut creator, &sources);
        if report.added == 0 && report.replaced == 0 {
            return Ok((None, report));
        }
        Ok((Some(creator.freeze()?), report))
    }
}
