//! Generated font table overlay source (§4.5 item 5).
//!
//! Encodes a small fixed-record binary format per table (not the game's
//! own font-table format bit-for-bit — see `DESIGN.md`'s Open Question on
//! font table fidelity): a 4-byte magic, a `u32` row count, then
//! `size_of::<FontTableRow>()` bytes per row. Per spec, the generated
//! tables are serialized into the same TTMP cache shape the Excel merge
//! uses and re-ingested as an ordinary TTMP overlay rather than inserted
//! into the Creator directly — `apply` builds the cache on first use and
//! reuses it (unchanged on disk) on every run after.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::cache::{cache_exists, cache_paths, CacheBuilder};
use super::ttmp::TtmpSource;
use super::{OverlayError, OverlaySource};
use crate::sqpack::creator::{AdditionsReport, Creator};

pub const FONT_TABLE_MAGIC: &[u8; 4] = b"FDT1";
const NAME_FIELD_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontTableRow {
    pub name: String,
    pub size_pt: f32,
    pub ascent: f32,
    pub descent: f32,
    pub line_height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontTableDefinition {
    /// Virtual path the encoded table is inserted at, e.g.
    /// `"common/font/font_table.fdt"`.
    pub virtual_path: String,
    pub rows: Vec<FontTableRow>,
}

pub fn encode_font_table(def: &FontTableDefinition) -> Result<Vec<u8>, OverlayError> {
    let mut out = Vec::with_capacity(8 + def.rows.len() * (NAME_FIELD_LEN + 16));
    out.extend_from_slice(FONT_TABLE_MAGIC);
    out.extend_from_slice(&(def.rows.len() as u32).to_le_bytes());

    for row in &def.rows {
        if row.name.len() > NAME_FIELD_LEN {
            return Err(OverlayError::FontConfig(format!(
                "font name '{}' exceeds {NAME_FIELD_LEN} bytes",
                row.name
            )));
        }
        let mut name_field = [0u8; NAME_FIELD_LEN];
        name_field[..row.name.len()].copy_from_slice(row.name.as_bytes());
        out.extend_from_slice(&name_field);
        out.extend_from_slice(&row.size_pt.to_le_bytes());
        out.extend_from_slice(&row.ascent.to_le_bytes());
        out.extend_from_slice(&row.descent.to_le_bytes());
        out.extend_from_slice(&row.line_height.to_le_bytes());
    }

    Ok(out)
}

pub const FONT_CACHE_NAME: &str = "font-tables";

pub struct FontSource {
    label: String,
    definitions: Vec<FontTableDefinition>,
    cache_dir: PathBuf,
}

impl FontSource {
    pub fn new(label: impl Into<String>, definitions: Vec<FontTableDefinition>, cache_dir: PathBuf) -> Self {
        Self {
            label: label.into(),
            definitions,
            cache_dir,
        }
    }
}

impl OverlaySource for FontSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn apply(&self, creator: &mut Creator) -> Result<AdditionsReport, OverlayError> {
        let (mpl_path, mpd_path) = if cache_exists(&self.cache_dir, FONT_CACHE_NAME) {
            cache_paths(&self.cache_dir, FONT_CACHE_NAME)
        } else {
            let builder = CacheBuilder::create(&self.cache_dir, FONT_CACHE_NAME, "ffxiv")?;
            for def in &self.definitions {
                match encode_font_table(def) {
                    Ok(encoded) => {
                        if let Err(err) = builder.push(&def.virtual_path, &encoded) {
                            log::warn!("font table '{}' could not be cached and was skipped: {err}", def.virtual_path);
                        }
                    }
                    Err(err) => {
                        log::warn!("font table '{}' failed to encode and was skipped: {err}", def.virtual_path);
                    }
                }
            }
            builder.finish()?
        };

        let cached = TtmpSource::open_from_extracted(format!("{}-cache", self.label), mpl_path, mpd_path)?;
        cached.apply(creator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn encodes_rows_in_order() {
        let def = FontTableDefinition {
            virtual_path: "common/font/font_table.fdt".to_string(),
            rows: vec![FontTableRow {
                name: "AXIS_12".to_string(),
                size_pt: 12.0,
                ascent: 10.0,
                descent: 2.0,
                line_height: 14.0,
            }],
        };
        let encoded = encode_font_table(&def).unwrap();
        assert_eq!(&encoded[0..4], FONT_TABLE_MAGIC);
        assert_eq!(u32::from_le_bytes(encoded[4..8].try_into().unwrap()), 1);
    }

    #[test]
    fn rejects_overlong_name() {
        let def = FontTableDefinition {
            virtual_path: "common/font/font_table.fdt".to_string(),
            rows: vec![FontTableRow {
                name: "x".repeat(64),
                size_pt: 1.0,
                ascent: 1.0,
                descent: 1.0,
                line_height: 1.0,
            }],
        };
        assert!(encode_font_table(&def).is_err());
    }

    #[test]
    fn apply_inserts_one_entry_per_definition() {
        let defs = vec![
            FontTableDefinition {
                virtual_path: "common/font/font_table.fdt".to_string(),
                rows: vec![],
            },
            FontTableDefinition {
                virtual_path: "common/font/font_table_jp.fdt".to_string(),
                rows: vec![],
            },
        ];
        let dir = tempdir().unwrap();
        let source = FontSource::new("font", defs, dir.path().to_path_buf());
        let mut creator = Creator::new(Default::default());
        let report = source.apply(&mut creator).unwrap();
        assert_eq!(report.added, 2);
    }

    #[test]
    fn second_apply_reuses_the_existing_cache() {
        let defs = vec![FontTableDefinition {
            virtual_path: "common/font/font_table.fdt".to_string(),
            rows: vec![],
        }];
        let dir = tempdir().unwrap();
        let source = FontSource::new("font", defs, dir.path().to_path_buf());

        let mut creator = Creator::new(Default::default());
        source.apply(&mut creator).unwrap();
        let (mpl_path, _) = cache_paths(dir.path(), FONT_CACHE_NAME);
        let first_build_time = std::fs::metadata(&mpl_path).unwrap().modified().unwrap();

        let mut creator2 = Creator::new(Default::default());
        let report = source.apply(&mut creator2).unwrap();
        assert_eq!(report.added, 1);
        let second_build_time = std::fs::metadata(&mpl_path).unwrap().modified().unwrap();
        assert_eq!(first_build_time, second_build_time, "cache should not be rebuilt on the second apply");
    }
}
