//! [`PathSpec`] — the canonical key for an archive entry.
//!
//! Carries the original textual path plus the three hashes the two index
//! schemes need: `name_hash` (basename folded), `path_hash` (parent folder
//! folded) and `full_path_hash` (whole path folded). Two `PathSpec`s are
//! equal when either `full_path_hash` matches, or both `path_hash` and
//! `name_hash` match — this dual key is what lets `.index` (two-hash) and
//! `.index2` (one-hash) agree on identity. Case-insensitive, forward-slash
//! normalized.

use crate::hash::{jenkins_one_at_a_time, normalize_path, split_parent_basename};

#[derive(Debug, Clone)]
pub struct PathSpec {
    pub original_path: String,
    pub name_hash: u32,
    pub path_hash: u32,
    pub full_path_hash: u32,
}

impl PathSpec {
    pub fn from_path(path: &str) -> Self {
        let normalized = normalize_path(path);
        let (parent, name) = split_parent_basename(&normalized);
        Self {
            name_hash: jenkins_one_at_a_time(name.as_bytes()),
            path_hash: jenkins_one_at_a_time(parent.as_bytes()),
            full_path_hash: jenkins_one_at_a_time(normalized.as_bytes()),
            original_path: normalized,
        }
    }

    /// Build a `PathSpec` from hashes alone, with no recoverable textual
    /// path — the shape a passthrough read from an existing archive's
    /// index arrives in, since SqPack directories only ever store hashes.
    pub fn from_raw_hashes(path_hash: u32, name_hash: u32, full_path_hash: u32) -> Self {
        Self {
            original_path: format!("<hash:{path_hash:08x}-{name_hash:08x}>"),
            name_hash,
            path_hash,
            full_path_hash,
        }
    }

    /// Key form used by `.index` (two-hash directory).
    pub fn index_key(&self) -> (u32, u32) {
        (self.path_hash, self.name_hash)
    }

    /// Key form used by `.index2` (one-hash directory).
    pub fn index2_key(&self) -> u32 {
        self.full_path_hash
    }

    /// True when `self` and `other` identify the same entry under either
    /// key form (§3's dual-key equality).
    pub fn matches(&self, other: &PathSpec) -> bool {
        self.full_path_hash == other.full_path_hash || self.index_key() == other.index_key()
    }

    /// True when the two specs share one key form but disagree on the
    /// other — a hash collision the Creator must reject rather than
    /// silently merge (§4.4 "PathSpec collisions across non-equivalent
    /// keys").
    pub fn collides_without_matching(&self, other: &PathSpec) -> bool {
        let same_full = self.full_path_hash == other.full_path_hash;
        let same_index = self.index_key() == other.index_key();
        same_full != same_index
    }
}
