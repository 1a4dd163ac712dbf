//! Seek mode translation (§4.1 "Seek", §9 Open Questions).
//!
//! The source computes `end - distance` for a from-end seek rather than
//! `end + distance`; §9 flags this as probably-intended but worth testing
//! explicitly, so it is preserved here rather than "corrected".

/// The three seek origins a hook can be asked for, plus the raw mode
/// numbers an embedding host passes them as (mirroring a Win32
/// `SetFilePointer` call: `FILE_BEGIN = 0`, `FILE_CURRENT = 1`,
/// `FILE_END = 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    FromBegin(u64),
    FromCurrent(i64),
    FromEnd(i64),
}

pub const FILE_BEGIN: u32 = 0;
pub const FILE_CURRENT: u32 = 1;
pub const FILE_END: u32 = 2;

impl SeekMode {
    /// `None` on an unrecognized mode number — callers translate that to
    /// `ERROR_INVALID_PARAMETER`.
    pub fn from_raw(mode: u32, distance: i64) -> Option<Self> {
        match mode {
            FILE_BEGIN => Some(SeekMode::FromBegin(distance.max(0) as u64)),
            FILE_CURRENT => Some(SeekMode::FromCurrent(distance)),
            FILE_END => Some(SeekMode::FromEnd(distance)),
            _ => None,
        }
    }

    /// Resolve against a handle's current cursor and stream size, clamping
    /// to `[0, stream_size]`.
    pub fn resolve(self, cursor: u64, stream_size: u64) -> u64 {
        let target: i128 = match self {
            SeekMode::FromBegin(offset) => offset as i128,
            SeekMode::FromCurrent(delta) => cursor as i128 + delta as i128,
            // Preserves the source's `end - distance` arithmetic.
            SeekMode::FromEnd(distance) => stream_size as i128 - distance as i128,
        };
        target.clamp(0, stream_size as i128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_begin_clamps_past_end() {
        let mode = SeekMode::from_raw(FILE_BEGIN, 100).unwrap();
        assert_eq!(mode.resolve(0, 40), 40);
    }

    #[test]
    fn from_current_clamps_below_zero() {
        let mode = SeekMode::from_raw(FILE_CURRENT, -50).unwrap();
        assert_eq!(mode.resolve(10, 1000), 0);
    }

    #[test]
    fn from_end_subtracts_distance() {
        let mode = SeekMode::from_raw(FILE_END, 10).unwrap();
        assert_eq!(mode.resolve(0, 100), 90);
    }

    #[test]
    fn unknown_mode_is_none() {
        assert!(SeekMode::from_raw(99, 0).is_none());
    }
}
