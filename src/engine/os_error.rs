//! OS error code constants (§7, §9 "Hooking model"). The engine is
//! platform-neutral — these are plain `u32` values rather than bindings into
//! a Windows-specific crate, chosen to match what a Win32-hosting embedder
//! expects to see come back out of a hook.

/// One or more parameters were invalid (bad seek mode, malformed overlapped
/// descriptor).
pub const ERROR_INVALID_PARAMETER: u32 = 87;
/// The I/O device reported a read fault (catch-all for an unexpected
/// exception surfacing through a hook).
pub const ERROR_READ_FAULT: u32 = 30;
/// The system cannot find the file specified.
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
/// The handle is invalid.
pub const ERROR_INVALID_HANDLE: u32 = 6;
/// Not enough storage is available to process this command (surfaced for
/// out-of-range data span indices, mirroring `OutOfRangePathType`).
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
