//! Top-level error type, composed from one `thiserror` enum per subsystem —
//! the same nested-enum-with-`#[from]` shape the teacher format used for
//! `SuperblockError`/`CodecError`/`CryptoError`.

use std::io;
use thiserror::Error;

use crate::overlay::OverlayError;
use crate::sqpack::creator::CreatorError;
use crate::sqpack::reader::ReaderError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Error kinds named in the spec: CorruptArchive, OverlaySourceError,
/// DuplicatePathSpec, OutOfRangePathType, CancelledByUser, OsIoError.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("corrupt archive: {0}")]
    CorruptArchive(#[from] ReaderError),

    #[error("overlay source error: {0}")]
    OverlaySourceError(#[from] OverlayError),

    #[error("creator error: {0}")]
    Creator(#[from] CreatorError),

    #[error("duplicate path spec for {path}")]
    DuplicatePathSpec { path: String },

    #[error("requested data span index {requested} is out of range (have {available})")]
    OutOfRangePathType { requested: usize, available: usize },

    #[error("operation cancelled by user")]
    CancelledByUser,

    #[error("OS I/O error: {0}")]
    OsIoError(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
