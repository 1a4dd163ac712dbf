//! # sqvoe — Virtual SqPack Overlay Engine
//!
//! Intercepts a host process's file I/O for SqPack archives and substitutes
//! a virtual archive synthesized from the on-disk archive plus one or more
//! overlay sources (additional archives, TTMP mod packs, loose files,
//! generated font tables). Reads against the intercepted handles see a
//! coherent merged view; the underlying files are never modified.
//!
//! Dependency order, leaves first: SqPack binary primitives -> Entry
//! Providers -> Reader -> Creator -> View Assembler -> Handle Table -> OS
//! I/O Interceptor. Overlay Sources and the Background Builder feed the
//! Creator.
//!
//! # Non-goals
//! No modification of on-disk archives. No general-purpose filesystem. No
//! write/append support on intercepted handles. No guarantees about
//! archives not covered by the overlay set.

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod overlay;
pub mod pathspec;
pub mod provider;
pub mod sqpack;
pub mod stream;
pub mod views;

pub use config::EngineConfig;
pub use engine::{Interceptor, NativeOsFileApi, OsFileApi, RoutedHandle, Triplet, TripletConfigFactory};
pub use error::{EngineError, EngineResult};
pub use pathspec::PathSpec;
pub use provider::EntryProvider;
pub use sqpack::creator::{AdditionsReport, Creator, CreatorLimits, InsertOutcome};
pub use stream::RandomAccessStream;
pub use views::SqpackViews;
