//! Handle Table, OS I/O Interceptor, and `acquire_views` (§4.1, §4.2, §4.4):
//! the layer that sits between a host process's file operations and the
//! frozen [`SqpackViews`](crate::views::SqpackViews) a [`Creator`
//! ](crate::sqpack::creator::Creator) produces.
//!
//! `OsFileApi` (§4.1 **[AMBIENT]**) is the portability seam: a host injects
//! its own open/close/read/seek implementation and the generic
//! [`Interceptor`](interceptor::Interceptor) decides per call whether to
//! route to a synthetic stream or forward untouched.

pub mod handle_table;
pub mod interceptor;
pub mod os_api;
pub mod os_error;
pub mod seek;

pub use handle_table::{OverlayedHandle, PathType};
pub use interceptor::{Interceptor, RoutedHandle, Triplet, TripletConfigFactory};
pub use os_api::{NativeOsFileApi, OsFileApi};
