//! Live lifecycle tracking for reference-counted GObject instances.
//!
//! Preloaded into a host process (`LD_PRELOAD=libgobject_tracker.so`), the
//! crate substitutes shims for the object system's creation and
//! reference-count operations, keeps a registry of live instances, and
//! reports on demand:
//!
//! - `SIGUSR1` dumps every live object.
//! - `SIGUSR2` dumps everything created and destroyed since the last
//!   checkpoint and resets the baseline.
//! - Normal exit and fatal signals dump the live set exactly once.
//!
//! Configuration is read from the environment on first interception:
//! `GOBJECT_TRACKER_FILTER` (type-name prefix; unset tracks everything)
//! and `GOBJECT_TRACKER_DISPLAY` (comma-separated categories from `none`,
//! `create`, `refs`, `backtrace`, `all`; default `create`).
//!
//! The engine itself (`Tracker`, `Registry`) is an ordinary library
//! surface and can be driven without preloading anything, which is how the
//! tests exercise it.

mod abi;
mod config;
mod control;
mod error;
mod ffi;
mod registry;
mod report;
mod stack;
mod symbols;
mod tracker;
mod types;

pub mod prelude;

pub use config::*;
pub use control::{dispatch, Command};
pub use error::*;
pub use registry::{LiveEntry, Registry};
pub use report::*;
pub use stack::{capture, write_frames, Frame};
pub use tracker::{global, TermPhase, TermState, Tracker};
pub use types::*;
