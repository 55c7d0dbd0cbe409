//! Re-exports of the types most host-side tooling and tests need.

#[doc(no_inline)]
pub use crate::{
    CheckpointReport, Command, DisplayFlags, Error, Frame, Handle, LiveRecord, RefCountProbe,
    Registry, RemovedRecord, Result, TermPhase, Tracker, TrackerConfig, TypeFilter,
};
