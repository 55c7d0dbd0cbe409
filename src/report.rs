//! Report rendering.
//!
//! Every shape writes into an injected sink: the preload path passes a
//! locked stderr, tests pass byte buffers. Three dump shapes exist (live
//! set, checkpoint diff, and the termination dump, which reuses the live
//! shape) plus the per-event lines.

use std::io::{self, Write};

use bstr::{BStr, BString};

use crate::types::Handle;

#[cfg(feature = "serialize")]
fn serialize_type_name<S: serde::Serializer>(
    name: &BString,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(name)
}

/// One live object at dump time. `ref_count` is `None` when the probe could
/// not read it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct LiveRecord {
    pub handle: Handle,
    #[cfg_attr(feature = "serialize", serde(serialize_with = "serialize_type_name"))]
    pub type_name: BString,
    pub ref_count: Option<u32>,
}

/// One object destroyed since the last checkpoint. Only the name captured
/// at creation survives; the object itself is gone.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct RemovedRecord {
    pub handle: Handle,
    #[cfg_attr(feature = "serialize", serde(serialize_with = "serialize_type_name"))]
    pub type_name: BString,
}

/// Everything created and destroyed since the previous checkpoint
/// baseline.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct CheckpointReport {
    pub added: Vec<LiveRecord>,
    pub removed: Vec<RemovedRecord>,
}

fn write_live_line<W: Write>(w: &mut W, record: &LiveRecord) -> io::Result<()> {
    match record.ref_count {
        Some(count) => writeln!(
            w,
            " - {}, {}: {} refs",
            record.handle, record.type_name, count
        ),
        None => writeln!(w, " - {}, {}: ? refs", record.handle, record.type_name),
    }
}

/// Live dump: every tracked object with its observed reference count.
pub fn write_live_dump<W: Write>(w: &mut W, records: &[LiveRecord]) -> io::Result<()> {
    writeln!(w, "Living objects:")?;
    for record in records {
        write_live_line(w, record)?;
    }
    writeln!(w, "Total: {} objects", records.len())
}

/// Checkpoint diff, followed by confirmation that a new baseline is in
/// effect.
pub fn write_checkpoint<W: Write>(w: &mut W, report: &CheckpointReport) -> io::Result<()> {
    writeln!(w, "Added since last checkpoint:")?;
    for record in &report.added {
        write_live_line(w, record)?;
    }
    writeln!(w, "Removed since last checkpoint:")?;
    for record in &report.removed {
        writeln!(w, " - {}, {}", record.handle, record.type_name)?;
    }
    writeln!(
        w,
        "Added: {}, removed: {}",
        report.added.len(),
        report.removed.len()
    )?;
    writeln!(w, "New checkpoint baseline established.")
}

pub fn write_created<W: Write>(w: &mut W, handle: Handle, type_name: &BStr) -> io::Result<()> {
    writeln!(w, " ++ Created object {handle}, {type_name}")
}

pub fn write_finalized<W: Write>(w: &mut W, handle: Handle, type_name: &BStr) -> io::Result<()> {
    writeln!(w, " -- Finalized object {handle}, {type_name}")
}

pub fn write_acquired<W: Write>(
    w: &mut W,
    handle: Handle,
    type_name: &BStr,
    before: u32,
    after: u32,
) -> io::Result<()> {
    writeln!(
        w,
        "  + Reffed object {handle}, {type_name}; ref_count: {before} -> {after}"
    )
}

pub fn write_released<W: Write>(
    w: &mut W,
    handle: Handle,
    type_name: &BStr,
    before: u32,
    after: u32,
) -> io::Result<()> {
    writeln!(
        w,
        "  - Unreffed object {handle}, {type_name}; ref_count: {before} -> {after}"
    )
}
