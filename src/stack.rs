//! Call-stack capture for report lines.
//!
//! Capture never fails fatally: when frame metadata is unavailable the
//! report degrades to a single placeholder line.

use std::io::{self, Write};

/// One resolved stack frame: symbol name plus the offset of the return
/// address from the symbol start.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Frame {
    pub name: String,
    pub offset: usize,
}

// Interactive dumps do not need unbounded depth.
const MAX_FRAMES: usize = 32;

/// Captures the current call stack, innermost frame first. Frames without
/// symbol information are skipped.
pub fn capture() -> Vec<Frame> {
    let mut frames = Vec::new();
    let trace = backtrace::Backtrace::new();
    for frame in trace.frames() {
        if frames.len() >= MAX_FRAMES {
            break;
        }
        let ip = frame.ip() as usize;
        for symbol in frame.symbols() {
            let Some(name) = symbol.name() else {
                continue;
            };
            let offset = symbol
                .addr()
                .map(|addr| ip.saturating_sub(addr as usize))
                .unwrap_or(0);
            frames.push(Frame {
                name: name.to_string(),
                offset,
            });
        }
    }
    frames
}

/// Writes `frames` in report form, one line per frame.
pub fn write_frames<W: Write>(w: &mut W, frames: &[Frame]) -> io::Result<()> {
    if frames.is_empty() {
        return writeln!(w, "    (backtrace unavailable)");
    }
    for (depth, frame) in frames.iter().enumerate() {
        writeln!(w, "    #{depth}  {} + {:#x}", frame.name, frame.offset)?;
    }
    Ok(())
}
