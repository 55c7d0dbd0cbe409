//! The tracking engine: one process-wide guarded state object tying the
//! registry, the configuration and termination handling together.
//!
//! Host threads, the control listener and the termination hooks all enter
//! through the same `Tracker`; one mutex serializes every registry
//! mutation, checkpoint snapshot+clear, and live-set read done while
//! rendering. Nothing here schedules work of its own: every path runs
//! synchronously inside whichever thread called it.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

use bstr::{BStr, ByteSlice};
use once_cell::sync::Lazy;

use crate::config::{DisplayFlags, TrackerConfig};
use crate::registry::Registry;
use crate::report::{self, CheckpointReport, LiveRecord, RemovedRecord};
use crate::stack;
use crate::types::{Handle, RefCountProbe};

/// Phases of termination handling. Transitions are one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TermPhase {
    /// Instrumentation installed, registry live.
    Armed = 0,
    /// A termination dump is in progress.
    Reporting = 1,
    /// A fatal-signal dump finished; the signal is being re-raised with
    /// its default disposition restored.
    Propagating = 2,
    Terminated = 3,
}

/// One-way termination state machine.
///
/// The `Armed -> Reporting` edge is a compare-and-swap, so the termination
/// dump fires at most once per process no matter how many exit paths race.
pub struct TermState(AtomicU8);

impl TermState {
    pub const fn new() -> TermState {
        TermState(AtomicU8::new(TermPhase::Armed as u8))
    }

    pub fn phase(&self) -> TermPhase {
        match self.0.load(Ordering::SeqCst) {
            0 => TermPhase::Armed,
            1 => TermPhase::Reporting,
            2 => TermPhase::Propagating,
            _ => TermPhase::Terminated,
        }
    }

    /// Claims the termination dump. Only the first caller wins.
    pub fn begin_reporting(&self) -> bool {
        self.0
            .compare_exchange(
                TermPhase::Armed as u8,
                TermPhase::Reporting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn begin_propagating(&self) {
        self.0.store(TermPhase::Propagating as u8, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        self.0.store(TermPhase::Terminated as u8, Ordering::SeqCst);
    }
}

impl Default for TermState {
    fn default() -> TermState {
        TermState::new()
    }
}

struct EngineState {
    registry: Registry,
    probe: RefCountProbe,
}

/// The lifecycle-tracking engine.
///
/// Reporting triggered from a signal handler acquires the same lock on
/// whatever thread received the notification. That is an accepted
/// best-effort risk of this kind of diagnostic tool, not a guarantee; the
/// interactive commands avoid it by running on the listener thread, the
/// fatal path cannot.
pub struct Tracker {
    config: TrackerConfig,
    state: Mutex<EngineState>,
    term: TermState,
}

impl Tracker {
    pub fn new(config: TrackerConfig, probe: RefCountProbe) -> Tracker {
        let registry = Registry::new(config.filter.clone());
        Tracker {
            config,
            state: Mutex::new(EngineState { registry, probe }),
            term: TermState::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn term(&self) -> &TermState {
        &self.term
    }

    // Lock poisoning is ignored: a panicking host thread must not disable
    // tracking for the rest of the process.
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records an observed creation. Returns `true` when the object is now
    /// tracked; the shim registers the finalize watch only in that case.
    pub fn observe_created<W: Write>(&self, w: &mut W, handle: Handle, type_name: &BStr) -> bool {
        let mut state = self.lock();
        if !state.registry.track(handle, type_name) {
            return false;
        }
        if self.config.display.contains(DisplayFlags::CREATE) {
            let _ = report::write_created(w, handle, type_name);
            self.maybe_write_backtrace(w);
        }
        true
    }

    /// Records a finalize notification. The host object system delivers
    /// exactly one per watched object; unknown handles are a silent no-op.
    pub fn observe_finalized<W: Write>(&self, w: &mut W, handle: Handle) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.registry.untrack(handle) else {
            return false;
        };
        if self.config.display.contains(DisplayFlags::CREATE) {
            let _ = report::write_finalized(w, handle, entry.type_name.as_bstr());
        }
        true
    }

    /// Reports an observed reference acquisition. Live/Added/Removed are
    /// not touched: ref-count churn is orthogonal to the live/dead
    /// question.
    pub fn observe_acquired<W: Write>(
        &self,
        w: &mut W,
        handle: Handle,
        type_name: &BStr,
        before: u32,
        after: u32,
    ) {
        if !self.config.filter.matches(type_name) {
            return;
        }
        if self.config.display.contains(DisplayFlags::REFS) {
            let _ = report::write_acquired(w, handle, type_name, before, after);
            self.maybe_write_backtrace(w);
        }
    }

    /// Reports a reference release with the predicted resulting count.
    ///
    /// The shim calls this before the delegate runs: the release may free
    /// the object, so the count after the call cannot be read.
    pub fn observe_released<W: Write>(
        &self,
        w: &mut W,
        handle: Handle,
        type_name: &BStr,
        before: u32,
    ) {
        if !self.config.filter.matches(type_name) {
            return;
        }
        if self.config.display.contains(DisplayFlags::REFS) {
            let _ = report::write_released(w, handle, type_name, before, before.saturating_sub(1));
            self.maybe_write_backtrace(w);
        }
    }

    fn maybe_write_backtrace<W: Write>(&self, w: &mut W) {
        if self.config.display.contains(DisplayFlags::BACKTRACE) {
            let _ = stack::write_frames(w, &stack::capture());
        }
    }

    /// Dumps every live object with its current reference count.
    pub fn dump_live<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let state = self.lock();
        report::write_live_dump(w, &live_records(&state))
    }

    /// Reports the Added/Removed diff accumulated since the previous
    /// checkpoint and establishes a new baseline. Snapshot, render and
    /// clear all happen under the engine lock, so the diff is consistent
    /// with respect to concurrent track/untrack calls.
    pub fn dump_checkpoint<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let (added, removed) = state.registry.snapshot_checkpoint();
        let probe = &state.probe;
        let report = CheckpointReport {
            added: added
                .into_iter()
                .map(|(handle, type_name)| LiveRecord {
                    handle,
                    type_name,
                    ref_count: probe(handle),
                })
                .collect(),
            removed: removed
                .into_iter()
                .map(|(handle, type_name)| RemovedRecord { handle, type_name })
                .collect(),
        };
        report::write_checkpoint(w, &report)
    }

    pub fn live_count(&self) -> usize {
        self.lock().registry.live_len()
    }

    /// Termination dump for the normal-exit path. Across all termination
    /// paths the dump fires at most once per process.
    pub fn dump_on_exit<W: Write>(&self, w: &mut W) -> bool {
        if !self.term.begin_reporting() {
            return false;
        }
        let _ = self.dump_live(w);
        self.term.finish();
        true
    }

    /// Termination dump for the fatal-signal path. When this returns
    /// `true` the caller restores the signal's default disposition and
    /// re-raises, so the process still terminates exactly as it would have
    /// without instrumentation.
    pub fn dump_on_fatal<W: Write>(&self, w: &mut W) -> bool {
        if !self.term.begin_reporting() {
            return false;
        }
        let _ = self.dump_live(w);
        self.term.begin_propagating();
        true
    }
}

fn live_records(state: &EngineState) -> Vec<LiveRecord> {
    state
        .registry
        .snapshot_live()
        .into_iter()
        .map(|(handle, type_name)| LiveRecord {
            handle,
            type_name,
            ref_count: (state.probe)(handle),
        })
        .collect()
}

static GLOBAL: Lazy<Tracker> = Lazy::new(|| {
    Tracker::new(
        TrackerConfig::from_env(),
        Box::new(|handle| unsafe { crate::ffi::ref_count(handle.as_object()) }),
    )
});

/// The process-wide engine used by the interception shim. Initialized on
/// first use; the configuration is read from the environment at that point
/// and never again.
pub fn global() -> &'static Tracker {
    &GLOBAL
}
