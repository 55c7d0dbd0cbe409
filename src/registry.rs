use bstr::{BStr, BString};
use rustc_hash::FxHashMap;

use crate::config::TypeFilter;
use crate::types::Handle;

/// Bookkeeping for one live tracked object.
///
/// The object itself is owned by the host program; this records only what
/// the tracker observed at creation.
#[derive(Clone, Debug)]
pub struct LiveEntry {
    pub type_name: BString,
    /// Set while the object belongs to the "created since the last
    /// checkpoint" set, cleared by `snapshot_checkpoint`.
    pub added: bool,
}

/// The live set plus the two checkpoint-diff sets.
///
/// Invariants:
/// - the Added set is a subset of the live set (the flag lives inside the
///   live entry, so this holds by construction);
/// - a handle enters `removed` only when untracked while its `added` flag
///   was clear, and stays there until the next checkpoint clear;
/// - handle values may be reused by the host allocator, so a creation
///   observed for a previously untracked value starts a fresh entry.
///
/// The registry itself is not synchronized; the engine serializes every
/// call through its single lock.
pub struct Registry {
    filter: TypeFilter,
    live: FxHashMap<Handle, LiveEntry>,
    removed: FxHashMap<Handle, BString>,
}

impl Registry {
    pub fn new(filter: TypeFilter) -> Registry {
        Registry {
            filter,
            live: FxHashMap::default(),
            removed: FxHashMap::default(),
        }
    }

    /// Begins tracking `handle`. Returns `true` when a new entry was
    /// created; re-tracking a live handle and filtered-out type names are
    /// no-ops.
    pub fn track(&mut self, handle: Handle, type_name: &BStr) -> bool {
        if self.live.contains_key(&handle) {
            return false;
        }
        if !self.filter.matches(type_name) {
            return false;
        }
        self.live.insert(
            handle,
            LiveEntry {
                type_name: type_name.to_owned(),
                added: true,
            },
        );
        true
    }

    /// Stops tracking `handle`, returning its entry.
    ///
    /// Unknown handles (objects predating instrumentation, or filtered out
    /// at creation) are a silent no-op. An entry destroyed inside the
    /// current checkpoint interval nets out of the diff entirely; one that
    /// predates the interval is recorded in `removed` so its disappearance
    /// shows up in the next checkpoint report.
    pub fn untrack(&mut self, handle: Handle) -> Option<LiveEntry> {
        let entry = self.live.remove(&handle)?;
        if !entry.added {
            self.removed.insert(handle, entry.type_name.clone());
        }
        Some(entry)
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Current live set, sorted by handle. No mutation.
    pub fn snapshot_live(&self) -> Vec<(Handle, BString)> {
        let mut entries: Vec<_> = self
            .live
            .iter()
            .map(|(handle, entry)| (*handle, entry.type_name.clone()))
            .collect();
        entries.sort_by_key(|(handle, _)| *handle);
        entries
    }

    /// Returns the Added and Removed sets accumulated since the previous
    /// checkpoint, then clears both, establishing a new baseline. The live
    /// set is untouched.
    pub fn snapshot_checkpoint(&mut self) -> (Vec<(Handle, BString)>, Vec<(Handle, BString)>) {
        let mut added = Vec::new();
        for (handle, entry) in self.live.iter_mut() {
            if entry.added {
                added.push((*handle, entry.type_name.clone()));
                entry.added = false;
            }
        }
        added.sort_by_key(|(handle, _)| *handle);

        let mut removed: Vec<_> = self.removed.drain().collect();
        removed.sort_by_key(|(handle, _)| *handle);

        (added, removed)
    }
}
