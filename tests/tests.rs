use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bstr::BStr;
use maplit::hashmap;
use static_assertions::assert_impl_all;

use gobject_tracker::{
    dispatch, Command, DisplayFlags, Handle, RefCountProbe, Registry, TermPhase, Tracker,
    TrackerConfig, TypeFilter,
};

assert_impl_all!(Tracker: Send, Sync);
assert_impl_all!(Handle: Copy, Send, Sync, Ord);

type Counts = Arc<Mutex<HashMap<Handle, u32>>>;

fn probe_from(counts: &Counts) -> RefCountProbe {
    let counts = Arc::clone(counts);
    Box::new(move |handle| counts.lock().unwrap().get(&handle).copied())
}

/// Drives a `Tracker` the way the interception shim would, with a table of
/// fake objects standing in for the host object system.
struct FakeHost {
    tracker: Tracker,
    counts: Counts,
    out: Vec<u8>,
}

impl FakeHost {
    fn new(config: TrackerConfig) -> FakeHost {
        let counts: Counts = Arc::new(Mutex::new(HashMap::new()));
        FakeHost {
            tracker: Tracker::new(config, probe_from(&counts)),
            counts,
            out: Vec::new(),
        }
    }

    fn create(&mut self, raw: usize, type_name: &str) -> Handle {
        let handle = Handle::from_raw(raw);
        self.counts.lock().unwrap().insert(handle, 1);
        self.tracker
            .observe_created(&mut self.out, handle, BStr::new(type_name));
        handle
    }

    fn acquire(&mut self, handle: Handle, type_name: &str) {
        let mut counts = self.counts.lock().unwrap();
        let before = counts[&handle];
        counts.insert(handle, before + 1);
        drop(counts);
        self.tracker.observe_acquired(
            &mut self.out,
            handle,
            BStr::new(type_name),
            before,
            before + 1,
        );
    }

    fn release(&mut self, handle: Handle, type_name: &str) {
        let before = self.counts.lock().unwrap()[&handle];
        self.tracker
            .observe_released(&mut self.out, handle, BStr::new(type_name), before);
        if before == 1 {
            self.counts.lock().unwrap().remove(&handle);
            self.tracker.observe_finalized(&mut self.out, handle);
        } else {
            self.counts.lock().unwrap().insert(handle, before - 1);
        }
    }

    fn destroy(&mut self, handle: Handle) {
        self.counts.lock().unwrap().remove(&handle);
        self.tracker.observe_finalized(&mut self.out, handle);
    }

    fn output(&mut self) -> String {
        String::from_utf8(std::mem::take(&mut self.out)).unwrap()
    }

    fn dump_live(&mut self) -> String {
        let mut out = Vec::new();
        self.tracker.dump_live(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn dump_checkpoint(&mut self) -> String {
        let mut out = Vec::new();
        self.tracker.dump_checkpoint(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }
}

fn config_all() -> TrackerConfig {
    TrackerConfig::new(
        TypeFilter::default(),
        DisplayFlags::CREATE | DisplayFlags::REFS,
    )
}

#[test]
fn replay_matches_live_set() {
    let mut host = FakeHost::new(config_all());

    let a = host.create(0x10, "Foo");
    let b = host.create(0x20, "Bar");
    let _c = host.create(0x30, "Baz");
    host.destroy(b);

    assert_eq!(host.tracker.live_count(), 2);
    let dump = host.dump_live();
    assert!(dump.contains(" - 0x10, Foo: 1 refs"));
    assert!(dump.contains(" - 0x30, Baz: 1 refs"));
    assert!(!dump.contains("Bar"));
    assert!(dump.ends_with("Total: 2 objects\n"));

    host.destroy(a);
    assert_eq!(host.tracker.live_count(), 1);
}

#[test]
fn created_and_finalized_lines() {
    let mut host = FakeHost::new(config_all());

    let a = host.create(0x10, "Foo");
    host.acquire(a, "Foo");
    host.release(a, "Foo");
    host.release(a, "Foo");

    let output = host.output();
    assert!(output.contains(" ++ Created object 0x10, Foo\n"));
    assert!(output.contains("  + Reffed object 0x10, Foo; ref_count: 1 -> 2\n"));
    assert!(output.contains("  - Unreffed object 0x10, Foo; ref_count: 2 -> 1\n"));
    assert!(output.contains("  - Unreffed object 0x10, Foo; ref_count: 1 -> 0\n"));
    assert!(output.contains(" -- Finalized object 0x10, Foo\n"));
}

#[test]
fn display_categories_gate_event_lines() {
    let mut host = FakeHost::new(TrackerConfig::new(
        TypeFilter::default(),
        DisplayFlags::CREATE,
    ));

    let a = host.create(0x10, "Foo");
    host.acquire(a, "Foo");
    let output = host.output();
    assert!(output.contains("Created"));
    assert!(!output.contains("Reffed"), "refs lines are off by default");

    let mut quiet = FakeHost::new(TrackerConfig::new(TypeFilter::default(), DisplayFlags::NONE));
    quiet.create(0x10, "Foo");
    assert_eq!(quiet.output(), "", "category none silences event lines");
    assert_eq!(
        quiet.tracker.live_count(),
        1,
        "tracking still happens when reporting is off"
    );
}

#[test]
fn checkpoint_diff_law() {
    let mut host = FakeHost::new(config_all());

    // baseline: flush everything already seen out of the diff sets
    host.create(0x10, "Foo");
    host.dump_checkpoint();

    let report = host.dump_checkpoint();
    assert!(
        report.contains("Added: 0, removed: 0"),
        "both sets are empty right after a checkpoint"
    );

    // a create inside the interval lands in Added
    let b = host.create(0x20, "Bar");
    let report = host.dump_checkpoint();
    assert!(report.contains(" - 0x20, Bar: 1 refs"));
    assert!(report.contains("Added: 1, removed: 0"));

    // destroying an Added object nets out of the diff entirely
    let c = host.create(0x30, "Baz");
    host.destroy(c);
    let report = host.dump_checkpoint();
    assert!(report.contains("Added: 0, removed: 0"));

    // destroying a pre-existing object is reported with its captured name
    host.destroy(b);
    let report = host.dump_checkpoint();
    assert!(report.contains("Removed since last checkpoint:\n - 0x20, Bar\n"));
    assert!(report.contains("Added: 0, removed: 1"));
}

#[test]
fn checkpoint_scenario_walkthrough() {
    let mut host = FakeHost::new(config_all());

    let a = host.create(0x40, "Foo");
    assert_eq!(host.tracker.live_count(), 1);

    let report = host.dump_checkpoint();
    assert!(report.contains("Added since last checkpoint:\n - 0x40, Foo: 1 refs\n"));
    assert!(report.contains("Added: 1, removed: 0"));
    assert!(report.ends_with("New checkpoint baseline established.\n"));

    host.destroy(a);
    assert_eq!(host.tracker.live_count(), 0);

    let report = host.dump_checkpoint();
    assert!(report.contains("Removed since last checkpoint:\n - 0x40, Foo\n"));
    assert!(report.contains("Added: 0, removed: 1"));
}

#[test]
fn filter_excludes_types_from_all_reports() {
    let mut host = FakeHost::new(TrackerConfig::new(
        TypeFilter::new(Some("Gtk".to_owned())),
        DisplayFlags::CREATE | DisplayFlags::REFS,
    ));

    let window = host.create(0x10, "GtkWindow");
    let pixbuf = host.create(0x20, "GdkPixbuf");
    host.acquire(pixbuf, "GdkPixbuf");

    assert_eq!(host.tracker.live_count(), 1);
    let output = host.output();
    assert!(output.contains("GtkWindow"));
    assert!(!output.contains("GdkPixbuf"), "filtered types never appear");

    let dump = host.dump_live();
    assert!(!dump.contains("GdkPixbuf"));

    host.destroy(pixbuf);
    host.destroy(window);
    let report = host.dump_checkpoint();
    assert!(!report.contains("GdkPixbuf"));
}

#[test]
fn tracking_is_idempotent() {
    let counts: Counts = Arc::new(Mutex::new(hashmap! {
        Handle::from_raw(0x10) => 1,
    }));
    let tracker = Tracker::new(TrackerConfig::default(), probe_from(&counts));
    let mut out = Vec::new();

    let handle = Handle::from_raw(0x10);
    assert!(tracker.observe_created(&mut out, handle, BStr::new("Foo")));
    assert!(
        !tracker.observe_created(&mut out, handle, BStr::new("Foo")),
        "second observation of a live handle is a no-op"
    );
    assert_eq!(tracker.live_count(), 1);
}

#[test]
fn untracked_destroy_is_silent() {
    let mut host = FakeHost::new(config_all());

    // object predating instrumentation
    host.destroy(Handle::from_raw(0x99));
    assert_eq!(host.output(), "");
    assert_eq!(host.tracker.live_count(), 0);
}

#[test]
fn commands_dispatch_to_the_engine() {
    let mut host = FakeHost::new(config_all());
    host.create(0x10, "Foo");

    let mut out = Vec::new();
    dispatch(&host.tracker, Command::DumpLive, &mut out).unwrap();
    let text = String::from_utf8(std::mem::take(&mut out)).unwrap();
    assert!(text.starts_with("Living objects:\n"));
    assert!(text.contains(" - 0x10, Foo: 1 refs"));

    dispatch(&host.tracker, Command::DumpCheckpoint, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Added: 1, removed: 0"));
}

#[test]
fn crash_dump_fires_exactly_once() {
    let mut host = FakeHost::new(config_all());
    host.create(0x10, "Foo");

    let mut first = Vec::new();
    assert!(host.tracker.dump_on_fatal(&mut first));
    let text = String::from_utf8(first).unwrap();
    assert!(text.contains(" - 0x10, Foo: 1 refs"));
    assert_eq!(host.tracker.term().phase(), TermPhase::Propagating);

    // the exit hook still runs while the signal propagates
    let mut second = Vec::new();
    assert!(!host.tracker.dump_on_exit(&mut second));
    assert!(second.is_empty(), "no second dump on any termination path");
}

#[test]
fn exit_dump_fires_exactly_once() {
    let mut host = FakeHost::new(config_all());
    host.create(0x10, "Foo");

    let mut first = Vec::new();
    assert!(host.tracker.dump_on_exit(&mut first));
    assert!(String::from_utf8(first)
        .unwrap()
        .contains("Total: 1 objects"));
    assert_eq!(host.tracker.term().phase(), TermPhase::Terminated);

    let mut second = Vec::new();
    assert!(!host.tracker.dump_on_exit(&mut second));
    assert!(second.is_empty());
}

#[test]
fn handle_reuse_after_destroy() {
    let mut host = FakeHost::new(config_all());

    let a = host.create(0x10, "Foo");
    host.dump_checkpoint();
    host.destroy(a);

    // the allocator hands the same address to a fresh object
    host.create(0x10, "Bar");
    assert_eq!(host.tracker.live_count(), 1);

    let report = host.dump_checkpoint();
    assert!(report.contains(" - 0x10, Bar: 1 refs"));
    assert!(report.contains("Removed since last checkpoint:\n - 0x10, Foo\n"));
}

#[test]
fn probe_failure_degrades_to_unknown_count() {
    let counts: Counts = Arc::new(Mutex::new(HashMap::new()));
    let tracker = Tracker::new(TrackerConfig::default(), probe_from(&counts));
    let mut out = Vec::new();

    tracker.observe_created(&mut out, Handle::from_raw(0x10), BStr::new("Foo"));

    let mut dump = Vec::new();
    tracker.dump_live(&mut dump).unwrap();
    assert!(String::from_utf8(dump)
        .unwrap()
        .contains(" - 0x10, Foo: ? refs"));
}

#[test]
fn registry_is_usable_standalone() {
    let mut registry = Registry::new(TypeFilter::default());

    assert!(registry.track(Handle::from_raw(1), BStr::new("Foo")));
    let (added, removed) = registry.snapshot_checkpoint();
    assert_eq!(added.len(), 1);
    assert!(removed.is_empty());
}

#[test]
fn config_from_env_round_trip() {
    std::env::set_var(gobject_tracker::ENV_FILTER, "Gtk");
    std::env::set_var(gobject_tracker::ENV_DISPLAY, "refs,backtrace");

    let config = TrackerConfig::from_env();
    assert!(config.filter.matches(BStr::new("GtkLabel")));
    assert!(!config.filter.matches(BStr::new("Atk")));
    assert!(config.display.contains(DisplayFlags::REFS));
    assert!(config.display.contains(DisplayFlags::BACKTRACE));
    assert!(!config.display.contains(DisplayFlags::CREATE));

    std::env::remove_var(gobject_tracker::ENV_FILTER);
    std::env::remove_var(gobject_tracker::ENV_DISPLAY);
}
