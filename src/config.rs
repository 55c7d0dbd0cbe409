use std::env;
use std::ops::{BitOr, BitOrAssign};

use bstr::BStr;

/// Environment variable naming the type-name prefix filter.
pub const ENV_FILTER: &str = "GOBJECT_TRACKER_FILTER";
/// Environment variable selecting report categories.
pub const ENV_DISPLAY: &str = "GOBJECT_TRACKER_DISPLAY";

/// Report categories enabled via `GOBJECT_TRACKER_DISPLAY`.
///
/// Categories combine with `|`. The variable holds a comma-separated token
/// list drawn from `none`, `create`, `refs`, `backtrace` and `all`;
/// unrecognized tokens are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayFlags(u8);

impl DisplayFlags {
    pub const NONE: DisplayFlags = DisplayFlags(0);
    /// Object creation and finalization lines.
    pub const CREATE: DisplayFlags = DisplayFlags(1);
    /// Reference-count transition lines.
    pub const REFS: DisplayFlags = DisplayFlags(1 << 1);
    /// Append a captured backtrace to event lines.
    pub const BACKTRACE: DisplayFlags = DisplayFlags(1 << 2);
    pub const ALL: DisplayFlags = DisplayFlags(u8::MAX);

    pub const fn contains(self, flags: DisplayFlags) -> bool {
        self.0 & flags.0 == flags.0
    }

    /// Parses a comma-separated category list.
    pub fn from_tokens(tokens: &str) -> DisplayFlags {
        let mut flags = DisplayFlags::NONE;
        for token in tokens.split(',') {
            flags |= match token.trim() {
                "create" => DisplayFlags::CREATE,
                "refs" => DisplayFlags::REFS,
                "backtrace" => DisplayFlags::BACKTRACE,
                "all" => DisplayFlags::ALL,
                // "none" contributes nothing; unknown tokens are ignored
                _ => DisplayFlags::NONE,
            };
        }
        flags
    }
}

impl BitOr for DisplayFlags {
    type Output = DisplayFlags;

    fn bitor(self, rhs: DisplayFlags) -> DisplayFlags {
        DisplayFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DisplayFlags {
    fn bitor_assign(&mut self, rhs: DisplayFlags) {
        self.0 |= rhs.0;
    }
}

/// Name-prefix filter for tracked types. An unset filter matches every
/// type.
#[derive(Clone, Debug, Default)]
pub struct TypeFilter(Option<String>);

impl TypeFilter {
    pub fn new(prefix: Option<String>) -> TypeFilter {
        TypeFilter(prefix)
    }

    pub fn matches(&self, type_name: &BStr) -> bool {
        match &self.0 {
            Some(prefix) => type_name.starts_with(prefix.as_bytes()),
            None => true,
        }
    }
}

/// Process-wide tracker configuration. Read from the environment once, on
/// first interception, and immutable afterwards.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub filter: TypeFilter,
    pub display: DisplayFlags,
}

impl TrackerConfig {
    pub fn new(filter: TypeFilter, display: DisplayFlags) -> TrackerConfig {
        TrackerConfig { filter, display }
    }

    pub fn from_env() -> TrackerConfig {
        let filter = TypeFilter::new(env::var(ENV_FILTER).ok().filter(|s| !s.is_empty()));
        let display = match env::var(ENV_DISPLAY) {
            Ok(tokens) => DisplayFlags::from_tokens(&tokens),
            Err(_) => DisplayFlags::CREATE,
        };
        TrackerConfig { filter, display }
    }
}

impl Default for TrackerConfig {
    fn default() -> TrackerConfig {
        TrackerConfig {
            filter: TypeFilter::default(),
            display: DisplayFlags::CREATE,
        }
    }
}
