//! Event types for change notifications.
//!
//! An [`Event`] is what the caller's callback receives: one path and the
//! kind of change the backend reported for it. Events are transient; the
//! watcher forwards them and never stores them.

use std::fmt;

use camino::Utf8PathBuf;
use notify::EventKind;
use notify::event::ModifyKind;
use serde::{Deserialize, Serialize};

/// The kind of change reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// A file or directory was created.
    Create,
    /// File contents were written.
    Write,
    /// A file or directory was removed.
    Remove,
    /// A file or directory was renamed (either side of the rename).
    Rename,
    /// Anything else the backend reports (metadata, access, unknown).
    Other,
}

impl Op {
    /// Returns the upper-case label used in textual output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Write => "WRITE",
            Self::Remove => "REMOVE",
            Self::Rename => "RENAME",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&EventKind> for Op {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Create,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => Self::Other,
            EventKind::Modify(_) => Self::Write,
            EventKind::Remove(_) => Self::Remove,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Self::Other,
        }
    }
}

/// A single change notification.
///
/// # Examples
///
/// ```
/// use tw_watcher::{Event, Op};
///
/// let event = Event::new("/srv/data/report.csv", Op::Write);
/// assert_eq!(event.to_string(), "WRITE /srv/data/report.csv");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Absolute path the change applies to.
    pub path: Utf8PathBuf,
    /// Kind of change.
    pub op: Op,
}

impl Event {
    /// Creates a new event.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.path)
    }
}
