//! File change events delivered to listeners.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

/// Kind of change observed on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
}

impl FileEventKind {
    /// Map a raw notify event kind for `path` onto a listener kind.
    ///
    /// Renames are reported the way a directory watch sees them: the old
    /// name disappears and the new one appears. `RenameMode::Both` carries
    /// both names at once and is skipped because the backend also emits the
    /// `From` and `To` halves separately.
    pub fn from_notify(kind: &EventKind, path: &Path) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => Some(Self::Deleted),
                RenameMode::To => Some(Self::Created),
                RenameMode::Both => None,
                RenameMode::Any | RenameMode::Other => {
                    if path.exists() {
                        Some(Self::Created)
                    } else {
                        Some(Self::Deleted)
                    }
                }
            },
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An immutable change notification.
///
/// Built once per accepted OS notification and shared (behind an `Arc`) by
/// every listener task it fans out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    path: PathBuf,
    kind: FileEventKind,
    source: PathBuf,
}

impl FileEvent {
    pub fn new(path: PathBuf, kind: FileEventKind, source: PathBuf) -> Self {
        Self { path, kind, source }
    }

    /// Absolute path of the file that changed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> FileEventKind {
        self.kind
    }

    /// Absolute path of the watch target that produced this event.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// File name of the affected path, if it has one.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}
