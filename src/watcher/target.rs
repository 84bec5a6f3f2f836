//! Watch targets: the path a watcher conceptually observes.
//!
//! Native handles only watch directories, so a file target binds its handle
//! to the parent directory and filters out sibling entries. The binding is
//! chosen when watching starts, not when the target is built.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

/// An absolute filesystem path plus whether it names a single file.
///
/// Equality and hashing use the absolute path only.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    path: PathBuf,
    is_file: bool,
}

impl WatchTarget {
    /// Build a target from a caller-supplied path.
    ///
    /// Relative paths are resolved against the current directory without
    /// touching the filesystem (symlinks are kept as written). The file/dir
    /// decision is taken now; a path that does not exist yet counts as a
    /// directory.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let is_file = path.is_file();
        Ok(Self { path, is_file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Decide where a native handle attaches, from what is on disk now.
    ///
    /// A path that is a directory at this moment is watched directly.
    /// Anything else is watched through its containing directory, so the
    /// watch survives the file being deleted and recreated.
    pub fn bind(&self) -> Binding {
        if self.path.is_dir() {
            return Binding::Directory(self.path.clone());
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Binding::Entry {
            dir,
            entry: self.path.clone(),
        }
    }
}

/// Where a started watcher's native handle is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Bound to the target directory itself.
    Directory(PathBuf),
    /// Bound to `dir`, keeping only notifications about `entry`.
    Entry { dir: PathBuf, entry: PathBuf },
}

impl Binding {
    /// Directory the native handle watches.
    pub fn dir(&self) -> &Path {
        match self {
            Binding::Directory(dir) => dir,
            Binding::Entry { dir, .. } => dir,
        }
    }

    /// Qualifier filter. A directory binding accepts every child entry but
    /// not the directory itself; an entry binding accepts only its entry.
    pub fn accepts(&self, affected: &Path) -> bool {
        match self {
            Binding::Directory(dir) => affected != dir.as_path(),
            Binding::Entry { entry, .. } => affected == entry.as_path(),
        }
    }
}

impl PartialEq for WatchTarget {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for WatchTarget {}

impl Hash for WatchTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
