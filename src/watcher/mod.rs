//! Per-path file watchers and their event/listener contract.
//!
//! # Architecture
//!
//! ```text
//! WatcherRegistry (path -> FileWatcher, one per absolute path)
//!   - HandleSet (every live native handle, for bulk close)
//!   - Dispatcher (growable pool)
//!         |
//!    FileWatcher ---- WatchHandle (notify, non-recursive, on the target dir)
//!         |
//!    Poller (runs on the pool, one per active watcher)
//!         |
//!    one pool task per listener per accepted event
//! ```

mod error;
mod event;
mod file_watcher;
mod handle;
mod listener;
mod target;

pub use error::WatchError;
pub use event::{FileEvent, FileEventKind};
pub use file_watcher::FileWatcher;
pub use handle::{EventStream, HandleSet, WatchHandle};
pub use listener::{FileEventListener, FnListener};
pub use target::{Binding, WatchTarget};
