//! Path-deduplicated file watchers with pooled, asynchronous listener dispatch.
//!
//! ```no_run
//! use std::sync::Arc;
//! use filewatch::{FileEvent, FileEventListener, WatcherRegistry};
//!
//! struct Printer;
//!
//! impl FileEventListener for Printer {
//!     fn on_modified(&self, event: &FileEvent) {
//!         println!("changed: {}", event.path().display());
//!     }
//! }
//!
//! # fn main() -> Result<(), filewatch::WatchError> {
//! let registry = WatcherRegistry::new();
//! let watcher = registry.create_watcher("Cargo.toml")?;
//! watcher.add_listener(Arc::new(Printer));
//! watcher.start()?;
//!
//! // ... on shutdown
//! registry.stop_register();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod registry;
pub mod watcher;

pub use config::Settings;
pub use dispatcher::Dispatcher;
pub use registry::WatcherRegistry;
pub use watcher::{
    FileEvent, FileEventKind, FileEventListener, FileWatcher, FnListener, WatchError, WatchTarget,
};
