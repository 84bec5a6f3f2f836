//! Listener trait for file change callbacks.

use std::fmt;

use super::event::{FileEvent, FileEventKind};

/// Receives file change events from a [`FileWatcher`](super::FileWatcher).
///
/// Every method defaults to a no-op, so implementors override only the
/// kinds they care about. Callbacks run on pool threads, possibly
/// concurrently with each other, and may block without stalling delivery
/// to other listeners.
pub trait FileEventListener: Send + Sync {
    /// A file appeared (created or moved in).
    fn on_created(&self, _event: &FileEvent) {}

    /// File contents or metadata changed.
    fn on_modified(&self, _event: &FileEvent) {}

    /// A file disappeared (deleted or moved out).
    fn on_deleted(&self, _event: &FileEvent) {}
}

/// Invoke the callback on `listener` matching the event's kind.
pub(crate) fn dispatch_to(listener: &dyn FileEventListener, event: &FileEvent) {
    match event.kind() {
        FileEventKind::Created => listener.on_created(event),
        FileEventKind::Modified => listener.on_modified(event),
        FileEventKind::Deleted => listener.on_deleted(event),
    }
}

/// Adapts a closure into a listener that receives every kind.
///
/// ```ignore
/// watcher.add_listener(Arc::new(FnListener::new(|event: &FileEvent| {
///     println!("{event}");
/// })));
/// ```
pub struct FnListener<F> {
    callback: F,
}

impl<F> FnListener<F>
where
    F: Fn(&FileEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> FileEventListener for FnListener<F>
where
    F: Fn(&FileEvent) + Send + Sync,
{
    fn on_created(&self, event: &FileEvent) {
        (self.callback)(event)
    }

    fn on_modified(&self, event: &FileEvent) {
        (self.callback)(event)
    }

    fn on_deleted(&self, event: &FileEvent) {
        (self.callback)(event)
    }
}

impl<F> fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").finish_non_exhaustive()
    }
}
