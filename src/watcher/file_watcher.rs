//! Per-path watch loop.
//!
//! A [`FileWatcher`] owns one native handle bound to its target's directory,
//! turns raw notifications into [`FileEvent`]s and fans each accepted event
//! out to its listeners through the shared [`Dispatcher`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::EventKind;
use parking_lot::{Mutex, RwLock};

use crate::dispatcher::Dispatcher;

use super::error::WatchError;
use super::event::{FileEvent, FileEventKind};
use super::handle::{EventStream, HandleSet, WatchHandle};
use super::listener::{FileEventListener, dispatch_to};
use super::target::{Binding, WatchTarget};

type ListenerList = Arc<RwLock<Vec<Arc<dyn FileEventListener>>>>;

/// Watch loop for a single file or directory.
///
/// Obtain one through [`WatcherRegistry::create_watcher`](crate::WatcherRegistry::create_watcher),
/// which guarantees a single instance per absolute path.
pub struct FileWatcher {
    target: WatchTarget,
    listeners: ListenerList,
    /// Guards start-up so only one polling body ever runs.
    active: Mutex<bool>,
    /// Set when the registry forgets this watcher; it never starts again.
    retired: AtomicBool,
    dispatcher: Dispatcher,
    handles: HandleSet,
}

impl FileWatcher {
    pub(crate) fn new(target: WatchTarget, dispatcher: Dispatcher, handles: HandleSet) -> Self {
        Self {
            target,
            listeners: Arc::new(RwLock::new(Vec::new())),
            active: Mutex::new(false),
            retired: AtomicBool::new(false),
            dispatcher,
            handles,
        }
    }

    /// Begin watching.
    ///
    /// Does nothing if the watcher is already active or the target does not
    /// exist on disk; callers cannot tell these two cases apart. Otherwise
    /// the native handle is opened before this returns, so any change made
    /// afterwards is observed. Whether the target is watched directly or
    /// through its parent is decided here, from what is on disk now.
    ///
    /// Once running, the watcher stops silently when its handle is closed or
    /// the backend fails. There is no retry.
    pub fn start(&self) -> Result<(), WatchError> {
        let _admit = self.handles.admit();
        let mut active = self.active.lock();
        if *active || self.retired.load(Ordering::SeqCst) || !self.target.exists() {
            return Ok(());
        }

        let binding = self.target.bind();
        let (handle, stream) = WatchHandle::open(binding.dir())?;
        self.handles.insert(Arc::clone(&handle));

        let poller = Poller {
            target: self.target.clone(),
            binding,
            listeners: Arc::clone(&self.listeners),
            dispatcher: self.dispatcher.clone(),
            handles: self.handles.clone(),
            handle: Arc::clone(&handle),
            stream,
        };

        if let Err(e) = self.dispatcher.execute(move || poller.run()) {
            self.handles.remove(&handle);
            if let Err(close_err) = handle.close() {
                crate::best_effort!("watcher", "close {}: {close_err}", self.target);
            }
            return Err(e);
        }

        *active = true;
        crate::log_event!("watcher", "activated", "{}", self.target);
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn FileEventListener>) -> &Self {
        self.listeners.write().push(listener);
        self
    }

    /// Remove one registration of `listener`, compared by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn FileEventListener>) -> &Self {
        let mut listeners = self.listeners.write();
        if let Some(pos) = listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            listeners.remove(pos);
        }
        self
    }

    pub fn set_listeners(&self, listeners: Vec<Arc<dyn FileEventListener>>) -> &Self {
        *self.listeners.write() = listeners;
        self
    }

    /// Snapshot of the current listeners.
    pub fn listeners(&self) -> Vec<Arc<dyn FileEventListener>> {
        self.listeners.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    /// Drop every listener and refuse any later start. Called by the
    /// registry while it holds the handle gate exclusively.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.clear_listeners();
    }

    /// Absolute path identifying this watcher in the registry.
    pub fn watcher_key(&self) -> &Path {
        self.target.path()
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Whether a polling body was ever started.
    ///
    /// Stays `true` after the handle is closed; a dead loop is not reported.
    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("target", &self.target)
            .field("listeners", &self.listener_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Polling body, run on a dispatcher thread.
struct Poller {
    target: WatchTarget,
    binding: Binding,
    listeners: ListenerList,
    dispatcher: Dispatcher,
    handles: HandleSet,
    handle: Arc<WatchHandle>,
    stream: EventStream,
}

impl Poller {
    fn run(self) {
        crate::debug_event!("watcher", "polling", "{}", self.binding.dir().display());

        self.poll();
        self.release();

        crate::debug_event!("watcher", "stopped", "{}", self.target);
    }

    fn poll(&self) {
        let root = self.binding.dir();

        while let Some(batch) = self.stream.next_batch() {
            // Re-arm: a closed handle ends the loop even with events queued.
            if self.handle.is_closed() {
                return;
            }

            let snapshot = self.listeners.read().clone();

            for res in batch {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        crate::best_effort!("watcher", "{} stopped: {e}", self.target);
                        return;
                    }
                };

                for raw in &event.paths {
                    let path = resolve_affected(root, raw);

                    // The watched directory itself: gone means the watch is dead.
                    if path == root {
                        if matches!(event.kind, EventKind::Remove(_)) {
                            crate::best_effort!(
                                "watcher",
                                "{} stopped: {} was removed",
                                self.target,
                                root.display()
                            );
                            return;
                        }
                        continue;
                    }

                    let Some(kind) = FileEventKind::from_notify(&event.kind, &path) else {
                        continue;
                    };
                    if !self.binding.accepts(&path) {
                        continue;
                    }
                    if !self.notify_listeners(&snapshot, path, kind) {
                        return;
                    }
                }
            }
        }
    }

    /// Close and forget the handle once the loop is over.
    fn release(&self) {
        self.handles.remove(&self.handle);
        if let Err(e) = self.handle.close() {
            crate::best_effort!("watcher", "close {}: {e}", self.target);
        }
    }

    /// Submit one task per listener. Returns `false` if the pool is gone.
    fn notify_listeners(
        &self,
        listeners: &[Arc<dyn FileEventListener>],
        path: PathBuf,
        kind: FileEventKind,
    ) -> bool {
        crate::debug_event!("watcher", kind.as_str(), "{}", path.display());

        let event = Arc::new(FileEvent::new(
            path,
            kind,
            self.target.path().to_path_buf(),
        ));

        for listener in listeners {
            let listener = Arc::clone(listener);
            let event = Arc::clone(&event);
            if let Err(e) = self
                .dispatcher
                .execute(move || dispatch_to(listener.as_ref(), &event))
            {
                crate::best_effort!("watcher", "{} stopped: {e}", self.target);
                return false;
            }
        }

        true
    }
}

/// Rebuild a reported path under the directory we registered.
///
/// Some backends report canonical paths (e.g. `/private/var` on macOS) even
/// when the watch was registered through a symlink. Watches are
/// non-recursive, so every entry is a direct child of `watch_dir` and its
/// file name is enough to rebuild the path the caller knows.
fn resolve_affected(watch_dir: &Path, raw: &Path) -> PathBuf {
    if raw.starts_with(watch_dir) {
        return raw.to_path_buf();
    }
    match raw.file_name() {
        Some(name) => watch_dir.join(name),
        None => raw.to_path_buf(),
    }
}
