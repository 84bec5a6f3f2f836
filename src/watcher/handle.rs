//! Native watch handles and the set used for bulk teardown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::WatchError;

/// One OS change subscription bound to a single directory.
///
/// Closing the handle drops the underlying `notify` watcher and wakes the
/// polling body blocked on its [`EventStream`].
pub struct WatchHandle {
    dir: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
    /// Dropped on close; the stream selects on its disconnection.
    stop_tx: Mutex<Option<Sender<()>>>,
    closed: AtomicBool,
}

/// Receiving side of a [`WatchHandle`], owned by the polling body.
pub struct EventStream {
    events: Receiver<notify::Result<Event>>,
    stop: Receiver<()>,
}

impl WatchHandle {
    /// Open a non-recursive watch on `dir`.
    pub fn open(dir: &Path) -> Result<(Arc<Self>, EventStream), WatchError> {
        let (event_tx, event_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        let handle = Arc::new(Self {
            dir: dir.to_path_buf(),
            watcher: Mutex::new(Some(watcher)),
            stop_tx: Mutex::new(Some(stop_tx)),
            closed: AtomicBool::new(false),
        });

        let stream = EventStream {
            events: event_rx,
            stop: stop_rx,
        };

        Ok((handle, stream))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the handle. Idempotent.
    ///
    /// The handle is discarded whatever happens; the returned error only
    /// reports that the OS refused to unwatch (e.g. the directory is gone).
    pub fn close(&self) -> Result<(), WatchError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.stop_tx.lock().take();

        let Some(mut watcher) = self.watcher.lock().take() else {
            return Ok(());
        };

        watcher
            .unwatch(&self.dir)
            .map_err(|e| WatchError::PathWatchFailed {
                path: self.dir.clone(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("dir", &self.dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventStream {
    /// Block until the next batch of notifications arrives.
    ///
    /// A batch is the first notification plus everything already queued
    /// behind it. Returns `None` once the handle is closed or the backend
    /// hangs up.
    pub fn next_batch(&self) -> Option<Vec<notify::Result<Event>>> {
        select! {
            recv(self.stop) -> _ => None,
            recv(self.events) -> msg => match msg {
                Ok(first) => {
                    let mut batch = vec![first];
                    batch.extend(self.events.try_iter());
                    Some(batch)
                }
                Err(_) => None,
            }
        }
    }
}

#[cfg(test)]
impl EventStream {
    /// Stream fed by hand instead of by a notify backend.
    pub(crate) fn from_channels(
        events: Receiver<notify::Result<Event>>,
        stop: Receiver<()>,
    ) -> Self {
        Self { events, stop }
    }
}

/// Every live native handle across a registry, for bulk close.
///
/// The gate orders bulk close against concurrent starts: starts hold it
/// shared, [`exclusive`](Self::exclusive) holds it for the whole teardown.
#[derive(Debug, Clone, Default)]
pub struct HandleSet {
    handles: Arc<Mutex<Vec<Arc<WatchHandle>>>>,
    gate: Arc<RwLock<()>>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared side of the gate, held while a watcher is created or started.
    pub fn admit(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read()
    }

    /// Exclusive side of the gate, held across a bulk teardown.
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    pub fn insert(&self, handle: Arc<WatchHandle>) {
        self.handles.lock().push(handle);
    }

    /// Forget `handle` without closing it. Compared by identity.
    pub fn remove(&self, handle: &Arc<WatchHandle>) {
        self.handles.lock().retain(|h| !Arc::ptr_eq(h, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Close and forget every tracked handle.
    ///
    /// Returns `(closed, failed)`. Failures are logged and otherwise
    /// ignored.
    pub fn close_all(&self) -> (usize, usize) {
        let drained: Vec<_> = std::mem::take(&mut *self.handles.lock());

        let mut failed = 0;
        for handle in &drained {
            if let Err(e) = handle.close() {
                failed += 1;
                crate::best_effort!("registry", "close {}: {e}", handle.dir().display());
            }
        }

        (drained.len() - failed, failed)
    }
}
