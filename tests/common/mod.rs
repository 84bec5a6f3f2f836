//! Shared helpers for watcher integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use filewatch::{FileEvent, FileEventKind, FileEventListener};
use parking_lot::Mutex;

/// Generous upper bound for an OS notification to reach a listener.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener that records every event it receives.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<FileEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: &FileEvent) {
        self.events.lock().push(event.clone());
    }

    pub fn events(&self) -> Vec<FileEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: FileEventKind, path: &Path) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == kind && e.path() == path)
            .count()
    }

    /// Wait until at least one `kind` event for `path` has arrived.
    pub fn wait_for(&self, kind: FileEventKind, path: &Path) -> bool {
        wait_until(EVENT_TIMEOUT, || self.count(kind, path) > 0)
    }
}

impl FileEventListener for Recorder {
    fn on_created(&self, event: &FileEvent) {
        self.record(event)
    }

    fn on_modified(&self, event: &FileEvent) {
        self.record(event)
    }

    fn on_deleted(&self, event: &FileEvent) {
        self.record(event)
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Short pause so any stray notifications have time to show up.
pub fn settle() {
    thread::sleep(Duration::from_millis(300));
}
