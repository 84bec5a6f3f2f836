//! Registry of watchers, deduplicated by absolute path.
//!
//! The registry owns the shared [`Dispatcher`] and the set of live native
//! handles. It is an ordinary value: construct one per process (or per test)
//! and pass clones to whoever needs to create watchers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::watcher::{FileWatcher, HandleSet, WatchError, WatchTarget};

/// Path-keyed watcher registry. Cloning shares the same state.
#[derive(Clone)]
pub struct WatcherRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    watchers: DashMap<PathBuf, Arc<FileWatcher>>,
    handles: HandleSet,
    dispatcher: Dispatcher,
    shutdown_timeout: Duration,
}

impl WatcherRegistry {
    /// Registry with default settings.
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                watchers: DashMap::new(),
                handles: HandleSet::new(),
                dispatcher: Dispatcher::new(&settings.dispatcher),
                shutdown_timeout: Duration::from_secs(settings.dispatcher.shutdown_timeout_secs),
            }),
        }
    }

    /// Get or create the watcher for `path`.
    ///
    /// Keyed by absolute path; concurrent callers asking for the same path
    /// all receive the same instance.
    pub fn create_watcher(&self, path: impl AsRef<Path>) -> Result<Arc<FileWatcher>, WatchError> {
        let path = path.as_ref();
        let target = WatchTarget::new(path).map_err(|e| WatchError::PathWatchFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let _admit = self.inner.handles.admit();
        let entry = self
            .inner
            .watchers
            .entry(target.path().to_path_buf())
            .or_insert_with(|| {
                crate::debug_event!("registry", "created", "{target}");
                Arc::new(FileWatcher::new(
                    target,
                    self.inner.dispatcher.clone(),
                    self.inner.handles.clone(),
                ))
            });

        Ok(Arc::clone(&*entry))
    }

    /// Look up an existing watcher without creating one.
    pub fn get_watcher(&self, path: impl AsRef<Path>) -> Option<Arc<FileWatcher>> {
        let key = std::path::absolute(path.as_ref()).ok()?;
        self.inner
            .watchers
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Run `job` on the shared pool.
    pub fn execute_in_pool<F>(&self, job: F) -> Result<(), WatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.dispatcher.execute(job)
    }

    /// Close every native handle and forget every watcher.
    ///
    /// Close failures are logged and skipped. Creates and starts running
    /// concurrently either finish before the teardown or wait for it, so no
    /// handle outlives it. Forgotten watchers never start again; later
    /// `create_watcher` calls build fresh ones.
    pub fn close_all_watchers(&self) {
        let _gate = self.inner.handles.exclusive();

        for entry in self.inner.watchers.iter() {
            entry.value().retire();
        }
        self.inner.watchers.clear();

        let (closed, failed) = self.inner.handles.close_all();

        crate::log_event!("registry", "closed", "{closed} handles, {failed} failed");
    }

    /// Close everything and drain the pool, waiting up to the configured
    /// shutdown timeout. Meant for process shutdown hooks.
    pub fn stop_register(&self) -> bool {
        self.stop_register_with_timeout(self.inner.shutdown_timeout)
    }

    /// Like [`stop_register`](Self::stop_register) with an explicit bound.
    ///
    /// Returns `true` if every in-flight task finished in time. Shutdown
    /// proceeds either way.
    pub fn stop_register_with_timeout(&self, timeout: Duration) -> bool {
        self.close_all_watchers();

        let drained = self.inner.dispatcher.shutdown_and_await(timeout);
        if drained {
            crate::log_event!("registry", "stopped");
        } else {
            tracing::warn!(
                "[registry] {} workers still running after {timeout:?}",
                self.inner.dispatcher.worker_count()
            );
        }
        drained
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    /// Live native handles tracked for bulk close.
    pub fn handle_count(&self) -> usize {
        self.inner.handles.len()
    }

    /// Whether the pool has been shut down by `stop_register`.
    pub fn is_stopped(&self) -> bool {
        self.inner.dispatcher.is_shutdown()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("watchers", &self.watcher_count())
            .field("handles", &self.handle_count())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::FileEventListener;
    use std::fs;
    use tempfile::TempDir;

    struct Noop;
    impl FileEventListener for Noop {}

    #[test]
    fn test_create_watcher_dedupes() {
        let temp_dir = TempDir::new().unwrap();
        let registry = WatcherRegistry::new();

        let a = registry.create_watcher(temp_dir.path()).unwrap();
        let b = registry.create_watcher(temp_dir.path()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.watcher_count(), 1);

        a.add_listener(Arc::new(Noop));
        b.add_listener(Arc::new(Noop));
        assert_eq!(a.listener_count(), 2);
    }

    #[test]
    fn test_distinct_paths_get_distinct_watchers() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        let registry = WatcherRegistry::new();
        let dir_watcher = registry.create_watcher(temp_dir.path()).unwrap();
        let file_watcher = registry.create_watcher(&file).unwrap();

        assert!(!Arc::ptr_eq(&dir_watcher, &file_watcher));
        assert!(file_watcher.target().is_file());
        assert_eq!(registry.watcher_count(), 2);
    }

    #[test]
    fn test_get_watcher() {
        let temp_dir = TempDir::new().unwrap();
        let registry = WatcherRegistry::new();

        assert!(registry.get_watcher(temp_dir.path()).is_none());
        let created = registry.create_watcher(temp_dir.path()).unwrap();
        let found = registry.get_watcher(temp_dir.path()).unwrap();
        assert!(Arc::ptr_eq(&created, &found));
    }

    #[test]
    fn test_close_all_watchers_empties_registry() {
        let temp_dir = TempDir::new().unwrap();
        let registry = WatcherRegistry::new();

        let watcher = registry.create_watcher(temp_dir.path()).unwrap();
        watcher.add_listener(Arc::new(Noop));
        watcher.start().unwrap();
        assert_eq!(registry.handle_count(), 1);

        registry.close_all_watchers();

        assert_eq!(registry.watcher_count(), 0);
        assert_eq!(registry.handle_count(), 0);
        assert_eq!(watcher.listener_count(), 0);

        // Still usable afterwards, with a fresh instance.
        let again = registry.create_watcher(temp_dir.path()).unwrap();
        assert!(!Arc::ptr_eq(&watcher, &again));
        assert!(!again.is_active());
    }

    #[test]
    fn test_stop_register_shuts_pool() {
        let registry = WatcherRegistry::new();

        assert!(registry.stop_register_with_timeout(Duration::from_secs(5)));
        assert!(registry.is_stopped());
        assert!(matches!(
            registry.execute_in_pool(|| {}),
            Err(WatchError::PoolShutdown)
        ));
    }

    #[test]
    fn test_clones_share_state() {
        let temp_dir = TempDir::new().unwrap();
        let registry = WatcherRegistry::new();
        let other = registry.clone();

        let a = registry.create_watcher(temp_dir.path()).unwrap();
        let b = other.create_watcher(temp_dir.path()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
