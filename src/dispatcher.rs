//! Growable worker pool shared by polling bodies and listener callbacks.
//!
//! Jobs go to an idle worker when one is waiting, otherwise a fresh thread
//! is spawned, so a burst of listener tasks can never starve the long-lived
//! polling bodies. Idle workers retire after the keep-alive period.
//!
//! Worker threads never keep the process alive: when `main` returns they
//! are torn down with it. The only place that waits for them is
//! [`Dispatcher::await_termination`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::{Condvar, Mutex};

use crate::config::DispatcherConfig;
use crate::watcher::WatchError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a shared worker pool. Cloning is cheap; clones share workers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    /// Taken on shutdown; workers see the disconnect once the queue drains.
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    /// Waiting workers not yet promised a job.
    idle: AtomicUsize,
    /// Worker threads still running.
    live: Mutex<usize>,
    terminated: Condvar,
    /// Monotonic counter for thread names.
    spawned: AtomicUsize,
    shutdown: AtomicBool,
    keep_alive: Duration,
    thread_name_prefix: String,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        let (sender, receiver) = unbounded();

        Self {
            inner: Arc::new(Inner {
                sender: Mutex::new(Some(sender)),
                receiver,
                idle: AtomicUsize::new(0),
                live: Mutex::new(0),
                terminated: Condvar::new(),
                spawned: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
                keep_alive: Duration::from_millis(config.keep_alive_ms),
                thread_name_prefix: config.thread_name_prefix.clone(),
            }),
        }
    }

    /// Run `job` on a pool thread.
    ///
    /// Fails with [`WatchError::PoolShutdown`] once [`shutdown`](Self::shutdown)
    /// has been called. A panicking job is logged and does not take its
    /// worker down.
    pub fn execute<F>(&self, job: F) -> Result<(), WatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);

        // Held only for the clone; spawning happens unlocked.
        let Some(sender) = self.inner.sender.lock().clone() else {
            return Err(WatchError::PoolShutdown);
        };

        if self.inner.claim_idle() {
            return sender.send(job).map_err(|_| WatchError::PoolShutdown);
        }

        self.spawn_worker(job)
    }

    fn spawn_worker(&self, first: Job) -> Result<(), WatchError> {
        let id = self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{id}", self.inner.thread_name_prefix);

        *self.inner.live.lock() += 1;

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(inner, first));

        if let Err(e) = spawned {
            self.inner.worker_exited();
            return Err(WatchError::ThreadSpawn {
                reason: e.to_string(),
            });
        }

        crate::debug_event!("dispatcher", "spawned", "worker {id}");
        Ok(())
    }

    /// Stop accepting jobs. Queued jobs still run; idle workers exit.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.sender.lock().take();
        crate::debug_event!("dispatcher", "shutdown requested");
    }

    /// Wait up to `timeout` for every worker to exit.
    ///
    /// Only meaningful after [`shutdown`](Self::shutdown); before that, idle
    /// workers linger until their keep-alive expires. Returns `true` if the
    /// pool fully drained.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = self.inner.live.lock();

        while *live > 0 {
            if self
                .inner
                .terminated
                .wait_until(&mut live, deadline)
                .timed_out()
            {
                return *live == 0;
            }
        }

        true
    }

    /// [`shutdown`](Self::shutdown) followed by
    /// [`await_termination`](Self::await_termination).
    pub fn shutdown_and_await(&self, timeout: Duration) -> bool {
        self.shutdown();
        self.await_termination(timeout)
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Worker threads currently alive (busy or idle).
    pub fn worker_count(&self) -> usize {
        *self.inner.live.lock()
    }

    /// Workers waiting for a job.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.load(Ordering::SeqCst)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&DispatcherConfig::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.worker_count())
            .field("idle", &self.idle_count())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Inner {
    /// Reserve one idle worker for a job about to be queued.
    fn claim_idle(&self) -> bool {
        self.idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn run_job(&self, job: Job) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(
                "[dispatcher] task panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    fn worker_exited(&self) {
        let mut live = self.live.lock();
        *live -= 1;
        if *live == 0 {
            self.terminated.notify_all();
        }
    }
}

fn worker_loop(inner: Arc<Inner>, first: Job) {
    inner.run_job(first);

    loop {
        inner.idle.fetch_add(1, Ordering::SeqCst);

        let next = loop {
            match inner.receiver.recv_timeout(inner.keep_alive) {
                Ok(job) => break Some(job),
                Err(RecvTimeoutError::Timeout) => {
                    // Retire only if nobody has promised us a job meanwhile.
                    if inner.claim_idle() {
                        break None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    inner.claim_idle();
                    break None;
                }
            }
        };

        match next {
            Some(job) => inner.run_job(job),
            None => break,
        }
    }

    inner.worker_exited();
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
