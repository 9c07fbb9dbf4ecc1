use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::model_loader::{LoadError, ModelLoader};

use super::error::SessionError;

pub(crate) type SharedDetector = Arc<Mutex<Box<dyn FaceDetector>>>;

/// Observable model load state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Idle => write!(f, "idle"),
            LoadStatus::Loading => write!(f, "loading"),
            LoadStatus::Ready => write!(f, "ready"),
            LoadStatus::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

enum Slot {
    Idle,
    Loading,
    Ready(SharedDetector),
    Failed(SessionError),
}

impl Slot {
    fn status(&self) -> LoadStatus {
        match self {
            Slot::Idle => LoadStatus::Idle,
            Slot::Loading => LoadStatus::Loading,
            Slot::Ready(_) => LoadStatus::Ready,
            Slot::Failed(e) => LoadStatus::Failed(e.to_string()),
        }
    }
}

/// What to do when the gate finds a previous load failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OnFailed {
    Retry,
    Report,
}

/// Shared handle every caller joins before touching the model.
///
/// At most one load runs at a time; callers arriving while it runs block
/// until it finishes and share its outcome.
pub struct ReadinessGate {
    slot: Mutex<Slot>,
    changed: Condvar,
    ready: AtomicBool,
    watchers: Mutex<Vec<Sender<LoadStatus>>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
            changed: Condvar::new(),
            ready: AtomicBool::new(false),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// The readiness flag: false until a load succeeds, then true for good.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn status(&self) -> LoadStatus {
        lock(&self.slot).status()
    }

    /// Subscribe to status changes. The current status is sent first.
    pub fn watch(&self) -> Receiver<LoadStatus> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let slot = lock(&self.slot);
        let _ = tx.send(slot.status());
        lock(&self.watchers).push(tx);
        rx
    }

    /// Block until the model is ready, a load fails, or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout. Does not start a load. A timeout too
    /// large to represent as a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, SessionError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = lock(&self.slot);
        loop {
            match &*slot {
                Slot::Ready(_) => return Ok(true),
                Slot::Failed(e) => return Err(e.clone()),
                Slot::Idle | Slot::Loading => {}
            }
            slot = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    self.changed
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Return the loaded detector, running `loader` if no load has succeeded.
    ///
    /// Joins an in-flight load instead of starting a second one. A caller that
    /// joined a load gets that load's outcome, failure included; only a call
    /// arriving after a failure retries under `OnFailed::Retry`.
    pub(crate) fn ensure_loaded(
        &self,
        loader: &dyn ModelLoader,
        on_failed: OnFailed,
    ) -> Result<SharedDetector, SessionError> {
        let mut slot = lock(&self.slot);
        let mut joined = false;
        loop {
            let in_flight = match &*slot {
                Slot::Ready(detector) => return Ok(detector.clone()),
                Slot::Failed(e) if joined || on_failed == OnFailed::Report => {
                    return Err(e.clone())
                }
                Slot::Loading => true,
                Slot::Idle | Slot::Failed(_) => false,
            };
            if !in_flight {
                break;
            }
            joined = true;
            slot = self
                .changed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *slot = Slot::Loading;
        drop(slot);
        self.publish(LoadStatus::Loading);

        log::info!("Loading {}", loader.describe());
        let outcome = run_loader(loader);

        let mut slot = lock(&self.slot);
        let result = match outcome {
            Ok(detector) => {
                let shared: SharedDetector = Arc::new(Mutex::new(detector));
                *slot = Slot::Ready(shared.clone());
                self.ready.store(true, Ordering::Release);
                Ok(shared)
            }
            Err(e) => {
                let err = SessionError::ModelLoad(Arc::from(e));
                log::warn!("{err}");
                *slot = Slot::Failed(err.clone());
                Err(err)
            }
        };
        let status = slot.status();
        drop(slot);
        self.changed.notify_all();
        self.publish(status);
        result
    }

    fn publish(&self, status: LoadStatus) {
        lock(&self.watchers).retain(|tx| tx.send(status.clone()).is_ok());
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

/// A panicking loader must not leave waiters stuck on `Loading`.
fn run_loader(loader: &dyn ModelLoader) -> Result<Box<dyn FaceDetector>, LoadError> {
    match panic::catch_unwind(AssertUnwindSafe(|| loader.load())) {
        Ok(result) => result,
        Err(_) => Err("model loader panicked".into()),
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
