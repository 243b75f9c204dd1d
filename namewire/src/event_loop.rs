//! Background poll loop.
//!
//! One named OS thread drives a [`LoopDriver`] in bounded steps until it is
//! stopped or the driver reports the native handle as closed. Each run gets
//! its own stop flag, so a loop that was stopped from inside one of its own
//! callbacks keeps exiting even if a new run is started before it notices.
//!
//! State machine:
//!
//! ```text
//!   Stopped --start--> Running --stop--> Stopped
//!                         |
//!                     fatal error
//!                         v
//!                       Closed (terminal)
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use namewire_core::error::{NamewireError, Result};

/// Lifecycle of the background loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// No loop thread; operations are rejected with `NotInitialized`.
    Stopped = 0,
    /// Loop thread is polling; operations are accepted.
    Running = 1,
    /// Native handle invalidated; nothing further succeeds.
    Closed = 2,
}

impl LoopState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Closed,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Per-run cancellation flag.
#[derive(Debug, Clone, Default)]
pub(crate) struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[inline]
    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Result of one poll step.
#[derive(Debug)]
pub(crate) enum StepOutcome {
    Continue,
    /// The native handle is gone; the loop closes and exits.
    Fatal(String),
}

/// Why a loop run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoopExit {
    Stopped,
    Fatal(String),
}

/// Work performed by the loop thread.
pub(crate) trait LoopDriver: Send + Sync + 'static {
    /// One bounded unit of work. Must not dispatch callbacks once `stop` is set.
    fn poll_step(&self, stop: &StopFlag) -> StepOutcome;

    /// Runs once on the loop thread after the last step.
    fn on_exit(&self, exit: LoopExit, stop: &StopFlag);
}

struct Worker {
    stop: StopFlag,
    handle: JoinHandle<()>,
}

/// Owner of the background loop thread.
pub(crate) struct EventLoopThread {
    state: Arc<AtomicU8>,
    worker: Mutex<Option<Worker>>,
    thread_name: String,
    loop_yield: Duration,
}

impl EventLoopThread {
    pub(crate) fn new(thread_name: impl Into<String>, loop_yield: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LoopState::Stopped as u8)),
            worker: Mutex::new(None),
            thread_name: thread_name.into(),
            loop_yield,
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Accept operations only while running.
    pub(crate) fn ensure_running(&self) -> Result<()> {
        match self.state() {
            LoopState::Running => Ok(()),
            LoopState::Stopped => Err(NamewireError::NotInitialized("event loop not started")),
            LoopState::Closed => Err(NamewireError::HandleClosed),
        }
    }

    /// Move to the terminal state. The loop thread notices and exits.
    pub(crate) fn mark_closed(&self) {
        self.state.store(LoopState::Closed as u8, Ordering::Release);
    }

    /// Spawn the loop thread. Starting a running loop is a no-op.
    pub(crate) fn start(&self, driver: Arc<dyn LoopDriver>) -> Result<bool> {
        let mut worker = self.worker.lock();
        match self.state() {
            LoopState::Running => {
                debug!("[Loop] Already running");
                return Ok(false);
            }
            LoopState::Closed => return Err(NamewireError::HandleClosed),
            LoopState::Stopped => {}
        }

        let stop = StopFlag::default();
        self.state.store(LoopState::Running as u8, Ordering::Release);

        let spawned = thread::Builder::new().name(self.thread_name.clone()).spawn({
            let stop = stop.clone();
            let state = Arc::clone(&self.state);
            let loop_yield = self.loop_yield;
            move || run_loop(&*driver, &stop, &state, loop_yield)
        });

        match spawned {
            Ok(handle) => {
                debug!(thread = %self.thread_name, "[Loop] Spawned");
                *worker = Some(Worker { stop, handle });
                Ok(true)
            }
            Err(e) => {
                error!("[Loop] Failed to spawn loop thread: {}", e);
                self.state.store(LoopState::Stopped as u8, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// From the loop thread itself (inside a callback) this only raises the
    /// stop flag: the current dispatch finishes and the thread exits on its
    /// own. Stopping an idle loop is a no-op.
    pub(crate) fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.stop.set();
        let _ = self.state.compare_exchange(
            LoopState::Running as u8,
            LoopState::Stopped as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        if worker.handle.thread().id() == thread::current().id() {
            debug!("[Loop] Stop requested from the loop thread; exiting after this step");
            return;
        }

        if worker.handle.join().is_err() {
            error!("[Loop] Loop thread panicked");
        }
        debug!("[Loop] Joined");
    }
}

impl Drop for EventLoopThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(driver: &dyn LoopDriver, stop: &StopFlag, state: &AtomicU8, loop_yield: Duration) {
    debug!("[Loop] Started");

    let exit = loop {
        if stop.is_set() {
            break LoopExit::Stopped;
        }
        if LoopState::from_u8(state.load(Ordering::Acquire)) == LoopState::Closed {
            break LoopExit::Fatal("native handle closed".to_string());
        }

        // A panicking native stack leaves the handle in an unknown state.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| driver.poll_step(stop)))
            .unwrap_or_else(|payload| {
                let reason = format!("poll step panicked: {}", panic_message(payload.as_ref()));
                error!("[Loop] {}", reason);
                StepOutcome::Fatal(reason)
            });

        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Fatal(reason) => {
                state.store(LoopState::Closed as u8, Ordering::Release);
                break LoopExit::Fatal(reason);
            }
        }

        if stop.is_set() {
            break LoopExit::Stopped;
        }

        // Lock is released here so application calls can get in.
        if loop_yield.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(loop_yield);
        }
    };

    trace!(?exit, "[Loop] Exiting");
    driver.on_exit(exit, stop);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
