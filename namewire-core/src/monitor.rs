//! Wrapper event monitoring.
//!
//! Provides an event stream for the background loop's lifecycle and the
//! faults it absorbs (transient errors, panicking callbacks).

use std::fmt;

use crate::name::Name;

/// Loop lifecycle and fault events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapperEvent {
    /// Background loop thread started.
    LoopStarted,

    /// Background loop thread exited after a stop request.
    LoopStopped,

    /// Native handle invalidated; the wrapper is unusable.
    HandleClosed { reason: String },

    /// A poll step failed transiently; the loop kept going.
    TransientError { reason: String },

    /// A user callback panicked; the loop kept going.
    CallbackPanicked { name: Name },
}

impl fmt::Display for WrapperEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoopStarted => f.write_str("Loop started"),
            Self::LoopStopped => f.write_str("Loop stopped"),
            Self::HandleClosed { reason } => write!(f, "Handle closed: {reason}"),
            Self::TransientError { reason } => write!(f, "Transient error: {reason}"),
            Self::CallbackPanicked { name } => write!(f, "Callback for {name} panicked"),
        }
    }
}

/// Handle for receiving wrapper events.
pub type WrapperMonitor = flume::Receiver<WrapperEvent>;

/// Sending half used by the wrapper to emit events.
pub type WrapperEventSender = flume::Sender<WrapperEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (WrapperEventSender, WrapperMonitor) {
    flume::unbounded()
}
