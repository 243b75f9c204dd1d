//! Capability boundary to the native content-centric stack.
//!
//! The façade never looks inside the stack: it expresses interests, manages
//! prefix filters, deposits content, and drains inbound events with a bounded
//! [`NativeStack::poll`]. Implementations are single-threaded by contract;
//! the façade guarantees no two calls on the same handle overlap.
//!
//! Status codes follow native conventions: a positive value is success,
//! anything else is a rejection reported to the caller as an error.

use std::io;
use std::time::Duration;

use crate::content::ContentObject;
use crate::name::Name;

/// Raw status code returned by a native call.
pub type NativeStatus = i32;

/// Result of a native call.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Errors raised by a native stack.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// I/O hiccup; the handle stays usable.
    #[error("transient I/O error: {0}")]
    Transient(#[source] io::Error),

    /// Handle invalidated; nothing further will succeed.
    #[error("handle closed: {0}")]
    Closed(String),
}

impl NativeError {
    pub fn transient(e: io::Error) -> Self {
        Self::Transient(e)
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed(reason.into())
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Inbound event yielded by [`NativeStack::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// Content satisfying an interest this handle expressed.
    Content {
        /// Name the interest was expressed for.
        interest: Name,
        content: ContentObject,
    },
    /// Interest from a peer under one of this handle's filters.
    Interest { name: Name },
    /// An interest this handle expressed timed out without content.
    Expired { interest: Name },
}

impl StackEvent {
    /// Name the event is keyed on (interest name for responses and expiry).
    #[must_use]
    pub const fn name(&self) -> &Name {
        match self {
            Self::Content { interest, .. } | Self::Expired { interest } => interest,
            Self::Interest { name } => name,
        }
    }
}

/// A single-threaded, blocking native stack handle.
pub trait NativeStack: Send + 'static {
    /// Send an interest for `name`; the stack times it out after `lifetime`.
    fn express_interest(&mut self, name: &Name, lifetime: Duration) -> NativeResult<NativeStatus>;

    /// Ask for interests under `prefix` to be delivered to this handle.
    fn set_interest_filter(&mut self, prefix: &Name) -> NativeResult<NativeStatus>;

    /// Stop delivering interests under `prefix`.
    fn clear_interest_filter(&mut self, prefix: &Name) -> NativeResult<NativeStatus>;

    /// Deposit a signed content object in the stack's content store.
    fn put_content(&mut self, content: ContentObject) -> NativeResult<NativeStatus>;

    /// Run one bounded processing step, waiting at most `timeout` for I/O.
    fn poll(&mut self, timeout: Duration) -> NativeResult<Vec<StackEvent>>;
}

impl<S: NativeStack + ?Sized> NativeStack for Box<S> {
    fn express_interest(&mut self, name: &Name, lifetime: Duration) -> NativeResult<NativeStatus> {
        (**self).express_interest(name, lifetime)
    }

    fn set_interest_filter(&mut self, prefix: &Name) -> NativeResult<NativeStatus> {
        (**self).set_interest_filter(prefix)
    }

    fn clear_interest_filter(&mut self, prefix: &Name) -> NativeResult<NativeStatus> {
        (**self).clear_interest_filter(prefix)
    }

    fn put_content(&mut self, content: ContentObject) -> NativeResult<NativeStatus> {
        (**self).put_content(content)
    }

    fn poll(&mut self, timeout: Duration) -> NativeResult<Vec<StackEvent>> {
        (**self).poll(timeout)
    }
}
