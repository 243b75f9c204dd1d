//! Wrapper configuration options
//!
//! Tunables for the event loop, the request path and the signing identity.

use std::time::Duration;

use crate::keys::KeySource;

/// What a request callback receives when its interest times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Deliver `Response::Expired(name)`.
    #[default]
    Signal,
    /// Deliver `Response::Content` with an unsigned, empty object.
    EmptyPayload,
}

/// Wrapper configuration.
///
/// # Examples
///
/// ```
/// use namewire_core::options::{ExpiryPolicy, WrapperOptions};
/// use namewire_core::keys::KeySource;
/// use std::time::Duration;
///
/// let opts = WrapperOptions::default()
///     .with_interest_lifetime(Duration::from_secs(2))
///     .with_expiry_policy(ExpiryPolicy::EmptyPayload)
///     .with_key_source(KeySource::Ephemeral);
/// ```
#[derive(Debug, Clone)]
pub struct WrapperOptions {
    /// Upper bound on one native poll step.
    ///
    /// The exclusion lock is held for the whole step, so this also bounds how
    /// long an application call can wait for the lock.
    /// - Default: 10ms
    pub poll_timeout: Duration,

    /// Pause between poll steps, with the lock released.
    /// - Default: 1ms
    /// - `Duration::ZERO`: yield the time slice instead of sleeping
    pub loop_yield: Duration,

    /// Lifetime attached to every expressed interest.
    /// - Default: 4 seconds
    pub interest_lifetime: Duration,

    /// Expiry delivery policy.
    /// - Default: [`ExpiryPolicy::Signal`]
    pub expiry_policy: ExpiryPolicy,

    /// Where the signing identity is loaded from.
    /// - Default: [`KeySource::Default`]
    pub key_source: KeySource,

    /// Name of the background loop thread.
    /// - Default: "namewire-loop"
    pub thread_name: String,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(10),
            loop_yield: Duration::from_millis(1),
            interest_lifetime: Duration::from_secs(4),
            expiry_policy: ExpiryPolicy::Signal,
            key_source: KeySource::Default,
            thread_name: "namewire-loop".to_string(),
        }
    }
}

impl WrapperOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_loop_yield(mut self, pause: Duration) -> Self {
        self.loop_yield = pause;
        self
    }

    #[must_use]
    pub fn with_interest_lifetime(mut self, lifetime: Duration) -> Self {
        self.interest_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_key_source(mut self, source: KeySource) -> Self {
        self.key_source = source;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
