//! Thread-safe façade over a single-threaded native stack.
//!
//! [`Wrapper`] owns one [`NativeStack`] handle plus the request and filter
//! registries, all behind a single reentrant exclusion lock. The background
//! loop takes that lock for each bounded poll step; application calls take it
//! for each native call. No two native calls ever overlap.
//!
//! Callbacks run on the loop thread while the lock is still held, but after
//! the inner `RefCell` borrow has been released. A callback may therefore call
//! straight back into the façade (through a [`WrapperHandle`]) from the same
//! thread without deadlocking, and other threads stay excluded meanwhile.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info, trace, warn};

use namewire_core::content::ContentObject;
use namewire_core::error::{NamewireError, Result};
use namewire_core::filter::{FilterRegistry, InterestCallback};
use namewire_core::keys::{KeyLocator, KeyManager, PublicKeyDigest};
use namewire_core::monitor::{create_monitor, WrapperEvent, WrapperEventSender, WrapperMonitor};
use namewire_core::name::{IntoName, Name};
use namewire_core::options::{ExpiryPolicy, WrapperOptions};
use namewire_core::pending::{PendingRequest, RequestRegistry, Response};
use namewire_core::stack::{NativeResult, NativeStack, NativeStatus, StackEvent};

use crate::event_loop::{EventLoopThread, LoopDriver, LoopExit, LoopState, StepOutcome, StopFlag};

/// Positive status code returned by a successful native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(NativeStatus);

impl Status {
    #[must_use]
    pub const fn code(self) -> NativeStatus {
        self.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable state guarded by the exclusion lock.
struct Core<S> {
    stack: S,
    requests: RequestRegistry,
    filters: FilterRegistry,
}

/// Callback invocation prepared under the borrow, run after it is released.
enum Dispatch {
    Response {
        request: PendingRequest,
        response: Response,
    },
    Interest {
        callback: InterestCallback,
        name: Name,
    },
}

impl Dispatch {
    fn name(&self) -> &Name {
        match self {
            Self::Response { request, .. } => request.name(),
            Self::Interest { name, .. } => name,
        }
    }

    fn run(self) {
        match self {
            Self::Response { request, response } => request.respond(response),
            Self::Interest { callback, name } => callback(&name),
        }
    }
}

impl<S> Core<S> {
    fn resolve(&mut self, event: StackEvent, policy: ExpiryPolicy, out: &mut Vec<Dispatch>) {
        match event {
            StackEvent::Content { interest, content } => {
                let waiters = self.requests.complete(&interest);
                if waiters.is_empty() {
                    trace!(name = %interest, "[Wrapper] Discarding unmatched content");
                }
                out.extend(waiters.into_iter().map(|request| Dispatch::Response {
                    request,
                    response: Response::Content(content.clone()),
                }));
            }
            StackEvent::Expired { interest } => {
                let Some(request) = self.requests.expire_oldest(&interest) else {
                    trace!(name = %interest, "[Wrapper] Discarding unmatched expiry");
                    return;
                };
                let response = match policy {
                    ExpiryPolicy::Signal => Response::Expired(interest),
                    ExpiryPolicy::EmptyPayload => Response::Content(ContentObject::empty(interest)),
                };
                out.push(Dispatch::Response { request, response });
            }
            StackEvent::Interest { name } => match self.filters.longest_match(&name) {
                Some(entry) => out.push(Dispatch::Interest {
                    callback: Arc::clone(entry.callback()),
                    name,
                }),
                None => trace!(%name, "[Wrapper] Discarding interest with no filter"),
            },
        }
    }
}

struct Shared<S> {
    core: ReentrantMutex<RefCell<Core<S>>>,
    keys: KeyManager,
    locator: KeyLocator,
    options: WrapperOptions,
    event_loop: EventLoopThread,
    monitor: Mutex<Option<WrapperEventSender>>,
}

impl<S: NativeStack> Shared<S> {
    fn emit(&self, event: WrapperEvent) {
        if let Some(sender) = self.monitor.lock().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Map a native result onto the façade's error model.
    fn check(&self, op: &'static str, result: NativeResult<NativeStatus>) -> Result<Status> {
        match result {
            Ok(code) if code > 0 => Ok(Status(code)),
            Ok(code) => {
                debug!(op, code, "[Wrapper] Native call rejected");
                Err(NamewireError::Rejected { op, code })
            }
            Err(e) if e.is_fatal() => {
                error!(op, "[Wrapper] Native handle closed: {}", e);
                self.event_loop.mark_closed();
                Err(NamewireError::HandleClosed)
            }
            Err(e) => {
                warn!(op, "[Wrapper] Native call failed: {}", e);
                Err(NamewireError::Native(e))
            }
        }
    }

    fn express_interest(&self, name: Name, callback: Box<dyn FnOnce(Response) + Send>) -> Result<Status> {
        self.event_loop.ensure_running()?;
        let guard = self.core.lock();
        let mut core = guard.borrow_mut();
        // State may have changed while waiting for the lock.
        self.event_loop.ensure_running()?;

        let token = core.requests.insert(name.clone(), callback);
        let result = core.stack.express_interest(&name, self.options.interest_lifetime);
        let status = self.check("express_interest", result);
        if status.is_err() {
            core.requests.cancel(&name, token);
        }
        trace!(%name, ok = status.is_ok(), "[Wrapper] Interest expressed");
        status
    }

    fn register_filter(&self, prefix: Name, callback: InterestCallback) -> Result<Status> {
        self.event_loop.ensure_running()?;
        let guard = self.core.lock();
        let mut core = guard.borrow_mut();
        self.event_loop.ensure_running()?;

        let result = core.stack.set_interest_filter(&prefix);
        let status = self.check("set_interest_filter", result)?;
        if core.filters.register(prefix.clone(), callback).is_some() {
            debug!(%prefix, "[Wrapper] Filter callback replaced");
        } else {
            debug!(%prefix, "[Wrapper] Filter registered");
        }
        Ok(status)
    }

    fn unregister_filter(&self, prefix: &Name) -> Result<()> {
        self.event_loop.ensure_running()?;
        let guard = self.core.lock();
        let mut core = guard.borrow_mut();
        self.event_loop.ensure_running()?;

        if !core.filters.contains(prefix) {
            trace!(%prefix, "[Wrapper] Unregister of unknown prefix ignored");
            return Ok(());
        }
        // The entry stays until the native stack has dropped the filter.
        let result = core.stack.clear_interest_filter(prefix);
        self.check("clear_interest_filter", result)?;
        core.filters.unregister(prefix);
        debug!(%prefix, "[Wrapper] Filter unregistered");
        Ok(())
    }

    fn publish(&self, name: Name, payload: Bytes, freshness: Duration) -> Result<Status> {
        self.event_loop.ensure_running()?;
        let content = ContentObject::new(name, payload, Some(freshness)).sign(&self.keys)?;

        let guard = self.core.lock();
        let mut core = guard.borrow_mut();
        self.event_loop.ensure_running()?;

        let name = content.name().clone();
        let result = core.stack.put_content(content);
        let status = self.check("put_content", result);
        trace!(%name, ok = status.is_ok(), "[Wrapper] Content published");
        status
    }

    fn invoke(&self, dispatch: Dispatch) {
        let name = dispatch.name().clone();
        if panic::catch_unwind(AssertUnwindSafe(|| dispatch.run())).is_err() {
            error!(%name, "[Wrapper] Callback panicked");
            self.emit(WrapperEvent::CallbackPanicked { name });
        }
    }

    /// Drop every registration without invoking anything.
    fn abandon(&self) {
        let guard = self.core.lock();
        let Ok(mut core) = guard.try_borrow_mut() else {
            return;
        };
        let requests = core.requests.drain();
        let filters = core.filters.clear();
        drop(core);
        if !requests.is_empty() || !filters.is_empty() {
            debug!(
                requests = requests.len(),
                filters = filters.len(),
                "[Wrapper] Abandoning registrations"
            );
        }
    }
}

impl<S: NativeStack> LoopDriver for Shared<S> {
    fn poll_step(&self, stop: &StopFlag) -> StepOutcome {
        let guard = self.core.lock();

        let polled = guard.borrow_mut().stack.poll(self.options.poll_timeout);
        let events = match polled {
            Ok(events) => events,
            Err(e) if e.is_fatal() => return StepOutcome::Fatal(e.to_string()),
            Err(e) => {
                warn!("[Loop] Transient poll error: {}", e);
                self.emit(WrapperEvent::TransientError {
                    reason: e.to_string(),
                });
                return StepOutcome::Continue;
            }
        };
        if events.is_empty() {
            return StepOutcome::Continue;
        }

        let mut dispatches = Vec::with_capacity(events.len());
        {
            let mut core = guard.borrow_mut();
            for event in events {
                core.resolve(event, self.options.expiry_policy, &mut dispatches);
            }
        }

        // Borrow released: callbacks may reenter the façade.
        for dispatch in dispatches {
            if stop.is_set() {
                debug!(name = %dispatch.name(), "[Loop] Stopped; skipping remaining callbacks");
                break;
            }
            self.invoke(dispatch);
        }
        StepOutcome::Continue
    }

    fn on_exit(&self, exit: LoopExit, stop: &StopFlag) {
        match exit {
            LoopExit::Stopped => {
                info!("[Loop] Stopped");
                self.emit(WrapperEvent::LoopStopped);
            }
            LoopExit::Fatal(reason) => {
                error!("[Loop] Native handle closed: {}", reason);
                self.emit(WrapperEvent::HandleClosed {
                    reason: reason.clone(),
                });

                let guard = self.core.lock();
                let orphans = guard.borrow_mut().requests.drain();
                for request in orphans {
                    if stop.is_set() {
                        break;
                    }
                    let name = request.name().clone();
                    self.invoke(Dispatch::Response {
                        request,
                        response: Response::Closed(name),
                    });
                }
            }
        }
    }
}

/// Thread-safe façade over one native stack handle.
///
/// Created stopped: call [`Wrapper::start`] before issuing operations.
/// Dropping the wrapper stops the loop and discards outstanding requests and
/// filters without invoking their callbacks.
///
/// # Examples
///
/// ```
/// use namewire::prelude::*;
/// use std::time::Duration;
///
/// let net = LoopbackNetwork::new();
/// let opts = WrapperOptions::default().with_key_source(KeySource::Ephemeral);
///
/// let wrapper = Wrapper::new(net.attach(), opts).unwrap();
/// wrapper.start().unwrap();
///
/// let (tx, rx) = flume::unbounded();
/// wrapper.publish("/demo/greeting", "hello", Duration::from_secs(5)).unwrap();
/// wrapper
///     .express_interest("/demo/greeting", move |resp| { let _ = tx.send(resp); })
///     .unwrap();
///
/// let resp = rx.recv_timeout(Duration::from_secs(2)).unwrap();
/// assert_eq!(&resp.payload()[..], b"hello");
/// ```
pub struct Wrapper<S: NativeStack> {
    shared: Arc<Shared<S>>,
}

impl<S: NativeStack> Wrapper<S> {
    /// Take ownership of `stack` and load the signing identity.
    ///
    /// A keystore failure here is fatal: there is no degraded mode without
    /// a signing key.
    pub fn new(stack: S, options: WrapperOptions) -> Result<Self> {
        let keys = KeyManager::new();
        keys.initialize(&options.key_source)?;
        let locator = *keys.locator()?;
        info!(digest = %locator.digest(), "[Wrapper] Signing identity ready");

        let event_loop = EventLoopThread::new(options.thread_name.clone(), options.loop_yield);
        let shared = Shared {
            core: ReentrantMutex::new(RefCell::new(Core {
                stack,
                requests: RequestRegistry::new(),
                filters: FilterRegistry::new(),
            })),
            keys,
            locator,
            options,
            event_loop,
            monitor: Mutex::new(None),
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Start the background loop. Starting a running wrapper is a no-op.
    pub fn start(&self) -> Result<()> {
        let driver: Arc<dyn LoopDriver> = self.shared.clone();
        if self.shared.event_loop.start(driver)? {
            info!("[Wrapper] Started");
            self.shared.emit(WrapperEvent::LoopStarted);
        }
        Ok(())
    }

    /// Stop the background loop and wait for it to exit.
    ///
    /// Once this returns no callback fires. Called from inside a callback it
    /// returns immediately; the loop exits when that callback returns.
    pub fn stop(&self) {
        self.shared.event_loop.stop();
    }

    /// Express an interest for `name`; `callback` runs once with the outcome.
    ///
    /// Returns the native status. On error the callback never runs.
    pub fn express_interest<N, F>(&self, name: N, callback: F) -> Result<Status>
    where
        N: IntoName,
        F: FnOnce(Response) + Send + 'static,
    {
        let name = name.into_name()?;
        self.shared.express_interest(name, Box::new(callback))
    }

    /// Deliver interests under `prefix` to `callback`, replacing any callback
    /// already registered for exactly that prefix.
    pub fn register_filter<N, F>(&self, prefix: N, callback: F) -> Result<Status>
    where
        N: IntoName,
        F: Fn(&Name) + Send + Sync + 'static,
    {
        let prefix = prefix.into_name()?;
        self.shared.register_filter(prefix, Arc::new(callback))
    }

    /// Remove the filter for exactly `prefix`. Unknown prefixes are ignored.
    pub fn unregister_filter<N: IntoName>(&self, prefix: N) -> Result<()> {
        let prefix = prefix.into_name()?;
        self.shared.unregister_filter(&prefix)
    }

    /// Sign `payload` under `name` and deposit it with the native stack.
    pub fn publish<N, P>(&self, name: N, payload: P, freshness: Duration) -> Result<Status>
    where
        N: IntoName,
        P: Into<Bytes>,
    {
        let name = name.into_name()?;
        self.shared.publish(name, payload.into(), freshness)
    }

    #[must_use]
    pub fn public_key_digest(&self) -> &PublicKeyDigest {
        self.shared.locator.digest()
    }

    #[must_use]
    pub fn key_locator(&self) -> &KeyLocator {
        &self.shared.locator
    }

    /// Subscribe to loop events. A new monitor replaces the previous one.
    pub fn monitor(&self) -> WrapperMonitor {
        let (sender, receiver) = create_monitor();
        *self.shared.monitor.lock() = Some(sender);
        receiver
    }

    /// Weak handle for use inside callbacks.
    #[must_use]
    pub fn handle(&self) -> WrapperHandle<S> {
        WrapperHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.shared.event_loop.state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    #[must_use]
    pub fn options(&self) -> &WrapperOptions {
        &self.shared.options
    }
}

impl<S: NativeStack> fmt::Debug for Wrapper<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("state", &self.state())
            .field("digest", self.public_key_digest())
            .finish_non_exhaustive()
    }
}

impl<S: NativeStack> Drop for Wrapper<S> {
    fn drop(&mut self) {
        self.shared.event_loop.stop();
        self.shared.abandon();
        debug!("[Wrapper] Dropped");
    }
}

/// Non-owning handle to a [`Wrapper`].
///
/// Callbacks capture this rather than the wrapper itself, so registrations
/// never keep the wrapper alive. Every call fails with `HandleClosed` once
/// the wrapper is gone.
pub struct WrapperHandle<S: NativeStack> {
    shared: Weak<Shared<S>>,
}

impl<S: NativeStack> Clone for WrapperHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<S: NativeStack> WrapperHandle<S> {
    fn upgrade(&self) -> Result<Arc<Shared<S>>> {
        self.shared.upgrade().ok_or(NamewireError::HandleClosed)
    }

    pub fn express_interest<N, F>(&self, name: N, callback: F) -> Result<Status>
    where
        N: IntoName,
        F: FnOnce(Response) + Send + 'static,
    {
        let name = name.into_name()?;
        self.upgrade()?.express_interest(name, Box::new(callback))
    }

    pub fn register_filter<N, F>(&self, prefix: N, callback: F) -> Result<Status>
    where
        N: IntoName,
        F: Fn(&Name) + Send + Sync + 'static,
    {
        let prefix = prefix.into_name()?;
        self.upgrade()?.register_filter(prefix, Arc::new(callback))
    }

    pub fn unregister_filter<N: IntoName>(&self, prefix: N) -> Result<()> {
        let prefix = prefix.into_name()?;
        self.upgrade()?.unregister_filter(&prefix)
    }

    pub fn publish<N, P>(&self, name: N, payload: P, freshness: Duration) -> Result<Status>
    where
        N: IntoName,
        P: Into<Bytes>,
    {
        let name = name.into_name()?;
        self.upgrade()?.publish(name, payload.into(), freshness)
    }

    /// Request a stop. Safe to call from inside a callback.
    pub fn stop(&self) {
        if let Ok(shared) = self.upgrade() {
            shared.event_loop.stop();
        }
    }

    /// Current loop state; `Closed` once the wrapper is gone.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.shared
            .upgrade()
            .map_or(LoopState::Closed, |shared| shared.event_loop.state())
    }
}

impl<S: NativeStack> fmt::Debug for WrapperHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperHandle")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
