//! Outstanding request table.
//!
//! Design:
//! - `BTreeMap<Name, VecDeque<PendingRequest>>`, keyed on the interest name.
//! - A second request for a name that is still pending queues behind the
//!   first (FIFO). Each waiter gets a token so a failed native send can
//!   withdraw exactly the waiter it inserted.
//! - Content for a name completes every queued waiter, oldest first.
//! - Expiry for a name completes only the oldest waiter: each native
//!   interest times out on its own.
//! - The table is mutated only inside the façade's critical section.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Instant;

use bytes::Bytes;

use crate::content::ContentObject;
use crate::name::Name;

/// Outcome delivered to a request's completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Content arrived for the requested name.
    Content(ContentObject),
    /// The interest timed out without content.
    Expired(Name),
    /// The native handle was closed while the request was outstanding.
    Closed(Name),
}

impl Response {
    /// Payload bytes; empty for anything but content.
    #[must_use]
    pub fn payload(&self) -> Bytes {
        match self {
            Self::Content(obj) => obj.payload().clone(),
            Self::Expired(_) | Self::Closed(_) => Bytes::new(),
        }
    }

    #[must_use]
    pub const fn is_content(&self) -> bool {
        matches!(self, Self::Content(_))
    }

    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }

    #[must_use]
    pub const fn content(&self) -> Option<&ContentObject> {
        match self {
            Self::Content(obj) => Some(obj),
            _ => None,
        }
    }
}

/// Completion callback for an expressed interest. Runs on the loop thread.
pub type ResponseCallback = Box<dyn FnOnce(Response) + Send + 'static>;

/// Identifies one waiter within the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

/// One outstanding request and its completion callback.
pub struct PendingRequest<C = ResponseCallback> {
    name: Name,
    token: RequestToken,
    issued_at: Instant,
    callback: C,
}

impl<C> PendingRequest<C> {
    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }

    #[must_use]
    pub const fn token(&self) -> RequestToken {
        self.token
    }

    #[must_use]
    pub const fn issued_at(&self) -> Instant {
        self.issued_at
    }

    #[must_use]
    pub fn into_callback(self) -> C {
        self.callback
    }
}

impl PendingRequest<ResponseCallback> {
    /// Consume the request, invoking its callback.
    pub fn respond(self, response: Response) {
        (self.callback)(response);
    }
}

impl<C> fmt::Debug for PendingRequest<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("name", &self.name)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Table of outstanding requests keyed by interest name.
pub struct RequestRegistry<C = ResponseCallback> {
    pending: BTreeMap<Name, VecDeque<PendingRequest<C>>>,
    next_token: u64,
    waiters: usize,
}

impl<C> Default for RequestRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RequestRegistry<C> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_token: 1,
            waiters: 0,
        }
    }

    /// Number of waiters across all names.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.waiters
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.waiters == 0
    }

    #[must_use]
    pub fn is_pending(&self, name: &Name) -> bool {
        self.pending.contains_key(name)
    }

    /// Number of waiters queued on `name`.
    #[must_use]
    pub fn waiters(&self, name: &Name) -> usize {
        self.pending.get(name).map_or(0, VecDeque::len)
    }

    /// Queue a waiter for `name`, behind any existing ones.
    pub fn insert(&mut self, name: Name, callback: C) -> RequestToken {
        let token = RequestToken(self.next_token);
        self.next_token += 1;

        let request = PendingRequest {
            name: name.clone(),
            token,
            issued_at: Instant::now(),
            callback,
        };
        self.pending.entry(name).or_default().push_back(request);
        self.waiters += 1;
        token
    }

    /// Withdraw the waiter identified by `token`.
    pub fn cancel(&mut self, name: &Name, token: RequestToken) -> Option<PendingRequest<C>> {
        let queue = self.pending.get_mut(name)?;
        let pos = queue.iter().position(|r| r.token == token)?;
        let request = queue.remove(pos);
        if queue.is_empty() {
            self.pending.remove(name);
        }
        if request.is_some() {
            self.waiters -= 1;
        }
        request
    }

    /// Remove every waiter for `name`, oldest first.
    ///
    /// Returns an empty vec for names with nothing pending.
    pub fn complete(&mut self, name: &Name) -> Vec<PendingRequest<C>> {
        let Some(queue) = self.pending.remove(name) else {
            return Vec::new();
        };
        self.waiters -= queue.len();
        queue.into()
    }

    /// Remove only the oldest waiter for `name`.
    pub fn expire_oldest(&mut self, name: &Name) -> Option<PendingRequest<C>> {
        let queue = self.pending.get_mut(name)?;
        let request = queue.pop_front();
        if queue.is_empty() {
            self.pending.remove(name);
        }
        if request.is_some() {
            self.waiters -= 1;
        }
        request
    }

    /// Remove everything (teardown / handle closed), ordered by name then age.
    pub fn drain(&mut self) -> Vec<PendingRequest<C>> {
        self.waiters = 0;
        std::mem::take(&mut self.pending)
            .into_values()
            .flatten()
            .collect()
    }
}

impl<C> fmt::Debug for RequestRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("names", &self.pending.len())
            .field("waiters", &self.waiters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[test]
    fn test_insert_and_complete() {
        let mut reg: RequestRegistry<u32> = RequestRegistry::new();
        reg.insert(name("/a"), 1);
        reg.insert(name("/b"), 2);
        assert_eq!(reg.len(), 2);

        let done = reg.complete(&name("/a"));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].name(), &name("/a"));
        assert!(!reg.is_pending(&name("/a")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_requests_queue_in_order() {
        let mut reg: RequestRegistry<u32> = RequestRegistry::new();
        reg.insert(name("/a"), 1);
        reg.insert(name("/a"), 2);
        reg.insert(name("/a"), 3);
        assert_eq!(reg.waiters(&name("/a")), 3);

        let done: Vec<u32> = reg
            .complete(&name("/a"))
            .into_iter()
            .map(PendingRequest::into_callback)
            .collect();
        assert_eq!(done, vec![1, 2, 3]);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_expiry_pops_oldest_only() {
        let mut reg: RequestRegistry<u32> = RequestRegistry::new();
        reg.insert(name("/a"), 1);
        reg.insert(name("/a"), 2);

        let first = reg.expire_oldest(&name("/a")).unwrap();
        assert_eq!(first.into_callback(), 1);
        assert_eq!(reg.waiters(&name("/a")), 1);

        let second = reg.expire_oldest(&name("/a")).unwrap();
        assert_eq!(second.into_callback(), 2);
        assert!(reg.expire_oldest(&name("/a")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_cancel_removes_exact_waiter() {
        let mut reg: RequestRegistry<u32> = RequestRegistry::new();
        let t1 = reg.insert(name("/a"), 1);
        let t2 = reg.insert(name("/a"), 2);

        assert_eq!(reg.cancel(&name("/a"), t2).unwrap().into_callback(), 2);
        assert!(reg.cancel(&name("/a"), t2).is_none());
        assert_eq!(reg.waiters(&name("/a")), 1);

        reg.cancel(&name("/a"), t1).unwrap();
        assert!(!reg.is_pending(&name("/a")));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_unmatched_completion_is_empty() {
        let mut reg: RequestRegistry<u32> = RequestRegistry::new();
        reg.insert(name("/a"), 1);
        assert!(reg.complete(&name("/a/b")).is_empty());
        assert!(reg.expire_oldest(&name("/zzz")).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_drain_empties_everything() {
        let mut reg: RequestRegistry<u32> = RequestRegistry::new();
        reg.insert(name("/b"), 2);
        reg.insert(name("/a"), 1);
        reg.insert(name("/a"), 3);

        let drained: Vec<u32> = reg.drain().into_iter().map(PendingRequest::into_callback).collect();
        assert_eq!(drained, vec![1, 3, 2]);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_boxed_callback_receives_response() {
        let (tx, rx) = flume::unbounded();
        let mut reg = RequestRegistry::<ResponseCallback>::new();
        reg.insert(
            name("/a"),
            Box::new(move |resp: Response| tx.send(resp).unwrap()),
        );

        for req in reg.complete(&name("/a")) {
            req.respond(Response::Expired(name("/a")));
        }
        assert_eq!(rx.recv().unwrap(), Response::Expired(name("/a")));
    }
}
