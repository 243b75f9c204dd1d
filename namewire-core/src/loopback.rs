//! In-process content-centric fabric implementing [`NativeStack`].
//!
//! A [`LoopbackNetwork`] plays the role of a local forwarder: every
//! [`LoopbackFace`] attached to it is one native handle. The fabric keeps
//!
//! - a content store honoring each object's freshness bound,
//! - a pending interest table with per-interest lifetimes,
//! - per-face prefix filters used to forward interests to other faces.
//!
//! Events for a face travel over an unbounded `flume` channel and are drained
//! by [`NativeStack::poll`], which blocks for at most the given timeout.
//!
//! # Usage
//!
//! ```rust
//! use namewire_core::loopback::LoopbackNetwork;
//! use namewire_core::stack::{NativeStack, StackEvent};
//! use namewire_core::name::Name;
//! use std::time::Duration;
//!
//! let net = LoopbackNetwork::new();
//! let mut server = net.attach();
//! let mut client = net.attach();
//!
//! let prefix = Name::parse("/app").unwrap();
//! server.set_interest_filter(&prefix).unwrap();
//! client
//!     .express_interest(&Name::parse("/app/x").unwrap(), Duration::from_secs(1))
//!     .unwrap();
//!
//! let events = server.poll(Duration::from_millis(50)).unwrap();
//! assert!(matches!(&events[0], StackEvent::Interest { name } if name.to_string() == "/app/x"));
//! ```
//!
//! Networks can also be looked up by name so independent components of one
//! process share a fabric, see [`LoopbackNetwork::shared`].

use dashmap::DashMap;
use flume::{Receiver, RecvTimeoutError, Sender};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::content::ContentObject;
use crate::name::Name;
use crate::stack::{NativeError, NativeResult, NativeStack, NativeStatus, StackEvent};

/// Status returned for every accepted call.
pub const STATUS_OK: NativeStatus = 1;

/// Status returned when unsigned content is offered to the store.
pub const STATUS_UNSIGNED: NativeStatus = 0;

/// Identifier of a face within one network.
pub type FaceId = u64;

/// Process-wide registry of named networks.
static SHARED_NETWORKS: once_cell::sync::Lazy<DashMap<String, LoopbackNetwork>> =
    once_cell::sync::Lazy::new(DashMap::new);

struct FaceState {
    tx: Sender<StackEvent>,
    filters: BTreeSet<Name>,
}

struct StoredContent {
    content: ContentObject,
    /// `None` means the object never goes stale.
    stale_at: Option<Instant>,
}

impl StoredContent {
    fn is_fresh(&self, now: Instant) -> bool {
        self.stale_at.map_or(true, |at| now < at)
    }
}

struct PendingInterest {
    face: FaceId,
    name: Name,
    expires_at: Instant,
}

#[derive(Default)]
struct Fabric {
    faces: HashMap<FaceId, FaceState>,
    store: BTreeMap<Name, StoredContent>,
    pit: Vec<PendingInterest>,
    next_face: FaceId,
    closed: Option<String>,
}

impl Fabric {
    fn ensure_open(&self) -> NativeResult<()> {
        match &self.closed {
            Some(reason) => Err(NativeError::closed(reason.clone())),
            None => Ok(()),
        }
    }

    /// Leftmost fresh object whose name starts with `name`.
    fn lookup(&self, name: &Name, now: Instant) -> Option<ContentObject> {
        self.store
            .range(name.clone()..)
            .take_while(|(stored, _)| name.is_prefix_of(stored))
            .find(|(_, entry)| entry.is_fresh(now))
            .map(|(_, entry)| entry.content.clone())
    }

    /// Drop every object whose freshness bound has passed.
    fn evict_stale(&mut self, now: Instant) {
        let before = self.store.len();
        self.store.retain(|_, entry| entry.is_fresh(now));
        let evicted = before - self.store.len();
        if evicted > 0 {
            trace!(evicted, "[Loopback] Stale content evicted");
        }
    }

    fn deliver(&self, face: FaceId, event: StackEvent) {
        if let Some(state) = self.faces.get(&face) {
            // Receiver lives as long as the face; a failed send means it is being dropped.
            let _ = state.tx.send(event);
        }
    }

    fn take_expired(&mut self, face: FaceId, now: Instant) -> Vec<StackEvent> {
        let mut expired = Vec::new();
        self.pit.retain(|p| {
            if p.face == face && p.expires_at <= now {
                expired.push(StackEvent::Expired {
                    interest: p.name.clone(),
                });
                false
            } else {
                true
            }
        });
        expired
    }

    fn next_deadline(&self, face: FaceId) -> Option<Instant> {
        self.pit
            .iter()
            .filter(|p| p.face == face)
            .map(|p| p.expires_at)
            .min()
    }
}

/// A shared in-process fabric. Cloning yields another handle to the same fabric.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    fabric: Arc<Mutex<Fabric>>,
}

impl LoopbackNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the process-wide network registered under `name`.
    #[must_use]
    pub fn shared(name: &str) -> Self {
        SHARED_NETWORKS
            .entry(name.to_string())
            .or_insert_with(Self::new)
            .clone()
    }

    /// Forget the process-wide network registered under `name`.
    ///
    /// Faces already attached keep working.
    pub fn release_shared(name: &str) -> Option<Self> {
        SHARED_NETWORKS.remove(name).map(|(_, net)| net)
    }

    /// Attach a new face (native handle) to this network.
    #[must_use]
    pub fn attach(&self) -> LoopbackFace {
        let (tx, rx) = flume::unbounded();
        let mut fabric = self.fabric.lock();
        let id = fabric.next_face;
        fabric.next_face += 1;
        fabric.faces.insert(
            id,
            FaceState {
                tx,
                filters: BTreeSet::new(),
            },
        );
        debug!(face = id, "[Loopback] Face attached");

        LoopbackFace {
            id,
            fabric: Arc::clone(&self.fabric),
            rx,
        }
    }

    /// Invalidate every face: all later calls fail with a fatal error.
    pub fn shutdown(&self, reason: impl Into<String>) {
        let mut fabric = self.fabric.lock();
        let reason = reason.into();
        debug!(%reason, "[Loopback] Network shut down");
        fabric.closed = Some(reason);
        fabric.faces.clear();
        fabric.pit.clear();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.fabric.lock().closed.is_some()
    }

    /// Fresh content the store would answer `name` with right now.
    #[must_use]
    pub fn cached(&self, name: &Name) -> Option<ContentObject> {
        self.fabric.lock().lookup(name, Instant::now())
    }

    /// Number of objects in the content store.
    ///
    /// Stale objects are evicted on the next put or poll, so they may still be
    /// counted here until then.
    #[must_use]
    pub fn store_len(&self) -> usize {
        self.fabric.lock().store.len()
    }

    /// Number of interests waiting for content.
    #[must_use]
    pub fn pending_interests(&self) -> usize {
        self.fabric.lock().pit.len()
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.fabric.lock().faces.len()
    }
}

/// One native handle attached to a [`LoopbackNetwork`].
pub struct LoopbackFace {
    id: FaceId,
    fabric: Arc<Mutex<Fabric>>,
    rx: Receiver<StackEvent>,
}

impl LoopbackFace {
    #[must_use]
    pub const fn id(&self) -> FaceId {
        self.id
    }

    fn take_expired(&self, now: Instant) -> NativeResult<Vec<StackEvent>> {
        let mut fabric = self.fabric.lock();
        fabric.ensure_open()?;
        fabric.evict_stale(now);
        Ok(fabric.take_expired(self.id, now))
    }
}

impl NativeStack for LoopbackFace {
    fn express_interest(&mut self, name: &Name, lifetime: Duration) -> NativeResult<NativeStatus> {
        let mut fabric = self.fabric.lock();
        fabric.ensure_open()?;
        let now = Instant::now();

        if let Some(content) = fabric.lookup(name, now) {
            trace!(face = self.id, %name, "[Loopback] Interest answered from store");
            fabric.deliver(
                self.id,
                StackEvent::Content {
                    interest: name.clone(),
                    content,
                },
            );
            return Ok(STATUS_OK);
        }

        fabric.pit.push(PendingInterest {
            face: self.id,
            name: name.clone(),
            expires_at: now + lifetime,
        });

        let targets: Vec<FaceId> = fabric
            .faces
            .iter()
            .filter(|(id, state)| {
                **id != self.id && state.filters.iter().any(|p| p.is_prefix_of(name))
            })
            .map(|(id, _)| *id)
            .collect();
        trace!(face = self.id, %name, forwarded = targets.len(), "[Loopback] Interest pending");

        for target in targets {
            fabric.deliver(target, StackEvent::Interest { name: name.clone() });
        }
        Ok(STATUS_OK)
    }

    fn set_interest_filter(&mut self, prefix: &Name) -> NativeResult<NativeStatus> {
        let mut fabric = self.fabric.lock();
        fabric.ensure_open()?;
        if let Some(state) = fabric.faces.get_mut(&self.id) {
            state.filters.insert(prefix.clone());
        }
        Ok(STATUS_OK)
    }

    fn clear_interest_filter(&mut self, prefix: &Name) -> NativeResult<NativeStatus> {
        let mut fabric = self.fabric.lock();
        fabric.ensure_open()?;
        if let Some(state) = fabric.faces.get_mut(&self.id) {
            state.filters.remove(prefix);
        }
        Ok(STATUS_OK)
    }

    fn put_content(&mut self, content: ContentObject) -> NativeResult<NativeStatus> {
        let mut fabric = self.fabric.lock();
        fabric.ensure_open()?;

        if !content.is_signed() {
            debug!(face = self.id, name = %content.name(), "[Loopback] Refusing unsigned content");
            return Ok(STATUS_UNSIGNED);
        }

        let now = Instant::now();
        fabric.evict_stale(now);
        let mut satisfied = Vec::new();
        fabric.pit.retain(|p| {
            if p.name.is_prefix_of(content.name()) {
                satisfied.push((p.face, p.name.clone()));
                false
            } else {
                true
            }
        });
        trace!(
            face = self.id,
            name = %content.name(),
            satisfied = satisfied.len(),
            "[Loopback] Content deposited"
        );
        for (face, interest) in satisfied {
            fabric.deliver(
                face,
                StackEvent::Content {
                    interest,
                    content: content.clone(),
                },
            );
        }

        // A zero freshness bound only satisfies interests already waiting.
        if content.freshness() != Some(Duration::ZERO) {
            let stale_at = content.freshness().map(|f| now + f);
            fabric
                .store
                .insert(content.name().clone(), StoredContent { content, stale_at });
        }
        Ok(STATUS_OK)
    }

    fn poll(&mut self, timeout: Duration) -> NativeResult<Vec<StackEvent>> {
        let mut events = self.take_expired(Instant::now())?;

        if events.is_empty() {
            let wait = {
                let fabric = self.fabric.lock();
                fabric
                    .next_deadline(self.id)
                    .map_or(timeout, |deadline| {
                        deadline.saturating_duration_since(Instant::now()).min(timeout)
                    })
            };
            match self.rx.recv_timeout(wait) {
                Ok(event) => events.push(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NativeError::closed("face detached from network"));
                }
            }
        }

        events.extend(self.rx.try_iter());
        events.extend(self.take_expired(Instant::now())?);
        Ok(events)
    }
}

impl Drop for LoopbackFace {
    fn drop(&mut self) {
        let mut fabric = self.fabric.lock();
        fabric.faces.remove(&self.id);
        let id = self.id;
        fabric.pit.retain(|p| p.face != id);
        debug!(face = id, "[Loopback] Face detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyManager, KeySource};

    const POLL: Duration = Duration::from_millis(20);

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn signed(keys: &KeyManager, n: &str, payload: &'static str, fresh: Option<Duration>) -> ContentObject {
        ContentObject::new(name(n), payload, fresh).sign(keys).unwrap()
    }

    fn keys() -> KeyManager {
        let keys = KeyManager::new();
        keys.initialize(&KeySource::Ephemeral).unwrap();
        keys
    }

    #[test]
    fn test_interest_is_forwarded_to_matching_filter_only() {
        let net = LoopbackNetwork::new();
        let mut a = net.attach();
        let mut b = net.attach();
        let mut c = net.attach();

        b.set_interest_filter(&name("/a/b")).unwrap();
        c.set_interest_filter(&name("/z")).unwrap();
        a.express_interest(&name("/a/b/c"), Duration::from_secs(1)).unwrap();

        let got = b.poll(POLL).unwrap();
        assert_eq!(got, vec![StackEvent::Interest { name: name("/a/b/c") }]);
        assert!(c.poll(POLL).unwrap().is_empty());
    }

    #[test]
    fn test_origin_face_does_not_see_its_own_interest() {
        let net = LoopbackNetwork::new();
        let mut a = net.attach();
        a.set_interest_filter(&name("/a")).unwrap();
        a.express_interest(&name("/a/x"), Duration::from_secs(1)).unwrap();
        assert!(a.poll(POLL).unwrap().is_empty());
    }

    #[test]
    fn test_put_satisfies_pending_interest() {
        let keys = keys();
        let net = LoopbackNetwork::new();
        let mut a = net.attach();
        let mut b = net.attach();

        a.express_interest(&name("/x"), Duration::from_secs(1)).unwrap();
        assert_eq!(net.pending_interests(), 1);

        let obj = signed(&keys, "/x/1", "v1", Some(Duration::from_secs(1)));
        assert_eq!(b.put_content(obj.clone()).unwrap(), STATUS_OK);
        assert_eq!(net.pending_interests(), 0);

        let got = a.poll(POLL).unwrap();
        assert_eq!(
            got,
            vec![StackEvent::Content {
                interest: name("/x"),
                content: obj
            }]
        );
    }

    #[test]
    fn test_store_answers_fresh_content_only() {
        let keys = keys();
        let net = LoopbackNetwork::new();
        let mut a = net.attach();

        a.put_content(signed(&keys, "/x", "v", Some(Duration::from_millis(50))))
            .unwrap();
        assert!(net.cached(&name("/x")).is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert!(net.cached(&name("/x")).is_none());

        a.express_interest(&name("/x"), Duration::from_millis(30)).unwrap();
        let mut got = Vec::new();
        for _ in 0..20 {
            got.extend(a.poll(POLL).unwrap());
            if !got.is_empty() {
                break;
            }
        }
        assert_eq!(got, vec![StackEvent::Expired { interest: name("/x") }]);
    }

    #[test]
    fn test_stale_content_is_evicted_on_poll_and_put() {
        let keys = keys();
        let net = LoopbackNetwork::new();
        let mut a = net.attach();

        let fresh = Some(Duration::from_millis(200));
        for i in 0..20 {
            let obj = ContentObject::new(name(&format!("/bulk/{i}")), "v", fresh)
                .sign(&keys)
                .unwrap();
            a.put_content(obj).unwrap();
        }
        a.put_content(signed(&keys, "/keep", "v", None)).unwrap();
        assert_eq!(net.store_len(), 21);

        std::thread::sleep(Duration::from_millis(300));
        a.poll(Duration::ZERO).unwrap();
        assert_eq!(net.store_len(), 1);
        assert!(net.cached(&name("/keep")).is_some());

        a.put_content(signed(&keys, "/short", "v", Some(Duration::from_millis(1))))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        a.put_content(signed(&keys, "/next", "v", Some(Duration::from_secs(5))))
            .unwrap();
        assert_eq!(net.store_len(), 2);
        assert!(net.cached(&name("/short")).is_none());
    }

    #[test]
    fn test_zero_freshness_is_not_cached() {
        let keys = keys();
        let net = LoopbackNetwork::new();
        let mut a = net.attach();
        a.put_content(signed(&keys, "/x", "v", Some(Duration::ZERO))).unwrap();
        assert_eq!(net.store_len(), 0);
    }

    #[test]
    fn test_unsigned_content_is_rejected() {
        let net = LoopbackNetwork::new();
        let mut a = net.attach();
        let status = a.put_content(ContentObject::empty(name("/x"))).unwrap();
        assert_eq!(status, STATUS_UNSIGNED);
        assert_eq!(net.store_len(), 0);
    }

    #[test]
    fn test_shutdown_is_fatal() {
        let net = LoopbackNetwork::new();
        let mut a = net.attach();
        net.shutdown("test");

        let err = a.poll(POLL).unwrap_err();
        assert!(err.is_fatal());
        assert!(a.express_interest(&name("/x"), Duration::from_secs(1)).unwrap_err().is_fatal());
    }

    #[test]
    fn test_dropping_face_clears_its_interests() {
        let net = LoopbackNetwork::new();
        let mut a = net.attach();
        a.express_interest(&name("/x"), Duration::from_secs(1)).unwrap();
        assert_eq!(net.pending_interests(), 1);
        drop(a);
        assert_eq!(net.pending_interests(), 0);
        assert_eq!(net.face_count(), 0);
    }

    #[test]
    fn test_shared_networks_are_looked_up_by_name() {
        let one = LoopbackNetwork::shared("loopback-test-shared");
        let _face = one.attach();
        let two = LoopbackNetwork::shared("loopback-test-shared");
        assert_eq!(two.face_count(), 1);
        assert!(LoopbackNetwork::release_shared("loopback-test-shared").is_some());
    }
}
