//! # Namewire
//!
//! A thread-safe façade over a single-threaded, content-centric network
//! stack handle.
//!
//! ## Architecture
//!
//! - **`namewire-core`**: names, signed content, keystore, registries and
//!   the [`NativeStack`](namewire_core::stack::NativeStack) capability trait
//! - **`namewire`**: the [`Wrapper`] façade and its background loop (this crate)
//!
//! The wrapper serializes every native call behind one reentrant lock, runs
//! a background thread that polls the stack in bounded steps, and turns
//! inbound events into callbacks:
//!
//! - content for an expressed interest completes that request
//! - an interest timeout completes the oldest request for that name
//! - an interest from a peer goes to the longest matching registered prefix
//!
//! Published content is signed with a persistent ed25519 identity.
//!
//! ## Quick Start
//!
//! ```rust
//! use namewire::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let net = LoopbackNetwork::new();
//! let opts = WrapperOptions::default().with_key_source(KeySource::Ephemeral);
//!
//! let producer = Wrapper::new(net.attach(), opts.clone())?;
//! let consumer = Wrapper::new(net.attach(), opts)?;
//! producer.start()?;
//! consumer.start()?;
//!
//! // Answer interests under /chat by publishing on demand.
//! let handle = producer.handle();
//! producer.register_filter("/chat", move |name: &Name| {
//!     let _ = handle.publish(name, "hi there", Duration::from_secs(1));
//! })?;
//!
//! let (tx, rx) = flume::unbounded();
//! consumer.express_interest("/chat/room/1", move |resp| {
//!     let _ = tx.send(resp);
//! })?;
//!
//! let resp = rx.recv_timeout(Duration::from_secs(2))?;
//! assert_eq!(&resp.payload()[..], b"hi there");
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading
//!
//! Callbacks run on the loop thread. They may call back into the wrapper
//! through a [`WrapperHandle`], including [`WrapperHandle::stop`]. After
//! [`Wrapper::stop`] returns, no further callback fires.

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod dev_tracing;
pub mod event_loop;
pub mod wrapper;

pub use namewire_core::{content, error, filter, keys, loopback, monitor, name, options, pending, stack};

pub use event_loop::LoopState;
pub use wrapper::{Status, Wrapper, WrapperHandle};

pub mod prelude {
    pub use crate::event_loop::LoopState;
    pub use crate::wrapper::{Status, Wrapper, WrapperHandle};
    pub use namewire_core::prelude::*;
}
