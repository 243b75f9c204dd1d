//! Namewire Core
//!
//! This crate contains the building blocks behind the `namewire` façade:
//! - Hierarchical names (`name`)
//! - Signed content objects (`content`)
//! - Signing identity and keystore (`keys`)
//! - Native stack capability trait (`stack`)
//! - Outstanding request table (`pending`)
//! - Longest-prefix interest filters (`filter`)
//! - In-process loopback stack (`loopback`)
//! - Options, monitor events and error types (`options`, `monitor`, `error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
pub mod content;
pub mod error;
pub mod filter;
pub mod keys;
pub mod loopback;
pub mod monitor;
pub mod name;
pub mod options;
pub mod pending;
pub mod stack;

// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::content::{ContentObject, ContentSignature};
    pub use crate::error::{KeystoreError, NamewireError};
    pub use crate::filter::{FilterEntry, FilterRegistry, InterestCallback};
    pub use crate::keys::{KeyLocator, KeyManager, KeySource, PublicKeyDigest};
    pub use crate::loopback::{LoopbackFace, LoopbackNetwork};
    pub use crate::monitor::{WrapperEvent, WrapperMonitor};
    pub use crate::name::{IntoName, Name, NameError};
    pub use crate::options::{ExpiryPolicy, WrapperOptions};
    pub use crate::pending::{PendingRequest, RequestRegistry, Response, ResponseCallback};
    pub use crate::stack::{NativeError, NativeStack, NativeStatus, StackEvent};
}
