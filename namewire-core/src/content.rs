//! Named, signed content objects.
//!
//! A [`ContentObject`] is what gets deposited in the native stack by the
//! publish path and what a response callback receives. The signature covers a
//! canonical encoding of name, freshness and payload:
//!
//! ```text
//! [count:u32] ([len:u32][component bytes])*  [freshness_ms:u64]  [payload...]
//! ```
//!
//! `freshness_ms` is `u64::MAX` when no freshness bound is attached.

use bytes::{BufMut, Bytes, BytesMut};
use ed25519_dalek::Signature;
use std::time::Duration;

use crate::error::Result;
use crate::keys::{KeyLocator, KeyManager};
use crate::name::Name;

/// Signature block attached to a published object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSignature {
    pub locator: KeyLocator,
    pub signature: Signature,
}

/// A named unit of data with an optional freshness hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    name: Name,
    payload: Bytes,
    freshness: Option<Duration>,
    signature: Option<ContentSignature>,
}

impl ContentObject {
    /// Create an unsigned object.
    pub fn new(name: Name, payload: impl Into<Bytes>, freshness: Option<Duration>) -> Self {
        Self {
            name,
            payload: payload.into(),
            freshness,
            signature: None,
        }
    }

    /// Unsigned, empty object standing in for an expired request.
    #[must_use]
    pub fn empty(name: Name) -> Self {
        Self::new(name, Bytes::new(), None)
    }

    /// Sign this object with the identity held by `keys`.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if `keys` has no identity yet.
    pub fn sign(mut self, keys: &KeyManager) -> Result<Self> {
        let signature = keys.sign(&self.signed_portion())?;
        self.signature = Some(ContentSignature {
            locator: *keys.locator()?,
            signature,
        });
        Ok(self)
    }

    /// True if the object carries a signature that matches its contents.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.signature
            .as_ref()
            .is_some_and(|s| s.locator.verify(&self.signed_portion(), &s.signature))
    }

    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }

    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[must_use]
    pub const fn freshness(&self) -> Option<Duration> {
        self.freshness
    }

    #[must_use]
    pub const fn signature(&self) -> Option<&ContentSignature> {
        self.signature.as_ref()
    }

    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    fn signed_portion(&self) -> Bytes {
        let components = self.name.components();
        let name_len: usize = components.iter().map(|c| 4 + c.len()).sum();
        let mut buf = BytesMut::with_capacity(4 + name_len + 8 + self.payload.len());

        buf.put_u32(components.len() as u32);
        for component in components {
            buf.put_u32(component.len() as u32);
            buf.put_slice(component.as_bytes());
        }
        let freshness_ms = self
            .freshness
            .map_or(u64::MAX, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX - 1));
        buf.put_u64(freshness_ms);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
