//! Signing identity used to authenticate published content.
//!
//! The [`KeyManager`] loads an Ed25519 key from a keystore file, or generates
//! and persists one when the file does not exist yet. After initialization the
//! identity never changes; it exposes:
//!
//! - the SHA-256 digest of the public key ([`PublicKeyDigest`])
//! - a [`KeyLocator`] embedding the public key, attached to every signed object
//!
//! ## Keystore format
//!
//! A single line `ed25519:<64 hex chars>` holding the 32-byte secret key.
//! New keystores are created with mode `0600` on Unix. Secret material read
//! from or written to disk is zeroized after use.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{KeystoreError, NamewireError, Result};

/// Length of the public key digest in bytes.
pub const DIGEST_SIZE: usize = 32;

const KEYSTORE_TAG: &str = "ed25519:";
const SECRET_KEY_SIZE: usize = 32;

/// Where the signing identity comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeySource {
    /// Resolve the keystore path from the environment.
    ///
    /// `NAMEWIRE_KEYSTORE` if set, else `$NAMEWIRE_DIR/keystore`,
    /// else `$HOME/.namewire/keystore`.
    #[default]
    Default,
    /// Explicit keystore file; created if missing.
    File(PathBuf),
    /// Fresh in-memory key, never written to disk.
    Ephemeral,
}

impl KeySource {
    /// Resolve the keystore file for this source (`None` for ephemeral keys).
    pub fn resolve_path(&self) -> std::result::Result<Option<PathBuf>, KeystoreError> {
        match self {
            Self::Ephemeral => Ok(None),
            Self::File(path) => Ok(Some(path.clone())),
            Self::Default => default_keystore_path().map(Some),
        }
    }
}

fn default_keystore_path() -> std::result::Result<PathBuf, KeystoreError> {
    if let Some(path) = std::env::var_os("NAMEWIRE_KEYSTORE") {
        return Ok(PathBuf::from(path));
    }
    if let Some(dir) = std::env::var_os("NAMEWIRE_DIR") {
        return Ok(PathBuf::from(dir).join("keystore"));
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".namewire").join("keystore"))
        .ok_or(KeystoreError::NoLocation)
}

/// SHA-256 digest of the public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyDigest([u8; DIGEST_SIZE]);

impl PublicKeyDigest {
    #[must_use]
    pub fn of(key: &VerifyingKey) -> Self {
        Self(Sha256::digest(key.as_bytes()).into())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicKeyDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyDigest({self})")
    }
}

/// Reference to the verifying key, embedded in signed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLocator {
    key: VerifyingKey,
    digest: PublicKeyDigest,
}

impl KeyLocator {
    #[must_use]
    pub fn new(key: VerifyingKey) -> Self {
        Self {
            digest: PublicKeyDigest::of(&key),
            key,
        }
    }

    #[must_use]
    pub const fn public_key(&self) -> &VerifyingKey {
        &self.key
    }

    #[must_use]
    pub const fn digest(&self) -> &PublicKeyDigest {
        &self.digest
    }

    /// Check `signature` over `message` against the embedded key.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.key.verify(message, signature).is_ok()
    }
}

struct Identity {
    signing: SigningKey,
    locator: KeyLocator,
    path: Option<PathBuf>,
}

impl Identity {
    fn new(signing: SigningKey, path: Option<PathBuf>) -> Self {
        let locator = KeyLocator::new(signing.verifying_key());
        Self {
            signing,
            locator,
            path,
        }
    }
}

/// Owner of the signing identity.
#[derive(Default)]
pub struct KeyManager {
    identity: OnceCell<Identity>,
}

impl KeyManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the key from `source`, generating and persisting one if absent.
    ///
    /// Calling this again after a successful initialization keeps the first
    /// identity.
    ///
    /// # Errors
    ///
    /// [`KeystoreError`] when the keystore cannot be read or written, or its
    /// contents are not a valid key.
    pub fn initialize(&self, source: &KeySource) -> std::result::Result<(), KeystoreError> {
        if self.identity.get().is_some() {
            debug!("[Keys] Already initialized, keeping existing identity");
            return Ok(());
        }

        let identity = match source.resolve_path()? {
            None => Identity::new(SigningKey::generate(&mut OsRng), None),
            Some(path) => load_or_generate(&path)?,
        };

        debug!(
            digest = %identity.locator.digest(),
            path = ?identity.path,
            "[Keys] Identity ready"
        );

        if self.identity.set(identity).is_err() {
            debug!("[Keys] Lost initialization race, keeping existing identity");
        }
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.identity.get().is_some()
    }

    pub fn public_key_digest(&self) -> Result<&PublicKeyDigest> {
        Ok(self.identity()?.locator.digest())
    }

    pub fn locator(&self) -> Result<&KeyLocator> {
        Ok(&self.identity()?.locator)
    }

    /// Keystore file backing this identity, if any.
    pub fn keystore_path(&self) -> Result<Option<&Path>> {
        Ok(self.identity()?.path.as_deref())
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.identity()?.signing.sign(message))
    }

    fn identity(&self) -> Result<&Identity> {
        self.identity
            .get()
            .ok_or(NamewireError::NotInitialized("key manager"))
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity.get() {
            Some(id) => write!(f, "KeyManager({})", id.locator.digest()),
            None => f.write_str("KeyManager(<uninitialized>)"),
        }
    }
}

fn load_or_generate(path: &Path) -> std::result::Result<Identity, KeystoreError> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let text = Zeroizing::new(text);
            let signing = parse_keystore(path, &text)?;
            debug!(path = %path.display(), "[Keys] Loaded keystore");
            Ok(Identity::new(signing, Some(path.to_path_buf())))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let signing = SigningKey::generate(&mut OsRng);
            write_keystore(path, &signing)?;
            debug!(path = %path.display(), "[Keys] Generated new keystore");
            Ok(Identity::new(signing, Some(path.to_path_buf())))
        }
        Err(e) => Err(KeystoreError::io(path, e)),
    }
}

fn parse_keystore(path: &Path, text: &str) -> std::result::Result<SigningKey, KeystoreError> {
    let encoded = text
        .trim()
        .strip_prefix(KEYSTORE_TAG)
        .ok_or_else(|| KeystoreError::corrupted(path, "missing ed25519 tag"))?;

    let raw = Zeroizing::new(
        hex::decode(encoded).map_err(|e| KeystoreError::corrupted(path, e.to_string()))?,
    );
    if raw.len() != SECRET_KEY_SIZE {
        return Err(KeystoreError::corrupted(
            path,
            format!("expected {SECRET_KEY_SIZE} key bytes, found {}", raw.len()),
        ));
    }

    let mut secret = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
    secret.copy_from_slice(&raw);
    Ok(SigningKey::from_bytes(&secret))
}

fn write_keystore(path: &Path, signing: &SigningKey) -> std::result::Result<(), KeystoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| KeystoreError::io(parent, e))?;
    }

    let secret = Zeroizing::new(signing.to_bytes());
    let line = Zeroizing::new(format!("{KEYSTORE_TAG}{}\n", hex::encode(secret.as_slice())));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| KeystoreError::io(path, e))?;
    if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.sync_all()) {
        warn!(path = %path.display(), error = %e, "[Keys] Failed to persist keystore");
        let _ = fs::remove_file(path);
        return Err(KeystoreError::io(path, e));
    }
    Ok(())
}
