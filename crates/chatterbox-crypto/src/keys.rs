//! X25519 key pairs, public keys and fingerprints

use std::fmt;

use sha2::{Digest, Sha256};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::symmetric::{KEY_LENGTH, SymmetricKey};

/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Size of a public-key fingerprint (SHA-256) in bytes
pub const FINGERPRINT_LENGTH: usize = 32;

/// Number of fingerprint bytes rendered by `Display`
const DISPLAY_PREFIX: usize = 8;

/// Public half of an X25519 key pair.
///
/// Immutable value type. Used as the registry key for sessions and bound into
/// associated data through its [`fingerprint`](Self::fingerprint).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Deterministic SHA-256 digest of the key.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LENGTH] {
        Sha256::digest(self.0).into()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.fingerprint()[..DISPLAY_PREFIX] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

/// X25519 key pair.
///
/// The private half never leaves this type; it is only used through
/// [`dh_combine`]. Zeroized on drop.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from 32 caller-provided random bytes.
    ///
    /// The caller MUST provide cryptographically secure random bytes in
    /// production. The local copy of `secret` is wiped before returning.
    pub fn from_secret_bytes(mut secret: [u8; KEY_LENGTH]) -> Self {
        let static_secret = StaticSecret::from(secret);
        secret.zeroize();

        let public = PublicKey(x25519_dalek::PublicKey::from(&static_secret).to_bytes());
        Self { secret: static_secret, public }
    }

    /// Public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Diffie-Hellman between `public` and the private half of `own`.
///
/// Commutative: `dh_combine(b.public, a) == dh_combine(a.public, b)`. The raw
/// shared secret becomes key material for [`crate::combine_keys`].
pub fn dh_combine(public: &PublicKey, own: &KeyPair) -> SymmetricKey {
    let shared = own.secret.diffie_hellman(&x25519_dalek::PublicKey::from(public.0));
    SymmetricKey::from_bytes(*shared.as_bytes())
}
