//! Symmetric keys: labelled derivation, combination and AEAD
//!
//! # Security Properties
//!
//! - One-way: repeated derivation under the same label walks an HMAC chain
//!   that cannot be run backwards
//! - Independence: each [`Label`] feeds a distinct HMAC input byte
//! - Wipe: key bytes are zeroized on drop and on explicit [`Zeroize`]

use std::fmt;

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, digest::FixedOutput};
use zeroize::Zeroize;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Size of every symmetric key in bytes
pub const KEY_LENGTH: usize = 32;

/// Size of the explicit `XChaCha20` IV in bytes
pub const IV_LENGTH: usize = 24;

/// Poly1305 tag size in bytes
pub const TAG_LENGTH: usize = 16;

/// HKDF info string for [`combine_keys`]
const COMBINE_INFO: &[u8] = b"chatterboxCombineV1";

/// Reserved derivation labels.
///
/// The discriminant is the byte fed to HMAC, so the four labels produce
/// independent outputs from the same parent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Label {
    /// Handshake check value, compared out of band after the handshake
    HandshakeCheck = 0x11,
    /// Root key ratchet, applied before folding in a fresh DH output
    Root = 0x22,
    /// Chain key ratchet, one step per message
    Chain = 0x33,
    /// Per-message key from a chain key
    MessageKey = 0x44,
}

impl Label {
    /// The byte used as HMAC input.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Opaque 32-byte secret.
///
/// Supports one-way derivation by [`Label`] and authenticated
/// encryption. Equality is constant-time so handshake-check values can be
/// compared directly.
#[derive(Clone)]
pub struct SymmetricKey {
    key: [u8; KEY_LENGTH],
}

impl SymmetricKey {
    /// Wrap raw key material.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Derive an independent key under `label`.
    pub fn derive_key(&self, label: Label) -> Self {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&self.key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(&[label.as_byte()]);

        // Output lands in the key buffer; no intermediate copy to wipe.
        let mut key = [0u8; KEY_LENGTH];
        mac.finalize_into((&mut key).into());
        Self { key }
    }

    /// Encrypt `plaintext`, binding `additional_data` into the tag.
    ///
    /// The returned ciphertext carries the 16-byte Poly1305 tag. The caller
    /// MUST supply a fresh random IV for every call under the same key.
    pub fn authenticated_encrypt(
        &self,
        plaintext: &[u8],
        additional_data: &[u8],
        iv: &[u8; IV_LENGTH],
    ) -> Vec<u8> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let payload = Payload { msg: plaintext, aad: additional_data };

        let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(iv), payload) else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };
        ciphertext
    }

    /// Decrypt and authenticate `ciphertext` against `additional_data`.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed`: tag mismatch (wrong key, tampered ciphertext,
    ///   associated data or IV)
    pub fn authenticated_decrypt(
        &self,
        ciphertext: &[u8],
        additional_data: &[u8],
        iv: &[u8; IV_LENGTH],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let payload = Payload { msg: ciphertext, aad: additional_data };

        cipher
            .decrypt(XNonce::from_slice(iv), payload)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

impl Zeroize for SymmetricKey {
    fn zeroize(&mut self) {
        self.key.zeroize();
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        let diff = self.key.iter().zip(other.key.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b));
        diff == 0
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Fold an ordered sequence of secrets into one new key.
///
/// HKDF-SHA256 over the concatenation of the inputs. Order matters:
/// `combine_keys(&[a, b])` and `combine_keys(&[b, a])` are unrelated.
pub fn combine_keys(keys: &[&SymmetricKey]) -> SymmetricKey {
    let mut input = Vec::with_capacity(keys.len() * KEY_LENGTH);
    for key in keys {
        input.extend_from_slice(&key.key);
    }

    let hkdf = Hkdf::<Sha256>::new(None, &input);
    let mut key = [0u8; KEY_LENGTH];
    let Ok(()) = hkdf.expand(COMBINE_INFO, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    // `Hkdf` keeps its keyed HMAC state private and has no `Zeroize`; only
    // the concatenated input can be wiped here.
    input.zeroize();
    SymmetricKey { key }
}
