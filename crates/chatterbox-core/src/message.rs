//! Message record and associated-data encoding.
//!
//! The non-secret fields of a [`Message`] are authenticated (but not
//! encrypted) by binding them into the AEAD tag. The encoding is bit-exact:
//!
//! ```text
//! ┌──────────┬─────────────┬──────────────┬──────────────┬──────────────────┐
//! │ counter  │ last_update │ sender fp    │ receiver fp  │ next_dh_ratchet  │
//! │ u32 LE   │ u32 LE      │ 32 bytes     │ 32 bytes     │ fp, 32 bytes     │
//! └──────────┴─────────────┴──────────────┴──────────────┴──────────────────┘
//! ```
//!
//! A fingerprint slot is zero-filled when its key is absent.

use chatterbox_crypto::{FINGERPRINT_LENGTH, IV_LENGTH, PublicKey, TAG_LENGTH};

/// Length of the encoded associated data.
pub const ADDITIONAL_DATA_LENGTH: usize = 8 + 3 * FINGERPRINT_LENGTH;

/// One ciphertext unit as sent over an untrusted network.
///
/// Immutable once built by the sender. Keys are optional because a record
/// received from the network may lack them; such a record still encodes
/// (with zero fingerprints) but cannot be routed or ratcheted.
///
/// Fields are public and the type does not enforce immutability. Integrity
/// comes from the AEAD tag: a receiver rejects any record whose authenticated
/// fields changed after encryption, but nothing stops a holder from editing
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender identity key
    pub sender: Option<PublicKey>,
    /// Receiver identity key
    pub receiver: Option<PublicKey>,
    /// Sender's current DH-ratchet public key
    pub next_dh_ratchet: Option<PublicKey>,
    /// Per-sender counter, starting at 1
    pub counter: u32,
    /// Counter of the message that introduced `next_dh_ratchet`
    pub last_update: u32,
    /// Whether this message introduced `next_dh_ratchet`
    pub carries_ratchet: bool,
    /// Ciphertext including the 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
    /// Explicit 24-byte `XChaCha20` IV
    pub iv: [u8; IV_LENGTH],
}

impl Message {
    /// Encode the authenticated fields as associated data.
    pub fn encode_additional_data(&self) -> [u8; ADDITIONAL_DATA_LENGTH] {
        let mut buf = [0u8; ADDITIONAL_DATA_LENGTH];

        buf[0..4].copy_from_slice(&self.counter.to_le_bytes());
        buf[4..8].copy_from_slice(&self.last_update.to_le_bytes());

        let slots = [self.sender, self.receiver, self.next_dh_ratchet];
        for (slot, key) in slots.iter().enumerate() {
            if let Some(key) = key {
                let start = 8 + slot * FINGERPRINT_LENGTH;
                buf[start..start + FINGERPRINT_LENGTH].copy_from_slice(&key.fingerprint());
            }
        }

        buf
    }

    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(TAG_LENGTH)
    }
}
