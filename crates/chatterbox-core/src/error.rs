//! Error types for chatter and session operations.

use chatterbox_crypto::{CryptoError, PublicKey};
use thiserror::Error;

/// Errors returned by [`crate::Chatter`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatterError {
    /// Handshake call while a session with this partner already exists
    #[error("session already open with {partner}")]
    SessionAlreadyOpen {
        /// Partner identity
        partner: PublicKey,
    },

    /// No session (pending or established) with this partner
    #[error("no session open with {partner}")]
    SessionNotFound {
        /// Partner identity
        partner: PublicKey,
    },

    /// Session exists but the initiator has not finalized the handshake
    #[error("handshake with {partner} not finalized")]
    HandshakeIncomplete {
        /// Partner identity
        partner: PublicKey,
    },

    /// AEAD tag mismatch: corrupted ciphertext, associated data or IV
    #[error("message authentication failed")]
    AuthenticationFailure,

    /// Past-path message whose key is not cached (never skipped, already
    /// delivered, or evicted)
    #[error("unknown or already consumed message {counter}")]
    UnknownOrConsumedMessage {
        /// Counter of the rejected message
        counter: u32,
    },

    /// Message lacks a field needed to route or ratchet it, or its
    /// authenticated plaintext is not UTF-8
    #[error("malformed message: invalid or missing {field}")]
    MalformedMessage {
        /// Name of the offending field
        field: &'static str,
    },

    /// Incoming counter is further ahead than the configured skip bound
    #[error("too many skipped messages: at {current}, got {requested}, limit {max}")]
    SkipLimitExceeded {
        /// Current receive counter
        current: u32,
        /// Counter of the incoming message
        requested: u32,
        /// Configured `max_skip`
        max: u32,
    },

    /// Send counter would no longer fit the 4-byte wire encoding
    #[error("send counter overflow at {counter}")]
    CounterOverflow {
        /// Counter when overflow was detected
        counter: u32,
    },
}

impl ChatterError {
    /// Returns true if resubmitting an intact copy of the message may succeed.
    ///
    /// Authentication failures leave the session rolled back (or the cached
    /// key in place), so a clean retransmission still decrypts. Everything
    /// else reflects session lifecycle or a protocol violation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AuthenticationFailure)
    }
}

impl From<CryptoError> for ChatterError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => Self::AuthenticationFailure,
        }
    }
}
