//! Chatterbox Cryptographic Primitives
//!
//! Building blocks consumed by the session ratchet. Pure functions with
//! deterministic outputs: callers provide the random bytes behind every key
//! pair and IV, so tests can replay a session bit for bit.
//!
//! # Key Lifecycle
//!
//! ```text
//! Identity × Ephemeral DH terms (handshake)
//!        │
//!        ▼
//! combine_keys → Root Key ──derive(Root)──┐
//!        │                                ├─ combine_keys with fresh DH → next Root Key
//!        ▼                                │
//! derive(Chain) → Chain Key ──derive(Chain)──> next Chain Key
//!        │
//!        ▼
//! derive(MessageKey) → Message Key → XChaCha20-Poly1305
//! ```
//!
//! # Security
//!
//! - Every [`SymmetricKey`] is zeroized when dropped or explicitly wiped
//! - Labelled derivations are independent: the same parent key derived under
//!   [`Label::Root`], [`Label::Chain`], [`Label::MessageKey`] and
//!   [`Label::HandshakeCheck`] yields unrelated outputs
//! - [`combine_keys`] is order-sensitive, so both handshake roles must feed
//!   the DH terms in the same order
//! - Authentication failures surface as [`CryptoError::AuthenticationFailed`]
//!   and never return partial plaintext

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod keys;
pub mod symmetric;

pub use error::CryptoError;
pub use keys::{FINGERPRINT_LENGTH, KeyPair, PUBLIC_KEY_LENGTH, PublicKey, dh_combine};
pub use symmetric::{IV_LENGTH, KEY_LENGTH, Label, SymmetricKey, TAG_LENGTH, combine_keys};
