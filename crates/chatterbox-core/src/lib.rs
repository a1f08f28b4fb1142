//! Chatterbox Core
//!
//! Pairwise end-to-end encrypted sessions using a Double Ratchet: a
//! triple-DH handshake establishes a shared root key, after which every
//! message advances a symmetric hash chain and every change of speaker
//! folds a fresh X25519 share into the root.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Chatter<E>                                   │
//! │   identity, ChatterConfig, Environment       │
//! │   SessionRegistry: partner → SessionEntry    │
//! └──────────────────────┬───────────────────────┘
//!                        │ one entry locked per call
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │ Session                                      │
//! │   send: ratchet step if owed, chain step     │
//! │   receive: current │ future │ past           │
//! │   skipped-key cache (bounded, wiped)         │
//! └──────────────────────┬───────────────────────┘
//!                        │ Message::encode_additional_data
//!                        ▼
//!              chatterbox-crypto primitives
//! ```
//!
//! # Guarantees
//!
//! - Forward secrecy: compromising current chain keys does not expose
//!   messages whose keys were already consumed
//! - Post-compromise security: a completed DH-ratchet round trip locks out a
//!   holder of previously stolen chain keys
//! - Out-of-order delivery: skipped keys are cached and each decrypts at
//!   most once
//! - Atomic receive: a failed authentication leaves the session exactly as
//!   it was
//!
//! # Example
//!
//! ```
//! use chatterbox_core::{Chatter, SystemEnv};
//!
//! let alice = Chatter::new(SystemEnv::new());
//! let bob = Chatter::new(SystemEnv::new());
//!
//! let alice_eph = alice.initiate_handshake(bob.identity())?;
//! let (bob_eph, bob_check) = bob.return_handshake(alice.identity(), &alice_eph)?;
//! let alice_check = alice.finalize_handshake(bob.identity(), &bob_eph)?;
//! assert_eq!(alice_check, bob_check);
//!
//! let message = alice.send_message(bob.identity(), "hi bob")?;
//! assert_eq!(bob.receive_message(&message)?, "hi bob");
//! # Ok::<(), chatterbox_core::ChatterError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chatter;
pub mod config;
pub mod env;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;

pub use chatter::Chatter;
pub use chatterbox_crypto::{KeyPair, PublicKey, SymmetricKey};
pub use config::{ChatterConfig, DEFAULT_MAX_CACHED_KEYS, DEFAULT_MAX_SKIP};
pub use env::{Environment, SystemEnv};
pub use error::ChatterError;
pub use message::{ADDITIONAL_DATA_LENGTH, Message};
pub use registry::{SessionEntry, SessionRegistry};
pub use session::{PendingHandshake, RatchetTurn, Session, SessionSnapshot};
