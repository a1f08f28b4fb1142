//! Environment abstraction for deterministic testing.
//!
//! Decouples the ratchet from system randomness. Production uses the OS RNG;
//! tests plug in a seeded RNG so a whole conversation replays identically.

use chatterbox_crypto::{IV_LENGTH, KEY_LENGTH, KeyPair};
use zeroize::Zeroize;

/// Source of randomness for key pairs and IVs.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - The method is infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fresh random IV for one AEAD encryption.
    fn random_iv(&self) -> [u8; IV_LENGTH] {
        let mut iv = [0u8; IV_LENGTH];
        self.random_bytes(&mut iv);
        iv
    }

    /// Fresh X25519 key pair.
    fn generate_key_pair(&self) -> KeyPair {
        let mut secret = [0u8; KEY_LENGTH];
        self.random_bytes(&mut secret);
        let key_pair = KeyPair::from_secret_bytes(secret);
        secret.zeroize();
        key_pair
    }
}

/// Production environment backed by the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. A participant without functioning
/// cryptographic randomness cannot generate keys or IVs safely, and
/// continuing would compromise every session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - keys cannot be generated");
    }
}
