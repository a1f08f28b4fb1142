//! Error types for primitive operations

use thiserror::Error;

/// Errors from primitive operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag mismatch: wrong key, tampered ciphertext, tampered associated
    /// data or wrong IV
    #[error("authentication failed")]
    AuthenticationFailed,
}
