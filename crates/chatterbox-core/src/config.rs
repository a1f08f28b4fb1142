//! Participant configuration.

/// Maximum number of skipped message keys one incoming message may force.
pub const DEFAULT_MAX_SKIP: u32 = 1000;

/// Maximum number of skipped message keys cached per session.
pub const DEFAULT_MAX_CACHED_KEYS: usize = 2000;

/// Limits applied to every session a [`crate::Chatter`] opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatterConfig {
    /// Largest gap between the receive counter and an incoming counter that
    /// is accepted. Larger gaps fail before any state is touched.
    pub max_skip: u32,
    /// Capacity of the skipped-key cache. When full, the lowest index is
    /// wiped and evicted first.
    pub max_cached_keys: usize,
}

impl Default for ChatterConfig {
    fn default() -> Self {
        Self { max_skip: DEFAULT_MAX_SKIP, max_cached_keys: DEFAULT_MAX_CACHED_KEYS }
    }
}
