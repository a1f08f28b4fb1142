//! Partner → session registry.
//!
//! Two levels of locking:
//!
//! - The map itself sits behind an `RwLock`. Structural changes (open, close)
//!   take the write lock; lookups take the read lock just long enough to
//!   clone the entry handle.
//! - Each entry sits behind its own `Mutex`, held for the duration of one
//!   handshake step, send or receive.
//!
//! Operations on distinct partners therefore never contend beyond the brief
//! map lookup.
//!
//! A lock is only poisoned when a thread panicked while holding it. Session
//! pipelines commit their draft state only after every fallible step, so the
//! guarded value is still consistent and is recovered rather than
//! propagated.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use chatterbox_crypto::PublicKey;

use crate::{
    error::ChatterError,
    session::{PendingHandshake, Session},
};

/// State of the relationship with one partner.
pub enum SessionEntry {
    /// Initiator has sent its ephemeral share and awaits the response
    Pending(PendingHandshake),
    /// Handshake complete; ready to send and receive
    Established(Box<Session>),
    /// Torn down and wiped; any handle still held by a racing caller sees
    /// the session as gone
    Closed,
}

type EntryHandle = Arc<Mutex<SessionEntry>>;

/// Synchronized container of sessions keyed by partner identity.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<PublicKey, EntryHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the entry produced by `build` if no session with `partner`
    /// exists.
    ///
    /// `build` runs under the write lock, so two concurrent opens for the
    /// same partner cannot both succeed. Its second return value is passed
    /// through to the caller.
    pub fn open_with<T>(
        &self,
        partner: &PublicKey,
        build: impl FnOnce() -> (SessionEntry, T),
    ) -> Result<T, ChatterError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(partner) {
            return Err(ChatterError::SessionAlreadyOpen { partner: *partner });
        }

        let (entry, output) = build();
        sessions.insert(*partner, Arc::new(Mutex::new(entry)));
        Ok(output)
    }

    /// Run `op` with exclusive access to the entry for `partner`.
    ///
    /// The map lock is released before the entry lock is taken.
    pub fn with_entry<T>(
        &self,
        partner: &PublicKey,
        op: impl FnOnce(&mut SessionEntry) -> Result<T, ChatterError>,
    ) -> Result<T, ChatterError> {
        let handle = self.handle(partner)?;
        let mut entry = lock_entry(&handle);
        if matches!(*entry, SessionEntry::Closed) {
            return Err(ChatterError::SessionNotFound { partner: *partner });
        }
        op(&mut *entry)
    }

    /// Run `op` against the established session for `partner`.
    pub fn with_session<T>(
        &self,
        partner: &PublicKey,
        op: impl FnOnce(&mut Session) -> Result<T, ChatterError>,
    ) -> Result<T, ChatterError> {
        self.with_entry(partner, |entry| match entry {
            SessionEntry::Established(session) => op(session.as_mut()),
            SessionEntry::Pending(_) => {
                Err(ChatterError::HandshakeIncomplete { partner: *partner })
            },
            SessionEntry::Closed => Err(ChatterError::SessionNotFound { partner: *partner }),
        })
    }

    /// Remove the entry for `partner` and hand back its final state.
    ///
    /// The entry is replaced by [`SessionEntry::Closed`] under its own lock,
    /// so a caller that looked it up before removal cannot use it afterwards.
    pub fn remove(&self, partner: &PublicKey) -> Result<SessionEntry, ChatterError> {
        let handle = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(partner)
            .ok_or(ChatterError::SessionNotFound { partner: *partner })?;

        let mut entry = lock_entry(&handle);
        Ok(std::mem::replace(&mut *entry, SessionEntry::Closed))
    }

    /// Whether any entry (pending or established) exists for `partner`.
    pub fn contains(&self, partner: &PublicKey) -> bool {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).contains_key(partner)
    }

    /// Number of entries, pending and established.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, partner: &PublicKey) -> Result<EntryHandle, ChatterError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partner)
            .cloned()
            .ok_or(ChatterError::SessionNotFound { partner: *partner })
    }
}

fn lock_entry(handle: &EntryHandle) -> MutexGuard<'_, SessionEntry> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
