//! Participant: long-term identity plus one ratchet session per partner.
//!
//! All operations take `&self`; a `Chatter` can be shared across threads and
//! serves distinct partners in parallel (see [`crate::registry`]).

use chatterbox_crypto::{KeyPair, PublicKey, SymmetricKey};
use tracing::debug;

use crate::{
    config::ChatterConfig,
    env::Environment,
    error::ChatterError,
    message::Message,
    registry::{SessionEntry, SessionRegistry},
    session::{PendingHandshake, Session, SessionSnapshot},
};

/// One participant in pairwise ratchet sessions.
///
/// # Lifecycle
///
/// ```text
///            initiate_handshake           finalize_handshake
///   (none) ─────────────────────> Pending ──────────────────> Established
///     │                                                           ▲
///     └──────────────────── return_handshake ─────────────────────┘
///
///   end_session: Pending | Established → (none), secrets wiped
/// ```
pub struct Chatter<E: Environment> {
    env: E,
    identity: KeyPair,
    config: ChatterConfig,
    sessions: SessionRegistry,
}

impl<E: Environment> Chatter<E> {
    /// Create a participant with a fresh identity and default limits.
    pub fn new(env: E) -> Self {
        Self::with_config(env, ChatterConfig::default())
    }

    /// Create a participant with a fresh identity and custom limits.
    pub fn with_config(env: E, config: ChatterConfig) -> Self {
        let identity = env.generate_key_pair();
        debug!(identity = %identity.public_key(), "created chatter");
        Self { env, identity, config, sessions: SessionRegistry::new() }
    }

    /// Long-term public identity key.
    pub fn identity(&self) -> &PublicKey {
        self.identity.public_key()
    }

    /// Start a handshake with `partner`.
    ///
    /// Returns the ephemeral public key to send to the partner.
    pub fn initiate_handshake(&self, partner: &PublicKey) -> Result<PublicKey, ChatterError> {
        let ephemeral = self.sessions.open_with(partner, || {
            let pending = PendingHandshake::initiate(self.env.generate_key_pair());
            let ephemeral = *pending.ephemeral_public();
            (SessionEntry::Pending(pending), ephemeral)
        })?;

        debug!(%partner, %ephemeral, "initiated handshake");
        Ok(ephemeral)
    }

    /// Respond to a handshake initiated by `partner`.
    ///
    /// Returns our ephemeral public key (to send back) and the
    /// handshake-check value (to compare out of band).
    pub fn return_handshake(
        &self,
        partner: &PublicKey,
        partner_ephemeral: &PublicKey,
    ) -> Result<(PublicKey, SymmetricKey), ChatterError> {
        let (ephemeral, check) = self.sessions.open_with(partner, || {
            let (session, check) = Session::respond(
                &self.identity,
                self.env.generate_key_pair(),
                partner,
                partner_ephemeral,
                self.config,
            );
            let ephemeral = *session.ratchet_public();
            (SessionEntry::Established(Box::new(session)), (ephemeral, check))
        })?;

        debug!(%partner, %ephemeral, "responded to handshake");
        Ok((ephemeral, check))
    }

    /// Complete a handshake this participant initiated.
    ///
    /// Returns the handshake-check value, which must equal the responder's.
    pub fn finalize_handshake(
        &self,
        partner: &PublicKey,
        partner_ephemeral: &PublicKey,
    ) -> Result<SymmetricKey, ChatterError> {
        self.sessions.with_entry(partner, |entry| {
            let SessionEntry::Pending(pending) = entry else {
                return Err(ChatterError::SessionAlreadyOpen { partner: *partner });
            };

            let (session, check) =
                pending.finalize(&self.identity, partner, partner_ephemeral, self.config);
            *entry = SessionEntry::Established(Box::new(session));

            debug!(%partner, %partner_ephemeral, "finalized handshake");
            Ok(check)
        })
    }

    /// Encrypt `plaintext` for `partner`.
    pub fn send_message(
        &self,
        partner: &PublicKey,
        plaintext: &str,
    ) -> Result<Message, ChatterError> {
        self.sessions.with_session(partner, |session| {
            session.send(&self.env, self.identity.public_key(), partner, plaintext)
        })
    }

    /// Decrypt a message from the partner named in its `sender` field.
    pub fn receive_message(&self, message: &Message) -> Result<String, ChatterError> {
        let sender = message.sender.ok_or(ChatterError::MalformedMessage { field: "sender" })?;
        self.sessions.with_session(&sender, |session| session.receive(message))
    }

    /// Tear down the session with `partner`, wiping every secret it held.
    pub fn end_session(&self, partner: &PublicKey) -> Result<(), ChatterError> {
        match self.sessions.remove(partner)? {
            SessionEntry::Established(mut session) => {
                let wiped = session.wipe();
                debug!(%partner, cached_keys_wiped = wiped, "ended session");
            },
            SessionEntry::Pending(_) => debug!(%partner, "abandoned pending handshake"),
            SessionEntry::Closed => {},
        }
        Ok(())
    }

    /// Whether a session (pending or established) exists with `partner`.
    pub fn has_session(&self, partner: &PublicKey) -> bool {
        self.sessions.contains(partner)
    }

    /// Number of sessions, pending and established.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Counters and turn state of the established session with `partner`.
    pub fn session_snapshot(&self, partner: &PublicKey) -> Result<SessionSnapshot, ChatterError> {
        self.sessions.with_session(partner, |session| Ok(session.snapshot()))
    }
}
