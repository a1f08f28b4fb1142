//! Per-partner ratchet state machine.
//!
//! A [`Session`] combines a DH ratchet (fresh X25519 shares folded into the
//! root key) with symmetric hash chains (one step per message). Messages may
//! arrive out of order: keys for skipped counters are cached and consumed at
//! most once.
//!
//! # Handshake
//!
//! ```text
//! Initiator                               Responder
//! ─────────                               ─────────
//! PendingHandshake::initiate
//!   ephemeral a ─────────────────────────>
//!                                         Session::respond
//!                                           root = combine(DH(A, b), DH(a, B), DH(a, b))
//!              <───────────────────────── ephemeral b, check
//! PendingHandshake::finalize
//!   root = combine(DH(b, A), DH(B, a), DH(b, a))
//!   check (compare out of band)
//! ```
//!
//! # Turn State Table
//!
//! [`RatchetTurn`] records who owes the next DH share. Both directions use the
//! same two states:
//!
//! | state          | event                                | effect / next state                       |
//! |----------------|--------------------------------------|-------------------------------------------|
//! | `AwaitingPeer` | initiator handshake                  | initial state                             |
//! | `OwesStep`     | responder handshake                  | initial state                             |
//! | `OwesStep`     | send                                 | fresh share, new root + send chain → `AwaitingPeer` |
//! | `AwaitingPeer` | send                                 | no step                                   |
//! | `AwaitingPeer` | receive current, carries new share   | receive-side step → `OwesStep`            |
//! | `OwesStep`     | receive current, carries new share   | share already applied, no step            |
//! | any            | future walk reaches `last_update`    | receive-side step → `OwesStep`            |
//!
//! # Receive Paths
//!
//! The receive counter is the highest counter processed in order. An incoming
//! counter equal to `receive + 1` is *current*, greater is *future*, anything
//! else is *past*. Current and future paths compute the next ratchet state
//! into a draft and commit it only after decryption succeeds. The past path
//! touches only the skipped-key cache.

use std::{cmp::Ordering, collections::BTreeMap};

use chatterbox_crypto::{KeyPair, Label, PublicKey, SymmetricKey, combine_keys, dh_combine};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::{config::ChatterConfig, env::Environment, error::ChatterError, message::Message};

/// Which side owes the next DH-ratchet share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatchetTurn {
    /// The peer's latest share has been applied; the next send must
    /// introduce a fresh share of our own.
    OwesStep,
    /// Our latest share is live; no further step until the peer's next
    /// fresh share arrives.
    AwaitingPeer,
}

/// Initiator state between Initiate and Finalize.
///
/// Holds only the ephemeral key pair; no chains exist yet.
pub struct PendingHandshake {
    ephemeral: KeyPair,
}

impl PendingHandshake {
    /// Start a handshake with a freshly generated ephemeral key pair.
    pub fn initiate(ephemeral: KeyPair) -> Self {
        Self { ephemeral }
    }

    /// Ephemeral share to send to the responder.
    pub fn ephemeral_public(&self) -> &PublicKey {
        self.ephemeral.public_key()
    }

    /// Complete the handshake with the responder's ephemeral share.
    ///
    /// Returns the established session and the handshake-check value.
    pub fn finalize(
        &self,
        identity: &KeyPair,
        partner_identity: &PublicKey,
        partner_ephemeral: &PublicKey,
        config: ChatterConfig,
    ) -> (Session, SymmetricKey) {
        let root = combine_keys(&[
            &dh_combine(partner_ephemeral, identity),
            &dh_combine(partner_identity, &self.ephemeral),
            &dh_combine(partner_ephemeral, &self.ephemeral),
        ]);

        Session::establish(
            self.ephemeral.clone(),
            *partner_ephemeral,
            root,
            RatchetTurn::AwaitingPeer,
            config,
        )
    }
}

/// Shared ratchet fields that a failed decryption must not disturb.
///
/// Cloned into a draft at the start of a current/future receive and swapped
/// back in only on success.
#[derive(Clone)]
struct RatchetState {
    root_chain: SymmetricKey,
    partner_ratchet: PublicKey,
    receive_chain: SymmetricKey,
    receive_counter: u32,
    turn: RatchetTurn,
}

impl RatchetState {
    /// Receive-side DH step with the peer's freshly introduced share.
    fn apply_ratchet_step(&mut self, partner_ratchet: &PublicKey, own: &KeyPair) {
        let root = next_root(&self.root_chain, partner_ratchet, own);
        self.receive_chain = root.derive_key(Label::Chain);
        self.root_chain = root;
        self.partner_ratchet = *partner_ratchet;
        self.turn = RatchetTurn::OwesStep;
    }
}

/// Non-secret view of a session, for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Counter of the last message sent
    pub send_counter: u32,
    /// Highest counter received in order
    pub receive_counter: u32,
    /// Counter at which our current DH share was introduced
    pub last_update: u32,
    /// Who owes the next DH share
    pub turn: RatchetTurn,
    /// Number of cached skipped-message keys
    pub cached_keys: usize,
}

/// Ratchet state for one (self, partner) pair.
///
/// # Invariants
///
/// - Root, send and receive chain keys never leave the session
/// - A replaced chain key is zeroized (on drop) and never retained, except as
///   a derived message key in the skipped-key cache
/// - Send and receive counters never decrease
/// - A cached key is removed and wiped as soon as it decrypts successfully
pub struct Session {
    my_ratchet: KeyPair,
    state: RatchetState,
    send_chain: SymmetricKey,
    send_counter: u32,
    last_update: u32,
    cached_keys: BTreeMap<u32, SymmetricKey>,
    config: ChatterConfig,
}

impl Session {
    /// Responder side of the handshake.
    ///
    /// Returns the session, the responder's ephemeral public key and the
    /// handshake-check value.
    pub fn respond(
        identity: &KeyPair,
        ephemeral: KeyPair,
        partner_identity: &PublicKey,
        partner_ephemeral: &PublicKey,
        config: ChatterConfig,
    ) -> (Self, SymmetricKey) {
        let root = combine_keys(&[
            &dh_combine(partner_identity, &ephemeral),
            &dh_combine(partner_ephemeral, identity),
            &dh_combine(partner_ephemeral, &ephemeral),
        ]);

        Self::establish(ephemeral, *partner_ephemeral, root, RatchetTurn::OwesStep, config)
    }

    fn establish(
        my_ratchet: KeyPair,
        partner_ratchet: PublicKey,
        root: SymmetricKey,
        turn: RatchetTurn,
        config: ChatterConfig,
    ) -> (Self, SymmetricKey) {
        let check = root.derive_key(Label::HandshakeCheck);
        let session = Self {
            my_ratchet,
            send_chain: root.derive_key(Label::Chain),
            state: RatchetState {
                receive_chain: root.derive_key(Label::Chain),
                root_chain: root,
                partner_ratchet,
                receive_counter: 0,
                turn,
            },
            send_counter: 0,
            last_update: 0,
            cached_keys: BTreeMap::new(),
            config,
        };
        (session, check)
    }

    /// Our current DH-ratchet public key.
    pub fn ratchet_public(&self) -> &PublicKey {
        self.my_ratchet.public_key()
    }

    /// Non-secret view of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            send_counter: self.send_counter,
            receive_counter: self.state.receive_counter,
            last_update: self.last_update,
            turn: self.state.turn,
            cached_keys: self.cached_keys.len(),
        }
    }

    /// Encrypt `plaintext` as the next message to the partner.
    ///
    /// Performs a DH-ratchet step first if this side owes one. The message
    /// key is dropped (and wiped) before returning.
    pub fn send<E: Environment>(
        &mut self,
        env: &E,
        sender: &PublicKey,
        receiver: &PublicKey,
        plaintext: &str,
    ) -> Result<Message, ChatterError> {
        let counter = self
            .send_counter
            .checked_add(1)
            .ok_or(ChatterError::CounterOverflow { counter: self.send_counter })?;
        self.send_counter = counter;

        let carries_ratchet = self.state.turn == RatchetTurn::OwesStep;
        if carries_ratchet {
            let fresh = env.generate_key_pair();
            let root = next_root(&self.state.root_chain, &self.state.partner_ratchet, &fresh);
            self.send_chain = root.derive_key(Label::Chain);
            self.state.root_chain = root;
            self.my_ratchet = fresh;
            self.last_update = counter;
            self.state.turn = RatchetTurn::AwaitingPeer;

            debug!(counter, ratchet = %self.my_ratchet.public_key(), "send-side DH ratchet step");
        }

        let message_key = self.send_chain.derive_key(Label::MessageKey);
        let iv = env.random_iv();
        self.send_chain = self.send_chain.derive_key(Label::Chain);

        let mut message = Message {
            sender: Some(*sender),
            receiver: Some(*receiver),
            next_dh_ratchet: Some(*self.my_ratchet.public_key()),
            counter,
            last_update: self.last_update,
            carries_ratchet,
            ciphertext: Vec::new(),
            iv,
        };
        let additional_data = message.encode_additional_data();
        message.ciphertext =
            message_key.authenticated_encrypt(plaintext.as_bytes(), &additional_data, &iv);

        Ok(message)
    }

    /// Decrypt a message from the partner.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailure`: tag mismatch; all ratchet state is rolled
    ///   back (current/future) or the cached key retained (past)
    /// - `UnknownOrConsumedMessage`: past counter with no cached key
    /// - `SkipLimitExceeded`: future counter beyond `max_skip`
    /// - `MalformedMessage`: a required DH-ratchet key is missing
    pub fn receive(&mut self, message: &Message) -> Result<String, ChatterError> {
        let expected = u64::from(self.state.receive_counter) + 1;

        match u64::from(message.counter).cmp(&expected) {
            Ordering::Equal => self.receive_current(message),
            Ordering::Greater => self.receive_future(message),
            Ordering::Less => self.receive_past(message),
        }
    }

    fn receive_current(&mut self, message: &Message) -> Result<String, ChatterError> {
        let mut draft = self.state.clone();

        if message.carries_ratchet && draft.turn == RatchetTurn::AwaitingPeer {
            let partner_ratchet = required_ratchet(message)?;
            draft.apply_ratchet_step(&partner_ratchet, &self.my_ratchet);
            debug!(
                counter = message.counter,
                ratchet = %partner_ratchet,
                "receive-side DH ratchet step"
            );
        }

        let message_key = draft.receive_chain.derive_key(Label::MessageKey);
        let plaintext = decrypt(&message_key, message).inspect_err(|_| {
            warn!(counter = message.counter, "authentication failed, rolling back");
        })?;

        draft.receive_chain = draft.receive_chain.derive_key(Label::Chain);
        draft.receive_counter = message.counter;
        self.state = draft;
        self.discard_cached(message.counter);

        Ok(plaintext)
    }

    fn receive_future(&mut self, message: &Message) -> Result<String, ChatterError> {
        let current = self.state.receive_counter;
        let skipped = message.counter - current - 1;
        if skipped > self.config.max_skip {
            warn!(current, requested = message.counter, "skip limit exceeded");
            return Err(ChatterError::SkipLimitExceeded {
                current,
                requested: message.counter,
                max: self.config.max_skip,
            });
        }

        // The sender introduced a new share somewhere in (current, counter].
        let steps_in_window =
            message.last_update > current && message.last_update <= message.counter;
        let partner_ratchet =
            if steps_in_window { Some(required_ratchet(message)?) } else { None };

        let mut draft = self.state.clone();
        for index in (current + 1)..message.counter {
            if let Some(partner_ratchet) = partner_ratchet.filter(|_| index == message.last_update)
            {
                draft.apply_ratchet_step(&partner_ratchet, &self.my_ratchet);
                debug!(index, ratchet = %partner_ratchet, "receive-side DH ratchet step (skipped)");
            }

            let skipped_key = draft.receive_chain.derive_key(Label::MessageKey);
            self.cache_skipped(index, skipped_key);
            draft.receive_chain = draft.receive_chain.derive_key(Label::Chain);
        }

        if let Some(partner_ratchet) =
            partner_ratchet.filter(|_| message.last_update == message.counter)
        {
            draft.apply_ratchet_step(&partner_ratchet, &self.my_ratchet);
            debug!(
                counter = message.counter,
                ratchet = %partner_ratchet,
                "receive-side DH ratchet step"
            );
        }

        debug!(current, counter = message.counter, skipped, "cached skipped message keys");

        let message_key = draft.receive_chain.derive_key(Label::MessageKey);
        let plaintext = decrypt(&message_key, message).inspect_err(|_| {
            warn!(counter = message.counter, "authentication failed, rolling back");
        })?;

        draft.receive_chain = draft.receive_chain.derive_key(Label::Chain);
        draft.receive_counter = message.counter;
        self.state = draft;
        self.discard_cached(message.counter);

        Ok(plaintext)
    }

    fn receive_past(&mut self, message: &Message) -> Result<String, ChatterError> {
        let Some(cached) = self.cached_keys.get(&message.counter) else {
            warn!(counter = message.counter, "no cached key: unknown or replayed message");
            return Err(ChatterError::UnknownOrConsumedMessage { counter: message.counter });
        };

        let plaintext = decrypt(cached, message).inspect_err(|_| {
            warn!(counter = message.counter, "authentication failed, keeping cached key");
        })?;

        self.discard_cached(message.counter);
        Ok(plaintext)
    }

    /// Insert a skipped key, evicting the lowest index when full.
    fn cache_skipped(&mut self, index: u32, key: SymmetricKey) {
        if self.config.max_cached_keys == 0 {
            return;
        }

        if self.cached_keys.len() >= self.config.max_cached_keys
            && !self.cached_keys.contains_key(&index)
            && let Some((evicted, mut old)) = self.cached_keys.pop_first()
        {
            old.zeroize();
            debug!(evicted, "skipped-key cache full, evicted oldest entry");
        }

        if let Some(mut previous) = self.cached_keys.insert(index, key) {
            previous.zeroize();
        }
    }

    fn discard_cached(&mut self, index: u32) {
        if let Some(mut key) = self.cached_keys.remove(&index) {
            key.zeroize();
        }
    }

    /// Wipe every secret this session holds.
    ///
    /// Root, send and receive chains plus every cached key. Returns the
    /// number of cached keys wiped. The session is unusable afterwards.
    pub fn wipe(&mut self) -> usize {
        self.state.root_chain.zeroize();
        self.state.receive_chain.zeroize();
        self.send_chain.zeroize();

        let wiped = self.cached_keys.len();
        for key in self.cached_keys.values_mut() {
            key.zeroize();
        }
        self.cached_keys.clear();
        wiped
    }
}

/// `combine(root.derive(Root), DH(partner_ratchet, own))`
fn next_root(root: &SymmetricKey, partner_ratchet: &PublicKey, own: &KeyPair) -> SymmetricKey {
    combine_keys(&[&root.derive_key(Label::Root), &dh_combine(partner_ratchet, own)])
}

fn required_ratchet(message: &Message) -> Result<PublicKey, ChatterError> {
    message.next_dh_ratchet.ok_or(ChatterError::MalformedMessage { field: "next_dh_ratchet" })
}

fn decrypt(key: &SymmetricKey, message: &Message) -> Result<String, ChatterError> {
    let additional_data = message.encode_additional_data();
    let plaintext = key.authenticated_decrypt(&message.ciphertext, &additional_data, &message.iv)?;

    String::from_utf8(plaintext).map_err(|err| {
        err.into_bytes().zeroize();
        ChatterError::MalformedMessage { field: "plaintext" }
    })
}
