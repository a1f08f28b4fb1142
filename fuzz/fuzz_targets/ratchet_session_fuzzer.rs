//! Fuzz target for the ratchet session under a hostile network
//!
//! Two participants exchange messages while the fuzzer controls delivery
//! order, replays and tampering.
//!
//! # Strategy
//!
//! - Arbitrary interleaving of sends in both directions
//! - Out-of-order delivery (any in-flight message may go next)
//! - Replays of already-delivered messages
//! - Tampered ciphertext, IV, counters, last-update index and ratchet key
//!
//! # Invariants
//!
//! - Intact messages always decrypt to the sent plaintext, exactly once
//! - Replays fail with `UnknownOrConsumedMessage`
//! - Tampered messages never decrypt and never move the receive counter or
//!   the ratchet turn
//! - NEVER panic on adversarial input

#![no_main]

use std::sync::{Arc, Mutex};

use arbitrary::Arbitrary;
use chatterbox_core::{Chatter, ChatterError, Environment, Message};
use libfuzzer_sys::fuzz_target;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

const MAX_OPERATIONS: usize = 128;

#[derive(Clone)]
struct FuzzEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl Environment for FuzzEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct SessionScenario {
    /// Seed for every key pair and IV
    seed: u64,
    /// Network events, truncated to `MAX_OPERATIONS`
    operations: Vec<NetworkOperation>,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Direction {
    ToAlice,
    ToBob,
}

#[derive(Debug, Clone, Arbitrary)]
enum NetworkOperation {
    /// Queue a new message
    Send { direction: Direction, text: String },
    /// Deliver an in-flight message, picked by index
    Deliver { direction: Direction, index: u8 },
    /// Deliver a tampered copy; the original stays in flight
    Tamper { direction: Direction, index: u8, tamper: Tamper },
    /// Redeliver an already-delivered message
    Replay { direction: Direction, index: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
enum Tamper {
    FlipCiphertext { position: u16, mask: u8 },
    FlipIv { position: u8, mask: u8 },
    Counter(u32),
    LastUpdate(u32),
    DropRatchetKey,
    Truncate { len: u16 },
}

impl Tamper {
    /// Apply to `message`. Returns false if the result equals the original.
    fn apply(&self, message: &mut Message) -> bool {
        match *self {
            Tamper::FlipCiphertext { position, mask } => {
                if mask == 0 || message.ciphertext.is_empty() {
                    return false;
                }
                let index = position as usize % message.ciphertext.len();
                message.ciphertext[index] ^= mask;
            },
            Tamper::FlipIv { position, mask } => {
                if mask == 0 {
                    return false;
                }
                let index = position as usize % message.iv.len();
                message.iv[index] ^= mask;
            },
            Tamper::Counter(counter) => {
                if counter == message.counter {
                    return false;
                }
                message.counter = counter;
            },
            Tamper::LastUpdate(last_update) => {
                if last_update == message.last_update {
                    return false;
                }
                message.last_update = last_update;
            },
            Tamper::DropRatchetKey => {
                message.next_dh_ratchet = None;
            },
            Tamper::Truncate { len } => {
                let len = len as usize;
                if len >= message.ciphertext.len() {
                    return false;
                }
                message.ciphertext.truncate(len);
            },
        }
        true
    }
}

#[derive(Default)]
struct Link {
    in_flight: Vec<(Message, String)>,
    delivered: Vec<Message>,
}

fuzz_target!(|scenario: SessionScenario| {
    let env = |seed: u64| FuzzEnv { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) };
    let alice = Chatter::new(env(scenario.seed));
    let bob = Chatter::new(env(scenario.seed.wrapping_add(1)));

    let alice_eph = alice.initiate_handshake(bob.identity()).unwrap();
    let (bob_eph, bob_check) = bob.return_handshake(alice.identity(), &alice_eph).unwrap();
    let alice_check = alice.finalize_handshake(bob.identity(), &bob_eph).unwrap();
    assert_eq!(alice_check, bob_check, "handshake checks must match");

    let mut to_alice = Link::default();
    let mut to_bob = Link::default();

    for op in scenario.operations.into_iter().take(MAX_OPERATIONS) {
        let (link, sender, receiver) = match op.direction() {
            Direction::ToAlice => (&mut to_alice, &bob, &alice),
            Direction::ToBob => (&mut to_bob, &alice, &bob),
        };

        match op {
            NetworkOperation::Send { text, .. } => {
                let message = sender.send_message(receiver.identity(), &text).unwrap();
                link.in_flight.push((message, text));
            },

            NetworkOperation::Deliver { index, .. } => {
                if link.in_flight.is_empty() {
                    continue;
                }
                let (message, text) = link.in_flight.remove(index as usize % link.in_flight.len());

                // INVARIANT 1: intact messages decrypt to what was sent
                let plaintext = receiver.receive_message(&message);
                assert_eq!(plaintext, Ok(text), "intact delivery must succeed");
                link.delivered.push(message);
            },

            NetworkOperation::Tamper { index, tamper, .. } => {
                if link.in_flight.is_empty() {
                    continue;
                }
                let (original, _) = &link.in_flight[index as usize % link.in_flight.len()];
                let mut message = original.clone();
                if !tamper.apply(&mut message) {
                    continue;
                }

                let before = receiver.session_snapshot(sender.identity()).unwrap();
                let result = receiver.receive_message(&message);

                // INVARIANT 2: tampered messages never decrypt
                assert!(result.is_err(), "tampered message decrypted: {tamper:?}");

                // INVARIANT 3: failed receives leave the ratchet where it was
                let after = receiver.session_snapshot(sender.identity()).unwrap();
                assert_eq!(after.receive_counter, before.receive_counter);
                assert_eq!(after.turn, before.turn);
            },

            NetworkOperation::Replay { index, .. } => {
                if link.delivered.is_empty() {
                    continue;
                }
                let message = &link.delivered[index as usize % link.delivered.len()];

                // INVARIANT 4: each message decrypts at most once
                assert_eq!(
                    receiver.receive_message(message),
                    Err(ChatterError::UnknownOrConsumedMessage { counter: message.counter }),
                    "replay must be rejected"
                );
            },
        }
    }

    // INVARIANT 5: everything still in flight remains deliverable
    for (link, receiver) in [(&mut to_alice, &alice), (&mut to_bob, &bob)] {
        for (message, text) in link.in_flight.drain(..) {
            assert_eq!(receiver.receive_message(&message), Ok(text));
        }
    }
});

impl NetworkOperation {
    fn direction(&self) -> Direction {
        match self {
            NetworkOperation::Send { direction, .. }
            | NetworkOperation::Deliver { direction, .. }
            | NetworkOperation::Tamper { direction, .. }
            | NetworkOperation::Replay { direction, .. } => *direction,
        }
    }
}
