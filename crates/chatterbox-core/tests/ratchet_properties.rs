//! Property-based tests for the ratchet session
//!
//! These tests verify the delivery contracts over random conversations:
//!
//! 1. **Round-trip**: every plaintext decrypts to itself, whatever the
//!    delivery order
//! 2. **At-most-once**: each message decrypts exactly once; redelivery fails
//! 3. **Atomic failure**: a tampered message leaves the session unchanged and
//!    the intact copy still decrypts
//! 4. **Determinism**: the same seed yields the same transcript

use std::sync::{Arc, Mutex};

use chatterbox_core::{Chatter, ChatterError, Environment, Message};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

#[derive(Clone)]
struct TestEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl TestEnv {
    fn seeded(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Environment for TestEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

fn pair(seed: u64) -> (Chatter<TestEnv>, Chatter<TestEnv>) {
    let alice = Chatter::new(TestEnv::seeded(seed));
    let bob = Chatter::new(TestEnv::seeded(seed.wrapping_add(1)));

    let alice_eph = alice.initiate_handshake(bob.identity()).unwrap();
    let (bob_eph, _) = bob.return_handshake(alice.identity(), &alice_eph).unwrap();
    alice.finalize_handshake(bob.identity(), &bob_eph).unwrap();

    (alice, bob)
}

#[derive(Debug, Clone)]
enum Op {
    AliceSends(String),
    BobSends(String),
    DeliverToBob(prop::sample::Index),
    DeliverToAlice(prop::sample::Index),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z0-9 ]{0,24}".prop_map(Op::AliceSends),
        "[a-z0-9 ]{0,24}".prop_map(Op::BobSends),
        any::<prop::sample::Index>().prop_map(Op::DeliverToBob),
        any::<prop::sample::Index>().prop_map(Op::DeliverToAlice),
    ]
}

/// Deliver the in-flight message at `position` and check its plaintext.
fn deliver(
    receiver: &Chatter<TestEnv>,
    in_flight: &mut Vec<(Message, String)>,
    delivered: &mut Vec<Message>,
    position: usize,
) -> Result<(), TestCaseError> {
    let (message, expected) = in_flight.swap_remove(position);
    let plaintext = receiver.receive_message(&message);
    prop_assert_eq!(plaintext, Ok(expected));
    delivered.push(message);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_random_schedule_delivers_every_message_once(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        let (alice, bob) = pair(seed);
        let mut to_bob = Vec::new();
        let mut to_alice = Vec::new();
        let mut delivered_to_bob = Vec::new();
        let mut delivered_to_alice = Vec::new();

        for op in &ops {
            match op {
                Op::AliceSends(text) => {
                    let message = alice.send_message(bob.identity(), text).unwrap();
                    to_bob.push((message, text.clone()));
                },
                Op::BobSends(text) => {
                    let message = bob.send_message(alice.identity(), text).unwrap();
                    to_alice.push((message, text.clone()));
                },
                Op::DeliverToBob(index) if !to_bob.is_empty() => {
                    let position = index.index(to_bob.len());
                    deliver(&bob, &mut to_bob, &mut delivered_to_bob, position)?;
                },
                Op::DeliverToAlice(index) if !to_alice.is_empty() => {
                    let position = index.index(to_alice.len());
                    deliver(&alice, &mut to_alice, &mut delivered_to_alice, position)?;
                },
                Op::DeliverToBob(_) | Op::DeliverToAlice(_) => {},
            }
        }

        // Drain whatever is still in flight.
        while !to_bob.is_empty() {
            deliver(&bob, &mut to_bob, &mut delivered_to_bob, 0)?;
        }
        while !to_alice.is_empty() {
            deliver(&alice, &mut to_alice, &mut delivered_to_alice, 0)?;
        }

        for message in &delivered_to_bob {
            prop_assert_eq!(
                bob.receive_message(message),
                Err(ChatterError::UnknownOrConsumedMessage { counter: message.counter })
            );
        }
        for message in &delivered_to_alice {
            prop_assert_eq!(
                alice.receive_message(message),
                Err(ChatterError::UnknownOrConsumedMessage { counter: message.counter })
            );
        }

        prop_assert_eq!(bob.session_snapshot(alice.identity()).unwrap().cached_keys, 0);
        prop_assert_eq!(alice.session_snapshot(bob.identity()).unwrap().cached_keys, 0);
    }

    #[test]
    fn prop_any_permutation_of_one_direction(
        seed in any::<u64>(),
        order in (1usize..40).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle()),
    ) {
        let (alice, bob) = pair(seed);
        let messages: Vec<Message> = (0..order.len())
            .map(|i| bob.send_message(alice.identity(), &format!("m{i}")).unwrap())
            .collect();

        for &i in &order {
            prop_assert_eq!(alice.receive_message(&messages[i]), Ok(format!("m{i}")));
        }

        let snapshot = alice.session_snapshot(bob.identity()).unwrap();
        prop_assert_eq!(snapshot.receive_counter as usize, order.len());
        prop_assert_eq!(snapshot.cached_keys, 0);
    }

    #[test]
    fn prop_tampering_is_atomic(
        seed in any::<u64>(),
        skipped in 0usize..5,
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let (alice, bob) = pair(seed);
        let messages: Vec<Message> = (0..=skipped)
            .map(|i| alice.send_message(bob.identity(), &format!("m{i}")).unwrap())
            .collect();
        let target = &messages[skipped];

        let mut tampered = target.clone();
        let index = position.index(tampered.ciphertext.len());
        tampered.ciphertext[index] ^= flip;

        let before = bob.session_snapshot(alice.identity()).unwrap();
        prop_assert_eq!(bob.receive_message(&tampered), Err(ChatterError::AuthenticationFailure));

        let after = bob.session_snapshot(alice.identity()).unwrap();
        prop_assert_eq!(after.receive_counter, before.receive_counter);
        prop_assert_eq!(after.turn, before.turn);

        prop_assert_eq!(bob.receive_message(target), Ok(format!("m{skipped}")));
        for (i, message) in messages[..skipped].iter().enumerate() {
            prop_assert_eq!(bob.receive_message(message), Ok(format!("m{i}")));
        }
    }

    #[test]
    fn prop_same_seed_same_transcript(
        seed in any::<u64>(),
        texts in prop::collection::vec("[a-z]{0,16}", 1..10),
    ) {
        let transcript = |seed: u64| {
            let (alice, bob) = pair(seed);
            texts
                .iter()
                .map(|text| alice.send_message(bob.identity(), text).unwrap())
                .collect::<Vec<_>>()
        };

        prop_assert_eq!(transcript(seed), transcript(seed));
    }
}
