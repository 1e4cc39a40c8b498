//! Property-based tests
//!
//! Randomized checks of the invariants the wire formats and key
//! derivations must hold for all inputs.

use btc_primitives::encoding::{parse_script_num, render_int};
use btc_primitives::*;
use proptest::prelude::*;

/// Any opcode that is not a push or a branch delimiter.
fn plain_opcode() -> impl Strategy<Value = Opcode> {
    (0x4fu8..=0xb9)
        .prop_filter_map("not a plain opcode", |byte| {
            Opcode::from_byte(byte).filter(|op| {
                !op.is_push_data() && !op.is_conditional() && !matches!(op, Opcode::OP_ELSE | Opcode::OP_ENDIF)
            })
        })
}

fn token() -> impl Strategy<Value = Token> {
    prop_oneof![
        plain_opcode().prop_map(Token::Op),
        prop::collection::vec(any::<u8>(), 1..300)
            .prop_filter_map("push", |data| Token::push(data).ok()),
    ]
}

fn script_bytes() -> impl Strategy<Value = Script> {
    prop::collection::vec(any::<u8>(), 0..64).prop_map(Script::from_bytes)
}

fn input() -> impl Strategy<Value = TransactionInput> {
    (any::<[u8; 32]>(), any::<u32>(), script_bytes(), any::<u32>())
        .prop_map(|(outpoint, index, script, seq)| TransactionInput::new(Hash::new(outpoint), index, script, seq))
}

fn output() -> impl Strategy<Value = TransactionOutput> {
    (any::<u64>(), script_bytes()).prop_map(|(value, script)| TransactionOutput::new(value, script))
}

fn private_key() -> impl Strategy<Value = PrivateKey> {
    any::<[u8; 32]>().prop_filter_map("out of range", |bytes| PrivateKey::from_bytes(&bytes, Network::Mainnet).ok())
}

proptest! {
    #[test]
    fn prop_script_tokens_survive_serialization(tokens in prop::collection::vec(token(), 0..20)) {
        let script = Script::from_tokens(tokens.clone()).unwrap();
        let reparsed = Script::from_bytes(script.to_bytes());
        prop_assert_eq!(reparsed.tokens().unwrap(), &tokens[..]);

        let text = script.to_text().unwrap();
        prop_assert_eq!(Script::parse(&text).unwrap(), script);
    }

    #[test]
    fn prop_parsed_bytes_reserialize_exactly(raw in prop::collection::vec(any::<u8>(), 0..200)) {
        let script = Script::from_bytes(raw.clone());
        prop_assert_eq!(script.to_bytes(), raw.clone());
        if let Ok(tokens) = script.tokens() {
            let rebuilt = Script::from_tokens(tokens.to_vec()).unwrap();
            prop_assert_eq!(rebuilt.to_bytes(), raw.clone());

            let reparsed = Script::parse(&script.to_string()).unwrap();
            prop_assert_eq!(reparsed.to_bytes(), raw);
        }
    }

    #[test]
    fn prop_balanced_branches_nest(depth in 1usize..20, body in plain_opcode()) {
        let mut tokens = vec![Token::Op(Opcode::OP_IF); depth];
        tokens.push(Token::Op(body));
        tokens.extend(std::iter::repeat(Token::Op(Opcode::OP_ENDIF)).take(depth));
        let script = Script::from_tokens(tokens).unwrap();
        prop_assert_eq!(script.ast().unwrap().len(), 1);

        // Dropping any delimiter unbalances the script.
        let mut damaged = script.clone();
        prop_assert!(damaged.delete(0).is_err());
        prop_assert_eq!(damaged, script);
    }

    #[test]
    fn prop_transaction_round_trip(
        version in any::<u32>(),
        inputs in prop::collection::vec(input(), 0..4),
        outputs in prop::collection::vec(output(), 0..4),
        lock_time in any::<u32>(),
    ) {
        let txn = Transaction::new(version, inputs, outputs, lock_time);
        let parsed = Transaction::from_hex(&txn.to_hex()).unwrap();
        prop_assert_eq!(parsed.hash(), txn.hash());
        prop_assert_eq!(parsed, txn);
    }

    #[test]
    fn prop_script_num_round_trip(n in -(1i64 << 62)..(1i64 << 62)) {
        let bytes = render_int(n);
        prop_assert!(bytes.len() <= 8);
        prop_assert_eq!(parse_script_num(&bytes, 8).unwrap(), n);
    }

    #[test]
    fn prop_sign_then_verify(key in private_key(), message in prop::collection::vec(any::<u8>(), 0..100)) {
        let sig = key.sign(&message, true).unwrap();
        prop_assert!(!sig.s().is_high());
        prop_assert!(key.public_key().verify(&message, &sig, true));

        let decoded = Signature::from_der(&sig.to_der()).unwrap();
        prop_assert!(key.public_key().verify(&message, &decoded, true));

        let mut tampered = message.clone();
        tampered.push(0x00);
        prop_assert!(!key.public_key().verify(&tampered, &sig, true));
    }

    #[test]
    fn prop_der_bit_flip_never_verifies(key in private_key(), bit in 0usize..(70 * 8)) {
        let sig = key.sign(b"bit flip", true).unwrap();
        let mut der = sig.to_der();
        let bit = bit % (der.len() * 8);
        der[bit / 8] ^= 1 << (bit % 8);
        if let Ok(flipped) = Signature::from_der(&der) {
            prop_assert!(!key.public_key().verify(b"bit flip", &flipped, true));
        }
    }

    #[test]
    fn prop_message_signature_verifies(key in private_key(), message in "[ -~]{0,80}", compressed in any::<bool>()) {
        let sig = key.sign_bitcoin(message.as_bytes(), compressed).unwrap();
        let address = key.public_key().address(compressed);
        prop_assert!(PublicKey::verify_bitcoin(message.as_bytes(), &sig, &address));
    }

    #[test]
    fn prop_hd_derivation_is_deterministic(seed in prop::collection::vec(any::<u8>(), 16..64), index in any::<u32>()) {
        let a = HDPrivateKey::master_key_from_seed(&seed, Network::Mainnet).unwrap();
        let b = HDPrivateKey::master_key_from_seed(&seed, Network::Mainnet).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(
            HDPrivateKey::from_parent(&a, index).unwrap(),
            HDPrivateKey::from_parent(&b, index).unwrap()
        );
    }

    #[test]
    fn prop_public_derivation_matches_private(seed in prop::collection::vec(any::<u8>(), 16..64), index in 0u32..0x8000_0000) {
        let master = HDPrivateKey::master_key_from_seed(&seed, Network::Mainnet).unwrap();
        let via_private = HDPrivateKey::from_parent(&master, index).unwrap().public_key();
        let via_public = HDPublicKey::from_parent(&master.public_key(), index).unwrap();
        prop_assert_eq!(via_private, via_public);

        let decoded = HDKey::from_b58check(&via_public.to_b58check()).unwrap();
        prop_assert_eq!(decoded, HDKey::Public(via_public));
    }
}
