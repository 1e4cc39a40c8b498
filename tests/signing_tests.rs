//! Transaction signing and input verification against mainnet transactions

use anyhow::Result;
use btc_primitives::constants::SIGHASH_ALL;
use btc_primitives::encoding::address_to_key_hash;
use btc_primitives::*;
use hex_literal::hex;

const WIF_0: &str = "5JcjcDkFZ3Dz4RjnK3n9cyLVmNS3FzGdNRtNMGFBfJKgzM8eAhH";
const WIF_1: &str = "5KK5GkzYJKa7evzYPdvDPmB9XWaKQY9qJS5ouRx4ndBHNHbb2Hq";

/// Spends the 10000 satoshis sent to WIF_0 in block 369023.
const P2PKH_SIGNED_HEX: &str = "0100000001205607fb482a03600b736fb0c257dfd4faa49e45db3990e2c4994796031eae6e000000008b483045022100ed84be709227397fb1bc13b749f235e1f98f07ef8216f15da79e926b99d2bdeb02206ff39819d91bc81fecd74e59a721a38b00725389abb9cbecb42ad1c939fd8262014104e674caf81eb3bb4a97f2acf81b54dc930d9db6a6805fd46ca74ac3ab212c0bbf62164a11e7edaf31fbf24a878087d925303079f2556664f3b32d125f2138cbefffffffff0128230000000000001976a914f1fd1dc65af03c30fe743ac63cef3a120ffab57d88ac00000000";

const MULTISIG_UNSIGNED_HEX: &str = "01000000010506344de69d47e432eb0174500d6e188a9e63c1e84a9e8796ec98c99b7559f70100000000ffffffff01c8af0000000000001976a91458b7a60f11a904feef35a639b6048de8dd4d9f1c88ac00000000";

const MULTISIG_SIGNED_HEX: &str = "01000000010506344de69d47e432eb0174500d6e188a9e63c1e84a9e8796ec98c99b7559f701000000fdfd00004730440220695a28c42daa23c13e192e36a20d03a2a79994e0fe1c3c6b612d0ae23743064602200ca19003e7c1ce0cecb0bbfba9a825fc3b83cf54e4c3261cd15f080d24a8a5b901483045022100aa9096ce71995c24545694f20ab0482099a98c99b799c706c333c521e51db66002206578f023fa46f4a863a6fa7f18b95eebd1a91fcdf6ce714e8795d902bd6b682b014c69522102b66fcb1064d827094685264aaa90d0126861688932eafbd1d1a4ba149de3308b21025cab5e31095551582630f168280a38eb3a62b0b3e230b20f8807fc5463ccca3c21021098babedb3408e9ac2984adcf2a8e4c48e56a785065893f76d0fa0ff507f01053aeffffffff01c8af0000000000001976a91458b7a60f11a904feef35a639b6048de8dd4d9f1c88ac00000000";

/// Same as MULTISIG_SIGNED_HEX with the two signatures swapped.
const MULTISIG_SWAPPED_HEX: &str = "01000000010506344de69d47e432eb0174500d6e188a9e63c1e84a9e8796ec98c99b7559f701000000fdfd0000483045022100aa9096ce71995c24545694f20ab0482099a98c99b799c706c333c521e51db66002206578f023fa46f4a863a6fa7f18b95eebd1a91fcdf6ce714e8795d902bd6b682b014730440220695a28c42daa23c13e192e36a20d03a2a79994e0fe1c3c6b612d0ae23743064602200ca19003e7c1ce0cecb0bbfba9a825fc3b83cf54e4c3261cd15f080d24a8a5b9014c69522102b66fcb1064d827094685264aaa90d0126861688932eafbd1d1a4ba149de3308b21025cab5e31095551582630f168280a38eb3a62b0b3e230b20f8807fc5463ccca3c21021098babedb3408e9ac2984adcf2a8e4c48e56a785065893f76d0fa0ff507f01053aeffffffff01c8af0000000000001976a91458b7a60f11a904feef35a639b6048de8dd4d9f1c88ac00000000";

/// A 2-of-2 input carrying a single signature.
const PARTIAL_MULTISIG_HEX: &str = "0100000001124f2e9522043794a438bfa44dd161b8976af246e4850948f85a2b50c113611a000000009200483045022100ec2e3fd3e116eb25644f055ba7945d940f828b39060d4a93c7d2b6d3cbd9d41802203c9f1ad2208122e1ffcbeba09d37a596ae5ce445be465b9417481f66ab804b070147522102395a983fd92e55200fbde624f62cda10f8d0adf8261506e5c983cfe92326c5aa2102bb70b001d807721e74d96bda71d225dc6c09fe8d541d260258145b42afac93e152ae0000000001a0860100000000001976a914e205124b0e25dc77e2b29b2e57c2f56ed10771eb88ac095635ac";

const MULTISIG_PUBKEYS: [[u8; 33]; 3] = [
    hex!("02b66fcb1064d827094685264aaa90d0126861688932eafbd1d1a4ba149de3308b"),
    hex!("025cab5e31095551582630f168280a38eb3a62b0b3e230b20f8807fc5463ccca3c"),
    hex!("021098babedb3408e9ac2984adcf2a8e4c48e56a785065893f76d0fa0ff507f010"),
];

const SIG_0: [u8; 71] = hex!("30440220695a28c42daa23c13e192e36a20d03a2a79994e0fe1c3c6b612d0ae23743064602200ca19003e7c1ce0cecb0bbfba9a825fc3b83cf54e4c3261cd15f080d24a8a5b901");
const SIG_1: [u8; 72] = hex!("3045022100aa9096ce71995c24545694f20ab0482099a98c99b799c706c333c521e51db66002206578f023fa46f4a863a6fa7f18b95eebd1a91fcdf6ce714e8795d902bd6b682b01");

fn multisig_private_keys() -> Result<[PrivateKey; 2]> {
    Ok([
        PrivateKey::from_hex("9d695afea1c3ab99e11248e4b74e698332b11f5c5c051e6e80da61aa19ae7c89", Network::Mainnet)?,
        PrivateKey::from_hex("68ebab45a918444d7e088c49bda76d7df89b9ea6ba5ddeb1aab5945391828b83", Network::Mainnet)?,
    ])
}

fn redeem_script() -> Result<Script> {
    Ok(Script::build_multisig_redeem(2, &MULTISIG_PUBKEYS)?)
}

fn push_at(script: &Script, index: usize) -> Result<Vec<u8>> {
    let tokens = script.tokens()?;
    let data = tokens[index].as_push().ok_or_else(|| anyhow::anyhow!("token {index} is not a push"))?;
    Ok(data.to_vec())
}

#[test]
fn test_wif_keys_match_known_points() -> Result<()> {
    let key = PrivateKey::from_b58check(WIF_0)?;
    assert_eq!(
        key.public_key().to_bytes(),
        hex!("04e674caf81eb3bb4a97f2acf81b54dc930d9db6a6805fd46ca74ac3ab212c0bbf62164a11e7edaf31fbf24a878087d925303079f2556664f3b32d125f2138cbef")
    );
    let key = PrivateKey::from_b58check(WIF_1)?;
    assert_eq!(
        key.public_key().to_bytes(),
        hex!("045866260447c0adfdb26dbe5060a7a298e17d051008ce1677d19fe3d3373284b9c384a3445dd96f96c11d3b33d82083e9ecc27d0abfa9fd433afaa5006186bf61")
    );
    Ok(())
}

#[test]
fn test_sign_p2pkh_input() -> Result<()> {
    let key_0 = PrivateKey::from_b58check(WIF_0)?;
    let key_1 = PrivateKey::from_b58check(WIF_1)?;
    let address_0 = key_0.public_key().address(false);
    let address_1 = key_1.public_key().address(false);
    assert_eq!(address_0, "1NKxQnbtKDdL6BY1UaKdrzCxQHfn3TQnqZ");

    let prev_script_pub_key = Script::build_p2pkh(&address_to_key_hash(&address_0)?.1);
    let out_script_pub_key = Script::build_p2pkh(&address_to_key_hash(&address_1)?.1);

    let input = TransactionInput::new(
        Hash::from_hex("6eae1e03964799c4e29039db459ea4fad4df57c2b06f730b60032a48fb075620")?,
        0,
        Script::new(),
        0xffffffff,
    );
    // 1000 satoshi fee
    let output = TransactionOutput::new(9000, out_script_pub_key.clone());
    let mut txn = Transaction::new(1, vec![input], vec![output], 0);

    txn.sign_input(0, SIGHASH_ALL, &key_0, &prev_script_pub_key)?;

    assert_eq!(txn.to_hex(), P2PKH_SIGNED_HEX);
    assert!(txn.verify_input_signature(0, &prev_script_pub_key));
    assert!(!txn.verify_input_signature(0, &out_script_pub_key));
    Ok(())
}

#[test]
fn test_sign_with_wrong_key_is_rejected() -> Result<()> {
    let key_0 = PrivateKey::from_b58check(WIF_0)?;
    let key_1 = PrivateKey::from_b58check(WIF_1)?;
    let prev_script_pub_key = Script::build_p2pkh(&key_0.public_key().hash160(false));

    let mut txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;
    let err = txn.sign_input(0, SIGHASH_ALL, &key_1, &prev_script_pub_key).unwrap_err();
    assert!(matches!(err, BitcoinError::Signing(_)));

    // The input is left untouched.
    assert!(txn.inputs[0].script.is_empty());
    Ok(())
}

#[test]
fn test_sign_rejects_out_of_range_input_and_wide_hash_type() -> Result<()> {
    let key = PrivateKey::from_b58check(WIF_0)?;
    let sub_script = Script::build_p2pkh(&key.public_key().hash160(false));
    let mut txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;

    assert!(txn.sign_input(1, SIGHASH_ALL, &key, &sub_script).is_err());
    assert!(matches!(
        txn.sign_input(0, 0x101, &key, &sub_script),
        Err(BitcoinError::Signing(_))
    ));
    Ok(())
}

#[test]
fn test_multisig_sign_in_key_order() -> Result<()> {
    let [key_0, key_1] = multisig_private_keys()?;
    let redeem_script = redeem_script()?;
    let script_pub_key = Script::build_p2sh(&redeem_script.hash160());
    assert_eq!(redeem_script.hash160(), hex!("5c406de4915e37a7e71c7ef9bff42fbf1404daa0"));

    let mut txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;
    txn.sign_input(0, SIGHASH_ALL, &key_0, &redeem_script)?;
    assert_eq!(push_at(&txn.inputs[0].script, 1)?, SIG_0);

    txn.sign_input(0, SIGHASH_ALL, &key_1, &redeem_script)?;
    assert_eq!(push_at(&txn.inputs[0].script, 2)?, SIG_1);

    assert_eq!(txn.to_hex(), MULTISIG_SIGNED_HEX);
    assert!(txn.verify_input_signature(0, &script_pub_key));
    assert!(!txn.verify_input_signature(0, &redeem_script));

    let wrong_script_pub_key = Script::parse("OP_HASH160 0x5c406de4915e37a7e71c7ef9bff42fbf1404daa1 OP_EQUAL")?;
    assert!(!txn.verify_input_signature(0, &wrong_script_pub_key));
    Ok(())
}

#[test]
fn test_multisig_single_signature_is_not_enough() -> Result<()> {
    let [key_0, key_1] = multisig_private_keys()?;
    let redeem_script = redeem_script()?;
    let script_pub_key = Script::build_p2sh(&redeem_script.hash160());

    for key in [&key_0, &key_1] {
        let mut txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;
        txn.sign_input(0, SIGHASH_ALL, key, &redeem_script)?;
        assert!(!txn.verify_input_signature(0, &script_pub_key));
        assert!(txn.verify_partial_multisig(0, &script_pub_key));
    }
    Ok(())
}

#[test]
fn test_multisig_sign_in_reverse_order() -> Result<()> {
    let [key_0, key_1] = multisig_private_keys()?;
    let redeem_script = redeem_script()?;
    let script_pub_key = Script::build_p2sh(&redeem_script.hash160());

    let mut txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;
    txn.sign_input(0, SIGHASH_ALL, &key_1, &redeem_script)?;
    txn.sign_input(0, SIGHASH_ALL, &key_0, &redeem_script)?;

    // Signatures are merged back into public key order.
    assert_eq!(txn.to_hex(), MULTISIG_SIGNED_HEX);
    assert!(txn.verify_input_signature(0, &script_pub_key));
    assert!(txn.verify_partial_multisig(0, &script_pub_key));
    Ok(())
}

#[test]
fn test_multisig_signatures_out_of_order_fail() -> Result<()> {
    let redeem_script = redeem_script()?;
    let script_pub_key = Script::build_p2sh(&redeem_script.hash160());
    let txn = Transaction::from_hex(MULTISIG_SWAPPED_HEX)?;
    assert!(!txn.verify_input_signature(0, &script_pub_key));
    Ok(())
}

#[test]
fn test_multisig_refuses_extra_and_repeated_signatures() -> Result<()> {
    let [key_0, key_1] = multisig_private_keys()?;
    let redeem_script = redeem_script()?;

    let mut txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;
    txn.sign_input(0, SIGHASH_ALL, &key_0, &redeem_script)?;
    assert!(matches!(
        txn.sign_input(0, SIGHASH_ALL, &key_0, &redeem_script),
        Err(BitcoinError::Signing(_))
    ));

    txn.sign_input(0, SIGHASH_ALL, &key_1, &redeem_script)?;
    assert!(matches!(
        txn.sign_input(0, SIGHASH_ALL, &key_1, &redeem_script),
        Err(BitcoinError::Signing(_))
    ));
    assert_eq!(txn.to_hex(), MULTISIG_SIGNED_HEX);
    Ok(())
}

#[test]
fn test_multisig_key_not_in_redeem_script() -> Result<()> {
    let outsider = PrivateKey::from_b58check(WIF_0)?;
    let mut txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;
    assert!(matches!(
        txn.sign_input(0, SIGHASH_ALL, &outsider, &redeem_script()?),
        Err(BitcoinError::Signing(_))
    ));
    Ok(())
}

#[test]
fn test_partially_signed_transaction() -> Result<()> {
    let txn = Transaction::from_hex(PARTIAL_MULTISIG_HEX)?;
    let sig_info = txn.inputs[0].script.extract_multisig_sig_info()?;
    assert_eq!(sig_info.signatures.len(), 1);

    let script_pub_key = Script::build_p2sh(&sig_info.redeem_script.hash160());
    assert!(!txn.verify_input_signature(0, &script_pub_key));
    assert!(txn.verify_partial_multisig(0, &script_pub_key));
    Ok(())
}

#[test]
fn test_signature_for_input_does_not_modify() -> Result<()> {
    let [key_0, _] = multisig_private_keys()?;
    let redeem_script = redeem_script()?;
    let txn = Transaction::from_hex(MULTISIG_UNSIGNED_HEX)?;

    let (signature, digest) = txn.get_signature_for_input(0, SIGHASH_ALL, &key_0, &redeem_script)?;
    assert_eq!(digest, txn.signature_digest(0, SIGHASH_ALL, &redeem_script)?);
    assert!(key_0.public_key().verify(&digest, &signature, false));
    assert_eq!(signature.to_der(), SIG_0[..SIG_0.len() - 1]);
    assert_eq!(txn.to_hex(), MULTISIG_UNSIGNED_HEX);
    Ok(())
}
