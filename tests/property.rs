use chainsig_core::keys::derivation::derivation_message;
use chainsig_core::keys::format::{to_naj, ed25519_key_bytes};
use chainsig_core::signing::order_by_payload_index;
use chainsig_core::signing::preimage::bitcoin::{BitcoinInput, BitcoinOutput, UnsignedBitcoinTransaction};
use chainsig_core::signing::preimage::ethereum::{AccessListEntry, EvmTxType, UnsignedEvmTransaction};
use chainsig_core::utils::crypto::{keccak256, to_checksum_address};
use chainsig_core::{
    derive, normalize, to_compressed, to_uncompressed, CanonicalSignature, MpcSignatureResponse,
};
use proptest::prelude::*;
use secp256k1::{PublicKey, Secp256k1, SecretKey};

fn any_public_key() -> impl Strategy<Value = PublicKey> {
    prop::array::uniform32(any::<u8>()).prop_filter_map("valid secp256k1 scalar", |bytes| {
        SecretKey::from_slice(&bytes)
            .ok()
            .map(|secret| PublicKey::from_secret_key(&Secp256k1::new(), &secret))
    })
}

fn any_predecessor() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{2,20}(\\.[a-z0-9_-]{2,10}){0,2}"
}

fn any_chain_tag() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("0x1"), Just("0x18d")]
}

fn any_bitcoin_transaction() -> impl Strategy<Value = UnsignedBitcoinTransaction> {
    let input = (prop::array::uniform32(any::<u8>()), any::<u32>(), any::<u64>(), any::<u32>())
        .prop_map(|(txid, vout, value, sequence)| BitcoinInput { txid, vout, value, sequence });
    let output = (any::<u64>(), prop::collection::vec(any::<u8>(), 0..40))
        .prop_map(|(value, script_pubkey)| BitcoinOutput { value, script_pubkey });
    (
        any::<i32>(),
        prop::collection::vec(input, 1..5),
        prop::collection::vec(output, 0..5),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 33),
    )
        .prop_map(|(version, inputs, outputs, locktime, public_key)| UnsignedBitcoinTransaction {
            version,
            inputs,
            outputs,
            locktime,
            public_key,
        })
}

fn any_evm_transaction() -> impl Strategy<Value = UnsignedEvmTransaction> {
    let access_entry = (
        prop::array::uniform20(any::<u8>()),
        prop::collection::vec(prop::array::uniform32(any::<u8>()), 0..3),
    )
        .prop_map(|(address, storage_keys)| AccessListEntry { address, storage_keys });
    let fees = prop_oneof![
        any::<u128>().prop_map(|gas_price| (EvmTxType::Legacy, Some(gas_price), None, None)),
        any::<u128>().prop_map(|gas_price| (EvmTxType::AccessList, Some(gas_price), None, None)),
        (any::<u128>(), any::<u128>())
            .prop_map(|(tip, max)| (EvmTxType::FeeMarket, None, Some(tip), Some(max))),
    ];
    (
        fees,
        (any::<u64>(), any::<u64>(), any::<u64>()),
        prop::array::uniform20(any::<u8>()),
        prop::option::of(prop::array::uniform20(any::<u8>())),
        any::<u128>(),
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(access_entry, 0..3),
    )
        .prop_map(
            |((tx_type, gas_price, max_priority_fee_per_gas, max_fee_per_gas), (chain_id, nonce, gas_limit), from, to, value, data, access_list)| {
                UnsignedEvmTransaction {
                    tx_type,
                    chain_id,
                    nonce,
                    gas_price,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                    gas_limit,
                    from,
                    to,
                    value,
                    data,
                    access_list,
                }
            },
        )
}

proptest! {
    #[test]
    fn naj_and_sec1_convert_back_and_forth(key in any_public_key()) {
        let uncompressed = hex::encode(key.serialize_uncompressed());
        let naj = to_naj(&uncompressed).unwrap();
        prop_assert!(naj.starts_with("secp256k1:"));
        prop_assert_eq!(to_uncompressed(&naj).unwrap(), uncompressed);
    }

    #[test]
    fn compression_agrees_with_secp256k1(key in any_public_key()) {
        let uncompressed = hex::encode(key.serialize_uncompressed());
        let compressed = to_compressed(&uncompressed).unwrap();
        prop_assert_eq!(compressed.len(), 66);
        prop_assert_eq!(&compressed[2..], &uncompressed[2..66]);
        prop_assert_eq!(compressed, hex::encode(key.serialize()));
    }

    #[test]
    fn derivation_is_deterministic(
        root in any_public_key(),
        predecessor in any_predecessor(),
        path in "[ -~]{0,40}",
        tag in any_chain_tag(),
    ) {
        let root = hex::encode(root.serialize_uncompressed());
        let first = derive(&root, &predecessor, &path, tag).unwrap();
        let second = derive(&root, &predecessor, &path, tag).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.starts_with("04"));
        prop_assert_eq!(first.len(), 130);
    }

    #[test]
    fn derivation_domains_are_separated(
        root in any_public_key(),
        predecessor in any_predecessor(),
        path in "[a-z0-9/,-]{0,20}",
    ) {
        let root = hex::encode(root.serialize_uncompressed());
        let evm = derive(&root, &predecessor, &path, "0x1").unwrap();
        let near = derive(&root, &predecessor, &path, "0x18d").unwrap();
        prop_assert_ne!(evm, near);
    }

    #[test]
    fn derivation_depends_on_path(
        root in any_public_key(),
        predecessor in any_predecessor(),
        a in "[a-z0-9]{1,12}",
        b in "[a-z0-9]{1,12}",
    ) {
        prop_assume!(a != b);
        let root = hex::encode(root.serialize_uncompressed());
        prop_assert_ne!(
            derive(&root, &predecessor, &a, "0x18d").unwrap(),
            derive(&root, &predecessor, &b, "0x18d").unwrap()
        );
    }

    #[test]
    fn derivation_message_layout(
        predecessor in any_predecessor(),
        path in "[ -~]{0,40}",
    ) {
        let message = derivation_message(chainsig_core::KdfChain::Ethereum, &predecessor, &path);
        let expected = format!("sig.network v1.0.0 epsilon derivation,0x1,{},{}", predecessor, path);
        prop_assert_eq!(message, expected);
    }

    #[test]
    fn normalized_v_is_27_or_28(
        x in prop::array::uniform32(any::<u8>()),
        s in prop::array::uniform32(any::<u8>()),
        parity in prop_oneof![Just("02"), Just("03")],
        recovery_id in 0u8..=1,
    ) {
        let response = MpcSignatureResponse::Flat {
            big_r: format!("{}{}", parity, hex::encode(x)),
            s: hex::encode(s),
            recovery_id,
        };
        match normalize(&response).unwrap() {
            CanonicalSignature::Ecdsa(sig) => {
                prop_assert_eq!(sig.v(), recovery_id + 27);
                prop_assert_eq!(sig.r(), hex::encode(x));
                prop_assert_eq!(sig.s(), hex::encode(s));
            }
            other => prop_assert!(false, "unexpected variant {:?}", other),
        }
    }

    #[test]
    fn normalize_rejects_recovery_ids_above_one(recovery_id in 2u8..) {
        let response = MpcSignatureResponse::Flat {
            big_r: format!("02{}", "11".repeat(32)),
            s: "22".repeat(32),
            recovery_id,
        };
        prop_assert!(normalize(&response).is_err());
    }

    #[test]
    fn canonical_signature_json_round_trip(
        x in prop::array::uniform32(any::<u8>()),
        s in prop::array::uniform32(any::<u8>()),
        recovery_id in 0u8..=1,
    ) {
        let sig = chainsig_core::RsvSignature::new(x, s, recovery_id).unwrap();
        let canonical = CanonicalSignature::from(sig);
        let json = serde_json::to_string(&canonical).unwrap();
        let back: CanonicalSignature = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, canonical);
    }

    #[test]
    fn bitcoin_transaction_json_round_trip(tx in any_bitcoin_transaction()) {
        let json = serde_json::to_string(&tx).unwrap();
        let back: UnsignedBitcoinTransaction = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, tx);
    }

    #[test]
    fn evm_transaction_json_round_trip(tx in any_evm_transaction()) {
        let json = serde_json::to_string(&tx).unwrap();
        let back: UnsignedEvmTransaction = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, tx);
    }

    #[test]
    fn ordering_restores_payload_order(order in Just((0usize..8).collect::<Vec<_>>()).prop_shuffle()) {
        let completed: Vec<(usize, CanonicalSignature)> = order
            .iter()
            .map(|&i| {
                let sig = chainsig_core::RsvSignature::new([i as u8 + 1; 32], [1u8; 32], 0).unwrap();
                (i, CanonicalSignature::from(sig))
            })
            .collect();
        let ordered = order_by_payload_index(completed, 8).unwrap();
        for (i, sig) in ordered.iter().enumerate() {
            let r = sig.as_ecdsa().unwrap().r_bytes().unwrap();
            prop_assert_eq!(r[0], i as u8 + 1);
        }
    }

    #[test]
    fn checksum_addresses_keep_hex(bytes in prop::array::uniform20(any::<u8>())) {
        let checksummed = to_checksum_address(&bytes);
        prop_assert!(checksummed.starts_with("0x"));
        prop_assert_eq!(checksummed[2..].to_ascii_lowercase(), hex::encode(bytes));

        let hash = keccak256(hex::encode(bytes).as_bytes());
        for (i, ch) in checksummed[2..].chars().enumerate() {
            let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
            if ch.is_ascii_alphabetic() {
                prop_assert_eq!(ch.is_ascii_uppercase(), nibble >= 8);
            }
        }
    }

    #[test]
    fn ed25519_keys_decode_to_32_bytes(bytes in prop::array::uniform32(any::<u8>())) {
        let key = format!("Ed25519:{}", bs58::encode(bytes).into_string());
        prop_assert_eq!(ed25519_key_bytes(&key).unwrap(), bytes);
    }
}
