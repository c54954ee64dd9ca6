//! Transaction Compiler
//!
//! Compiles canonical signatures back into complete, broadcast-ready
//! transactions. Every signature is checked against the payload it was
//! produced for before anything is serialized.

use crate::error::{ChainSigError, ChainSigResult};
use crate::signing::preimage::{
    bitcoin::{get_bitcoin_sighashes, write_var_int, UnsignedBitcoinTransaction},
    cosmos::{write_bytes, UnsignedCosmosTransaction},
    ethereum::{payload_fields, rlp_encode_list, rlp_encode_u64, rlp_encode_uint, signing_preimage, UnsignedEvmTransaction},
    solana::{serialize_legacy_message, write_compact_u16, UnsignedSolanaTransaction},
};
use crate::signing::signature::{Ed25519Signature, RsvSignature};
use crate::utils::crypto::{keccak256, sha256};
use bitcoin::hashes::{sha256d, Hash};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};

/// Compiled Bitcoin transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledBitcoinTransaction {
    /// Raw transaction bytes (ready to broadcast)
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub raw_tx: Vec<u8>,
    /// Transaction ID, display order
    #[serde(with = "crate::serde_bytes::hex32")]
    pub txid: [u8; 32],
    /// Witness transaction ID, display order
    #[serde(with = "crate::serde_bytes::hex32")]
    pub wtxid: [u8; 32],
    /// Virtual size in vbytes
    pub vsize: usize,
}

/// Compiled EVM transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledEvmTransaction {
    /// RLP-encoded signed transaction
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub raw_tx: Vec<u8>,
    #[serde(with = "crate::serde_bytes::hex32")]
    pub tx_hash: [u8; 32],
    /// Sender address (recovered from signature)
    #[serde(with = "crate::serde_bytes::hex20")]
    pub from: [u8; 20],
}

/// Compiled Cosmos transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledCosmosTransaction {
    /// Protobuf-encoded TxRaw
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub raw_tx: Vec<u8>,
    #[serde(with = "crate::serde_bytes::hex32")]
    pub tx_hash: [u8; 32],
}

/// Compiled Solana transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledSolanaTransaction {
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub raw_tx: Vec<u8>,
    /// Fee payer signature; its base58 form is the transaction id
    #[serde(with = "crate::serde_bytes::hex64")]
    pub signature: [u8; 64],
}

impl CompiledSolanaTransaction {
    pub fn transaction_id(&self) -> String {
        bs58::encode(self.signature).into_string()
    }
}

// =============================================================================
// EVM
// =============================================================================

/// Compile an EVM transaction with its single signature.
///
/// The sender recovered from the signature must equal `tx.from`. High-S
/// signatures are flipped to low-S (EIP-2) along with the recovery id.
pub fn compile_evm_transaction(
    tx: &UnsignedEvmTransaction,
    signature: &RsvSignature,
) -> ChainSigResult<CompiledEvmTransaction> {
    let hash = keccak256(&signing_preimage(tx)?);
    let (compact, recovery_id) = low_s_with_recovery(signature)?;

    let from = recover_address(&hash, &compact, recovery_id)
        .map_err(|_| ChainSigError::SignatureMismatch { index: 0 })?;
    if from != tx.from {
        return Err(ChainSigError::SignatureMismatch { index: 0 });
    }

    let mut items = payload_fields(tx)?;
    let v = match tx.tx_type.type_byte() {
        None => eip155_v(tx.chain_id, recovery_id)?,
        Some(_) => recovery_id as u64,
    };
    items.push(rlp_encode_u64(v));
    items.push(rlp_encode_uint(&compact[..32]));
    items.push(rlp_encode_uint(&compact[32..]));

    let raw_tx = match tx.tx_type.type_byte() {
        None => rlp_encode_list(&items),
        Some(type_byte) => {
            let mut typed = vec![type_byte];
            typed.extend_from_slice(&rlp_encode_list(&items));
            typed
        }
    };

    Ok(CompiledEvmTransaction {
        tx_hash: keccak256(&raw_tx),
        raw_tx,
        from,
    })
}

/// `chain_id * 2 + 35 + recovery_id`
fn eip155_v(chain_id: u64, recovery_id: u8) -> ChainSigResult<u64> {
    chain_id
        .checked_mul(2)
        .and_then(|v| v.checked_add(35 + recovery_id as u64))
        .ok_or_else(|| {
            ChainSigError::InvalidTransaction(format!("chain id {} is too large for EIP-155", chain_id))
        })
}

fn low_s_with_recovery(signature: &RsvSignature) -> ChainSigResult<([u8; 64], u8)> {
    let compact = signature.to_compact()?;
    let mut sig = Signature::from_compact(&compact)
        .map_err(|e| ChainSigError::InvalidSignatureFormat(e.to_string()))?;
    sig.normalize_s();
    let normalized = sig.serialize_compact();

    let recovery_id = if normalized == compact {
        signature.recovery_id()
    } else {
        signature.recovery_id() ^ 1
    };
    Ok((normalized, recovery_id))
}

fn recover_address(hash: &[u8; 32], compact: &[u8; 64], recovery_id: u8) -> ChainSigResult<[u8; 20]> {
    let secp = Secp256k1::verification_only();
    let recid = RecoveryId::from_i32(recovery_id as i32)?;
    let sig = RecoverableSignature::from_compact(compact, recid)?;
    let key = secp.recover_ecdsa(&Message::from_digest(*hash), &sig)?;

    let digest = keccak256(&key.serialize_uncompressed()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Ok(address)
}

/// Parse `sig`, force low-S and verify it over `digest`
fn verify_low_s(
    digest: [u8; 32],
    sig: &RsvSignature,
    key: &PublicKey,
    index: usize,
) -> ChainSigResult<Signature> {
    let secp = Secp256k1::verification_only();
    let mut parsed = Signature::from_compact(&sig.to_compact()?)
        .map_err(|e| ChainSigError::InvalidSignatureFormat(e.to_string()))?;
    parsed.normalize_s();
    secp.verify_ecdsa(&Message::from_digest(digest), &parsed, key)
        .map_err(|_| ChainSigError::SignatureMismatch { index })?;
    Ok(parsed)
}

// =============================================================================
// Bitcoin
// =============================================================================

/// Compile a P2WPKH transaction; `signatures[i]` must sign input `i`
pub fn compile_bitcoin_transaction(
    tx: &UnsignedBitcoinTransaction,
    signatures: &[RsvSignature],
) -> ChainSigResult<CompiledBitcoinTransaction> {
    if signatures.len() != tx.inputs.len() {
        return Err(ChainSigError::SignatureCountMismatch {
            expected: tx.inputs.len(),
            actual: signatures.len(),
        });
    }

    let sighashes = get_bitcoin_sighashes(tx)?;
    let key = PublicKey::from_slice(&tx.public_key)?;

    let mut witnesses = Vec::with_capacity(signatures.len());
    for (index, (payload, sig)) in sighashes.iter().zip(signatures).enumerate() {
        let parsed = verify_low_s(payload.as_digest()?, sig, &key, index)?;
        let mut der = parsed.serialize_der().to_vec();
        der.push(0x01); // SIGHASH_ALL
        witnesses.push(der);
    }

    // Legacy serialization (txid)
    let mut base = Vec::new();
    base.extend_from_slice(&tx.version.to_le_bytes());
    write_inputs_outputs(tx, &mut base);
    base.extend_from_slice(&tx.locktime.to_le_bytes());

    // SegWit serialization (wire format)
    let mut raw_tx = Vec::new();
    raw_tx.extend_from_slice(&tx.version.to_le_bytes());
    raw_tx.push(0x00); // marker
    raw_tx.push(0x01); // flag
    write_inputs_outputs(tx, &mut raw_tx);
    for der in &witnesses {
        write_var_int(&mut raw_tx, 2);
        write_var_int(&mut raw_tx, der.len() as u64);
        raw_tx.extend_from_slice(der);
        write_var_int(&mut raw_tx, tx.public_key.len() as u64);
        raw_tx.extend_from_slice(&tx.public_key);
    }
    raw_tx.extend_from_slice(&tx.locktime.to_le_bytes());

    let mut txid = sha256d::Hash::hash(&base).to_byte_array();
    txid.reverse();
    let mut wtxid = sha256d::Hash::hash(&raw_tx).to_byte_array();
    wtxid.reverse();

    let weight = base.len() * 3 + raw_tx.len();
    let vsize = (weight + 3) / 4;

    Ok(CompiledBitcoinTransaction {
        raw_tx,
        txid,
        wtxid,
        vsize,
    })
}

fn write_inputs_outputs(tx: &UnsignedBitcoinTransaction, buf: &mut Vec<u8>) {
    write_var_int(buf, tx.inputs.len() as u64);
    for input in &tx.inputs {
        buf.extend_from_slice(&input.outpoint_bytes());
        buf.push(0x00); // empty scriptSig
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_var_int(buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        output.serialize_into(buf);
    }
}

// =============================================================================
// Cosmos
// =============================================================================

/// Compile a Cosmos transaction into `TxRaw`
pub fn compile_cosmos_transaction(
    tx: &UnsignedCosmosTransaction,
    signature: &RsvSignature,
) -> ChainSigResult<CompiledCosmosTransaction> {
    let digest = sha256(&tx.sign_doc_bytes());
    let key = PublicKey::from_slice(&tx.public_key)?;
    let parsed = verify_low_s(digest, signature, &key, 0)?;

    let mut raw_tx = Vec::new();
    write_bytes(&mut raw_tx, 1, &tx.body_bytes());
    write_bytes(&mut raw_tx, 2, &tx.auth_info_bytes());
    write_bytes(&mut raw_tx, 3, &parsed.serialize_compact());

    Ok(CompiledCosmosTransaction {
        tx_hash: sha256(&raw_tx),
        raw_tx,
    })
}

// =============================================================================
// Solana
// =============================================================================

/// Compile a Solana transaction signed by its fee payer
pub fn compile_solana_transaction(
    tx: &UnsignedSolanaTransaction,
    signature: &Ed25519Signature,
) -> ChainSigResult<CompiledSolanaTransaction> {
    use ed25519_dalek::{Signature as EdSignature, VerifyingKey};

    let message = serialize_legacy_message(tx)?;
    let key = VerifyingKey::from_bytes(&tx.fee_payer)
        .map_err(|e| ChainSigError::Crypto(format!("invalid fee payer key: {}", e)))?;
    key.verify_strict(&message, &EdSignature::from_bytes(&signature.bytes))
        .map_err(|_| ChainSigError::SignatureMismatch { index: 0 })?;

    let mut raw_tx = Vec::with_capacity(1 + 64 + message.len());
    write_compact_u16(1, &mut raw_tx);
    raw_tx.extend_from_slice(&signature.bytes);
    raw_tx.extend_from_slice(&message);

    Ok(CompiledSolanaTransaction {
        raw_tx,
        signature: signature.bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::preimage::bitcoin::{BitcoinInput, BitcoinOutput};
    use crate::signing::preimage::cosmos::{encode_msg_send, CosmosCoin, CosmosFee};
    use crate::signing::preimage::ethereum::EvmTxType;
    use crate::signing::preimage::solana::system_transfer_instruction;
    use crate::signing::preimage::{get_cosmos_sign_doc_hash, get_ethereum_signing_hash};
    use crate::utils::crypto::hash160;
    use secp256k1::SecretKey;

    fn sign_digest(secret: &SecretKey, digest: [u8; 32]) -> RsvSignature {
        let secp = Secp256k1::new();
        let sig = secp.sign_ecdsa_recoverable(&Message::from_digest(digest), secret);
        let (recid, compact) = sig.serialize_compact();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        RsvSignature::new(r, s, recid.to_i32() as u8).unwrap()
    }

    fn eip155_tx() -> UnsignedEvmTransaction {
        UnsignedEvmTransaction {
            tx_type: EvmTxType::Legacy,
            chain_id: 1,
            nonce: 9,
            gas_price: Some(20_000_000_000),
            max_priority_fee_per_gas: None,
            max_fee_per_gas: None,
            gas_limit: 21000,
            from: hex::decode("9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f")
                .unwrap()
                .try_into()
                .unwrap(),
            to: Some([0x35; 20]),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            access_list: vec![],
        }
    }

    #[test]
    fn test_compile_eip155_example() {
        let secret = SecretKey::from_slice(&[0x46; 32]).unwrap();
        let tx = eip155_tx();
        let digest = get_ethereum_signing_hash(&tx).unwrap().as_digest().unwrap();
        let sig = sign_digest(&secret, digest);

        let compiled = compile_evm_transaction(&tx, &sig).unwrap();
        assert_eq!(
            hex::encode(&compiled.raw_tx),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(compiled.from, tx.from);
        assert_eq!(compiled.tx_hash, keccak256(&compiled.raw_tx));
    }

    #[test]
    fn test_compile_eip1559() {
        let secret = SecretKey::from_slice(&[0x46; 32]).unwrap();
        let mut tx = eip155_tx();
        tx.tx_type = EvmTxType::FeeMarket;
        tx.gas_price = None;
        tx.max_fee_per_gas = Some(30_000_000_000);
        tx.max_priority_fee_per_gas = Some(1_000_000_000);

        let digest = get_ethereum_signing_hash(&tx).unwrap().as_digest().unwrap();
        let compiled = compile_evm_transaction(&tx, &sign_digest(&secret, digest)).unwrap();
        assert_eq!(compiled.raw_tx[0], 0x02);
    }

    #[test]
    fn test_eip155_v_overflow() {
        assert_eq!(eip155_v(1, 0).unwrap(), 37);
        assert_eq!(eip155_v(1, 1).unwrap(), 38);
        assert!(matches!(
            eip155_v(u64::MAX / 2, 1),
            Err(ChainSigError::InvalidTransaction(_))
        ));

        let secret = SecretKey::from_slice(&[0x46; 32]).unwrap();
        let mut tx = eip155_tx();
        tx.chain_id = u64::MAX;
        let digest = get_ethereum_signing_hash(&tx).unwrap().as_digest().unwrap();
        assert!(matches!(
            compile_evm_transaction(&tx, &sign_digest(&secret, digest)),
            Err(ChainSigError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_evm_wrong_signer_rejected() {
        let other = SecretKey::from_slice(&[0x47; 32]).unwrap();
        let tx = eip155_tx();
        let digest = get_ethereum_signing_hash(&tx).unwrap().as_digest().unwrap();
        assert!(matches!(
            compile_evm_transaction(&tx, &sign_digest(&other, digest)),
            Err(ChainSigError::SignatureMismatch { index: 0 })
        ));
    }

    #[test]
    fn test_evm_high_s_is_normalized() {
        let secret = SecretKey::from_slice(&[0x46; 32]).unwrap();
        let tx = eip155_tx();
        let digest = get_ethereum_signing_hash(&tx).unwrap().as_digest().unwrap();
        let low = sign_digest(&secret, digest);
        let expected = compile_evm_transaction(&tx, &low).unwrap();

        // s' = n - s with the recovery id flipped is the same signature
        let order = secp256k1::constants::CURVE_ORDER;
        let s = low.s_bytes().unwrap();
        let mut high = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = order[i] as i16 - s[i] as i16 - borrow;
            borrow = if diff < 0 { 1 } else { 0 };
            high[i] = (diff + if diff < 0 { 256 } else { 0 }) as u8;
        }
        let high_sig = RsvSignature::new(low.r_bytes().unwrap(), high, low.recovery_id() ^ 1).unwrap();

        assert_eq!(compile_evm_transaction(&tx, &high_sig).unwrap(), expected);
    }

    fn bitcoin_tx(secret: &SecretKey, n_inputs: usize) -> UnsignedBitcoinTransaction {
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), secret).serialize().to_vec();
        let mut change = vec![0x00, 0x14];
        change.extend_from_slice(&hash160(&public_key));
        UnsignedBitcoinTransaction {
            version: 2,
            inputs: (0..n_inputs)
                .map(|i| BitcoinInput {
                    txid: [0x10 + i as u8; 32],
                    vout: i as u32,
                    value: 20_000,
                    sequence: 0xffff_ffff,
                })
                .collect(),
            outputs: vec![
                BitcoinOutput {
                    value: 15_000,
                    script_pubkey: hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap(),
                },
                BitcoinOutput {
                    value: 4_000 * n_inputs as u64,
                    script_pubkey: change,
                },
            ],
            locktime: 0,
            public_key,
        }
    }

    fn sign_all(secret: &SecretKey, tx: &UnsignedBitcoinTransaction) -> Vec<RsvSignature> {
        get_bitcoin_sighashes(tx)
            .unwrap()
            .iter()
            .map(|p| sign_digest(secret, p.as_digest().unwrap()))
            .collect()
    }

    #[test]
    fn test_compile_bitcoin_round_trips_through_bitcoin_crate() {
        let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let tx = bitcoin_tx(&secret, 3);
        let compiled = compile_bitcoin_transaction(&tx, &sign_all(&secret, &tx)).unwrap();

        let decoded: bitcoin::Transaction = bitcoin::consensus::deserialize(&compiled.raw_tx).unwrap();
        assert_eq!(decoded.input.len(), 3);
        assert_eq!(decoded.output.len(), 2);
        assert_eq!(decoded.compute_txid().to_string(), hex::encode(compiled.txid));
        assert_eq!(decoded.compute_wtxid().to_string(), hex::encode(compiled.wtxid));
        assert_eq!(decoded.vsize(), compiled.vsize);
        for input in &decoded.input {
            assert_eq!(input.witness.len(), 2);
            assert_eq!(input.witness.nth(1).unwrap(), tx.public_key.as_slice());
        }
    }

    #[test]
    fn test_bitcoin_permuted_signatures_rejected() {
        let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let tx = bitcoin_tx(&secret, 3);
        let mut sigs = sign_all(&secret, &tx);
        sigs.swap(1, 2);
        assert!(matches!(
            compile_bitcoin_transaction(&tx, &sigs),
            Err(ChainSigError::SignatureMismatch { index: 1 })
        ));
    }

    #[test]
    fn test_bitcoin_count_mismatch() {
        let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let tx = bitcoin_tx(&secret, 3);
        let mut sigs = sign_all(&secret, &tx);
        sigs.pop();
        assert!(matches!(
            compile_bitcoin_transaction(&tx, &sigs),
            Err(ChainSigError::SignatureCountMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_compile_cosmos() {
        let secret = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret).serialize().to_vec();
        let tx = UnsignedCosmosTransaction {
            chain_id: "theta-testnet-001".to_string(),
            messages: vec![encode_msg_send("cosmos1a", "cosmos1b", &[CosmosCoin::new("uatom", 10)])],
            fee: CosmosFee {
                amount: vec![CosmosCoin::new("uatom", 500)],
                gas: 100_000,
            },
            memo: "hi".to_string(),
            timeout_height: 0,
            account_number: 7,
            sequence: 3,
            public_key,
        };

        let digest = get_cosmos_sign_doc_hash(&tx).unwrap().as_digest().unwrap();
        let sig = sign_digest(&secret, digest);
        let compiled = compile_cosmos_transaction(&tx, &sig).unwrap();

        assert_eq!(compiled.raw_tx[0], 0x0a);
        assert!(compiled.raw_tx.ends_with(&sig.to_compact().unwrap()));
        assert_eq!(compiled.tx_hash, sha256(&compiled.raw_tx));

        let other = SecretKey::from_slice(&[0x23; 32]).unwrap();
        assert!(matches!(
            compile_cosmos_transaction(&tx, &sign_digest(&other, digest)),
            Err(ChainSigError::SignatureMismatch { index: 0 })
        ));
    }

    #[test]
    fn test_compile_solana() {
        use ed25519_dalek::{Signer, SigningKey};

        let signing_key = SigningKey::from_bytes(&[5u8; 32]);
        let from = signing_key.verifying_key().to_bytes();
        let tx = UnsignedSolanaTransaction {
            recent_blockhash: [3u8; 32],
            fee_payer: from,
            instructions: vec![system_transfer_instruction(from, [4u8; 32], 5000)],
        };

        let message = serialize_legacy_message(&tx).unwrap();
        let sig = Ed25519Signature {
            bytes: signing_key.sign(&message).to_bytes(),
        };
        let compiled = compile_solana_transaction(&tx, &sig).unwrap();

        assert_eq!(compiled.raw_tx[0], 1);
        assert_eq!(&compiled.raw_tx[1..65], &sig.bytes);
        assert_eq!(&compiled.raw_tx[65..], message.as_slice());
        assert_eq!(compiled.transaction_id(), bs58::encode(sig.bytes).into_string());

        let mut bad = sig.clone();
        bad.bytes[0] ^= 1;
        assert!(compile_solana_transaction(&tx, &bad).is_err());
    }
}
