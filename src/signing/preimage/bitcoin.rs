//! Bitcoin Pre-Image Hashing
//!
//! BIP-143 sighashes for native SegWit (P2WPKH) inputs, SIGHASH_ALL only.
//! Every input is spent by the same derived key, so one sighash is produced
//! per input, in input order.

use crate::error::{ChainSigError, ChainSigResult};
use crate::types::SignPayload;
use crate::utils::crypto::hash160;
use bitcoin::hashes::{sha256d, Hash};
use serde::{Deserialize, Serialize};

pub const SIGHASH_ALL: u32 = 0x01;

/// Bitcoin transaction input for sighash calculation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinInput {
    /// Previous transaction id, in display (RPC) byte order
    #[serde(with = "crate::serde_bytes::hex32")]
    pub txid: [u8; 32],
    /// Output index in previous transaction
    pub vout: u32,
    /// Value of the spent output in satoshis
    pub value: u64,
    pub sequence: u32,
}

impl BitcoinInput {
    /// txid in wire order followed by vout
    pub(crate) fn outpoint_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36);
        let mut txid = self.txid;
        txid.reverse();
        out.extend_from_slice(&txid);
        out.extend_from_slice(&self.vout.to_le_bytes());
        out
    }
}

/// Bitcoin transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinOutput {
    /// Value in satoshis
    pub value: u64,
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub script_pubkey: Vec<u8>,
}

impl BitcoinOutput {
    pub(crate) fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_var_int(buf, self.script_pubkey.len() as u64);
        buf.extend_from_slice(&self.script_pubkey);
    }
}

/// Unsigned P2WPKH transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedBitcoinTransaction {
    pub version: i32,
    pub inputs: Vec<BitcoinInput>,
    pub outputs: Vec<BitcoinOutput>,
    pub locktime: u32,
    /// Compressed SEC1 key that owns every input
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub public_key: Vec<u8>,
}

impl UnsignedBitcoinTransaction {
    pub(crate) fn validate(&self) -> ChainSigResult<()> {
        if self.inputs.is_empty() {
            return Err(ChainSigError::InvalidTransaction("transaction has no inputs".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(ChainSigError::InvalidTransaction("transaction has no outputs".to_string()));
        }
        if self.public_key.len() != 33 || !matches!(self.public_key[0], 0x02 | 0x03) {
            return Err(ChainSigError::InvalidTransaction(
                "public_key must be a 33-byte compressed key".to_string(),
            ));
        }
        Ok(())
    }

    /// P2PKH-style scriptCode for the spending key
    pub(crate) fn script_code(&self) -> Vec<u8> {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&hash160(&self.public_key));
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }
}

/// Get sighashes for all inputs in a Bitcoin transaction, in input order
pub fn get_bitcoin_sighashes(tx: &UnsignedBitcoinTransaction) -> ChainSigResult<Vec<SignPayload>> {
    tx.validate()?;

    let hash_prevouts = {
        let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
        for input in &tx.inputs {
            prevouts.extend_from_slice(&input.outpoint_bytes());
        }
        sha256d::Hash::hash(&prevouts).to_byte_array()
    };

    let hash_sequence = {
        let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
        for input in &tx.inputs {
            sequences.extend_from_slice(&input.sequence.to_le_bytes());
        }
        sha256d::Hash::hash(&sequences).to_byte_array()
    };

    let hash_outputs = {
        let mut outputs = Vec::new();
        for output in &tx.outputs {
            output.serialize_into(&mut outputs);
        }
        sha256d::Hash::hash(&outputs).to_byte_array()
    };

    let script_code = tx.script_code();

    let payloads = tx
        .inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let mut serialized = Vec::new();
            serialized.extend_from_slice(&tx.version.to_le_bytes());
            serialized.extend_from_slice(&hash_prevouts);
            serialized.extend_from_slice(&hash_sequence);
            serialized.extend_from_slice(&input.outpoint_bytes());
            write_var_int(&mut serialized, script_code.len() as u64);
            serialized.extend_from_slice(&script_code);
            serialized.extend_from_slice(&input.value.to_le_bytes());
            serialized.extend_from_slice(&input.sequence.to_le_bytes());
            serialized.extend_from_slice(&hash_outputs);
            serialized.extend_from_slice(&tx.locktime.to_le_bytes());
            serialized.extend_from_slice(&SIGHASH_ALL.to_le_bytes());

            let hash = sha256d::Hash::hash(&serialized).to_byte_array();
            SignPayload::digest(hash, index).with_description(format!(
                "Bitcoin P2WPKH input {} ({} sats)",
                index, input.value
            ))
        })
        .collect();

    Ok(payloads)
}

/// Bitcoin CompactSize
pub(crate) fn write_var_int(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::sighash::{EcdsaSighashType, SighashCache};
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
    use std::str::FromStr;

    const PUBKEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn sample_tx(n_inputs: usize) -> UnsignedBitcoinTransaction {
        let public_key = hex::decode(PUBKEY).unwrap();
        let mut change = vec![0x00, 0x14];
        change.extend_from_slice(&hash160(&public_key));

        UnsignedBitcoinTransaction {
            version: 2,
            inputs: (0..n_inputs)
                .map(|i| BitcoinInput {
                    txid: [i as u8 + 1; 32],
                    vout: i as u32,
                    value: 50_000 + i as u64 * 1_000,
                    sequence: 0xffff_ffff,
                })
                .collect(),
            outputs: vec![
                BitcoinOutput {
                    value: 40_000,
                    script_pubkey: hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap(),
                },
                BitcoinOutput {
                    value: 9_000,
                    script_pubkey: change,
                },
            ],
            locktime: 0,
            public_key,
        }
    }

    fn to_bitcoin_tx(tx: &UnsignedBitcoinTransaction) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: tx
                .inputs
                .iter()
                .map(|i| TxIn {
                    previous_output: OutPoint {
                        txid: Txid::from_str(&hex::encode(i.txid)).unwrap(),
                        vout: i.vout,
                    },
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence(i.sequence),
                    witness: Witness::new(),
                })
                .collect(),
            output: tx
                .outputs
                .iter()
                .map(|o| TxOut {
                    value: Amount::from_sat(o.value),
                    script_pubkey: ScriptBuf::from_bytes(o.script_pubkey.clone()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_sighashes_match_bitcoin_crate() {
        let tx = sample_tx(3);
        let payloads = get_bitcoin_sighashes(&tx).unwrap();
        assert_eq!(payloads.len(), 3);

        let reference = to_bitcoin_tx(&tx);
        let mut spk = vec![0x00, 0x14];
        spk.extend_from_slice(&hash160(&tx.public_key));
        let spk = ScriptBuf::from_bytes(spk);

        let mut cache = SighashCache::new(&reference);
        for (i, payload) in payloads.iter().enumerate() {
            let expected = cache
                .p2wpkh_signature_hash(
                    i,
                    &spk,
                    Amount::from_sat(tx.inputs[i].value),
                    EcdsaSighashType::All,
                )
                .unwrap();
            assert_eq!(payload.index, i);
            assert_eq!(payload.as_digest().unwrap(), expected.to_byte_array());
        }
    }

    #[test]
    fn test_sighashes_differ_per_input() {
        let payloads = get_bitcoin_sighashes(&sample_tx(2)).unwrap();
        assert_ne!(payloads[0].payload, payloads[1].payload);
        assert!(payloads[1].description.contains("input 1"));
    }

    #[test]
    fn test_invalid_transactions() {
        let mut tx = sample_tx(1);
        tx.inputs.clear();
        assert!(matches!(
            get_bitcoin_sighashes(&tx),
            Err(ChainSigError::InvalidTransaction(_))
        ));

        let mut tx = sample_tx(1);
        tx.public_key = vec![0x04; 65];
        assert!(get_bitcoin_sighashes(&tx).is_err());
    }

    #[test]
    fn test_script_code() {
        let tx = sample_tx(1);
        assert_eq!(
            hex::encode(tx.script_code()),
            "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac"
        );
    }

    #[test]
    fn test_var_int() {
        let mut buf = Vec::new();
        write_var_int(&mut buf, 0xfc);
        assert_eq!(buf, vec![0xfc]);

        let mut buf = Vec::new();
        write_var_int(&mut buf, 0x1234);
        assert_eq!(buf, vec![0xfd, 0x34, 0x12]);

        let mut buf = Vec::new();
        write_var_int(&mut buf, 0x10000);
        assert_eq!(buf, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }
}
