//! Bitcoin adapter
//!
//! Native SegWit (P2WPKH) only. UTXOs are supplied by the caller and spent in
//! the order given; each spent input yields one payload.

use super::{ecdsa_signatures, require_broadcaster, Broadcaster, ChainAdapter};
use crate::config::ChainSigConfig;
use crate::error::{ChainSigError, ChainSigResult};
use crate::keys::KeyDeriver;
use crate::log_debug;
use crate::signing::compiler::compile_bitcoin_transaction;
use crate::signing::preimage::bitcoin::{
    get_bitcoin_sighashes, BitcoinInput, BitcoinOutput, UnsignedBitcoinTransaction,
};
use crate::signing::signature::CanonicalSignature;
use crate::types::{ChainFamily, DerivedAccount, PreparedTransaction, SignPayload};
use ::bitcoin::{Address, CompressedPublicKey, Network};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Outputs below this many sats are non-standard for P2WPKH
pub const DUST_LIMIT: u64 = 546;

const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// An unspent output owned by the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Display-order hex
    pub txid: String,
    pub vout: u32,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinTransactionRequest {
    pub from: String,
    pub to: String,
    /// Amount to send in sats
    pub value: u64,
    /// Sender's public key (compressed or uncompressed hex)
    pub public_key: String,
    pub utxos: Vec<Utxo>,
    /// sat/vB
    pub fee_rate: u64,
}

pub struct BitcoinAdapter {
    deriver: KeyDeriver,
    network: Network,
    broadcaster: Option<Box<dyn Broadcaster>>,
}

impl BitcoinAdapter {
    pub fn new(config: &ChainSigConfig, network: Network) -> ChainSigResult<Self> {
        Ok(Self::from_deriver(KeyDeriver::new(config)?, network))
    }

    pub fn from_deriver(deriver: KeyDeriver, network: Network) -> Self {
        Self {
            deriver,
            network,
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: impl Broadcaster + 'static) -> Self {
        self.broadcaster = Some(Box::new(broadcaster));
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn p2wpkh_address(&self, compressed: &[u8; 33]) -> ChainSigResult<Address> {
        let key = CompressedPublicKey::from_slice(compressed)
            .map_err(|e| ChainSigError::Format(format!("invalid compressed key: {}", e)))?;
        Ok(Address::p2wpkh(&key, self.network))
    }

    fn parse_address(&self, address: &str) -> ChainSigResult<Address> {
        Address::from_str(address)
            .map_err(|e| ChainSigError::InvalidAddress(format!("{}: {}", address, e)))?
            .require_network(self.network)
            .map_err(|e| ChainSigError::InvalidAddress(format!("{}: {}", address, e)))
    }
}

/// Estimated fee for a P2WPKH spend with `inputs` inputs and `outputs` outputs
pub fn estimate_fee(fee_rate: u64, inputs: usize, outputs: usize) -> ChainSigResult<u64> {
    // 11 vB overhead, 68 vB per P2WPKH input, 31 vB per P2WPKH output
    (inputs as u64)
        .checked_mul(68)
        .and_then(|vb| vb.checked_add((outputs as u64).checked_mul(31)?))
        .and_then(|vb| vb.checked_add(11))
        .and_then(|vbytes| vbytes.checked_mul(fee_rate))
        .ok_or_else(|| {
            ChainSigError::InvalidTransaction(format!("fee at {} sat/vB overflows", fee_rate))
        })
}

/// `amount + fee`, or an error when the sum does not fit in a u64
fn required_sats(amount: u64, fee: u64) -> ChainSigResult<u64> {
    amount.checked_add(fee).ok_or_else(|| {
        ChainSigError::InvalidTransaction(format!("amount {} plus fee {} overflows", amount, fee))
    })
}

fn compressed_key(public_key: &str) -> ChainSigResult<[u8; 33]> {
    let bytes = hex::decode(public_key.trim_start_matches("0x"))?;
    let key = PublicKey::from_slice(&bytes)
        .map_err(|e| ChainSigError::Format(format!("invalid public key: {}", e)))?;
    Ok(key.serialize())
}

fn parse_txid(txid: &str) -> ChainSigResult<[u8; 32]> {
    hex::decode(txid)?
        .try_into()
        .map_err(|_| ChainSigError::InvalidTransaction(format!("txid must be 32 bytes: {}", txid)))
}

impl ChainAdapter for BitcoinAdapter {
    type Request = BitcoinTransactionRequest;
    type UnsignedTransaction = UnsignedBitcoinTransaction;

    fn family(&self) -> ChainFamily {
        ChainFamily::Bitcoin
    }

    fn derive_address_and_public_key(
        &self,
        predecessor_id: &str,
        path: &str,
    ) -> ChainSigResult<DerivedAccount> {
        let key = self.deriver.derive_point(predecessor_id, path)?;
        Ok(DerivedAccount {
            address: self.p2wpkh_address(&key.serialize())?.to_string(),
            public_key: hex::encode(key.serialize_uncompressed()),
        })
    }

    fn prepare_transaction_for_signing(
        &self,
        request: &BitcoinTransactionRequest,
    ) -> ChainSigResult<PreparedTransaction<UnsignedBitcoinTransaction>> {
        let public_key = compressed_key(&request.public_key)?;
        let own_address = self.p2wpkh_address(&public_key)?;
        if own_address != self.parse_address(&request.from)? {
            return Err(ChainSigError::InvalidAddress(format!(
                "public key does not control {}",
                request.from
            )));
        }
        let recipient = self.parse_address(&request.to)?;

        if request.value < DUST_LIMIT {
            return Err(ChainSigError::InvalidTransaction(format!(
                "amount {} is below the dust limit",
                request.value
            )));
        }

        // Accumulate in caller order until amount + fee is covered
        let mut selected = Vec::new();
        let mut total: u64 = 0;
        for utxo in &request.utxos {
            selected.push(utxo);
            total = total.checked_add(utxo.value).ok_or_else(|| {
                ChainSigError::InvalidTransaction("selected UTXO values overflow".to_string())
            })?;
            let fee = estimate_fee(request.fee_rate, selected.len(), 1)?;
            if total >= required_sats(request.value, fee)? {
                break;
            }
        }

        let fee_without_change = estimate_fee(request.fee_rate, selected.len(), 1)?;
        if selected.is_empty() || total < required_sats(request.value, fee_without_change)? {
            return Err(ChainSigError::InsufficientFunds(format!(
                "need {} sats plus fee {}, have {}",
                request.value, fee_without_change, total
            )));
        }

        let mut outputs = vec![BitcoinOutput {
            value: request.value,
            script_pubkey: recipient.script_pubkey().to_bytes(),
        }];

        let fee_with_change = estimate_fee(request.fee_rate, selected.len(), 2)?;
        let change = total.checked_sub(required_sats(request.value, fee_with_change)?);
        if let Some(change) = change.filter(|change| *change >= DUST_LIMIT) {
            outputs.push(BitcoinOutput {
                value: change,
                script_pubkey: own_address.script_pubkey().to_bytes(),
            });
        }

        let inputs = selected
            .iter()
            .map(|utxo| {
                Ok(BitcoinInput {
                    txid: parse_txid(&utxo.txid)?,
                    vout: utxo.vout,
                    value: utxo.value,
                    sequence: SEQUENCE_FINAL,
                })
            })
            .collect::<ChainSigResult<Vec<_>>>()?;

        let transaction = UnsignedBitcoinTransaction {
            version: 2,
            inputs,
            outputs,
            locktime: 0,
            public_key: public_key.to_vec(),
        };

        let payloads = self.signing_payloads(&transaction)?;
        log_debug!(
            "chains::bitcoin",
            "prepared transaction",
            from = request.from,
            to = request.to,
            inputs = transaction.inputs.len(),
            outputs = transaction.outputs.len()
        );

        Ok(PreparedTransaction {
            transaction,
            payloads,
        })
    }

    fn signing_payloads(&self, transaction: &UnsignedBitcoinTransaction) -> ChainSigResult<Vec<SignPayload>> {
        get_bitcoin_sighashes(transaction)
    }

    fn assemble_signed_transaction(
        &self,
        transaction: &UnsignedBitcoinTransaction,
        signatures: &[CanonicalSignature],
    ) -> ChainSigResult<String> {
        let compiled = compile_bitcoin_transaction(transaction, &ecdsa_signatures(signatures)?)?;
        log_debug!(
            "chains::bitcoin",
            "compiled transaction",
            txid = hex::encode(compiled.txid),
            vsize = compiled.vsize
        );
        Ok(hex::encode(compiled.raw_tx))
    }

    fn broadcast_tx(&self, signed_transaction: &str) -> ChainSigResult<String> {
        require_broadcaster(&self.broadcaster, self.family())?.broadcast(signed_transaction)
    }
}
