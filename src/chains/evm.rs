//! EVM adapter
//!
//! Addresses are the last 20 bytes of keccak256 over the uncompressed key
//! (without the 04 prefix), EIP-55 checksummed. One payload per transaction.

use super::{require_broadcaster, single_signature, Broadcaster, ChainAdapter};
use crate::config::ChainSigConfig;
use crate::error::{ChainSigError, ChainSigResult};
use crate::keys::KeyDeriver;
use crate::log_debug;
use crate::signing::compiler::compile_evm_transaction;
use crate::signing::preimage::ethereum::{
    get_ethereum_signing_hash, AccessListEntry, EvmTxType, UnsignedEvmTransaction,
};
use crate::signing::signature::CanonicalSignature;
use crate::types::{ChainFamily, DerivedAccount, PreparedTransaction, SignPayload};
use crate::utils::crypto::{keccak256, to_checksum_address};
use serde::{Deserialize, Serialize};

/// Fee model of the transaction to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvmFees {
    Legacy {
        #[serde(with = "crate::serde_bytes::u128_string")]
        gas_price: u128,
    },
    Eip1559 {
        #[serde(with = "crate::serde_bytes::u128_string")]
        max_fee_per_gas: u128,
        #[serde(with = "crate::serde_bytes::u128_string")]
        max_priority_fee_per_gas: u128,
    },
}

/// A transfer or contract call from a derived account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransactionRequest {
    pub from: String,
    /// `None` deploys a contract
    pub to: Option<String>,
    #[serde(with = "crate::serde_bytes::u128_string")]
    pub value: u128,
    #[serde(with = "crate::serde_bytes::hex_vec", default)]
    pub data: Vec<u8>,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fees: EvmFees,
    /// Non-empty with legacy fees produces an EIP-2930 transaction
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
}

pub struct EvmAdapter {
    deriver: KeyDeriver,
    chain_id: u64,
    broadcaster: Option<Box<dyn Broadcaster>>,
}

impl EvmAdapter {
    pub fn new(config: &ChainSigConfig, chain_id: u64) -> ChainSigResult<Self> {
        Ok(Self::from_deriver(KeyDeriver::new(config)?, chain_id))
    }

    pub fn from_deriver(deriver: KeyDeriver, chain_id: u64) -> Self {
        Self {
            deriver,
            chain_id,
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: impl Broadcaster + 'static) -> Self {
        self.broadcaster = Some(Box::new(broadcaster));
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Address bytes from a public key
pub fn address_from_public_key(uncompressed: &[u8; 65]) -> [u8; 20] {
    let hash = keccak256(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Parse a hex address. Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(address: &str) -> ChainSigResult<[u8; 20]> {
    let stripped = address
        .strip_prefix("0x")
        .ok_or_else(|| ChainSigError::InvalidAddress(format!("missing 0x prefix: {}", address)))?;

    if stripped.len() != 40 {
        return Err(ChainSigError::InvalidAddress(format!(
            "expected 40 hex chars, got {}",
            stripped.len()
        )));
    }

    let bytes: [u8; 20] = hex::decode(stripped)
        .map_err(|e| ChainSigError::InvalidAddress(e.to_string()))?
        .try_into()
        .map_err(|_| ChainSigError::InvalidAddress(address.to_string()))?;

    let has_upper = stripped.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = stripped.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower && to_checksum_address(&bytes) != address {
        return Err(ChainSigError::InvalidAddress(format!("bad checksum: {}", address)));
    }

    Ok(bytes)
}

impl ChainAdapter for EvmAdapter {
    type Request = EvmTransactionRequest;
    type UnsignedTransaction = UnsignedEvmTransaction;

    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn derive_address_and_public_key(
        &self,
        predecessor_id: &str,
        path: &str,
    ) -> ChainSigResult<DerivedAccount> {
        let key = self.deriver.derive_point(predecessor_id, path)?;
        let uncompressed = key.serialize_uncompressed();
        Ok(DerivedAccount {
            address: to_checksum_address(&address_from_public_key(&uncompressed)),
            public_key: hex::encode(uncompressed),
        })
    }

    fn prepare_transaction_for_signing(
        &self,
        request: &EvmTransactionRequest,
    ) -> ChainSigResult<PreparedTransaction<UnsignedEvmTransaction>> {
        let from = parse_address(&request.from)?;
        let to = request.to.as_deref().map(parse_address).transpose()?;

        let (tx_type, gas_price, max_fee_per_gas, max_priority_fee_per_gas) = match request.fees {
            EvmFees::Legacy { gas_price } => {
                let tx_type = if request.access_list.is_empty() {
                    EvmTxType::Legacy
                } else {
                    EvmTxType::AccessList
                };
                (tx_type, Some(gas_price), None, None)
            }
            EvmFees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                if max_priority_fee_per_gas > max_fee_per_gas {
                    return Err(ChainSigError::InvalidTransaction(
                        "max_priority_fee_per_gas exceeds max_fee_per_gas".to_string(),
                    ));
                }
                (
                    EvmTxType::FeeMarket,
                    None,
                    Some(max_fee_per_gas),
                    Some(max_priority_fee_per_gas),
                )
            }
        };

        if to.is_none() && request.data.is_empty() {
            return Err(ChainSigError::InvalidTransaction(
                "contract creation needs init code".to_string(),
            ));
        }

        let transaction = UnsignedEvmTransaction {
            tx_type,
            chain_id: self.chain_id,
            nonce: request.nonce,
            gas_price,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit: request.gas_limit,
            from,
            to,
            value: request.value,
            data: request.data.clone(),
            access_list: request.access_list.clone(),
        };

        let payloads = self.signing_payloads(&transaction)?;
        log_debug!(
            "chains::evm",
            "prepared transaction",
            from = request.from,
            chain_id = self.chain_id,
            payload = payloads[0].payload_hex()
        );

        Ok(PreparedTransaction {
            transaction,
            payloads,
        })
    }

    fn signing_payloads(&self, transaction: &UnsignedEvmTransaction) -> ChainSigResult<Vec<SignPayload>> {
        Ok(vec![get_ethereum_signing_hash(transaction)?])
    }

    fn assemble_signed_transaction(
        &self,
        transaction: &UnsignedEvmTransaction,
        signatures: &[CanonicalSignature],
    ) -> ChainSigResult<String> {
        let signature = single_signature(signatures)?.as_ecdsa()?;
        let compiled = compile_evm_transaction(transaction, signature)?;
        Ok(format!("0x{}", hex::encode(compiled.raw_tx)))
    }

    fn broadcast_tx(&self, signed_transaction: &str) -> ChainSigResult<String> {
        require_broadcaster(&self.broadcaster, self.family())?.broadcast(signed_transaction)
    }
}
