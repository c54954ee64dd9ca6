//! EVM Pre-Image Hashing
//!
//! Generates the signing hash for EVM transactions.
//! Supports Legacy (EIP-155), EIP-2930 (Access Lists) and EIP-1559 (Fee Market).

use crate::error::{ChainSigError, ChainSigResult};
use crate::types::SignPayload;
use crate::utils::crypto::keccak256;
use serde::{Deserialize, Serialize};

/// EVM transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvmTxType {
    /// Legacy transaction with EIP-155 replay protection
    Legacy,
    /// EIP-2930: Access list transaction (type 0x01)
    AccessList,
    /// EIP-1559: Fee market transaction (type 0x02)
    FeeMarket,
}

impl EvmTxType {
    pub fn type_byte(&self) -> Option<u8> {
        match self {
            Self::Legacy => None,
            Self::AccessList => Some(0x01),
            Self::FeeMarket => Some(0x02),
        }
    }
}

/// Access list entry (EIP-2930)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessListEntry {
    #[serde(with = "crate::serde_bytes::hex20")]
    pub address: [u8; 20],
    #[serde(with = "crate::serde_bytes::hex32_vec")]
    pub storage_keys: Vec<[u8; 32]>,
}

/// Unsigned EVM transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvmTransaction {
    pub tx_type: EvmTxType,
    pub chain_id: u64,
    pub nonce: u64,
    /// Legacy & EIP-2930
    #[serde(with = "crate::serde_bytes::u128_string_option", default)]
    pub gas_price: Option<u128>,
    /// EIP-1559
    #[serde(with = "crate::serde_bytes::u128_string_option", default)]
    pub max_priority_fee_per_gas: Option<u128>,
    /// EIP-1559
    #[serde(with = "crate::serde_bytes::u128_string_option", default)]
    pub max_fee_per_gas: Option<u128>,
    pub gas_limit: u64,
    /// Expected signer; not part of the encoding, checked when compiling
    #[serde(with = "crate::serde_bytes::hex20")]
    pub from: [u8; 20],
    /// `None` for contract creation
    #[serde(with = "crate::serde_bytes::hex20_option")]
    pub to: Option<[u8; 20]>,
    #[serde(with = "crate::serde_bytes::u128_string")]
    pub value: u128,
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
}

/// Get the signing hash for an EVM transaction
pub fn get_ethereum_signing_hash(tx: &UnsignedEvmTransaction) -> ChainSigResult<SignPayload> {
    let hash = keccak256(&signing_preimage(tx)?);

    let description = format!(
        "EVM {:?} tx on chain {}: {} wei to {}",
        tx.tx_type,
        tx.chain_id,
        tx.value,
        tx.to
            .map(hex::encode)
            .unwrap_or_else(|| "contract creation".to_string())
    );

    Ok(SignPayload::digest(hash, 0).with_description(description))
}

/// Bytes whose keccak256 is signed
pub(crate) fn signing_preimage(tx: &UnsignedEvmTransaction) -> ChainSigResult<Vec<u8>> {
    let mut items = payload_fields(tx)?;

    match tx.tx_type.type_byte() {
        None => {
            // EIP-155: [..., chainId, 0, 0]
            items.push(rlp_encode_u64(tx.chain_id));
            items.push(rlp_encode_u64(0));
            items.push(rlp_encode_u64(0));
            Ok(rlp_encode_list(&items))
        }
        Some(type_byte) => {
            let mut typed = vec![type_byte];
            typed.extend_from_slice(&rlp_encode_list(&items));
            Ok(typed)
        }
    }
}

/// RLP items shared by the unsigned and signed encodings, in field order
pub(crate) fn payload_fields(tx: &UnsignedEvmTransaction) -> ChainSigResult<Vec<Vec<u8>>> {
    let mut items = Vec::new();

    match tx.tx_type {
        EvmTxType::Legacy => {
            let gas_price = require(tx.gas_price, "gas_price")?;
            // [nonce, gasPrice, gasLimit, to, value, data]
            items.push(rlp_encode_u64(tx.nonce));
            items.push(rlp_encode_u128(gas_price));
            items.push(rlp_encode_u64(tx.gas_limit));
            items.push(rlp_encode_address(tx.to));
            items.push(rlp_encode_u128(tx.value));
            items.push(rlp_encode_bytes(&tx.data));
        }
        EvmTxType::AccessList => {
            let gas_price = require(tx.gas_price, "gas_price")?;
            // [chainId, nonce, gasPrice, gasLimit, to, value, data, accessList]
            items.push(rlp_encode_u64(tx.chain_id));
            items.push(rlp_encode_u64(tx.nonce));
            items.push(rlp_encode_u128(gas_price));
            items.push(rlp_encode_u64(tx.gas_limit));
            items.push(rlp_encode_address(tx.to));
            items.push(rlp_encode_u128(tx.value));
            items.push(rlp_encode_bytes(&tx.data));
            items.push(rlp_encode_access_list(&tx.access_list));
        }
        EvmTxType::FeeMarket => {
            let max_priority = require(tx.max_priority_fee_per_gas, "max_priority_fee_per_gas")?;
            let max_fee = require(tx.max_fee_per_gas, "max_fee_per_gas")?;
            if max_priority > max_fee {
                return Err(ChainSigError::InvalidTransaction(
                    "max_priority_fee_per_gas exceeds max_fee_per_gas".to_string(),
                ));
            }
            // [chainId, nonce, maxPriorityFeePerGas, maxFeePerGas, gasLimit, to, value, data, accessList]
            items.push(rlp_encode_u64(tx.chain_id));
            items.push(rlp_encode_u64(tx.nonce));
            items.push(rlp_encode_u128(max_priority));
            items.push(rlp_encode_u128(max_fee));
            items.push(rlp_encode_u64(tx.gas_limit));
            items.push(rlp_encode_address(tx.to));
            items.push(rlp_encode_u128(tx.value));
            items.push(rlp_encode_bytes(&tx.data));
            items.push(rlp_encode_access_list(&tx.access_list));
        }
    }

    Ok(items)
}

fn require(value: Option<u128>, field: &str) -> ChainSigResult<u128> {
    value.ok_or_else(|| ChainSigError::InvalidTransaction(format!("missing field: {}", field)))
}

// RLP encoding helpers

pub(crate) fn rlp_encode_u64(val: u64) -> Vec<u8> {
    rlp_encode_uint(&val.to_be_bytes())
}

pub(crate) fn rlp_encode_u128(val: u128) -> Vec<u8> {
    rlp_encode_uint(&val.to_be_bytes())
}

/// Big-endian integer: leading zero bytes are dropped, zero is the empty string
pub(crate) fn rlp_encode_uint(bytes: &[u8]) -> Vec<u8> {
    let leading_zeros = bytes.iter().take_while(|&&b| b == 0).count();
    rlp_encode_bytes(&bytes[leading_zeros..])
}

pub(crate) fn rlp_encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return data.to_vec();
    }

    if data.len() < 56 {
        let mut result = vec![0x80 + data.len() as u8];
        result.extend_from_slice(data);
        result
    } else {
        let len_bytes = encode_length(data.len());
        let mut result = vec![0xb7 + len_bytes.len() as u8];
        result.extend_from_slice(&len_bytes);
        result.extend_from_slice(data);
        result
    }
}

pub(crate) fn rlp_encode_address(addr: Option<[u8; 20]>) -> Vec<u8> {
    match addr {
        Some(a) => rlp_encode_bytes(&a),
        None => vec![0x80],
    }
}

pub(crate) fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.concat();

    if payload.len() < 56 {
        let mut result = vec![0xc0 + payload.len() as u8];
        result.extend_from_slice(&payload);
        result
    } else {
        let len_bytes = encode_length(payload.len());
        let mut result = vec![0xf7 + len_bytes.len() as u8];
        result.extend_from_slice(&len_bytes);
        result.extend_from_slice(&payload);
        result
    }
}

fn encode_length(len: usize) -> Vec<u8> {
    let bytes = len.to_be_bytes();
    let leading_zeros = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[leading_zeros..].to_vec()
}

fn rlp_encode_access_list(list: &[AccessListEntry]) -> Vec<u8> {
    let items: Vec<Vec<u8>> = list
        .iter()
        .map(|entry| {
            let addr = rlp_encode_bytes(&entry.address);
            let keys: Vec<Vec<u8>> = entry.storage_keys.iter().map(|k| rlp_encode_bytes(k)).collect();
            rlp_encode_list(&[addr, rlp_encode_list(&keys)])
        })
        .collect();

    rlp_encode_list(&items)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The worked example from EIP-155
    fn eip155_example() -> UnsignedEvmTransaction {
        UnsignedEvmTransaction {
            tx_type: EvmTxType::Legacy,
            chain_id: 1,
            nonce: 9,
            gas_price: Some(20_000_000_000),
            max_priority_fee_per_gas: None,
            max_fee_per_gas: None,
            gas_limit: 21000,
            from: [0u8; 20],
            to: Some([0x35; 20]),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            access_list: vec![],
        }
    }

    fn sample_eip1559_tx() -> UnsignedEvmTransaction {
        UnsignedEvmTransaction {
            tx_type: EvmTxType::FeeMarket,
            chain_id: 11155111,
            nonce: 5,
            gas_price: None,
            max_priority_fee_per_gas: Some(2_000_000_000),
            max_fee_per_gas: Some(100_000_000_000),
            gas_limit: 21000,
            from: [0u8; 20],
            to: Some([0xaa; 20]),
            value: 500_000_000_000_000_000,
            data: vec![0x01, 0x02, 0x03],
            access_list: vec![],
        }
    }

    #[test]
    fn test_eip155_signing_hash() {
        let tx = eip155_example();
        let preimage = signing_preimage(&tx).unwrap();
        assert_eq!(
            hex::encode(&preimage),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );

        let payload = get_ethereum_signing_hash(&tx).unwrap();
        assert_eq!(
            hex::encode(payload.as_digest().unwrap()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
        assert_eq!(payload.index, 0);
    }

    #[test]
    fn test_eip1559_typed_prefix() {
        let tx = sample_eip1559_tx();
        let preimage = signing_preimage(&tx).unwrap();
        assert_eq!(preimage[0], 0x02);
        assert!(get_ethereum_signing_hash(&tx).is_ok());
    }

    #[test]
    fn test_eip2930_hash() {
        let mut tx = eip155_example();
        tx.tx_type = EvmTxType::AccessList;
        tx.access_list = vec![AccessListEntry {
            address: [0xbb; 20],
            storage_keys: vec![[0xcc; 32]],
        }];

        let preimage = signing_preimage(&tx).unwrap();
        assert_eq!(preimage[0], 0x01);
        assert_ne!(
            get_ethereum_signing_hash(&tx).unwrap(),
            get_ethereum_signing_hash(&eip155_example()).unwrap()
        );
    }

    #[test]
    fn test_missing_fee_fields() {
        let mut tx = eip155_example();
        tx.gas_price = None;
        assert!(matches!(
            get_ethereum_signing_hash(&tx),
            Err(ChainSigError::InvalidTransaction(_))
        ));

        let mut tx = sample_eip1559_tx();
        tx.max_priority_fee_per_gas = Some(200_000_000_000);
        assert!(get_ethereum_signing_hash(&tx).is_err());
    }

    #[test]
    fn test_contract_creation() {
        let mut tx = eip155_example();
        tx.to = None;
        tx.data = vec![0x60, 0x80, 0x60, 0x40];

        let payload = get_ethereum_signing_hash(&tx).unwrap();
        assert!(payload.description.contains("contract creation"));
    }

    #[test]
    fn test_rlp_encode_u64() {
        assert_eq!(rlp_encode_u64(0), vec![0x80]);
        assert_eq!(rlp_encode_u64(127), vec![127]);
        assert_eq!(rlp_encode_u64(128), vec![0x81, 128]);
        assert_eq!(rlp_encode_u64(256), vec![0x82, 1, 0]);
    }

    #[test]
    fn test_rlp_encode_bytes() {
        assert_eq!(rlp_encode_bytes(&[]), vec![0x80]);
        assert_eq!(rlp_encode_bytes(&[0x7f]), vec![0x7f]);
        assert_eq!(rlp_encode_bytes(&[0x80]), vec![0x81, 0x80]);
        assert_eq!(rlp_encode_bytes(&[1, 2, 3]), vec![0x83, 1, 2, 3]);
        assert_eq!(rlp_encode_uint(&[0, 0, 5]), vec![5]);
    }

    #[test]
    fn test_long_list_header() {
        let items = vec![rlp_encode_bytes(&[0xaa; 60])];
        let encoded = rlp_encode_list(&items);
        assert_eq!(encoded[0], 0xf8);
        assert_eq!(encoded[1], 62);
    }

    #[test]
    fn test_serde_round_trip() {
        let tx = sample_eip1559_tx();
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"value\":\"500000000000000000\""));
        let back: UnsignedEvmTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }
}
