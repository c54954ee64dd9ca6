//! Cosmos Pre-Image Hashing
//!
//! SIGN_MODE_DIRECT sign docs for Cosmos SDK transactions with a single
//! secp256k1 signer. Protobuf is written by hand; proto3 zero values are
//! omitted so the bytes match what the chain re-encodes.

use crate::error::{ChainSigError, ChainSigResult};
use crate::types::SignPayload;
use crate::utils::crypto::sha256;
use serde::{Deserialize, Serialize};

pub const MSG_SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";
const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";
const SIGN_MODE_DIRECT: u64 = 1;

/// Cosmos coin denomination and amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosCoin {
    /// Denomination (e.g., "uatom", "uosmo")
    pub denom: String,
    /// Amount as string (to handle large values)
    pub amount: String,
}

impl CosmosCoin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut coin = Vec::new();
        write_string(&mut coin, 1, &self.denom);
        write_string(&mut coin, 2, &self.amount);
        coin
    }
}

/// Fee paid by the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosFee {
    pub amount: Vec<CosmosCoin>,
    /// Gas limit
    pub gas: u64,
}

/// One `Any`-wrapped message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosMessage {
    /// Message type URL (e.g., "/cosmos.bank.v1beta1.MsgSend")
    pub type_url: String,
    /// Protobuf-encoded message value
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub value: Vec<u8>,
}

/// Unsigned Cosmos transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedCosmosTransaction {
    pub chain_id: String,
    pub messages: Vec<CosmosMessage>,
    pub fee: CosmosFee,
    pub memo: String,
    /// 0 for no timeout
    pub timeout_height: u64,
    pub account_number: u64,
    pub sequence: u64,
    /// Compressed secp256k1 key of the signer
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub public_key: Vec<u8>,
}

impl UnsignedCosmosTransaction {
    fn validate(&self) -> ChainSigResult<()> {
        if self.messages.is_empty() {
            return Err(ChainSigError::InvalidTransaction("transaction has no messages".to_string()));
        }
        if self.chain_id.is_empty() {
            return Err(ChainSigError::InvalidTransaction("chain_id is empty".to_string()));
        }
        if self.public_key.len() != 33 {
            return Err(ChainSigError::InvalidTransaction(
                "public_key must be a 33-byte compressed key".to_string(),
            ));
        }
        Ok(())
    }

    /// `TxBody` bytes
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for msg in &self.messages {
            let mut any = Vec::new();
            write_string(&mut any, 1, &msg.type_url);
            write_bytes(&mut any, 2, &msg.value);
            write_message(&mut body, 1, &any);
        }
        write_string(&mut body, 2, &self.memo);
        write_uint(&mut body, 3, self.timeout_height);
        body
    }

    /// `AuthInfo` bytes
    pub fn auth_info_bytes(&self) -> Vec<u8> {
        // SignerInfo
        let mut pubkey = Vec::new();
        write_bytes(&mut pubkey, 1, &self.public_key);
        let mut pubkey_any = Vec::new();
        write_string(&mut pubkey_any, 1, SECP256K1_PUBKEY_TYPE_URL);
        write_message(&mut pubkey_any, 2, &pubkey);

        let mut single = Vec::new();
        write_uint(&mut single, 1, SIGN_MODE_DIRECT);
        let mut mode_info = Vec::new();
        write_message(&mut mode_info, 1, &single);

        let mut signer_info = Vec::new();
        write_message(&mut signer_info, 1, &pubkey_any);
        write_message(&mut signer_info, 2, &mode_info);
        write_uint(&mut signer_info, 3, self.sequence);

        // Fee
        let mut fee = Vec::new();
        for coin in &self.fee.amount {
            write_message(&mut fee, 1, &coin.encode());
        }
        write_uint(&mut fee, 2, self.fee.gas);

        let mut auth_info = Vec::new();
        write_message(&mut auth_info, 1, &signer_info);
        write_message(&mut auth_info, 2, &fee);
        auth_info
    }

    /// `SignDoc` bytes
    pub fn sign_doc_bytes(&self) -> Vec<u8> {
        let mut doc = Vec::new();
        write_bytes(&mut doc, 1, &self.body_bytes());
        write_bytes(&mut doc, 2, &self.auth_info_bytes());
        write_string(&mut doc, 3, &self.chain_id);
        write_uint(&mut doc, 4, self.account_number);
        doc
    }
}

/// Get the signing hash for a Cosmos transaction
pub fn get_cosmos_sign_doc_hash(tx: &UnsignedCosmosTransaction) -> ChainSigResult<SignPayload> {
    tx.validate()?;

    let hash = sha256(&tx.sign_doc_bytes());
    Ok(SignPayload::digest(hash, 0).with_description(format!(
        "Cosmos DIRECT tx on {}: {} message(s)",
        tx.chain_id,
        tx.messages.len()
    )))
}

/// `MsgSend` wrapped as a message
pub fn encode_msg_send(from_address: &str, to_address: &str, amount: &[CosmosCoin]) -> CosmosMessage {
    let mut value = Vec::new();
    write_string(&mut value, 1, from_address);
    write_string(&mut value, 2, to_address);
    for coin in amount {
        write_message(&mut value, 3, &coin.encode());
    }
    CosmosMessage {
        type_url: MSG_SEND_TYPE_URL.to_string(),
        value,
    }
}

// Protobuf helpers

pub(crate) fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn write_key(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    encode_varint(((field as u64) << 3) | wire_type as u64, buf);
}

fn write_uint(buf: &mut Vec<u8>, field: u32, value: u64) {
    if value != 0 {
        write_key(buf, field, 0);
        encode_varint(value, buf);
    }
}

/// Length-delimited scalar; skipped when empty
pub(crate) fn write_bytes(buf: &mut Vec<u8>, field: u32, data: &[u8]) {
    if !data.is_empty() {
        write_message(buf, field, data);
    }
}

fn write_string(buf: &mut Vec<u8>, field: u32, value: &str) {
    write_bytes(buf, field, value.as_bytes());
}

/// Embedded message; always written, even when empty
fn write_message(buf: &mut Vec<u8>, field: u32, data: &[u8]) {
    write_key(buf, field, 2);
    encode_varint(data.len() as u64, buf);
    buf.extend_from_slice(data);
}
