//! Shared types for chainsig-core
//!
//! Data that crosses module boundaries (payloads handed to the MPC signer,
//! derived accounts, lifecycle stages) lives here.

use crate::error::{ChainSigError, ChainSigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Key / chain identification
// =============================================================================

/// Signature scheme requested from the MPC network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Ecdsa,
    Eddsa,
}

impl KeyType {
    /// MPC domain id the signer contract expects for this scheme
    pub fn domain_id(&self) -> u32 {
        match self {
            KeyType::Ecdsa => 0,
            KeyType::Eddsa => 1,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Ecdsa => write!(f, "Ecdsa"),
            KeyType::Eddsa => write!(f, "Eddsa"),
        }
    }
}

/// Chain families with an adapter implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainFamily {
    Evm,
    Bitcoin,
    Cosmos,
    Solana,
}

impl ChainFamily {
    pub fn key_type(&self) -> KeyType {
        match self {
            ChainFamily::Solana => KeyType::Eddsa,
            _ => KeyType::Ecdsa,
        }
    }

    /// Whether a transaction may need more than one signature
    pub fn is_multi_payload(&self) -> bool {
        matches!(self, ChainFamily::Bitcoin)
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Bitcoin => "bitcoin",
            ChainFamily::Cosmos => "cosmos",
            ChainFamily::Solana => "solana",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ChainFamily {
    type Err = ChainSigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "evm" | "ethereum" => Ok(ChainFamily::Evm),
            "bitcoin" | "btc" => Ok(ChainFamily::Bitcoin),
            "cosmos" => Ok(ChainFamily::Cosmos),
            "solana" | "sol" => Ok(ChainFamily::Solana),
            other => Err(ChainSigError::Config(format!("Unknown chain family: {}", other))),
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// One unit of data the MPC network must sign.
///
/// For secp256k1 chains `payload` is a 32-byte digest. For Ed25519 chains it
/// is the full message, since Ed25519 hashes internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPayload {
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub payload: Vec<u8>,

    /// Position in the prepare-time ordering
    pub index: usize,

    pub key_type: KeyType,

    /// Human-readable description
    pub description: String,
}

impl SignPayload {
    pub fn digest(digest: [u8; 32], index: usize) -> Self {
        Self {
            payload: digest.to_vec(),
            index,
            key_type: KeyType::Ecdsa,
            description: String::new(),
        }
    }

    pub fn message(message: Vec<u8>, index: usize) -> Self {
        Self {
            payload: message,
            index,
            key_type: KeyType::Eddsa,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// The payload as a 32-byte digest; fails for message payloads
    pub fn as_digest(&self) -> ChainSigResult<[u8; 32]> {
        self.payload.as_slice().try_into().map_err(|_| {
            ChainSigError::InvalidTransaction(format!(
                "payload {} is {} bytes, expected a 32-byte digest",
                self.index,
                self.payload.len()
            ))
        })
    }

    pub fn payload_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.payload))
    }
}

/// Output of `derive_address_and_public_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAccount {
    pub address: String,
    /// Uncompressed SEC1 hex for secp256k1 chains, `Ed25519:<base58>` for Ed25519 chains
    pub public_key: String,
}

/// Output of `prepare_transaction_for_signing`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTransaction<T> {
    pub transaction: T,
    pub payloads: Vec<SignPayload>,
}

impl<T> PreparedTransaction<T> {
    pub fn payload_count(&self) -> usize {
        self.payloads.len()
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Stage of one logical transaction. Stages only move forward, one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStage {
    Built,
    Prepared,
    Signed,
    Finalized,
    Broadcast,
}

impl TransactionStage {
    pub fn next(&self) -> Option<TransactionStage> {
        match self {
            TransactionStage::Built => Some(TransactionStage::Prepared),
            TransactionStage::Prepared => Some(TransactionStage::Signed),
            TransactionStage::Signed => Some(TransactionStage::Finalized),
            TransactionStage::Finalized => Some(TransactionStage::Broadcast),
            TransactionStage::Broadcast => None,
        }
    }

    /// Move to `to`; only the immediate successor is accepted
    pub fn advance(self, to: TransactionStage) -> ChainSigResult<TransactionStage> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(ChainSigError::InvalidTransaction(format!(
                "illegal stage transition {:?} -> {:?}",
                self, to
            )))
        }
    }

    /// A failed attempt starts over from scratch; nothing prepared is reused
    pub fn restart() -> TransactionStage {
        TransactionStage::Built
    }
}
