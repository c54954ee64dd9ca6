//! Unified error types for chainsig-core
//!
//! Every fallible operation returns [`ChainSigResult`]. Core failures
//! (format, derivation, normalization, signature count) are deterministic
//! and never retried internally; collaborator failures (network, broadcast,
//! signer) are carried through unchanged.

use serde::{Deserialize, Serialize};

/// Main error type for all chainsig operations
#[derive(Debug, thiserror::Error)]
pub enum ChainSigError {
    #[error("Invalid key encoding: {0}")]
    Format(String),

    #[error("Unsupported derivation chain: {0}")]
    UnsupportedChain(String),

    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("Expected {expected} signatures, got {actual}")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("Signature {index} does not match its payload")]
    SignatureMismatch { index: usize },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("Signer error: {0}")]
    Signer(String),
}

/// Error codes for categorization at the CLI / JSON boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    FormatError,
    UnsupportedChain,
    InvalidSignatureFormat,
    SignatureCountMismatch,
    SignatureMismatch,
    InvalidTransaction,
    InvalidAddress,
    InsufficientFunds,
    CryptoError,
    SerializationError,
    ConfigError,
    NetworkError,
    BroadcastRejected,
    SignerError,
}

impl ChainSigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Format(_) => ErrorCode::FormatError,
            Self::UnsupportedChain(_) => ErrorCode::UnsupportedChain,
            Self::InvalidSignatureFormat(_) => ErrorCode::InvalidSignatureFormat,
            Self::SignatureCountMismatch { .. } => ErrorCode::SignatureCountMismatch,
            Self::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            Self::InvalidTransaction(_) => ErrorCode::InvalidTransaction,
            Self::InvalidAddress(_) => ErrorCode::InvalidAddress,
            Self::InsufficientFunds(_) => ErrorCode::InsufficientFunds,
            Self::Crypto(_) => ErrorCode::CryptoError,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::BroadcastRejected(_) => ErrorCode::BroadcastRejected,
            Self::Signer(_) => ErrorCode::SignerError,
        }
    }

    /// Whether the failure originated in an external collaborator
    /// (RPC node, broadcast endpoint, MPC signer) rather than in the core.
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::BroadcastRejected(_) | Self::Signer(_) | Self::InsufficientFunds(_)
        )
    }

    /// JSON shape used by the CLI: `{"code": ..., "message": ...}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}

/// Result type alias for chainsig operations
pub type ChainSigResult<T> = Result<T, ChainSigError>;

// Conversions from common error types

impl From<hex::FromHexError> for ChainSigError {
    fn from(e: hex::FromHexError) -> Self {
        ChainSigError::Format(format!("hex: {}", e))
    }
}

impl From<bs58::decode::Error> for ChainSigError {
    fn from(e: bs58::decode::Error) -> Self {
        ChainSigError::Format(format!("base58: {}", e))
    }
}

impl From<serde_json::Error> for ChainSigError {
    fn from(e: serde_json::Error) -> Self {
        ChainSigError::Serialization(e.to_string())
    }
}

impl From<secp256k1::Error> for ChainSigError {
    fn from(e: secp256k1::Error) -> Self {
        ChainSigError::Crypto(format!("secp256k1: {}", e))
    }
}

impl From<reqwest::Error> for ChainSigError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChainSigError::Network("Request timed out".to_string())
        } else if e.is_connect() {
            ChainSigError::Network("Connection failed".to_string())
        } else {
            ChainSigError::Network(e.to_string())
        }
    }
}
