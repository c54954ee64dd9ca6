//! chainsig-core
//!
//! Chain-agnostic core for chain signatures: one MPC-held root key, child
//! keys derived per (predecessor, path), and foreign-chain transactions
//! signed by the MPC network.
//!
//! # Architecture
//!
//! This crate provides:
//! - **keys**: NAJ ↔ SEC1 key conversion and epsilon child-key derivation
//! - **signing**: payload generation, MPC response normalization, transaction compilation
//! - **chains**: the [`ChainAdapter`] contract and the EVM, Bitcoin, Cosmos and Solana adapters
//! - **config**: deployment environments and RPC endpoint validation
//!
//! # Example
//!
//! ```rust,ignore
//! use chainsig_core::{ChainAdapter, ChainSigConfig, Environment, EvmAdapter};
//!
//! let config = ChainSigConfig::for_environment(Environment::Testnet);
//! let evm = EvmAdapter::new(&config, 11155111)?;
//! let account = evm.derive_address_and_public_key("alice.near", "ethereum-1")?;
//! println!("{}", account.address);
//! ```

pub mod chains;
pub mod config;
pub mod error;
pub mod keys;
pub mod serde_bytes;
pub mod signing;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use chains::{
    BitcoinAdapter, Broadcaster, ChainAdapter, CosmosAdapter, Ed25519KeyResolver, EvmAdapter,
    SolanaAdapter,
};
pub use config::{ChainSigConfig, Environment, RpcEndpoint};
pub use error::{ChainSigError, ChainSigResult, ErrorCode};
pub use keys::{derive, derive_epsilon, to_compressed, to_uncompressed, KdfChain, KeyDeriver};
pub use signing::{
    normalize, normalize_json, normalize_value, CanonicalSignature, Ed25519Signature,
    MpcSignatureResponse, RsvSignature,
};
pub use types::{
    ChainFamily, DerivedAccount, KeyType, PreparedTransaction, SignPayload, TransactionStage,
};
