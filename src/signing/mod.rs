//! Payload generation and signature assembly
//!
//! 1. Reduce an unsigned transaction to the payloads the MPC network signs
//! 2. Normalize whatever the MPC network returns
//! 3. Compile canonical signatures into a broadcast-ready transaction
//!
//! Supported transaction formats:
//! - Bitcoin (native SegWit P2WPKH)
//! - EVM (Legacy, EIP-2930, EIP-1559)
//! - Cosmos (Protobuf / SIGN_MODE_DIRECT)
//! - Solana (legacy message)

pub mod compiler;
pub mod mpc;
pub mod preimage;
pub mod signature;

pub use compiler::*;
pub use mpc::{order_by_payload_index, sign_payloads, MpcSigner, SignRequest};
pub use signature::{
    normalize, normalize_json, normalize_value, CanonicalSignature, Ed25519Signature,
    MpcSignatureResponse, RsvSignature,
};
