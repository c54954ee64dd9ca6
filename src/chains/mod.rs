//! Chain adapters
//!
//! One adapter per chain family, all behind [`ChainAdapter`]. A transaction
//! moves through the same steps everywhere:
//!
//! 1. `derive_address_and_public_key`: child key and address for (predecessor, path)
//! 2. `prepare_transaction_for_signing`: unsigned transaction plus ordered payloads
//! 3. signatures come back from the MPC network (see [`crate::signing::mpc`])
//! 4. `finalize_transaction_signing`: attach signatures, serialize for broadcast
//! 5. `broadcast_tx`: hand the serialized transaction to the network

pub mod bitcoin;
pub mod broadcast;
pub mod cosmos;
pub mod evm;
pub mod solana;

pub use self::bitcoin::{BitcoinAdapter, BitcoinTransactionRequest, Utxo};
pub use self::broadcast::{
    Broadcaster, CosmosRestBroadcaster, EsploraBroadcaster, EvmRpcBroadcaster, SolanaRpcBroadcaster,
};
pub use self::cosmos::{CosmosAdapter, CosmosTransactionRequest};
pub use self::evm::{EvmAdapter, EvmFees, EvmTransactionRequest};
pub use self::solana::{Ed25519KeyResolver, SolanaAdapter, SolanaTransactionRequest};

use crate::error::{ChainSigError, ChainSigResult};
use crate::log_debug;
use crate::signing::signature::CanonicalSignature;
use crate::types::{ChainFamily, DerivedAccount, PreparedTransaction, SignPayload};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Uniform contract every chain family implements.
///
/// Adapters never hold signing keys. Signature order on finalize is the
/// payload order returned by prepare.
pub trait ChainAdapter {
    /// Caller's description of the transfer
    type Request;
    /// Chain-native unsigned transaction; must survive a JSON round trip
    type UnsignedTransaction: Clone + PartialEq + Debug + Serialize + DeserializeOwned;

    fn family(&self) -> ChainFamily;

    /// Derive the child key for (predecessor, path) and its address
    fn derive_address_and_public_key(
        &self,
        predecessor_id: &str,
        path: &str,
    ) -> ChainSigResult<DerivedAccount>;

    /// Build the unsigned transaction and its payloads, in signing order
    fn prepare_transaction_for_signing(
        &self,
        request: &Self::Request,
    ) -> ChainSigResult<PreparedTransaction<Self::UnsignedTransaction>>;

    /// Payloads of an already-built transaction, in signing order
    fn signing_payloads(&self, transaction: &Self::UnsignedTransaction) -> ChainSigResult<Vec<SignPayload>>;

    /// Attach signatures that are already count-checked and in payload order
    fn assemble_signed_transaction(
        &self,
        transaction: &Self::UnsignedTransaction,
        signatures: &[CanonicalSignature],
    ) -> ChainSigResult<String>;

    /// Submit the serialized transaction; returns the chain's transaction id
    fn broadcast_tx(&self, signed_transaction: &str) -> ChainSigResult<String>;

    /// Attach `signatures[i]` to payload `i` and serialize for broadcast
    fn finalize_transaction_signing(
        &self,
        transaction: &Self::UnsignedTransaction,
        signatures: &[CanonicalSignature],
    ) -> ChainSigResult<String> {
        let payloads = self.signing_payloads(transaction)?;
        if payloads.len() != signatures.len() {
            return Err(ChainSigError::SignatureCountMismatch {
                expected: payloads.len(),
                actual: signatures.len(),
            });
        }

        log_debug!(
            "chains",
            "finalizing transaction",
            family = self.family(),
            signatures = signatures.len()
        );
        self.assemble_signed_transaction(transaction, signatures)
    }

    fn serialize_transaction(&self, transaction: &Self::UnsignedTransaction) -> ChainSigResult<String> {
        Ok(serde_json::to_string(transaction)?)
    }

    fn deserialize_transaction(&self, serialized: &str) -> ChainSigResult<Self::UnsignedTransaction> {
        serde_json::from_str(serialized).map_err(|e| {
            ChainSigError::Serialization(format!("Invalid {} transaction: {}", self.family(), e))
        })
    }
}

/// Configured broadcaster or a configuration error
pub(crate) fn require_broadcaster<'a>(
    broadcaster: &'a Option<Box<dyn Broadcaster>>,
    family: ChainFamily,
) -> ChainSigResult<&'a dyn Broadcaster> {
    broadcaster
        .as_deref()
        .ok_or_else(|| ChainSigError::Config(format!("no broadcaster configured for {}", family)))
}

/// The one signature of a single-payload transaction
pub(crate) fn single_signature(signatures: &[CanonicalSignature]) -> ChainSigResult<&CanonicalSignature> {
    match signatures {
        [signature] => Ok(signature),
        _ => Err(ChainSigError::SignatureCountMismatch {
            expected: 1,
            actual: signatures.len(),
        }),
    }
}

/// Only ECDSA signatures, in order
pub(crate) fn ecdsa_signatures(
    signatures: &[CanonicalSignature],
) -> ChainSigResult<Vec<crate::signing::signature::RsvSignature>> {
    signatures
        .iter()
        .map(|sig| sig.as_ecdsa().cloned())
        .collect()
}
