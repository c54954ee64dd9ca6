//! Solana adapter
//!
//! Ed25519 keys are not derived locally: the signer contract owns that
//! derivation, so keys come from an [`Ed25519KeyResolver`]. The single
//! payload is the serialized message.

use super::{require_broadcaster, single_signature, Broadcaster, ChainAdapter};
use crate::error::{ChainSigError, ChainSigResult};
use crate::keys::format::ed25519_key_bytes;
use crate::log_debug;
use crate::signing::compiler::compile_solana_transaction;
use crate::signing::preimage::solana::{
    get_solana_message, system_transfer_instruction, Pubkey, UnsignedSolanaTransaction,
};
use crate::signing::signature::CanonicalSignature;
use crate::types::{ChainFamily, DerivedAccount, PreparedTransaction, SignPayload};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Source of derived Ed25519 keys (`Ed25519:<base58>`), usually the signer
/// contract's `derived_public_key` view
pub trait Ed25519KeyResolver: Send + Sync {
    fn derived_public_key(&self, predecessor_id: &str, path: &str) -> ChainSigResult<String>;
}

impl<F> Ed25519KeyResolver for F
where
    F: Fn(&str, &str) -> ChainSigResult<String> + Send + Sync,
{
    fn derived_public_key(&self, predecessor_id: &str, path: &str) -> ChainSigResult<String> {
        self(predecessor_id, path)
    }
}

/// System-program transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaTransactionRequest {
    /// Base58 sender, also the fee payer
    pub from: String,
    /// Base58 recipient
    pub to: String,
    pub lamports: u64,
    /// Base58 recent blockhash
    pub recent_blockhash: String,
}

pub struct SolanaAdapter {
    resolver: Box<dyn Ed25519KeyResolver>,
    broadcaster: Option<Box<dyn Broadcaster>>,
}

impl SolanaAdapter {
    pub fn new(resolver: impl Ed25519KeyResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: impl Broadcaster + 'static) -> Self {
        self.broadcaster = Some(Box::new(broadcaster));
        self
    }
}

fn decode_pubkey(value: &str) -> ChainSigResult<Pubkey> {
    let bytes = bs58::decode(value)
        .into_vec()
        .map_err(|e| ChainSigError::InvalidAddress(format!("{}: {}", value, e)))?;
    bytes
        .try_into()
        .map_err(|_| ChainSigError::InvalidAddress(format!("{} is not 32 bytes", value)))
}

impl ChainAdapter for SolanaAdapter {
    type Request = SolanaTransactionRequest;
    type UnsignedTransaction = UnsignedSolanaTransaction;

    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn derive_address_and_public_key(
        &self,
        predecessor_id: &str,
        path: &str,
    ) -> ChainSigResult<DerivedAccount> {
        let public_key = self.resolver.derived_public_key(predecessor_id, path)?;
        let bytes = ed25519_key_bytes(&public_key)?;
        Ok(DerivedAccount {
            address: bs58::encode(bytes).into_string(),
            public_key,
        })
    }

    fn prepare_transaction_for_signing(
        &self,
        request: &SolanaTransactionRequest,
    ) -> ChainSigResult<PreparedTransaction<UnsignedSolanaTransaction>> {
        let from = decode_pubkey(&request.from)?;
        let to = decode_pubkey(&request.to)?;
        let recent_blockhash = decode_pubkey(&request.recent_blockhash).map_err(|_| {
            ChainSigError::InvalidTransaction(format!("invalid blockhash: {}", request.recent_blockhash))
        })?;

        if request.lamports == 0 {
            return Err(ChainSigError::InvalidTransaction("transfer of 0 lamports".to_string()));
        }

        let transaction = UnsignedSolanaTransaction {
            recent_blockhash,
            fee_payer: from,
            instructions: vec![system_transfer_instruction(from, to, request.lamports)],
        };

        let payloads = self.signing_payloads(&transaction)?;
        log_debug!(
            "chains::solana",
            "prepared transaction",
            from = request.from,
            to = request.to,
            lamports = request.lamports
        );

        Ok(PreparedTransaction {
            transaction,
            payloads,
        })
    }

    fn signing_payloads(&self, transaction: &UnsignedSolanaTransaction) -> ChainSigResult<Vec<SignPayload>> {
        Ok(vec![get_solana_message(transaction)?])
    }

    fn assemble_signed_transaction(
        &self,
        transaction: &UnsignedSolanaTransaction,
        signatures: &[CanonicalSignature],
    ) -> ChainSigResult<String> {
        let signature = single_signature(signatures)?.as_ed25519()?;
        let compiled = compile_solana_transaction(transaction, signature)?;
        log_debug!(
            "chains::solana",
            "compiled transaction",
            signature = compiled.transaction_id()
        );
        Ok(general_purpose::STANDARD.encode(compiled.raw_tx))
    }

    fn broadcast_tx(&self, signed_transaction: &str) -> ChainSigResult<String> {
        require_broadcaster(&self.broadcaster, self.family())?.broadcast(signed_transaction)
    }
}
