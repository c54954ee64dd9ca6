//! Cosmos adapter
//!
//! Addresses are bech32 (`hrp1…`) over ripemd160(sha256(compressed key)).
//! Transactions are SIGN_MODE_DIRECT with one secp256k1 signer.

use super::{require_broadcaster, single_signature, Broadcaster, ChainAdapter};
use crate::config::ChainSigConfig;
use crate::error::{ChainSigError, ChainSigResult};
use crate::keys::KeyDeriver;
use crate::log_debug;
use crate::signing::compiler::compile_cosmos_transaction;
use crate::signing::preimage::cosmos::{
    encode_msg_send, get_cosmos_sign_doc_hash, CosmosCoin, CosmosFee, CosmosMessage,
    UnsignedCosmosTransaction,
};
use crate::signing::signature::CanonicalSignature;
use crate::types::{ChainFamily, DerivedAccount, PreparedTransaction, SignPayload};
use crate::utils::crypto::hash160;
use bech32::{FromBase32, ToBase32, Variant};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosTransactionRequest {
    pub from: String,
    /// Sender's public key (compressed or uncompressed hex)
    pub public_key: String,
    pub messages: Vec<CosmosMessage>,
    pub fee: CosmosFee,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub timeout_height: u64,
    pub account_number: u64,
    pub sequence: u64,
}

pub struct CosmosAdapter {
    deriver: KeyDeriver,
    hrp: String,
    chain_id: String,
    denom: String,
    broadcaster: Option<Box<dyn Broadcaster>>,
}

impl CosmosAdapter {
    pub fn new(
        config: &ChainSigConfig,
        hrp: impl Into<String>,
        chain_id: impl Into<String>,
        denom: impl Into<String>,
    ) -> ChainSigResult<Self> {
        Ok(Self::from_deriver(KeyDeriver::new(config)?, hrp, chain_id, denom))
    }

    pub fn from_deriver(
        deriver: KeyDeriver,
        hrp: impl Into<String>,
        chain_id: impl Into<String>,
        denom: impl Into<String>,
    ) -> Self {
        Self {
            deriver,
            hrp: hrp.into(),
            chain_id: chain_id.into(),
            denom: denom.into(),
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: impl Broadcaster + 'static) -> Self {
        self.broadcaster = Some(Box::new(broadcaster));
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn denom(&self) -> &str {
        &self.denom
    }

    /// Bech32 address for a compressed key
    pub fn address_for_key(&self, compressed: &[u8]) -> ChainSigResult<String> {
        bech32::encode(&self.hrp, hash160(compressed).to_base32(), Variant::Bech32)
            .map_err(|e| ChainSigError::Format(format!("bech32 encoding failed: {}", e)))
    }

    /// Check an address belongs to this chain's prefix and carries 20 bytes
    pub fn validate_address(&self, address: &str) -> ChainSigResult<()> {
        let (hrp, data, variant) =
            bech32::decode(address).map_err(|e| ChainSigError::InvalidAddress(format!("{}: {}", address, e)))?;
        if hrp != self.hrp || variant != Variant::Bech32 {
            return Err(ChainSigError::InvalidAddress(format!(
                "expected {} address, got {}",
                self.hrp, address
            )));
        }
        let bytes = Vec::<u8>::from_base32(&data)
            .map_err(|e| ChainSigError::InvalidAddress(format!("{}: {}", address, e)))?;
        if bytes.len() != 20 {
            return Err(ChainSigError::InvalidAddress(format!(
                "{} decodes to {} bytes",
                address,
                bytes.len()
            )));
        }
        Ok(())
    }

    /// Bank send of `amount` in the adapter's denom
    pub fn msg_send(&self, from: &str, to: &str, amount: u128) -> ChainSigResult<CosmosMessage> {
        self.validate_address(from)?;
        self.validate_address(to)?;
        Ok(encode_msg_send(from, to, &[CosmosCoin::new(self.denom.clone(), amount)]))
    }

    /// Fee of `amount` in the adapter's denom
    pub fn fee(&self, amount: u128, gas: u64) -> CosmosFee {
        CosmosFee {
            amount: vec![CosmosCoin::new(self.denom.clone(), amount)],
            gas,
        }
    }
}

impl ChainAdapter for CosmosAdapter {
    type Request = CosmosTransactionRequest;
    type UnsignedTransaction = UnsignedCosmosTransaction;

    fn family(&self) -> ChainFamily {
        ChainFamily::Cosmos
    }

    fn derive_address_and_public_key(
        &self,
        predecessor_id: &str,
        path: &str,
    ) -> ChainSigResult<DerivedAccount> {
        let key = self.deriver.derive_point(predecessor_id, path)?;
        Ok(DerivedAccount {
            address: self.address_for_key(&key.serialize())?,
            public_key: hex::encode(key.serialize_uncompressed()),
        })
    }

    fn prepare_transaction_for_signing(
        &self,
        request: &CosmosTransactionRequest,
    ) -> ChainSigResult<PreparedTransaction<UnsignedCosmosTransaction>> {
        let key_bytes = hex::decode(request.public_key.trim_start_matches("0x"))?;
        let compressed = PublicKey::from_slice(&key_bytes)
            .map_err(|e| ChainSigError::Format(format!("invalid public key: {}", e)))?
            .serialize();

        if self.address_for_key(&compressed)? != request.from {
            return Err(ChainSigError::InvalidAddress(format!(
                "public key does not control {}",
                request.from
            )));
        }
        if request.fee.gas == 0 {
            return Err(ChainSigError::InvalidTransaction("gas limit is zero".to_string()));
        }

        let transaction = UnsignedCosmosTransaction {
            chain_id: self.chain_id.clone(),
            messages: request.messages.clone(),
            fee: request.fee.clone(),
            memo: request.memo.clone(),
            timeout_height: request.timeout_height,
            account_number: request.account_number,
            sequence: request.sequence,
            public_key: compressed.to_vec(),
        };

        let payloads = self.signing_payloads(&transaction)?;
        log_debug!(
            "chains::cosmos",
            "prepared transaction",
            from = request.from,
            chain_id = self.chain_id,
            messages = transaction.messages.len()
        );

        Ok(PreparedTransaction {
            transaction,
            payloads,
        })
    }

    fn signing_payloads(&self, transaction: &UnsignedCosmosTransaction) -> ChainSigResult<Vec<SignPayload>> {
        Ok(vec![get_cosmos_sign_doc_hash(transaction)?])
    }

    fn assemble_signed_transaction(
        &self,
        transaction: &UnsignedCosmosTransaction,
        signatures: &[CanonicalSignature],
    ) -> ChainSigResult<String> {
        let signature = single_signature(signatures)?.as_ecdsa()?;
        let compiled = compile_cosmos_transaction(transaction, signature)?;
        Ok(hex::encode(compiled.raw_tx))
    }

    fn broadcast_tx(&self, signed_transaction: &str) -> ChainSigResult<String> {
        require_broadcaster(&self.broadcaster, self.family())?.broadcast(signed_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::test_support;
    use crate::utils::crypto::sha256;

    fn adapter() -> CosmosAdapter {
        CosmosAdapter::from_deriver(test_support::deriver(), "cosmos", "theta-testnet-001", "uatom")
    }

    fn request(adapter: &CosmosAdapter) -> CosmosTransactionRequest {
        let account = adapter.derive_address_and_public_key("alice.near", "cosmos-1").unwrap();
        let to = adapter.address_for_key(&[2u8; 33]).unwrap();
        CosmosTransactionRequest {
            messages: vec![adapter.msg_send(&account.address, &to, 1_000).unwrap()],
            from: account.address,
            public_key: account.public_key,
            fee: adapter.fee(500, 200_000),
            memo: String::new(),
            timeout_height: 0,
            account_number: 42,
            sequence: 1,
        }
    }

    #[test]
    fn test_address_for_known_key() {
        let adapter = adapter();
        let pubkey = hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798").unwrap();
        let address = adapter.address_for_key(&pubkey).unwrap();
        assert_eq!(address, "cosmos1w508d6qejxtdg4y5r3zarvary0c5xw7k6ah60c");
        adapter.validate_address(&address).unwrap();
    }

    #[test]
    fn test_validate_address() {
        let adapter = adapter();
        assert!(adapter.validate_address("osmo1w508d6qejxtdg4y5r3zarvary0c5xw7kkzcutj").is_err());
        assert!(adapter.validate_address("cosmos1invalid").is_err());
    }

    #[test]
    fn test_full_lifecycle() {
        let adapter = adapter().with_broadcaster(|raw: &str| -> ChainSigResult<String> {
            Ok(hex::encode_upper(sha256(&hex::decode(raw).unwrap())))
        });
        let prepared = adapter.prepare_transaction_for_signing(&request(&adapter)).unwrap();
        assert_eq!(prepared.payloads.len(), 1);

        let secret = test_support::child_secret("alice.near", "cosmos-1");
        let sig = test_support::sign(&secret, prepared.payloads[0].as_digest().unwrap());
        let raw = adapter
            .finalize_transaction_signing(&prepared.transaction, &[CanonicalSignature::from(sig)])
            .unwrap();

        let txhash = adapter.broadcast_tx(&raw).unwrap();
        assert_eq!(txhash.len(), 64);
    }

    #[test]
    fn test_transaction_json_round_trip() {
        let adapter = adapter();
        let mut req = request(&adapter);
        let to = adapter.address_for_key(&[2u8; 33]).unwrap();
        req.messages = vec![adapter.msg_send(&req.from, &to, u128::MAX).unwrap()];
        req.fee = adapter.fee(u128::MAX, 200_000);
        req.memo = "memo \u{1f680}".to_string();
        req.timeout_height = u64::MAX;

        let prepared = adapter.prepare_transaction_for_signing(&req).unwrap();
        let json = adapter.serialize_transaction(&prepared.transaction).unwrap();
        assert!(json.contains(&u128::MAX.to_string()));
        let restored = adapter.deserialize_transaction(&json).unwrap();
        assert_eq!(restored, prepared.transaction);
        assert_eq!(adapter.signing_payloads(&restored).unwrap(), prepared.payloads);
    }

    #[test]
    fn test_wrong_sender_key() {
        let adapter = adapter();
        let mut req = request(&adapter);
        req.public_key = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798".to_string();
        assert!(matches!(
            adapter.prepare_transaction_for_signing(&req),
            Err(ChainSigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_assemble_without_signature() {
        let adapter = adapter();
        let prepared = adapter.prepare_transaction_for_signing(&request(&adapter)).unwrap();
        assert!(matches!(
            adapter.assemble_signed_transaction(&prepared.transaction, &[]),
            Err(ChainSigError::SignatureCountMismatch { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_ed25519_signature_rejected() {
        let adapter = adapter();
        let prepared = adapter.prepare_transaction_for_signing(&request(&adapter)).unwrap();
        let sig = crate::signing::signature::Ed25519Signature { bytes: [0u8; 64] };
        assert!(matches!(
            adapter.finalize_transaction_signing(&prepared.transaction, &[CanonicalSignature::from(sig)]),
            Err(ChainSigError::InvalidSignatureFormat(_))
        ));
    }
}
