//! Boundary with the MPC signer network
//!
//! The crate never signs. It hands the signer a [`SignRequest`] and expects one
//! response per payload, in payload order. Responses are normalized as soon
//! as they arrive.

use crate::error::{ChainSigError, ChainSigResult};
use crate::log_debug;
use crate::signing::signature::{normalize, CanonicalSignature, MpcSignatureResponse};
use crate::types::{KeyType, SignPayload};
use serde::{Deserialize, Serialize};

/// What the signer collaborator receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    pub payloads: Vec<SignPayload>,
    pub path: String,
    pub key_type: KeyType,
    /// Account that submits the request to the signer contract (the predecessor)
    pub signer_account: String,
}

impl SignRequest {
    /// Build a request for prepared payloads; all payloads must share one key type
    pub fn new(
        payloads: Vec<SignPayload>,
        path: impl Into<String>,
        signer_account: impl Into<String>,
    ) -> ChainSigResult<Self> {
        let key_type = payloads
            .first()
            .map(|p| p.key_type)
            .ok_or_else(|| ChainSigError::InvalidTransaction("nothing to sign".to_string()))?;

        if let Some(odd) = payloads.iter().find(|p| p.key_type != key_type) {
            return Err(ChainSigError::InvalidTransaction(format!(
                "payload {} needs {} but the request is {}",
                odd.index, odd.key_type, key_type
            )));
        }

        Ok(Self {
            payloads,
            path: path.into(),
            key_type,
            signer_account: signer_account.into(),
        })
    }

    pub fn domain_id(&self) -> u32 {
        self.key_type.domain_id()
    }

    /// `sign` call arguments for payload `index`
    pub fn contract_args(&self, index: usize) -> ChainSigResult<serde_json::Value> {
        let payload = self.payloads.get(index).ok_or_else(|| {
            ChainSigError::InvalidTransaction(format!("no payload at index {}", index))
        })?;

        Ok(serde_json::json!({
            "request": {
                "payload": hex::encode(&payload.payload),
                "path": self.path,
                "domain_id": self.domain_id(),
            }
        }))
    }
}

/// External signer. Implementations may sign payloads concurrently but must
/// return responses in request order.
pub trait MpcSigner {
    fn sign(&self, request: &SignRequest) -> ChainSigResult<Vec<MpcSignatureResponse>>;
}

impl<F> MpcSigner for F
where
    F: Fn(&SignRequest) -> ChainSigResult<Vec<MpcSignatureResponse>>,
{
    fn sign(&self, request: &SignRequest) -> ChainSigResult<Vec<MpcSignatureResponse>> {
        self(request)
    }
}

/// Ask `signer` for signatures and normalize them.
///
/// Signer errors are returned unchanged. A response count that differs from
/// the payload count, or a response of the wrong scheme, is rejected.
pub fn sign_payloads<S: MpcSigner + ?Sized>(
    signer: &S,
    request: &SignRequest,
) -> ChainSigResult<Vec<CanonicalSignature>> {
    log_debug!(
        "signing::mpc",
        "requesting signatures",
        payloads = request.payloads.len(),
        key_type = request.key_type,
        signer_account = request.signer_account
    );

    let responses = signer.sign(request)?;
    if responses.len() != request.payloads.len() {
        return Err(ChainSigError::SignatureCountMismatch {
            expected: request.payloads.len(),
            actual: responses.len(),
        });
    }

    responses
        .iter()
        .map(|response| {
            let sig = normalize(response)?;
            match (request.key_type, &sig) {
                (KeyType::Ecdsa, CanonicalSignature::Ecdsa(_))
                | (KeyType::Eddsa, CanonicalSignature::Ed25519(_)) => Ok(sig),
                _ => Err(ChainSigError::InvalidSignatureFormat(format!(
                    "signer returned the wrong scheme for a {} request",
                    request.key_type
                ))),
            }
        })
        .collect()
}

/// Restore prepare-time order for signatures that completed out of order.
///
/// Each entry carries the payload index it was produced for. Exactly one
/// signature per index in `0..expected` is required.
pub fn order_by_payload_index(
    mut tagged: Vec<(usize, CanonicalSignature)>,
    expected: usize,
) -> ChainSigResult<Vec<CanonicalSignature>> {
    if tagged.len() != expected {
        return Err(ChainSigError::SignatureCountMismatch {
            expected,
            actual: tagged.len(),
        });
    }

    tagged.sort_by_key(|(index, _)| *index);
    for (position, (index, _)) in tagged.iter().enumerate() {
        if *index != position {
            // a duplicate or an out-of-range index leaves `position` unfilled
            return Err(ChainSigError::SignatureMismatch { index: position });
        }
    }

    Ok(tagged.into_iter().map(|(_, sig)| sig).collect())
}
