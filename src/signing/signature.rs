//! MPC signature normalization
//!
//! Signer deployments answer in several JSON shapes. They are parsed into
//! [`MpcSignatureResponse`] where the response first enters the crate and
//! converted straight away into a [`CanonicalSignature`]; nothing downstream
//! looks at the wire shape.

use crate::error::{ChainSigError, ChainSigResult};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Offset added to the raw recovery id to form `v`
pub const RECOVERY_ID_OFFSET: u8 = 27;

// =============================================================================
// Wire shapes
// =============================================================================

/// Raw response from the MPC network, one per payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MpcSignatureResponse {
    /// `{big_r: {affine_point}, s: {scalar}, recovery_id}`
    Nested {
        big_r: AffinePoint,
        s: ScalarField,
        recovery_id: u8,
    },
    /// `{big_r, s, recovery_id}` with hex strings
    Flat {
        big_r: String,
        s: String,
        recovery_id: u8,
    },
    /// `{bigR: {x, y}, s, recoveryId}` with integer fields
    Numeric {
        #[serde(rename = "bigR")]
        big_r: NumericPoint,
        s: U256Value,
        #[serde(rename = "recoveryId")]
        recovery_id: u8,
    },
    /// `{scheme: "Ed25519", signature: [u8; 64]}`
    Ed25519 {
        scheme: Ed25519Scheme,
        signature: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinePoint {
    /// Compressed SEC1 hex of R
    pub affine_point: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarField {
    pub scalar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericPoint {
    pub x: U256Value,
    pub y: U256Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ed25519Scheme {
    Ed25519,
}

/// 256-bit unsigned integer, big-endian.
///
/// Accepts a JSON integer, a decimal string or a `0x` hex string. Large
/// values can only arrive as strings since JSON numbers stop at 64 bits here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U256Value(pub [u8; 32]);

impl U256Value {
    pub fn from_u64(value: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&value.to_be_bytes());
        Self(out)
    }

    pub fn from_decimal(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let mut out = [0u8; 32];
        for ch in s.chars() {
            let digit = ch.to_digit(10)?;
            let mut carry = digit;
            for byte in out.iter_mut().rev() {
                let v = (*byte as u32) * 10 + carry;
                *byte = (v & 0xff) as u8;
                carry = v >> 8;
            }
            if carry != 0 {
                return None;
            }
        }
        Some(Self(out))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x")?;
        if digits.is_empty() || digits.len() > 64 {
            return None;
        }
        let padded = format!("{:0>64}", digits);
        let bytes = hex::decode(padded).ok()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Self(out))
    }

    /// 64 hex chars, zero-padded
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for U256Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", self.to_hex()))
    }
}

impl<'de> Deserialize<'de> for U256Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct U256Visitor;

        impl<'de> Visitor<'de> for U256Visitor {
            type Value = U256Value;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an unsigned integer, decimal string or 0x-hex string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256Value, E> {
                Ok(U256Value::from_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<U256Value, E> {
                let parsed = if v.starts_with("0x") {
                    U256Value::from_hex(v)
                } else {
                    U256Value::from_decimal(v)
                };
                parsed.ok_or_else(|| E::custom(format!("not a 256-bit integer: {}", v)))
            }
        }

        deserializer.deserialize_any(U256Visitor)
    }
}

// =============================================================================
// Canonical form
// =============================================================================

/// ECDSA signature with `v` in {27, 28}.
///
/// Every constructor, deserialization included, checks `v` and the
/// 64-hex-char `r`/`s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RsvFields")]
pub struct RsvSignature {
    /// 32-byte hex, no prefix
    r: String,
    /// 32-byte hex, no prefix
    s: String,
    v: u8,
}

/// Unchecked wire form of [`RsvSignature`]
#[derive(Deserialize)]
struct RsvFields {
    r: String,
    s: String,
    v: u8,
}

impl TryFrom<RsvFields> for RsvSignature {
    type Error = ChainSigError;

    fn try_from(fields: RsvFields) -> Result<Self, Self::Error> {
        RsvSignature::from_rsv(&fields.r, &fields.s, fields.v)
    }
}

impl RsvSignature {
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> ChainSigResult<Self> {
        Self::from_parts(hex::encode(r), hex::encode(s), recovery_id)
    }

    /// From hex `r`, `s` and `v` (27 or 28)
    pub fn from_rsv(r: &str, s: &str, v: u8) -> ChainSigResult<Self> {
        let recovery_id = match v {
            27 | 28 => v - RECOVERY_ID_OFFSET,
            other => {
                return Err(ChainSigError::InvalidSignatureFormat(format!(
                    "v must be 27 or 28, got {}",
                    other
                )))
            }
        };
        Self::from_parts(r.to_lowercase(), s.to_lowercase(), recovery_id)
    }

    fn from_parts(r: String, s: String, recovery_id: u8) -> ChainSigResult<Self> {
        if recovery_id > 1 {
            return Err(ChainSigError::InvalidSignatureFormat(format!(
                "recovery id must be 0 or 1, got {}",
                recovery_id
            )));
        }
        check_scalar_hex("r", &r)?;
        check_scalar_hex("s", &s)?;
        Ok(Self {
            r,
            s,
            v: recovery_id + RECOVERY_ID_OFFSET,
        })
    }

    pub fn r(&self) -> &str {
        &self.r
    }

    pub fn s(&self) -> &str {
        &self.s
    }

    pub fn v(&self) -> u8 {
        self.v
    }

    /// Raw recovery id (0 or 1)
    pub fn recovery_id(&self) -> u8 {
        self.v - RECOVERY_ID_OFFSET
    }

    pub fn r_bytes(&self) -> ChainSigResult<[u8; 32]> {
        scalar_bytes(&self.r)
    }

    pub fn s_bytes(&self) -> ChainSigResult<[u8; 32]> {
        scalar_bytes(&self.s)
    }

    /// `r‖s`
    pub fn to_compact(&self) -> ChainSigResult<[u8; 64]> {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r_bytes()?);
        out[32..].copy_from_slice(&self.s_bytes()?);
        Ok(out)
    }
}

/// Raw Ed25519 signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519Signature {
    #[serde(with = "crate::serde_bytes::hex64")]
    pub bytes: [u8; 64],
}

/// The only signature form adapters accept on finalize
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalSignature {
    Ecdsa(RsvSignature),
    Ed25519(Ed25519Signature),
}

impl CanonicalSignature {
    pub fn as_ecdsa(&self) -> ChainSigResult<&RsvSignature> {
        match self {
            CanonicalSignature::Ecdsa(sig) => Ok(sig),
            CanonicalSignature::Ed25519(_) => Err(ChainSigError::InvalidSignatureFormat(
                "expected an ECDSA signature, got Ed25519".to_string(),
            )),
        }
    }

    pub fn as_ed25519(&self) -> ChainSigResult<&Ed25519Signature> {
        match self {
            CanonicalSignature::Ed25519(sig) => Ok(sig),
            CanonicalSignature::Ecdsa(_) => Err(ChainSigError::InvalidSignatureFormat(
                "expected an Ed25519 signature, got ECDSA".to_string(),
            )),
        }
    }
}

impl From<RsvSignature> for CanonicalSignature {
    fn from(sig: RsvSignature) -> Self {
        CanonicalSignature::Ecdsa(sig)
    }
}

impl From<Ed25519Signature> for CanonicalSignature {
    fn from(sig: Ed25519Signature) -> Self {
        CanonicalSignature::Ed25519(sig)
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Convert any recognized response shape into a [`CanonicalSignature`].
///
/// `r` is the X coordinate of R (the parity byte of `big_r` is dropped), `s`
/// is kept as delivered and `v` is the recovery id plus 27.
pub fn normalize(response: &MpcSignatureResponse) -> ChainSigResult<CanonicalSignature> {
    match response {
        MpcSignatureResponse::Nested { big_r, s, recovery_id } => {
            let r = strip_parity_prefix(&big_r.affine_point)?;
            Ok(RsvSignature::from_parts(r, s.scalar.clone(), *recovery_id)?.into())
        }
        MpcSignatureResponse::Flat { big_r, s, recovery_id } => {
            let r = strip_parity_prefix(big_r)?;
            Ok(RsvSignature::from_parts(r, s.clone(), *recovery_id)?.into())
        }
        MpcSignatureResponse::Numeric { big_r, s, recovery_id } => {
            Ok(RsvSignature::from_parts(big_r.x.to_hex(), s.to_hex(), *recovery_id)?.into())
        }
        MpcSignatureResponse::Ed25519 { signature, .. } => {
            let bytes: [u8; 64] = signature.as_slice().try_into().map_err(|_| {
                ChainSigError::InvalidSignatureFormat(format!(
                    "Ed25519 signature is {} bytes, expected 64",
                    signature.len()
                ))
            })?;
            Ok(Ed25519Signature { bytes }.into())
        }
    }
}

/// Normalize a response still in JSON form
pub fn normalize_value(value: &serde_json::Value) -> ChainSigResult<CanonicalSignature> {
    let response = MpcSignatureResponse::deserialize(value).map_err(|_| {
        ChainSigError::InvalidSignatureFormat("response matches no known signature shape".to_string())
    })?;
    normalize(&response)
}

pub fn normalize_json(json: &str) -> ChainSigResult<CanonicalSignature> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| ChainSigError::InvalidSignatureFormat(format!("not JSON: {}", e)))?;
    normalize_value(&value)
}

pub fn normalize_all(responses: &[MpcSignatureResponse]) -> ChainSigResult<Vec<CanonicalSignature>> {
    responses.iter().map(normalize).collect()
}

fn strip_parity_prefix(big_r: &str) -> ChainSigResult<String> {
    if big_r.len() != 66 || !big_r.is_ascii() {
        return Err(ChainSigError::InvalidSignatureFormat(format!(
            "big_r must be a 33-byte compressed point, got {} chars",
            big_r.len()
        )));
    }
    Ok(big_r[2..].to_string())
}

fn check_scalar_hex(name: &str, value: &str) -> ChainSigResult<()> {
    if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChainSigError::InvalidSignatureFormat(format!(
            "{} must be 64 hex chars",
            name
        )));
    }
    Ok(())
}

fn scalar_bytes(value: &str) -> ChainSigResult<[u8; 32]> {
    let bytes = hex::decode(value)
        .map_err(|e| ChainSigError::InvalidSignatureFormat(format!("bad hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| ChainSigError::InvalidSignatureFormat("scalar must be 32 bytes".to_string()))
}
