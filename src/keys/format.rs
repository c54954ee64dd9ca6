//! Public key encodings
//!
//! - `secp256k1:<base58(X‖Y)>`: the signer network's native (NAJ) form, input only
//! - `04‖X‖Y` hex: uncompressed SEC1, the primary exchange format
//! - `(02|03)‖X` hex: compressed SEC1, produced on demand
//! - `Ed25519:<base58>`: Ed25519 keys, passed through as-is

use crate::error::{ChainSigError, ChainSigResult};
use secp256k1::PublicKey;

pub const SECP256K1_SCHEME: &str = "secp256k1";
pub const ED25519_SCHEME: &str = "Ed25519";

/// Hex length of an uncompressed SEC1 key (65 bytes)
const UNCOMPRESSED_HEX_LEN: usize = 130;

/// Convert a `secp256k1:<base58>` key to uncompressed SEC1 hex (`04…`).
///
/// The base58 part must decode to exactly 64 bytes (X‖Y).
pub fn to_uncompressed(naj_public_key: &str) -> ChainSigResult<String> {
    let (scheme, encoded) = naj_public_key
        .split_once(':')
        .ok_or_else(|| ChainSigError::Format("missing scheme prefix".to_string()))?;

    if scheme != SECP256K1_SCHEME {
        return Err(ChainSigError::Format(format!(
            "expected {} key, got {}",
            SECP256K1_SCHEME, scheme
        )));
    }

    let decoded = bs58::decode(encoded).into_vec()?;
    if decoded.len() != 64 {
        return Err(ChainSigError::Format(format!(
            "decoded key is {} bytes, expected 64",
            decoded.len()
        )));
    }

    Ok(format!("04{}", hex::encode(decoded)))
}

/// Inverse of [`to_uncompressed`]
pub fn to_naj(uncompressed: &str) -> ChainSigResult<String> {
    let bytes = decode_uncompressed(uncompressed)?;
    Ok(format!(
        "{}:{}",
        SECP256K1_SCHEME,
        bs58::encode(&bytes[1..]).into_string()
    ))
}

/// Compress an uncompressed SEC1 key. The prefix is picked from the parity
/// of the last byte of Y; no curve check is done here.
pub fn to_compressed(uncompressed: &str) -> ChainSigResult<String> {
    let bytes = decode_uncompressed(uncompressed)?;

    let prefix = if bytes[64] & 1 == 0 { "02" } else { "03" };
    Ok(format!("{}{}", prefix, hex::encode(&bytes[1..33])))
}

/// Parse uncompressed SEC1 hex into a curve point (checks the point is on the curve)
pub fn parse_uncompressed(uncompressed: &str) -> ChainSigResult<PublicKey> {
    let bytes = decode_uncompressed(uncompressed)?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| ChainSigError::Format(format!("not a secp256k1 point: {}", e)))
}

pub fn encode_uncompressed(key: &PublicKey) -> String {
    hex::encode(key.serialize_uncompressed())
}

/// Decode an `Ed25519:<base58>` key to its 32 raw bytes
pub fn ed25519_key_bytes(key: &str) -> ChainSigResult<[u8; 32]> {
    let encoded = key
        .strip_prefix(ED25519_SCHEME)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| ChainSigError::Format(format!("expected {}:<base58>", ED25519_SCHEME)))?;

    let decoded = bs58::decode(encoded).into_vec()?;
    decoded.try_into().map_err(|v: Vec<u8>| {
        ChainSigError::Format(format!("Ed25519 key is {} bytes, expected 32", v.len()))
    })
}

fn decode_uncompressed(uncompressed: &str) -> ChainSigResult<[u8; 65]> {
    let trimmed = uncompressed.trim_start_matches("0x");
    if trimmed.len() != UNCOMPRESSED_HEX_LEN {
        return Err(ChainSigError::Format(format!(
            "uncompressed key must be {} hex chars, got {}",
            UNCOMPRESSED_HEX_LEN,
            trimmed.len()
        )));
    }

    let bytes = hex::decode(trimmed)?;
    if bytes[0] != 0x04 {
        return Err(ChainSigError::Format(format!(
            "uncompressed key must start with 04, got {:02x}",
            bytes[0]
        )));
    }

    let mut out = [0u8; 65];
    out.copy_from_slice(&bytes);
    Ok(out)
}
