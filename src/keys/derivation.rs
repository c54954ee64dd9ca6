//! Epsilon key derivation
//!
//! A child key is `P + e·G`, where `P` is the root point and `e` is the hash
//! of `"sig.network v1.0.0 epsilon derivation,{chain},{predecessor},{path}"`
//! reduced modulo the group order. The signer contract computes the same
//! value, so the message layout and hash choice must never change.

use crate::config::ChainSigConfig;
use crate::error::{ChainSigError, ChainSigResult};
use crate::keys::format;
use crate::log_debug;
use crate::utils::crypto::{keccak256, sha3_256};
use secp256k1::constants::CURVE_ORDER;
use secp256k1::{PublicKey, Scalar, Secp256k1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const EPSILON_DERIVATION_PREFIX: &str = "sig.network v1.0.0 epsilon derivation";

/// Derivation domains understood by the signer contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KdfChain {
    /// Requests relayed from an EVM chain; Keccak-256
    #[serde(rename = "0x1")]
    Ethereum,
    /// Requests made on NEAR itself; SHA3-256
    #[serde(rename = "0x18d")]
    Near,
}

impl KdfChain {
    pub fn tag(&self) -> &'static str {
        match self {
            KdfChain::Ethereum => "0x1",
            KdfChain::Near => "0x18d",
        }
    }

    pub fn from_tag(tag: &str) -> ChainSigResult<Self> {
        match tag {
            "0x1" => Ok(KdfChain::Ethereum),
            "0x18d" => Ok(KdfChain::Near),
            other => Err(ChainSigError::UnsupportedChain(other.to_string())),
        }
    }

    fn hash(&self, message: &[u8]) -> [u8; 32] {
        match self {
            KdfChain::Ethereum => keccak256(message),
            KdfChain::Near => sha3_256(message),
        }
    }
}

impl fmt::Display for KdfChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for KdfChain {
    type Err = ChainSigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" | "evm" => Ok(KdfChain::Ethereum),
            "near" => Ok(KdfChain::Near),
            _ => KdfChain::from_tag(s),
        }
    }
}

pub fn derivation_message(chain: KdfChain, predecessor_id: &str, path: &str) -> String {
    format!(
        "{},{},{},{}",
        EPSILON_DERIVATION_PREFIX,
        chain.tag(),
        predecessor_id,
        path
    )
}

/// The tweak `e` for a derivation path
pub fn derive_epsilon(chain: KdfChain, predecessor_id: &str, path: &str) -> ChainSigResult<Scalar> {
    let message = derivation_message(chain, predecessor_id, path);
    let digest = reduce_mod_order(chain.hash(message.as_bytes()));
    Scalar::from_be_bytes(digest)
        .map_err(|_| ChainSigError::Crypto("epsilon out of range after reduction".to_string()))
}

/// Subtract the group order once if needed. `2^256 < 2n`, so a single
/// subtraction always lands in `[0, n)`.
fn reduce_mod_order(mut bytes: [u8; 32]) -> [u8; 32] {
    if bytes < CURVE_ORDER {
        return bytes;
    }

    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let diff = bytes[i] as i16 - CURVE_ORDER[i] as i16 - borrow;
        if diff < 0 {
            bytes[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            bytes[i] = diff as u8;
            borrow = 0;
        }
    }
    bytes
}

/// `root + e·G` on curve points
pub fn derive_point(
    root: &PublicKey,
    predecessor_id: &str,
    path: &str,
    chain: KdfChain,
) -> ChainSigResult<PublicKey> {
    let epsilon = derive_epsilon(chain, predecessor_id, path)?;
    let secp = Secp256k1::verification_only();
    root.add_exp_tweak(&secp, &epsilon)
        .map_err(|e| ChainSigError::Crypto(format!("derived point is invalid: {}", e)))
}

/// Derive a child key from an uncompressed root key, all values hex.
///
/// `chain_tag` must be `0x1` or `0x18d`; anything else is `UnsupportedChain`.
/// The predecessor is used exactly as given.
pub fn derive(
    root_uncompressed: &str,
    predecessor_id: &str,
    path: &str,
    chain_tag: &str,
) -> ChainSigResult<String> {
    let chain = KdfChain::from_tag(chain_tag)?;
    let root = format::parse_uncompressed(root_uncompressed)?;
    let child = derive_point(&root, predecessor_id, path, chain)?;
    Ok(format::encode_uncompressed(&child))
}

/// Derivation bound to one deployment (root key + domain).
///
/// Predecessor ids are lower-cased first, matching how the signer contract
/// sees account ids and checksummed EVM addresses alike.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    root: PublicKey,
    kdf_chain: KdfChain,
}

impl KeyDeriver {
    pub fn new(config: &ChainSigConfig) -> ChainSigResult<Self> {
        let root = format::parse_uncompressed(&config.root_uncompressed()?)?;
        Ok(Self {
            root,
            kdf_chain: config.kdf_chain,
        })
    }

    pub fn from_root(root_uncompressed: &str, kdf_chain: KdfChain) -> ChainSigResult<Self> {
        Ok(Self {
            root: format::parse_uncompressed(root_uncompressed)?,
            kdf_chain,
        })
    }

    pub fn kdf_chain(&self) -> KdfChain {
        self.kdf_chain
    }

    pub fn root_public_key(&self) -> String {
        format::encode_uncompressed(&self.root)
    }

    pub fn derive_point(&self, predecessor_id: &str, path: &str) -> ChainSigResult<PublicKey> {
        let predecessor = predecessor_id.to_lowercase();
        log_debug!(
            "keys::derivation",
            "deriving child key",
            predecessor = predecessor,
            path = path,
            chain = self.kdf_chain
        );
        derive_point(&self.root, &predecessor, path, self.kdf_chain)
    }

    /// Uncompressed SEC1 hex of the child key
    pub fn derive_public_key(&self, predecessor_id: &str, path: &str) -> ChainSigResult<String> {
        let point = self.derive_point(predecessor_id, path)?;
        Ok(format::encode_uncompressed(&point))
    }
}
