//! Deployment configuration
//!
//! The root public key and signer contract of each environment are static
//! data. They are handed to the derivation engine and the adapters through an
//! explicit [`ChainSigConfig`] rather than looked up implicitly.

use crate::error::{ChainSigError, ChainSigResult};
use crate::keys::{format, KdfChain};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Signer deployment environments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Testnet,
    Mainnet,
}

const TESTNET_ROOT_PUBLIC_KEY: &str = "secp256k1:4NfTiv3UsGahebgTaHyD9vF8KYKMBnfd6kh94mK6xv8fGBiJB8TBtFMP5WWXz6B89Ac1fbpzPwAvoyQebemHFwx3";
const MAINNET_ROOT_PUBLIC_KEY: &str = "secp256k1:3tFRbMqmoa6AAALMrEFAYCEoHcqKxeW38YptwowBVBtXK1vo36HDbUWuR6EZmoK4JcH6HDkNMGGqP1ouV7VZUWya";

const TESTNET_CONTRACT_ID: &str = "v1.signer-prod.testnet";
const MAINNET_CONTRACT_ID: &str = "v1.signer";

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Testnet, Environment::Mainnet];

    /// Root key in `secp256k1:<base58>` form
    pub fn root_public_key(&self) -> &'static str {
        match self {
            Environment::Testnet => TESTNET_ROOT_PUBLIC_KEY,
            Environment::Mainnet => MAINNET_ROOT_PUBLIC_KEY,
        }
    }

    /// Account id of the signer contract
    pub fn contract_id(&self) -> &'static str {
        match self {
            Environment::Testnet => TESTNET_CONTRACT_ID,
            Environment::Mainnet => MAINNET_CONTRACT_ID,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Testnet => write!(f, "testnet"),
            Environment::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl FromStr for Environment {
    type Err = ChainSigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "testnet" => Ok(Environment::Testnet),
            "mainnet" => Ok(Environment::Mainnet),
            other => Err(ChainSigError::Config(format!("Unknown environment: {}", other))),
        }
    }
}

/// Root public key of the signer contract `contract_id` (case-insensitive)
pub fn root_public_key_for_contract(contract_id: &str) -> ChainSigResult<&'static str> {
    Environment::ALL
        .iter()
        .find(|env| env.contract_id().eq_ignore_ascii_case(contract_id))
        .map(|env| env.root_public_key())
        .ok_or_else(|| ChainSigError::Config(format!("Unknown signer contract: {}", contract_id)))
}

/// Everything the derivation engine and adapters need to know about the deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSigConfig {
    /// `None` for a custom deployment
    pub environment: Option<Environment>,
    pub contract_id: String,
    /// `secp256k1:<base58>`
    pub root_public_key: String,
    /// Derivation domain used by adapters
    pub kdf_chain: KdfChain,
}

/// On-disk shape; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    environment: Option<Environment>,
    contract_id: Option<String>,
    root_public_key: Option<String>,
    kdf_chain: Option<KdfChain>,
}

impl ChainSigConfig {
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment: Some(environment),
            contract_id: environment.contract_id().to_string(),
            root_public_key: environment.root_public_key().to_string(),
            kdf_chain: KdfChain::Near,
        }
    }

    pub fn from_contract_id(contract_id: &str) -> ChainSigResult<Self> {
        let environment = Environment::ALL
            .into_iter()
            .find(|env| env.contract_id().eq_ignore_ascii_case(contract_id))
            .ok_or_else(|| {
                ChainSigError::Config(format!("Unknown signer contract: {}", contract_id))
            })?;
        Ok(Self::for_environment(environment))
    }

    /// Override the root key (custom deployments); the key is validated here
    pub fn with_root_public_key(mut self, root_public_key: &str) -> ChainSigResult<Self> {
        format::to_uncompressed(root_public_key)?;
        self.root_public_key = root_public_key.to_string();
        self.environment = None;
        Ok(self)
    }

    pub fn with_kdf_chain(mut self, kdf_chain: KdfChain) -> Self {
        self.kdf_chain = kdf_chain;
        self
    }

    /// Parse a JSON configuration document.
    ///
    /// `environment` (or a known `contract_id`) selects the base table entry;
    /// `root_public_key` and `kdf_chain` override it.
    pub fn from_json_str(json: &str) -> ChainSigResult<Self> {
        let file: ConfigFile = serde_json::from_str(json)
            .map_err(|e| ChainSigError::Config(format!("Invalid configuration: {}", e)))?;

        let mut config = match (file.environment, file.contract_id.as_deref()) {
            (Some(env), _) => Self::for_environment(env),
            (None, Some(contract_id)) => match Self::from_contract_id(contract_id) {
                Ok(config) => config,
                Err(e) if file.root_public_key.is_none() => return Err(e),
                Err(_) => Self {
                    environment: None,
                    contract_id: contract_id.to_string(),
                    root_public_key: String::new(),
                    kdf_chain: KdfChain::Near,
                },
            },
            (None, None) => {
                return Err(ChainSigError::Config(
                    "environment or contract_id is required".to_string(),
                ))
            }
        };

        if let Some(contract_id) = file.contract_id {
            config.contract_id = contract_id;
        }
        if let Some(root) = file.root_public_key {
            config = config.with_root_public_key(&root)?;
        }
        if let Some(kdf_chain) = file.kdf_chain {
            config.kdf_chain = kdf_chain;
        }

        Ok(config)
    }

    /// Root key as uncompressed SEC1 hex
    pub fn root_uncompressed(&self) -> ChainSigResult<String> {
        format::to_uncompressed(&self.root_public_key)
    }
}

impl Default for ChainSigConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Testnet)
    }
}

// =============================================================================
// RPC endpoints
// =============================================================================

/// A validated collaborator endpoint (RPC node, broadcast API)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    url: Url,
}

impl RpcEndpoint {
    /// HTTPS is required except for local development hosts.
    pub fn parse(url: &str) -> ChainSigResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| ChainSigError::Config(format!("Invalid URL format: {}", e)))?;

        match parsed.scheme() {
            "https" => {}
            "http" => {
                let host = parsed.host_str().unwrap_or_default();
                if !is_local_host(host) {
                    return Err(ChainSigError::Config(format!(
                        "HTTPS required for remote endpoint {}",
                        host
                    )));
                }
            }
            other => {
                return Err(ChainSigError::Config(format!("Unsupported URL scheme: {}", other)))
            }
        }

        if parsed.host_str().is_none() {
            return Err(ChainSigError::Config("Endpoint URL has no host".to_string()));
        }

        Ok(Self { url: parsed })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Append a path segment, e.g. `tx` or `cosmos/tx/v1beta1/txs`
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

fn is_local_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host.starts_with("192.168.")
}
