//! Transaction Broadcasting
//!
//! Submits finalized transactions to a node or public API and returns the
//! chain's transaction id. Failures are reported as-is; nothing here retries.

use crate::config::RpcEndpoint;
use crate::error::{ChainSigError, ChainSigResult};
use crate::log_info;
use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anything that can push a serialized transaction to a network
pub trait Broadcaster: Send + Sync {
    /// Submit `raw_tx` (in the adapter's output encoding) and return the tx id
    fn broadcast(&self, raw_tx: &str) -> ChainSigResult<String>;
}

impl<F> Broadcaster for F
where
    F: Fn(&str) -> ChainSigResult<String> + Send + Sync,
{
    fn broadcast(&self, raw_tx: &str) -> ChainSigResult<String> {
        self(raw_tx)
    }
}

pub(crate) fn create_client() -> ChainSigResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ChainSigError::Network(format!("Failed to create HTTP client: {}", e)))
}

#[derive(Serialize)]
struct RpcRequest<P: Serialize> {
    jsonrpc: &'static str,
    method: &'static str,
    params: P,
    id: u32,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

fn send_json_rpc<P: Serialize>(url: &str, method: &'static str, params: P) -> ChainSigResult<String> {
    let client = create_client()?;

    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(&RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        })
        .send()
        .map_err(|e| ChainSigError::Network(format!("RPC request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(ChainSigError::Network(format!(
            "RPC returned status {}",
            response.status()
        )));
    }

    let result: RpcResponse = response
        .json()
        .map_err(|e| ChainSigError::Serialization(format!("Failed to parse RPC response: {}", e)))?;

    if let Some(error) = result.error {
        return Err(ChainSigError::BroadcastRejected(error.message));
    }

    result
        .result
        .ok_or_else(|| ChainSigError::BroadcastRejected("No txid in response".to_string()))
}

// =============================================================================
// EVM
// =============================================================================

/// `eth_sendRawTransaction` against a JSON-RPC node
#[derive(Debug, Clone)]
pub struct EvmRpcBroadcaster {
    endpoint: RpcEndpoint,
}

impl EvmRpcBroadcaster {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Broadcaster for EvmRpcBroadcaster {
    fn broadcast(&self, raw_tx: &str) -> ChainSigResult<String> {
        let tx_with_prefix = if raw_tx.starts_with("0x") {
            raw_tx.to_string()
        } else {
            format!("0x{}", raw_tx)
        };

        let txid = send_json_rpc(self.endpoint.as_str(), "eth_sendRawTransaction", vec![tx_with_prefix])?;
        log_info!("chains::broadcast", "EVM transaction accepted", txid = txid);
        Ok(txid)
    }
}

// =============================================================================
// Bitcoin
// =============================================================================

/// Esplora-compatible `POST /tx` (mempool.space, blockstream.info)
#[derive(Debug, Clone)]
pub struct EsploraBroadcaster {
    endpoint: RpcEndpoint,
}

impl EsploraBroadcaster {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Broadcaster for EsploraBroadcaster {
    fn broadcast(&self, raw_tx: &str) -> ChainSigResult<String> {
        let client = create_client()?;

        let response = client
            .post(self.endpoint.join("tx"))
            .header("Content-Type", "text/plain")
            .body(raw_tx.to_string())
            .send()
            .map_err(|e| ChainSigError::Network(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let body = response.text().unwrap_or_default();

        if !status.is_success() {
            return Err(ChainSigError::BroadcastRejected(format!(
                "Bitcoin broadcast failed: {}",
                body
            )));
        }

        let txid = body.trim().to_string();
        log_info!("chains::broadcast", "Bitcoin transaction accepted", txid = txid);
        Ok(txid)
    }
}

// =============================================================================
// Cosmos
// =============================================================================

/// Cosmos SDK REST `POST /cosmos/tx/v1beta1/txs`. Takes hex `TxRaw` and
/// sends it base64-encoded.
#[derive(Debug, Clone)]
pub struct CosmosRestBroadcaster {
    endpoint: RpcEndpoint,
}

impl CosmosRestBroadcaster {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Broadcaster for CosmosRestBroadcaster {
    fn broadcast(&self, raw_tx: &str) -> ChainSigResult<String> {
        #[derive(Serialize)]
        struct BroadcastRequest {
            tx_bytes: String,
            mode: &'static str,
        }

        #[derive(Deserialize)]
        struct BroadcastResponse {
            tx_response: Option<TxResponse>,
        }

        #[derive(Deserialize)]
        struct TxResponse {
            txhash: String,
            #[serde(default)]
            code: u32,
            #[serde(default)]
            raw_log: String,
        }

        let tx_bytes = general_purpose::STANDARD.encode(hex::decode(raw_tx.trim_start_matches("0x"))?);

        let client = create_client()?;
        let response = client
            .post(self.endpoint.join("cosmos/tx/v1beta1/txs"))
            .json(&BroadcastRequest {
                tx_bytes,
                mode: "BROADCAST_MODE_SYNC",
            })
            .send()
            .map_err(|e| ChainSigError::Network(format!("Cosmos broadcast failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ChainSigError::BroadcastRejected(body));
        }

        let result: BroadcastResponse = response.json().map_err(|e| {
            ChainSigError::Serialization(format!("Failed to parse Cosmos response: {}", e))
        })?;

        let tx = result
            .tx_response
            .ok_or_else(|| ChainSigError::BroadcastRejected("No tx_response".to_string()))?;

        if tx.code != 0 {
            return Err(ChainSigError::BroadcastRejected(format!(
                "code {}: {}",
                tx.code, tx.raw_log
            )));
        }

        log_info!("chains::broadcast", "Cosmos transaction accepted", txid = tx.txhash);
        Ok(tx.txhash)
    }
}

// =============================================================================
// Solana
// =============================================================================

/// Solana JSON-RPC `sendTransaction` with base64 encoding
#[derive(Debug, Clone)]
pub struct SolanaRpcBroadcaster {
    endpoint: RpcEndpoint,
}

impl SolanaRpcBroadcaster {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Broadcaster for SolanaRpcBroadcaster {
    fn broadcast(&self, raw_tx: &str) -> ChainSigResult<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SendOptions {
            encoding: &'static str,
            preflight_commitment: &'static str,
        }

        let txid = send_json_rpc(
            self.endpoint.as_str(),
            "sendTransaction",
            (
                raw_tx.to_string(),
                SendOptions {
                    encoding: "base64",
                    preflight_commitment: "confirmed",
                },
            ),
        )?;
        log_info!("chains::broadcast", "Solana transaction accepted", txid = txid);
        Ok(txid)
    }
}
