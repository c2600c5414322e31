//! Starknet JSON-RPC client.
//!
//! Read-only access to the chain: contract calls, transaction receipts and
//! a block-number liveness probe used to pick an endpoint at startup.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ethers_core::utils::keccak256;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blockchain::models::{ExecutionOutcome, TransactionReceipt};

/// Node error code for an unknown transaction hash.
const TXN_HASH_NOT_FOUND: i64 = 29;

/// Error object returned by a Starknet node.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("RPC error {code}: {message}{}", format_data(.data))]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

fn format_data(data: &Option<Value>) -> String {
    data.as_ref().map(|d| format!(" ({})", d)).unwrap_or_default()
}

fn rpc_request(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    })
}

/// `starknet_keccak` of an entry point name: keccak256 truncated to 250 bits.
/// Values that are already hex selectors are passed through.
pub fn entry_point_selector(name: &str) -> String {
    if name.starts_with("0x") {
        return name.to_string();
    }
    let mut hash = keccak256(name.as_bytes());
    hash[0] &= 0x03;
    let encoded = hex::encode(hash);
    let trimmed = encoded.trim_start_matches('0');
    format!("0x{}", if trimmed.is_empty() { "0" } else { trimmed })
}

/// Client for a single Starknet RPC endpoint
#[derive(Clone, Debug)]
pub struct StarknetClient {
    rpc_url: String,
    client: Client,
}

impl StarknetClient {
    /// Create a client for the given endpoint without contacting it
    pub fn new(rpc_url: &str) -> Result<Self> {
        url::Url::parse(rpc_url).with_context(|| format!("Invalid Starknet RPC URL: {}", rpc_url))?;
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            client: Client::new(),
        })
    }

    /// Tries each endpoint in order and keeps the first one that answers a
    /// liveness probe. There is no failover after this point.
    pub async fn connect(urls: &[String]) -> Result<Self> {
        for url in urls {
            let candidate = match Self::new(url) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping RPC endpoint {}: {}", url, e);
                    continue;
                }
            };
            match candidate.block_number().await {
                Ok(block) => {
                    info!("Using Starknet RPC endpoint {} (latest block {})", url, block);
                    return Ok(candidate);
                }
                Err(e) => warn!("RPC endpoint {} failed liveness check: {}", url, e),
            }
        }
        Err(anyhow!("No Starknet RPC endpoint responded (tried {})", urls.len()))
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let payload = rpc_request(method, params);
        debug!("RPC {} -> {}", method, payload);

        let resp: Value = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("network error calling {}", method))?
            .json()
            .await
            .with_context(|| format!("invalid JSON from {}", method))?;

        if let Some(err) = resp.get("error") {
            let rpc_err = RpcError {
                code: err.get("code").and_then(|c| c.as_i64()).unwrap_or_default(),
                message: err.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error").to_string(),
                data: err.get("data").cloned(),
            };
            return Err(rpc_err.into());
        }
        resp.get("result")
            .cloned()
            .ok_or_else(|| anyhow!("RPC response to {} missing 'result' field: {}", method, resp))
    }

    /// Get current block number
    pub async fn block_number(&self) -> Result<u64> {
        let result = self.request("starknet_blockNumber", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| anyhow!("starknet_blockNumber returned non-integer: {}", result))
    }

    /// Call a contract view function and return the raw result
    pub async fn call_contract(&self, contract_address: &str, entry_point: &str, calldata: &[String]) -> Result<Value> {
        self.request(
            "starknet_call",
            json!([
                {
                    "contract_address": contract_address,
                    "entry_point_selector": entry_point_selector(entry_point),
                    "calldata": calldata
                },
                "latest"
            ]),
        )
        .await
    }

    /// Receipt of an accepted transaction, or `None` while the node does not
    /// know the hash yet or has not accepted it on L2.
    pub async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>> {
        let result = match self.request("starknet_getTransactionReceipt", json!([tx_hash])).await {
            Ok(v) => v,
            Err(e) => {
                if let Some(rpc_err) = e.downcast_ref::<RpcError>() {
                    if rpc_err.code == TXN_HASH_NOT_FOUND {
                        return Ok(None);
                    }
                }
                return Err(e);
            }
        };

        let receipt: RpcReceipt = serde_json::from_value(result).context("malformed transaction receipt")?;
        Ok(receipt.into_receipt())
    }

    /// Polls until the transaction is accepted. Waits indefinitely; callers
    /// that need a bound race this against a cancellation signal.
    pub async fn wait_for_transaction(&self, tx_hash: &str, poll_interval: Duration) -> Result<TransactionReceipt> {
        loop {
            if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            debug!("Transaction {} not final yet, polling again in {:?}", tx_hash, poll_interval);
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcReceipt {
    transaction_hash: String,
    #[serde(default)]
    execution_status: Option<String>,
    #[serde(default)]
    finality_status: Option<String>,
    #[serde(default)]
    revert_reason: Option<String>,
    #[serde(default)]
    block_hash: Option<String>,
    #[serde(default)]
    block_number: Option<u64>,
}

impl RpcReceipt {
    fn into_receipt(self) -> Option<TransactionReceipt> {
        let accepted = matches!(
            self.finality_status.as_deref(),
            Some("ACCEPTED_ON_L2") | Some("ACCEPTED_ON_L1")
        );
        let reverted = self.execution_status.as_deref() == Some("REVERTED");
        if !accepted && !reverted {
            return None;
        }
        let execution = if reverted {
            ExecutionOutcome::Reverted(self.revert_reason.unwrap_or_else(|| "transaction reverted".to_string()))
        } else {
            ExecutionOutcome::Succeeded
        };
        Some(TransactionReceipt {
            transaction_hash: self.transaction_hash,
            block_number: self.block_number,
            block_hash: self.block_hash,
            execution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_request_sets_method_and_id() {
        let req = rpc_request("starknet_blockNumber", json!([]));
        assert_eq!(req.get("method").and_then(|v| v.as_str()), Some("starknet_blockNumber"));
        assert_eq!(req.get("id").and_then(|v| v.as_i64()), Some(1));
    }

    #[test]
    fn selectors_match_starknet_keccak() {
        assert_eq!(
            entry_point_selector("transfer"),
            "0x83afd3f4caedc6eebf44246fe54e38c95e3179a5ec9ea81740eca5b482d12e"
        );
        assert_eq!(
            entry_point_selector("balance_of"),
            "0x35a73cd311a05d46deda634c5ee045db92f811b4e74bca4437fcb5302b7af33"
        );
        assert_eq!(entry_point_selector("0x1234"), "0x1234");
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(StarknetClient::new("not a url").is_err());
    }

    #[test]
    fn receipt_requires_acceptance() {
        let pending: RpcReceipt = serde_json::from_value(json!({
            "transaction_hash": "0x1",
            "execution_status": "SUCCEEDED",
            "finality_status": "RECEIVED"
        }))
        .unwrap();
        assert!(pending.into_receipt().is_none());

        let accepted: RpcReceipt = serde_json::from_value(json!({
            "transaction_hash": "0x1",
            "execution_status": "SUCCEEDED",
            "finality_status": "ACCEPTED_ON_L2",
            "block_hash": "0xb",
            "block_number": 7
        }))
        .unwrap();
        let receipt = accepted.into_receipt().unwrap();
        assert_eq!(receipt.block_number, Some(7));
        assert_eq!(receipt.execution, ExecutionOutcome::Succeeded);
    }

    #[test]
    fn reverted_receipt_carries_reason() {
        let reverted: RpcReceipt = serde_json::from_value(json!({
            "transaction_hash": "0x1",
            "execution_status": "REVERTED",
            "finality_status": "ACCEPTED_ON_L2",
            "revert_reason": "u256_sub Overflow"
        }))
        .unwrap();
        assert_eq!(
            reverted.into_receipt().unwrap().execution,
            ExecutionOutcome::Reverted("u256_sub Overflow".to_string())
        );
    }
}
