//! Wallet providers for signing and submitting transactions.
//!
//! A wallet provider stands in for a browser wallet extension: it hands out
//! the user's accounts and relays invoke transactions to the network. The
//! HTTP implementation speaks the Starknet wallet JSON-RPC API
//! (`wallet_requestAccounts`, `wallet_addInvokeTransaction`) to a bridge.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::blockchain::models::{ContractCall, SessionError};

/// Wallet API error code for a request refused by the user.
const USER_REFUSED_OP: i64 = 113;

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Display name used for selection
    fn name(&self) -> &str;

    /// Ask the wallet for access to its accounts
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Sign and submit the calls from `account`, returning the transaction hash
    async fn add_invoke_transaction(&self, account: &str, calls: &[ContractCall]) -> Result<String>;
}

/// Wallet reached over HTTP through a JSON-RPC bridge
#[derive(Clone, Debug)]
pub struct HttpWalletProvider {
    name: String,
    bridge_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct AddInvokeTransactionResult {
    transaction_hash: String,
}

impl HttpWalletProvider {
    pub fn new(name: &str, bridge_url: &str) -> Result<Self> {
        url::Url::parse(bridge_url).with_context(|| format!("Invalid wallet bridge URL for {}: {}", name, bridge_url))?;
        Ok(Self {
            name: name.to_string(),
            bridge_url: bridge_url.to_string(),
            client: Client::new(),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        debug!("Wallet {} {} -> {}", self.name, method, payload);

        let resp: Value = self
            .client
            .post(&self.bridge_url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("network error reaching wallet {}", self.name))?
            .json()
            .await
            .with_context(|| format!("invalid JSON from wallet {}", self.name))?;

        if let Some(err) = resp.get("error") {
            let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or_default();
            let message = err.get("message").and_then(|m| m.as_str()).unwrap_or("unknown wallet error");
            if code == USER_REFUSED_OP {
                return Err(anyhow!("User rejected the request in wallet {}", self.name));
            }
            return Err(anyhow!("Wallet error {}: {}", code, message));
        }
        resp.get("result")
            .cloned()
            .ok_or_else(|| anyhow!("Wallet response to {} missing 'result' field", method))
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        let result = self.request("wallet_requestAccounts", json!({})).await?;
        serde_json::from_value(result).context("wallet_requestAccounts returned an unexpected shape")
    }

    async fn add_invoke_transaction(&self, account: &str, calls: &[ContractCall]) -> Result<String> {
        let calls: Vec<Value> = calls
            .iter()
            .map(|c| {
                json!({
                    "contract_address": c.contract_address,
                    "entry_point": c.entry_point,
                    "calldata": c.calldata
                })
            })
            .collect();
        info!("Wallet {} submitting {} call(s) from {}", self.name, calls.len(), account);
        let result = self.request("wallet_addInvokeTransaction", json!({ "calls": calls })).await?;
        let parsed: AddInvokeTransactionResult =
            serde_json::from_value(result).context("wallet_addInvokeTransaction returned no transaction hash")?;
        Ok(parsed.transaction_hash)
    }
}

/// The set of wallet providers detected at startup
#[derive(Clone, Default)]
pub struct WalletRegistry {
    providers: Vec<Arc<dyn WalletProvider>>,
}

impl WalletRegistry {
    pub fn new(providers: Vec<Arc<dyn WalletProvider>>) -> Self {
        Self { providers }
    }

    /// Builds HTTP providers from a name -> bridge URL map
    pub fn from_config(providers: &BTreeMap<String, String>) -> Result<Self> {
        let providers = providers
            .iter()
            .map(|(name, url)| HttpWalletProvider::new(name, url).map(|p| Arc::new(p) as Arc<dyn WalletProvider>))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { providers })
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// The sole provider is picked automatically; with several, the caller
    /// has to name one.
    pub fn select(&self, preferred: Option<&str>) -> Result<Arc<dyn WalletProvider>, SessionError> {
        if let Some(name) = preferred {
            return self
                .providers
                .iter()
                .find(|p| p.name().eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| SessionError::UnknownWallet(name.to_string()));
        }
        match self.providers.as_slice() {
            [] => Err(SessionError::NoWalletDetected),
            [only] => Ok(only.clone()),
            _ => Err(SessionError::SelectionRequired(self.names())),
        }
    }
}
