//! The seam between the token service and the chain.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::info;

use crate::blockchain::client::StarknetClient;
use crate::blockchain::mock::MockChainBackend;
use crate::blockchain::models::{ContractCall, SessionError, TransactionReceipt};
use crate::blockchain::wallet_provider::WalletProvider;
use crate::config::Config;

/// Everything the token service needs from the chain: reads, signed
/// submissions and finality.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Read-only contract call returning the raw node response
    async fn call(&self, call: &ContractCall) -> Result<Value>;

    /// Submit a call signed by `account`; returns the transaction hash
    async fn execute(&self, account: &str, call: &ContractCall) -> Result<String>;

    /// Resolves once the transaction is final. May wait forever.
    async fn wait_for_transaction(&self, tx_hash: &str) -> Result<TransactionReceipt>;
}

/// RPC reads plus wallet-signed writes
pub struct LiveChainBackend {
    client: StarknetClient,
    wallet: Arc<dyn WalletProvider>,
    poll_interval: Duration,
}

impl LiveChainBackend {
    pub fn new(client: StarknetClient, wallet: Arc<dyn WalletProvider>, poll_interval: Duration) -> Self {
        Self {
            client,
            wallet,
            poll_interval,
        }
    }
}

#[async_trait]
impl ChainBackend for LiveChainBackend {
    async fn call(&self, call: &ContractCall) -> Result<Value> {
        self.client
            .call_contract(&call.contract_address, &call.entry_point, &call.calldata)
            .await
    }

    async fn execute(&self, account: &str, call: &ContractCall) -> Result<String> {
        self.wallet
            .add_invoke_transaction(account, std::slice::from_ref(call))
            .await
    }

    async fn wait_for_transaction(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        self.client.wait_for_transaction(tx_hash, self.poll_interval).await
    }
}

/// Where chain access comes from, fixed at startup by configuration.
#[derive(Clone)]
pub enum ChainSource {
    /// Public RPC endpoints; the endpoint is chosen on first connect and kept.
    Rpc {
        urls: Vec<String>,
        poll_interval: Duration,
        client: Arc<OnceCell<StarknetClient>>,
    },
    /// In-memory ledger; also acts as the only wallet.
    Mock(Arc<MockChainBackend>),
}

impl ChainSource {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.use_mock_chain_backend {
            info!("Using the in-memory mock chain backend");
            Ok(ChainSource::Mock(Arc::new(MockChainBackend::from_config(config)?)))
        } else {
            Ok(ChainSource::Rpc {
                urls: config.rpc_urls.clone(),
                poll_interval: config.receipt_poll_interval,
                client: Arc::new(OnceCell::new()),
            })
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, ChainSource::Mock(_))
    }

    /// Backend that signs through `wallet`.
    pub async fn backend_for(&self, wallet: Arc<dyn WalletProvider>) -> Result<Arc<dyn ChainBackend>, SessionError> {
        match self {
            ChainSource::Mock(mock) => Ok(mock.clone() as Arc<dyn ChainBackend>),
            ChainSource::Rpc {
                urls,
                poll_interval,
                client,
            } => {
                let client = client
                    .get_or_try_init(|| StarknetClient::connect(urls))
                    .await
                    .map_err(|e| SessionError::ChainUnavailable(format!("{:#}", e)))?;
                Ok(Arc::new(LiveChainBackend::new(client.clone(), wallet, *poll_interval)))
            }
        }
    }

    /// The wallet bundled with the mock ledger, if any.
    pub fn mock_wallet(&self) -> Option<Arc<dyn WalletProvider>> {
        match self {
            ChainSource::Mock(mock) => Some(mock.clone() as Arc<dyn WalletProvider>),
            ChainSource::Rpc { .. } => None,
        }
    }

    pub fn mock(&self) -> Option<&Arc<MockChainBackend>> {
        match self {
            ChainSource::Mock(mock) => Some(mock),
            ChainSource::Rpc { .. } => None,
        }
    }
}
