//! The process-wide wallet session.
//!
//! Owns the connected account, the token service built for it and the cached
//! balances. Handlers reach it through `AppState`; nothing else holds
//! connection state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use ethers_core::types::U256;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::blockchain::backend::ChainSource;
use crate::blockchain::models::{
    SessionError, TokenBalance, TokenError, TokenKind, TokenMintResult, WalletState,
};
use crate::blockchain::monitor::TrackedTransaction;
use crate::blockchain::services::formatter::format_units;
use crate::blockchain::services::retry::RetryPolicy;
use crate::blockchain::services::token::{parse_amount, TokenContracts, TokenService};
use crate::blockchain::wallet_provider::WalletRegistry;
use crate::config::Config;

/// Fixed parameters of every token service the session builds.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub contracts: TokenContracts,
    pub decimals: u32,
    pub retry: RetryPolicy,
    pub balance_refresh_delay: Duration,
    /// Shown, flagged as not real, whenever no live balance is available.
    pub fallback_magnitude: String,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        let fallback_magnitude = if config.use_mock_chain_backend {
            format_units(U256::from(config.mock_balance), 0)
        } else {
            "0".to_string()
        };
        Self {
            contracts: TokenContracts {
                cat_token: config.cat_token_address.clone(),
                gas_token: config.gas_token_address.clone(),
            },
            decimals: config.token_decimals,
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay),
            balance_refresh_delay: config.balance_refresh_delay,
            fallback_magnitude,
        }
    }
}

struct Connection {
    wallet_name: String,
    service: Arc<TokenService>,
    cancel: CancellationToken,
}

struct SessionState {
    connection: Option<Connection>,
    cat_balance: TokenBalance,
    gas_balance: TokenBalance,
}

impl SessionState {
    fn disconnected(fallback: &str) -> Self {
        Self {
            connection: None,
            cat_balance: TokenBalance::fallback(fallback),
            gas_balance: TokenBalance::fallback(fallback),
        }
    }
}

struct SessionInner {
    registry: WalletRegistry,
    chain: ChainSource,
    settings: SessionSettings,
    state: RwLock<SessionState>,
    tracked: DashMap<String, TrackedTransaction>,
}

/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct WalletSession {
    inner: Arc<SessionInner>,
}

impl WalletSession {
    pub fn new(registry: WalletRegistry, chain: ChainSource, settings: SessionSettings) -> Self {
        let state = SessionState::disconnected(&settings.fallback_magnitude);
        Self {
            inner: Arc::new(SessionInner {
                registry,
                chain,
                settings,
                state: RwLock::new(state),
                tracked: DashMap::new(),
            }),
        }
    }

    /// In mock mode the mock ledger is the only wallet; otherwise wallets
    /// come from the configured bridges.
    pub fn from_config(config: &Config) -> Result<Self> {
        let chain = ChainSource::from_config(config)?;
        let registry = match chain.mock_wallet() {
            Some(wallet) => WalletRegistry::new(vec![wallet]),
            None => WalletRegistry::from_config(&config.wallet_providers)?,
        };
        info!("Detected wallets: {:?}", registry.names());
        Ok(Self::new(registry, chain, SessionSettings::from_config(config)))
    }

    pub fn chain(&self) -> &ChainSource {
        &self.inner.chain
    }

    pub fn is_mock(&self) -> bool {
        self.inner.chain.is_mock()
    }

    pub fn available_wallets(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    pub async fn state(&self) -> WalletState {
        let state = self.inner.state.read().await;
        WalletState {
            is_connected: state.connection.is_some(),
            account: state.connection.as_ref().map(|c| c.service.account().to_string()),
            wallet_name: state.connection.as_ref().map(|c| c.wallet_name.clone()),
            is_mock: self.is_mock(),
            cat_balance: state.cat_balance.clone(),
            gas_balance: state.gas_balance.clone(),
        }
    }

    async fn connection(&self) -> Result<(Arc<TokenService>, CancellationToken), SessionError> {
        let state = self.inner.state.read().await;
        state
            .connection
            .as_ref()
            .map(|c| (c.service.clone(), c.cancel.clone()))
            .ok_or(SessionError::NotConnected)
    }

    /// Connects to `preferred`, or to the only detected wallet, and primes
    /// both balances. A previous connection is torn down first.
    pub async fn connect(&self, preferred: Option<&str>) -> Result<WalletState, SessionError> {
        let wallet = self.inner.registry.select(preferred)?;
        let accounts = wallet.request_accounts().await.map_err(|e| {
            error!("Wallet {} refused account access: {:#}", wallet.name(), e);
            SessionError::Token(TokenError::translate(&e))
        })?;
        let account = accounts.into_iter().next().ok_or(SessionError::NoAccounts)?;
        let backend = self.inner.chain.backend_for(wallet.clone()).await?;

        let settings = &self.inner.settings;
        let cancel = CancellationToken::new();
        let service = Arc::new(TokenService::new(
            backend,
            account.clone(),
            settings.contracts.clone(),
            settings.decimals,
            settings.retry,
            cancel.clone(),
        ));

        {
            let mut state = self.inner.state.write().await;
            if let Some(previous) = state.connection.take() {
                previous.cancel.cancel();
            }
            *state = SessionState::disconnected(&settings.fallback_magnitude);
            state.connection = Some(Connection {
                wallet_name: wallet.name().to_string(),
                service,
                cancel,
            });
        }
        self.inner.tracked.clear();
        info!("Connected wallet {} with account {}", wallet.name(), account);

        if let Err(e) = self.refresh_balances().await {
            error!("Failed to load balances for {}: {}", account, e);
        }
        Ok(self.state().await)
    }

    /// Drops the connection, cancels its monitors and pending refreshes and
    /// restores the fallback balances.
    pub async fn disconnect(&self) -> WalletState {
        {
            let mut state = self.inner.state.write().await;
            if let Some(connection) = state.connection.take() {
                connection.cancel.cancel();
                info!("Disconnected account {}", connection.service.account());
            }
            *state = SessionState::disconnected(&self.inner.settings.fallback_magnitude);
        }
        self.inner.tracked.clear();
        self.state().await
    }

    /// Reloads both balances. A result that arrives after the session moved
    /// on to another connection is discarded.
    pub async fn refresh_balances(&self) -> Result<WalletState, SessionError> {
        let (service, _) = self.connection().await?;
        let (cat, gas) = futures::future::join(service.cat_balance(), service.gas_balance()).await;

        {
            let mut state = self.inner.state.write().await;
            let current = state
                .connection
                .as_ref()
                .is_some_and(|c| Arc::ptr_eq(&c.service, &service));
            if !current {
                debug!("Discarding balances for stale connection {}", service.account());
                return Err(SessionError::NotConnected);
            }
            if let Ok(balance) = &cat {
                state.cat_balance = balance.clone();
            }
            if let Ok(balance) = &gas {
                state.gas_balance = balance.clone();
            }
        }
        cat?;
        gas?;
        Ok(self.state().await)
    }

    fn schedule_refresh(&self, cancel: &CancellationToken) {
        let session = self.clone();
        let cancel = cancel.child_token();
        let delay = self.inner.settings.balance_refresh_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("Scheduled balance refresh cancelled"),
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = session.refresh_balances().await {
                        warn!("Scheduled balance refresh failed: {}", e);
                    }
                }
            }
        });
    }

    /// Tracks the transaction unless `service` belongs to a connection that
    /// was closed while the submission was in flight.
    async fn record(&self, service: &Arc<TokenService>, tracked: TrackedTransaction) -> TokenMintResult {
        let result = tracked.current();
        let state = self.inner.state.read().await;
        let current = state
            .connection
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(&c.service, service));
        if current {
            self.inner
                .tracked
                .insert(result.transaction_hash.clone(), tracked);
        } else {
            debug!("Not tracking {} from a closed connection", result.transaction_hash);
            tracked.cancel();
        }
        result
    }

    pub async fn issue_tokens(&self, recipient: &str, amount: &str) -> Result<TokenMintResult, SessionError> {
        let (service, cancel) = self.connection().await?;
        info!("Issuing {} CAT to {}", amount, recipient);
        let tracked = service.mint(recipient, amount).await?;
        self.schedule_refresh(&cancel);
        Ok(self.record(&service, tracked).await)
    }

    /// Checks the cached balance before anything touches the network, then
    /// hands over to the service, which checks a fresh one again.
    pub async fn transfer_tokens(&self, recipient: &str, amount: &str) -> Result<TokenMintResult, SessionError> {
        let (service, cancel) = self.connection().await?;
        let value = parse_amount(amount, service.decimals())?;
        let cached = self.inner.state.read().await.cat_balance.clone();
        if cached.is_real_data && value > cached.raw.to_u256()? {
            warn!("Transfer of {} exceeds cached balance {}", amount, cached.formatted);
            return Err(TokenError::InsufficientBalance.into());
        }

        info!("Transferring {} CAT to {}", amount, recipient);
        let tracked = service.transfer(recipient, amount).await?;
        self.schedule_refresh(&cancel);
        Ok(self.record(&service, tracked).await)
    }

    pub async fn total_supply(&self, kind: TokenKind) -> Result<TokenBalance, SessionError> {
        let (service, _) = self.connection().await?;
        Ok(service.total_supply(kind).await?)
    }

    /// Latest known result of a transaction submitted in this session.
    pub fn transaction(&self, tx_hash: &str) -> Option<TokenMintResult> {
        self.inner.tracked.get(tx_hash).map(|t| t.current())
    }

    pub fn tracked(&self, tx_hash: &str) -> Option<TrackedTransaction> {
        self.inner.tracked.get(tx_hash).map(|t| t.value().clone())
    }

    /// Waits for a tracked transaction to settle or its monitor to stop.
    pub async fn wait_for_transaction(&self, tx_hash: &str) -> Option<TokenMintResult> {
        let tracked = self.tracked(tx_hash)?;
        Some(tracked.wait_final().await)
    }
}
