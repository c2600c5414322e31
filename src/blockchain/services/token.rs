// src/blockchain/services/token.rs

use std::sync::Arc;

use ethers_core::types::U256;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::blockchain::backend::ChainBackend;
use crate::blockchain::models::{
    ContractCall, ExecutionOutcome, OperationKind, TokenBalance, TokenError, TokenKind, TokenMintResult,
};
use crate::blockchain::monitor::{spawn_monitor, TrackedTransaction};
use crate::blockchain::services::formatter::format_balance;
use crate::blockchain::services::normalizer::{normalize_bool, normalize_u256};
use crate::blockchain::services::retry::RetryPolicy;
use crate::utils::{is_valid_address, u256_calldata};

/// The two contracts a session works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContracts {
    pub cat_token: String,
    pub gas_token: String,
}

impl TokenContracts {
    pub fn address(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Cat => &self.cat_token,
            TokenKind::Gas => &self.gas_token,
        }
    }
}

/// Parses a user-entered decimal amount into base units.
///
/// The amount must be positive and carry at most `decimals` fractional digits.
pub fn parse_amount(amount: &str, decimals: u32) -> Result<U256, TokenError> {
    let amount = amount.trim();
    let invalid = || TokenError::Validation(format!("Invalid amount: {:?}", amount));

    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(TokenError::Validation(format!(
            "Amount has more than {} decimal places",
            decimals
        )));
    }

    let padded = format!("{}{}{}", whole, fraction, "0".repeat(decimals as usize - fraction.len()));
    let digits = padded.trim_start_matches('0');
    let value = if digits.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(digits).map_err(|_| TokenError::Validation("Amount is too large".to_string()))?
    };
    if value.is_zero() {
        return Err(TokenError::Validation("Amount must be greater than zero".to_string()));
    }
    Ok(value)
}

fn validate_recipient(recipient: &str) -> Result<(), TokenError> {
    if recipient.trim().is_empty() {
        return Err(TokenError::Validation("Recipient address is required".to_string()));
    }
    if !is_valid_address(recipient) {
        return Err(TokenError::InvalidAddress);
    }
    Ok(())
}

/// Token operations bound to one connected account.
///
/// Every read goes through the retry policy, and every chain error leaves
/// this type already translated into a [`TokenError`].
pub struct TokenService {
    backend: Arc<dyn ChainBackend>,
    account: String,
    contracts: TokenContracts,
    decimals: u32,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl TokenService {
    pub fn new(
        backend: Arc<dyn ChainBackend>,
        account: String,
        contracts: TokenContracts,
        decimals: u32,
        retry: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            backend,
            account,
            contracts,
            decimals,
            retry,
            shutdown,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    async fn read(&self, label: &str, call: ContractCall) -> Result<Value, TokenError> {
        let call = &call;
        self.retry
            .retry_if(
                label,
                || async move { self.backend.call(call).await.map_err(|e| TokenError::translate(&e)) },
                TokenError::is_transient,
            )
            .await
    }

    async fn submit(&self, call: ContractCall) -> Result<String, TokenError> {
        let call = &call;
        let tx_hash = self
            .retry
            .retry_if(
                &format!("submit {}", call.entry_point),
                || async move {
                    self.backend
                        .execute(&self.account, call)
                        .await
                        .map_err(|e| TokenError::translate(&e))
                },
                TokenError::is_transient,
            )
            .await?;
        info!("Submitted {} from {}: {}", call.entry_point, self.account, tx_hash);
        Ok(tx_hash)
    }

    pub async fn balance_of(&self, kind: TokenKind, owner: &str) -> Result<TokenBalance, TokenError> {
        let call = ContractCall::new(self.contracts.address(kind), "balance_of", vec![owner.to_string()]);
        let raw = self.read("balance_of", call).await?;
        let parts = normalize_u256(&raw)?;
        let balance = format_balance(&parts, self.decimals)?;
        debug!("{:?} balance of {}: {}", kind, owner, balance.formatted);
        Ok(balance)
    }

    pub async fn cat_balance(&self) -> Result<TokenBalance, TokenError> {
        self.balance_of(TokenKind::Cat, &self.account).await
    }

    pub async fn gas_balance(&self) -> Result<TokenBalance, TokenError> {
        self.balance_of(TokenKind::Gas, &self.account).await
    }

    pub async fn total_supply(&self, kind: TokenKind) -> Result<TokenBalance, TokenError> {
        let call = ContractCall::new(self.contracts.address(kind), "total_supply", vec![]);
        let raw = self.read("total_supply", call).await?;
        Ok(format_balance(&normalize_u256(&raw)?, self.decimals)?)
    }

    pub async fn is_issuer(&self, address: &str) -> Result<bool, TokenError> {
        let call = ContractCall::new(&self.contracts.cat_token, "is_issuer", vec![address.to_string()]);
        let raw = self.read("is_issuer", call).await?;
        Ok(normalize_bool(&raw)?)
    }

    /// Makes sure the connected account may mint, registering it if needed.
    /// Returns `true` if a registration was submitted and confirmed.
    pub async fn ensure_issuer(&self) -> Result<bool, TokenError> {
        if self.is_issuer(&self.account).await? {
            return Ok(false);
        }

        info!("Registering {} as issuer", self.account);
        let call = ContractCall::new(&self.contracts.cat_token, "register_issuer", vec![self.account.clone()]);
        let call = &call;
        let submitted = self
            .retry
            .retry_if(
                "submit register_issuer",
                || async move {
                    match self.backend.execute(&self.account, call).await {
                        Ok(hash) => Ok(Some(hash)),
                        Err(e) if is_already_registered(&format!("{:#}", e)) => Ok(None),
                        Err(e) => Err(TokenError::translate(&e)),
                    }
                },
                TokenError::is_transient,
            )
            .await?;

        let Some(tx_hash) = submitted else {
            info!("{} was already registered as issuer", self.account);
            return Ok(false);
        };

        let receipt = tokio::select! {
            _ = self.shutdown.cancelled() => {
                return Err(TokenError::Chain("issuer registration was cancelled".to_string()));
            }
            receipt = self.backend.wait_for_transaction(&tx_hash) => {
                receipt.map_err(|e| TokenError::translate(&e))?
            }
        };
        match receipt.execution {
            ExecutionOutcome::Succeeded => Ok(true),
            ExecutionOutcome::Reverted(reason) if is_already_registered(&reason) => Ok(false),
            ExecutionOutcome::Reverted(reason) => {
                error!("Issuer registration {} reverted: {}", tx_hash, reason);
                Err(TokenError::from_chain_message(&reason))
            }
        }
    }

    /// Mints CAT to `recipient`, registering the caller as issuer first if
    /// needed. Returns as soon as the transaction is submitted.
    pub async fn mint(&self, recipient: &str, amount: &str) -> Result<TrackedTransaction, TokenError> {
        validate_recipient(recipient)?;
        let value = parse_amount(amount, self.decimals)?;
        self.ensure_issuer().await?;

        let [low, high] = u256_calldata(value);
        let call = ContractCall::new(&self.contracts.cat_token, "mint", vec![recipient.trim().to_string(), low, high]);
        let tx_hash = self.submit(call).await?;
        Ok(self.track(OperationKind::Mint, tx_hash))
    }

    /// Transfers CAT from the connected account.
    ///
    /// The balance check reads a fresh balance but is still optimistic: two
    /// concurrent transfers can both pass it, and the chain rejects the loser.
    pub async fn transfer(&self, recipient: &str, amount: &str) -> Result<TrackedTransaction, TokenError> {
        validate_recipient(recipient)?;
        let value = parse_amount(amount, self.decimals)?;

        let balance = self.cat_balance().await?;
        if value > balance.raw.to_u256()? {
            warn!(
                "Rejected transfer of {} from {}: balance is {}",
                amount, self.account, balance.formatted
            );
            return Err(TokenError::InsufficientBalance);
        }

        let [low, high] = u256_calldata(value);
        let call = ContractCall::new(
            &self.contracts.cat_token,
            "transfer",
            vec![recipient.trim().to_string(), low, high],
        );
        let tx_hash = self.submit(call).await?;
        Ok(self.track(OperationKind::Transfer, tx_hash))
    }

    fn track(&self, operation: OperationKind, tx_hash: String) -> TrackedTransaction {
        spawn_monitor(
            self.backend.clone(),
            TokenMintResult::pending(operation, tx_hash),
            self.shutdown.child_token(),
        )
    }
}

fn is_already_registered(message: &str) -> bool {
    message.to_lowercase().contains("already registered")
}
