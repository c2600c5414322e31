// src/blockchain/models.rs
use chrono::{DateTime, Utc};
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// --- Error types for token operations ---

/// User-facing errors raised by the token service.
///
/// Raw chain and wallet errors are translated into one of these through
/// [`TokenError::from_chain_message`] before they leave the service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("{0}")]
    Validation(String),
    #[error("Insufficient CAT balance for this operation")]
    InsufficientBalance,
    #[error("Your account is not authorized to perform this operation. Please contact the administrator.")]
    Unauthorized,
    #[error("Invalid address format. Please check the recipient address.")]
    InvalidAddress,
    #[error("Network error while contacting the chain. Please check your connection and try again.")]
    Network,
    #[error("Transaction was rejected in the wallet")]
    UserRejected,
    #[error("The request timed out. Please try again.")]
    Timeout,
    #[error("Unrecognized contract response: {0}")]
    UnrecognizedResponse(String),
    #[error("Transaction failed: {0}")]
    Chain(String),
}

impl TokenError {
    /// Maps a raw chain/wallet error message onto the fixed friendly taxonomy.
    /// Anything that matches no known pattern is wrapped verbatim.
    pub fn from_chain_message(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        let matches = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if matches(&["insufficient", "u256_sub overflow", "exceeds balance"]) {
            TokenError::InsufficientBalance
        } else if matches(&[
            "not an issuer",
            "not authorized",
            "unauthorized",
            "caller is not",
            "only issuer",
            "only owner",
        ]) {
            TokenError::Unauthorized
        } else if matches(&["invalid address", "invalid contract address", "contract not found"]) {
            TokenError::InvalidAddress
        } else if matches(&["user abort", "user rejected", "rejected by user", "user denied", "request rejected"]) {
            TokenError::UserRejected
        } else if matches(&["timeout", "timed out"]) {
            TokenError::Timeout
        } else if matches(&["network", "failed to fetch", "connection", "error sending request", "dns error"]) {
            TokenError::Network
        } else {
            TokenError::Chain(raw.to_string())
        }
    }

    /// Translates an infrastructure error at the service boundary. Errors that
    /// already carry a `TokenError` are passed through untouched.
    pub fn translate(err: &anyhow::Error) -> Self {
        if let Some(token_err) = err.downcast_ref::<TokenError>() {
            return token_err.clone();
        }
        Self::from_chain_message(&format!("{:#}", err))
    }

    /// Only transient failures are worth another attempt. Rejections,
    /// authorization and validation problems fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, TokenError::Network | TokenError::Timeout | TokenError::Chain(_))
    }

    /// Stable machine-readable code used by the API and MCP layers.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Validation(_) => "VALIDATION_ERROR",
            TokenError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            TokenError::Unauthorized => "UNAUTHORIZED",
            TokenError::InvalidAddress => "INVALID_ADDRESS",
            TokenError::Network => "NETWORK_ERROR",
            TokenError::UserRejected => "USER_REJECTED",
            TokenError::Timeout => "TIMEOUT",
            TokenError::UnrecognizedResponse(_) => "UNRECOGNIZED_RESPONSE",
            TokenError::Chain(_) => "CHAIN_ERROR",
        }
    }
}

/// Errors raised by the wallet session around connection management.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("No wallet is connected")]
    NotConnected,
    #[error("No wallet provider detected")]
    NoWalletDetected,
    #[error("Multiple wallets detected, choose one of: {}", .0.join(", "))]
    SelectionRequired(Vec<String>),
    #[error("Unknown wallet provider: {0}")]
    UnknownWallet(String),
    #[error("The wallet did not return any account")]
    NoAccounts,
    #[error("Failed to reach the chain: {0}")]
    ChainUnavailable(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}

// --- Balance Models ---

/// A u256 split into two 128-bit halves, both as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct U256Parts {
    pub low: String,
    pub high: String,
}

impl U256Parts {
    pub fn zero() -> Self {
        Self {
            low: "0".to_string(),
            high: "0".to_string(),
        }
    }

    /// Canonical split of a value at 2^128.
    pub fn from_u256(value: U256) -> Self {
        let high = value >> 128;
        let low = value - (high << 128);
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    /// Recombines `high * 2^128 + low`. Fails if a half is not a decimal
    /// integer or the sum does not fit in 256 bits.
    pub fn to_u256(&self) -> Result<U256, TokenError> {
        let parse = |half: &str, name: &str| {
            U256::from_dec_str(half.trim()).map_err(|_| {
                TokenError::UnrecognizedResponse(format!("u256 {} half is not a decimal integer: {:?}", name, half))
            })
        };
        let low = parse(&self.low, "low")?;
        let high = parse(&self.high, "high")?;
        if high > U256::from(u128::MAX) {
            return Err(TokenError::UnrecognizedResponse(format!("u256 high half out of range: {}", high)));
        }
        (high << 128)
            .checked_add(low)
            .ok_or_else(|| TokenError::UnrecognizedResponse("u256 value overflows 256 bits".to_string()))
    }
}

/// Balance as shown to callers. Produced fresh on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub formatted: String,
    pub raw: U256Parts,
    pub is_real_data: bool,
    pub numeric_value: f64,
}

/// Which of the two fixed contracts an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Custom "Credit Access" token
    Cat,
    /// Network gas token
    Gas,
}

// --- Transaction Models ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Mint,
    Transfer,
    RegisterIssuer,
}

/// Tracked result of a submitted mint or transfer.
///
/// Created `pending` on submission. Only the transaction monitor moves it
/// forward, and it never moves back from `confirmed` or `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMintResult {
    pub operation_id: Uuid,
    pub operation: OperationKind,
    pub transaction_hash: String,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl TokenMintResult {
    pub fn pending(operation: OperationKind, transaction_hash: String) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            operation,
            transaction_hash,
            status: TxStatus::Pending,
            block_number: None,
            block_hash: None,
            step: Some("submitted".to_string()),
            error: None,
            submitted_at: Utc::now(),
        }
    }

    /// Applies a finalized receipt. Returns `false` (and changes nothing) if
    /// the result had already settled.
    pub fn settle(&mut self, receipt: &TransactionReceipt) -> bool {
        if self.status.is_final() {
            return false;
        }
        self.block_number = receipt.block_number;
        self.block_hash = receipt.block_hash.clone();
        match &receipt.execution {
            ExecutionOutcome::Succeeded => {
                self.status = TxStatus::Confirmed;
                self.step = Some("confirmed".to_string());
            }
            ExecutionOutcome::Reverted(reason) => {
                self.status = TxStatus::Failed;
                self.step = Some("reverted".to_string());
                self.error = Some(reason.clone());
            }
        }
        true
    }

    /// Marks the result failed after a monitoring error. No-op once settled.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_final() {
            return false;
        }
        self.status = TxStatus::Failed;
        self.step = Some("monitor_failed".to_string());
        self.error = Some(reason.into());
        true
    }

    /// Updates the progress marker of a still-pending result.
    pub fn mark_step(&mut self, step: &str) -> bool {
        if self.status.is_final() {
            return false;
        }
        self.step = Some(step.to_string());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Reverted(String),
}

/// Finalized receipt of a transaction as reported by the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub execution: ExecutionOutcome,
}

/// A single contract invocation: target, entry point name and felt calldata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract_address: String,
    pub entry_point: String,
    pub calldata: Vec<String>,
}

impl ContractCall {
    pub fn new(contract_address: &str, entry_point: &str, calldata: Vec<String>) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            entry_point: entry_point.to_string(),
            calldata,
        }
    }
}

// --- Session Models ---

/// Snapshot of the wallet session exposed to handlers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub is_connected: bool,
    pub account: Option<String>,
    pub wallet_name: Option<String>,
    pub is_mock: bool,
    pub cat_balance: TokenBalance,
    pub gas_balance: TokenBalance,
}
