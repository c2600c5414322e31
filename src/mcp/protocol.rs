// src/mcp/protocol.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blockchain::models::{SessionError, TokenError};

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message,
                data: None,
            }),
        }
    }

    pub fn error_with_data(id: Value, code: i32, message: String, data: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message,
                data: Some(data),
            }),
        }
    }

    /// Session failures keep the friendly message and carry the stable
    /// error code in `data.code`.
    pub fn session_error(id: Value, err: &SessionError) -> Self {
        let (code, name) = match err {
            SessionError::NotConnected => (error_codes::NOT_CONNECTED, "NOT_CONNECTED"),
            SessionError::NoAccounts => (error_codes::NOT_CONNECTED, "NO_ACCOUNTS"),
            SessionError::NoWalletDetected => (error_codes::WALLET_UNAVAILABLE, "NO_WALLET_DETECTED"),
            SessionError::SelectionRequired(_) => (error_codes::INVALID_PARAMS, "WALLET_SELECTION_REQUIRED"),
            SessionError::UnknownWallet(_) => (error_codes::INVALID_PARAMS, "UNKNOWN_WALLET"),
            SessionError::ChainUnavailable(_) => (error_codes::CHAIN_ERROR, "CHAIN_UNAVAILABLE"),
            SessionError::Token(token) => (token_error_code(token), token.code()),
        };
        let mut data = serde_json::json!({ "code": name });
        if let SessionError::SelectionRequired(wallets) = err {
            data["wallets"] = serde_json::json!(wallets);
        }
        Self::error_with_data(id, code, err.to_string(), data)
    }
}

fn token_error_code(err: &TokenError) -> i32 {
    match err {
        TokenError::Validation(_) | TokenError::InvalidAddress => error_codes::INVALID_PARAMS,
        TokenError::InsufficientBalance => error_codes::INSUFFICIENT_BALANCE,
        TokenError::Unauthorized => error_codes::UNAUTHORIZED,
        TokenError::UserRejected => error_codes::USER_REJECTED,
        TokenError::Network | TokenError::Timeout | TokenError::UnrecognizedResponse(_) | TokenError::Chain(_) => {
            error_codes::CHAIN_ERROR
        }
    }
}

// Standard JSON-RPC error codes, followed by server-defined ones
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const NOT_CONNECTED: i32 = -32001;
    pub const WALLET_UNAVAILABLE: i32 = -32002;
    pub const INSUFFICIENT_BALANCE: i32 = -32003;
    pub const UNAUTHORIZED: i32 = -32004;
    pub const USER_REJECTED: i32 = -32005;
    pub const CHAIN_ERROR: i32 = -32006;
}
