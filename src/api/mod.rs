//! # API Module
//!
//! HTTP handlers over the wallet session. Every route lives under `/api`.
//!
//! ## Available Endpoints
//!
//! ### Wallet
//! - `GET /wallets` - Detected wallet providers
//! - `POST /wallet/connect` - Connect a wallet (`{"wallet": "<name>"}` optional)
//! - `POST /wallet/disconnect` - Drop the connection and cancel its monitors
//! - `GET /wallet/state` - Connection state and cached balances
//!
//! ### Balances
//! - `GET /balances` - Cached CAT and gas balances
//! - `POST /balances/refresh` - Reload both balances from the chain
//!
//! ### Tokens
//! - `POST /tokens/issue` - Mint CAT to a recipient
//! - `POST /tokens/transfer` - Transfer CAT from the connected account
//! - `GET /tokens/supply?token=cat|gas` - Total supply
//! - `GET /transactions/:hash` - Status of a submitted transaction
//!
//! ### Other
//! - `GET /health` - Liveness
//! - `POST /rpc` - MCP JSON-RPC over HTTP
//!
//! Errors are returned as `{"error": {"code": .., "message": ..}}`.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub mod balance;
pub mod error;
pub mod health;
pub mod rpc;
pub mod tokens;
pub mod tx;
pub mod wallet;

/// Builds the full application router with state and layers applied.
pub fn router(state: AppState) -> Router {
    let api_router = Router::new()
        // Health check
        .route("/health", get(health::health_handler))

        // Wallet session
        .merge(wallet::create_wallet_router())

        // Balances
        .route("/balances", get(balance::get_balances_handler))
        .route("/balances/refresh", post(balance::refresh_balances_handler))

        // Token operations
        .route("/tokens/issue", post(tokens::issue_tokens_handler))
        .route("/tokens/transfer", post(tokens::transfer_tokens_handler))
        .route("/tokens/supply", get(tokens::total_supply_handler))
        .route("/transactions/:hash", get(tx::get_transaction_handler))

        // JSON-RPC endpoint for MCP tool calls
        .route("/rpc", post(rpc::rpc_handler));

    Router::new()
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
