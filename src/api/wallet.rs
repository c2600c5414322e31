use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api::error::ApiError, blockchain::models::WalletState, AppState};

// --- Request and Response Models ---

/// Response for listing detected wallets
#[derive(Debug, Serialize)]
pub struct ListWalletsResponse {
    pub wallets: Vec<String>,
}

/// Request to connect a wallet
#[derive(Debug, Default, Deserialize)]
pub struct ConnectWalletRequest {
    /// Wallet to use; may be omitted when only one is detected
    pub wallet: Option<String>,
}

// --- Handlers ---

pub async fn list_wallets_handler(State(state): State<AppState>) -> Json<ListWalletsResponse> {
    Json(ListWalletsResponse {
        wallets: state.session.available_wallets(),
    })
}

pub async fn connect_wallet_handler(
    State(state): State<AppState>,
    body: Option<Json<ConnectWalletRequest>>,
) -> Result<Json<WalletState>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    info!("Handling wallet connect request ({:?})", request.wallet);
    let wallet_state = state.session.connect(request.wallet.as_deref()).await?;
    Ok(Json(wallet_state))
}

pub async fn disconnect_wallet_handler(State(state): State<AppState>) -> Json<WalletState> {
    info!("Handling wallet disconnect request");
    Json(state.session.disconnect().await)
}

pub async fn wallet_state_handler(State(state): State<AppState>) -> Json<WalletState> {
    Json(state.session.state().await)
}

/// Creates the wallet router with all wallet-related routes
pub fn create_wallet_router() -> Router<AppState> {
    Router::new()
        .route("/wallets", get(list_wallets_handler))
        .route("/wallet/connect", post(connect_wallet_handler))
        .route("/wallet/disconnect", post(disconnect_wallet_handler))
        .route("/wallet/state", get(wallet_state_handler))
}
