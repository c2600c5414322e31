use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    api::error::ApiError,
    blockchain::models::{TokenBalance, WalletState},
    AppState,
};

// Defines the structure for the JSON output returned by the balances endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesOutput {
    pub account: Option<String>,
    pub cat: TokenBalance,
    pub gas: TokenBalance,
}

impl From<WalletState> for BalancesOutput {
    fn from(state: WalletState) -> Self {
        Self {
            account: state.account,
            cat: state.cat_balance,
            gas: state.gas_balance,
        }
    }
}

/// Cached balances; flagged fallbacks while disconnected.
pub async fn get_balances_handler(State(state): State<AppState>) -> Json<BalancesOutput> {
    Json(state.session.state().await.into())
}

pub async fn refresh_balances_handler(State(state): State<AppState>) -> Result<Json<BalancesOutput>, ApiError> {
    let refreshed = state.session.refresh_balances().await?;
    Ok(Json(refreshed.into()))
}
