use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::{
    api::error::ApiError,
    blockchain::models::{TokenBalance, TokenKind, TokenMintResult},
    AppState,
};

/// Body of issue and transfer requests. Amounts are decimal strings in
/// whole tokens, e.g. `"12.5"`.
#[derive(Debug, Deserialize, Validate)]
pub struct TokenAmountRequest {
    #[validate(length(min = 1, message = "recipient is required"))]
    pub recipient: String,
    #[validate(length(min = 1, max = 100, message = "amount must be a non-empty decimal string"))]
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct SupplyQuery {
    #[serde(default = "default_token")]
    pub token: TokenKind,
}

fn default_token() -> TokenKind {
    TokenKind::Cat
}

pub async fn issue_tokens_handler(
    State(state): State<AppState>,
    Json(request): Json<TokenAmountRequest>,
) -> Result<(StatusCode, Json<TokenMintResult>), ApiError> {
    request.validate()?;
    info!("Received issue request: {} CAT to {}", request.amount, request.recipient);
    let result = state.session.issue_tokens(&request.recipient, &request.amount).await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

pub async fn transfer_tokens_handler(
    State(state): State<AppState>,
    Json(request): Json<TokenAmountRequest>,
) -> Result<(StatusCode, Json<TokenMintResult>), ApiError> {
    request.validate()?;
    info!("Received transfer request: {} CAT to {}", request.amount, request.recipient);
    let result = state.session.transfer_tokens(&request.recipient, &request.amount).await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

pub async fn total_supply_handler(
    State(state): State<AppState>,
    Query(query): Query<SupplyQuery>,
) -> Result<Json<TokenBalance>, ApiError> {
    Ok(Json(state.session.total_supply(query.token).await?))
}
