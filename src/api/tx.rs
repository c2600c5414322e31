use axum::{
    extract::{Path, State},
    Json,
};

use crate::{api::error::ApiError, blockchain::models::TokenMintResult, utils::is_valid_address, AppState};

/// Latest status of a transaction submitted through this session.
pub async fn get_transaction_handler(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<TokenMintResult>, ApiError> {
    // Transaction hashes are felts, same format as addresses
    if !is_valid_address(&tx_hash) {
        return Err(ApiError::BadRequest(format!("Invalid transaction hash: {}", tx_hash)));
    }
    state
        .session
        .transaction(&tx_hash)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No tracked transaction {}", tx_hash)))
}
