use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::blockchain::models::{SessionError, TokenError};

/// Error returned by every API handler.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Session(SessionError::Token(err))
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reasons: Vec<String> = errs
                    .iter()
                    .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                    .collect();
                format!("{}: {}", field, reasons.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");
        ApiError::BadRequest(message)
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Session(err) => match err {
                SessionError::NotConnected => (StatusCode::CONFLICT, "NOT_CONNECTED"),
                SessionError::NoAccounts => (StatusCode::CONFLICT, "NO_ACCOUNTS"),
                SessionError::SelectionRequired(_) => (StatusCode::BAD_REQUEST, "WALLET_SELECTION_REQUIRED"),
                SessionError::UnknownWallet(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_WALLET"),
                SessionError::NoWalletDetected => (StatusCode::SERVICE_UNAVAILABLE, "NO_WALLET_DETECTED"),
                SessionError::ChainUnavailable(_) => (StatusCode::BAD_GATEWAY, "CHAIN_UNAVAILABLE"),
                SessionError::Token(token) => (token_status(token), token.code()),
            },
        }
    }
}

fn token_status(err: &TokenError) -> StatusCode {
    match err {
        TokenError::Validation(_) | TokenError::InsufficientBalance | TokenError::InvalidAddress => {
            StatusCode::BAD_REQUEST
        }
        TokenError::Unauthorized => StatusCode::FORBIDDEN,
        TokenError::UserRejected => StatusCode::CONFLICT,
        TokenError::Network | TokenError::Timeout => StatusCode::BAD_GATEWAY,
        TokenError::UnrecognizedResponse(_) | TokenError::Chain(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes() {
        let cases = [
            (ApiError::from(TokenError::InsufficientBalance), StatusCode::BAD_REQUEST),
            (ApiError::from(TokenError::Unauthorized), StatusCode::FORBIDDEN),
            (ApiError::from(TokenError::UserRejected), StatusCode::CONFLICT),
            (ApiError::from(TokenError::Timeout), StatusCode::BAD_GATEWAY),
            (ApiError::from(TokenError::Chain("boom".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::from(SessionError::NotConnected), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_and_code().0, status, "{}", err);
        }
    }
}
