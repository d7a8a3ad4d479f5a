//! API Error Handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use credit_ledger::LedgerError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Ledger(e) => ledger_parts(e),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

fn ledger_parts(e: &LedgerError) -> (StatusCode, &'static str) {
    match e {
        LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
        LedgerError::InvalidContent(_) => (StatusCode::BAD_REQUEST, "invalid_content"),
        LedgerError::InvalidPlan(_) => (StatusCode::BAD_REQUEST, "invalid_plan"),
        LedgerError::Policy(_) => (StatusCode::BAD_REQUEST, "invalid_policy"),
        LedgerError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
        LedgerError::ContentNotFound(_) => (StatusCode::NOT_FOUND, "content_not_found"),
        LedgerError::InsufficientFunds { .. } => {
            (StatusCode::PAYMENT_REQUIRED, "insufficient_funds")
        }
        LedgerError::GuestCreditsExhausted { .. } => {
            (StatusCode::PAYMENT_REQUIRED, "guest_credits_exhausted")
        }
        LedgerError::SelfPurchaseForbidden => (StatusCode::FORBIDDEN, "self_purchase_forbidden"),
        LedgerError::AlreadyUnlocked(_) => (StatusCode::CONFLICT, "already_unlocked"),
        LedgerError::CooldownActive { .. } => (StatusCode::TOO_MANY_REQUESTS, "cooldown_active"),
        LedgerError::RewardCooldown { .. } => (StatusCode::TOO_MANY_REQUESTS, "reward_cooldown"),
        LedgerError::StoreWriteFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_write_failed"),
        LedgerError::StoreTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "store_timeout"),
        LedgerError::ProviderCallFailed(_) => (StatusCode::BAD_GATEWAY, "provider_call_failed"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.parts();
        if status.is_server_error() {
            tracing::error!("{} {}: {}", status.as_u16(), error_type, self);
        }

        let mut body = json!({
            "error": error_type,
            "message": self.to_string(),
        });
        if let ApiError::Ledger(e) = &self {
            if let Some(shortfall) = e.shortfall() {
                body["shortfall"] = json!(shortfall);
            }
            if let LedgerError::CooldownActive { remaining, .. }
            | LedgerError::RewardCooldown { remaining } = e
            {
                body["retry_after_secs"] = json!(remaining.as_secs());
            }
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funds_errors_are_payment_required() {
        let err = ApiError::from(LedgerError::InsufficientFunds {
            available: 10,
            required: 25,
        });
        assert_eq!(err.parts(), (StatusCode::PAYMENT_REQUIRED, "insufficient_funds"));
    }

    #[test]
    fn test_store_failures_are_server_errors() {
        let err = ApiError::from(LedgerError::StoreWriteFailed("down".to_string()));
        assert!(err.parts().0.is_server_error());
    }
}
