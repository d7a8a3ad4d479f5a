//! Account, balance, reward, subscription and withdrawal endpoints

use crate::{ApiResult, ApiState};
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use credit_core::{Account, CreatorTransactionRecord, Plan, SubscriptionRecord, TransactionRecord};
use credit_ledger::{SubscriptionReceipt, WithdrawalStatus, WithdrawalTicket};
use serde::{Deserialize, Serialize};

/// Register account routes
pub fn account_routes() -> Router<ApiState> {
    Router::new()
        .route("/{id}", get(get_account).post(open_account))
        .route("/{id}/transactions", get(get_transactions))
        .route("/{id}/sales", get(get_sales))
        .route("/{id}/topup", post(top_up))
        .route("/{id}/reward", post(grant_reward))
        .route(
            "/{id}/subscription",
            get(get_subscription)
                .post(subscribe)
                .delete(cancel_subscription),
        )
        .route(
            "/{id}/withdrawal",
            get(get_withdrawal_status).post(request_withdrawal),
        )
}

async fn open_account(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<Account>> {
    Ok(Json(state.economy.ledger.open_account(&id).await?))
}

async fn get_account(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<Account>> {
    Ok(Json(state.economy.ledger.account(&id).await?))
}

async fn get_transactions(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TransactionRecord>>> {
    Ok(Json(state.economy.ledger.history(&id).await?))
}

async fn get_sales(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CreatorTransactionRecord>>> {
    Ok(Json(state.economy.ledger.sales(&id).await?))
}

#[derive(Debug, Deserialize)]
struct TopUpRequest {
    amount: u64,
    /// Payment provider reference for the purchase
    reference: String,
}

async fn top_up(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TopUpRequest>,
) -> ApiResult<Json<Account>> {
    state.authorize_admin(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))?;
    Ok(Json(
        state
            .economy
            .ledger
            .top_up(&id, req.amount, &req.reference)
            .await?,
    ))
}

async fn grant_reward(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<Account>> {
    Ok(Json(state.economy.rewards.grant_reward(&id).await?))
}

async fn get_subscription(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Option<SubscriptionRecord>>> {
    Ok(Json(state.economy.subscriptions.current(&id).await?))
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    plan: Plan,
    payment_method: String,
}

async fn subscribe(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<SubscriptionReceipt>> {
    Ok(Json(
        state
            .economy
            .subscriptions
            .subscribe(&id, req.plan, &req.payment_method)
            .await?,
    ))
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
    record: Option<SubscriptionRecord>,
}

async fn cancel_subscription(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let record = state.economy.subscriptions.cancel(&id).await?;
    Ok(Json(CancelResponse {
        cancelled: record.is_some(),
        record,
    }))
}

async fn get_withdrawal_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WithdrawalStatus>> {
    Ok(Json(state.economy.withdrawals.status(&id).await?))
}

async fn request_withdrawal(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WithdrawalTicket>> {
    Ok(Json(state.economy.withdrawals.request_withdrawal(&id).await?))
}
