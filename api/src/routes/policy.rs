//! Economy policy endpoints

use crate::{ApiResult, ApiState};
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, put},
    Json, Router,
};
use economics::EconomyPolicy;
use serde::Serialize;

pub fn policy_routes() -> Router<ApiState> {
    Router::new().route("/", get(get_policy))
}

pub fn admin_routes() -> Router<ApiState> {
    Router::new().route("/policy", put(replace_policy))
}

async fn get_policy(State(state): State<ApiState>) -> Json<EconomyPolicy> {
    Json(state.economy.policy())
}

#[derive(Serialize)]
struct PolicyUpdateResponse {
    previous: EconomyPolicy,
    current: EconomyPolicy,
}

async fn replace_policy(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(policy): Json<EconomyPolicy>,
) -> ApiResult<Json<PolicyUpdateResponse>> {
    state.authorize_admin(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))?;
    let previous = state.economy.replace_policy(policy)?;
    Ok(Json(PolicyUpdateResponse {
        previous,
        current: policy,
    }))
}
