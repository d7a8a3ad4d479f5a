//! API routes organization
//!
//! Routes are grouped by domain:
//! - `accounts` - Balances, history, rewards, subscriptions, withdrawals
//! - `content` - Publishing and unlocking paid content
//! - `chat` - Metered messages for members and guests
//! - `policy` - Economy policy (public read, admin replace)

mod accounts;
mod chat;
mod content;
mod policy;

use crate::ApiState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

/// Create the main router with all API endpoints
pub fn create_routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/accounts", accounts::account_routes())
        .nest("/content", content::content_routes())
        .nest("/chat", chat::chat_routes())
        .nest("/policy", policy::policy_routes())
        .nest("/admin", policy::admin_routes())
}

async fn root() -> &'static str {
    "Credit Economy API"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
