//! Metered chat endpoints
//!
//! Members send with `sender` set. Guests omit it and carry the
//! `guest_session` id returned by their first message.

use crate::state::GuestSession;
use crate::{ApiResult, ApiState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use credit_core::ChatMessage;
use credit_ledger::Payer;
use serde::{Deserialize, Serialize};

/// Register chat routes
pub fn chat_routes() -> Router<ApiState> {
    Router::new()
        .route("/", post(send_message))
        .route("/quote", post(quote))
        .route("/{id}/inbox", get(inbox))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    sender: Option<String>,
    guest_session: Option<String>,
    recipient: String,
    text: String,
}

#[derive(Serialize)]
struct SendResponse {
    message: ChatMessage,
    cost: u64,
    remaining: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    guest_session: Option<String>,
}

async fn send_message(
    State(state): State<ApiState>,
    Json(req): Json<SendRequest>,
) -> ApiResult<Json<SendResponse>> {
    let chat = &state.economy.chat;

    if let Some(sender) = req.sender.as_deref() {
        let sent = chat
            .send_message(Payer::Member(sender), &req.recipient, &req.text)
            .await?;
        return Ok(Json(SendResponse {
            message: sent.message,
            cost: sent.cost,
            remaining: sent.remaining,
            guest_session: None,
        }));
    }

    let (sent, session) = match req.guest_session.as_deref() {
        Some(id) => {
            let handle = state.guest_session(id).await?;
            let mut session = handle.lock().await;
            let sent = chat
                .send_message(Payer::Guest(&mut session.pool), &req.recipient, &req.text)
                .await?;
            session.touch();
            (sent, id.to_string())
        }
        None => {
            // Only a session whose first message went through is kept
            let mut session = GuestSession::new();
            let sent = chat
                .send_message(Payer::Guest(&mut session.pool), &req.recipient, &req.text)
                .await?;
            (sent, state.open_guest_session(session))
        }
    };

    Ok(Json(SendResponse {
        message: sent.message,
        cost: sent.cost,
        remaining: sent.remaining,
        guest_session: Some(session),
    }))
}

#[derive(Debug, Deserialize)]
struct QuoteRequest {
    text: String,
}

#[derive(Serialize)]
struct QuoteResponse {
    characters: usize,
    cost: u64,
}

async fn quote(State(state): State<ApiState>, Json(req): Json<QuoteRequest>) -> Json<QuoteResponse> {
    Json(QuoteResponse {
        characters: req.text.chars().count(),
        cost: state.economy.chat.quote(&req.text),
    })
}

async fn inbox(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(state.economy.chat.inbox(&id).await?))
}
