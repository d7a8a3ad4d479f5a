//! Content publishing and unlock endpoints

use crate::{ApiResult, ApiState};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use credit_core::{Access, ContentItem};
use credit_ledger::{NewContent, PurchaseReceipt, UnlockState};
use serde::{Deserialize, Serialize};

/// Register content routes
pub fn content_routes() -> Router<ApiState> {
    Router::new()
        .route("/", post(publish))
        .route("/{id}", get(get_content))
        .route("/{id}/purchase", post(purchase))
}

async fn publish(
    State(state): State<ApiState>,
    Json(req): Json<NewContent>,
) -> ApiResult<Json<ContentItem>> {
    Ok(Json(state.economy.content.publish(req).await?))
}

#[derive(Debug, Deserialize)]
struct ViewerQuery {
    viewer: Option<String>,
}

#[derive(Serialize)]
struct ContentResponse {
    #[serde(flatten)]
    item: ContentItem,
    /// Present when the request names a viewer
    #[serde(skip_serializing_if = "Option::is_none")]
    access: Option<Access>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<UnlockState>,
}

async fn get_content(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> ApiResult<Json<ContentResponse>> {
    let content = &state.economy.content;
    let item = content.content(&id).await?;

    let (access, unlock) = match query.viewer.as_deref() {
        Some(viewer) => (
            Some(content.access(viewer, &id).await?),
            Some(content.state(viewer, &id).await?),
        ),
        None => (None, None),
    };

    Ok(Json(ContentResponse {
        item,
        access,
        state: unlock,
    }))
}

#[derive(Debug, Deserialize)]
struct PurchaseRequest {
    buyer: String,
}

async fn purchase(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<Json<PurchaseReceipt>> {
    Ok(Json(state.economy.content.purchase(&req.buyer, &id).await?))
}
