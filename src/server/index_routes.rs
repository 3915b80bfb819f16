//! Index API routes

use crate::store::{QueryRequest, StoreError, SyncPhase, SyncProgress};

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{error, warn};

use super::state::{GuardedIndexStore, ServerState};

#[derive(Serialize, Debug, PartialEq)]
pub struct SyncProgressBody {
    pub synced: u64,
    pub total: Option<u64>,
    pub is_complete: bool,
    pub phase: SyncPhase,
}

impl From<SyncProgress> for SyncProgressBody {
    fn from(progress: SyncProgress) -> Self {
        Self {
            synced: progress.synced(),
            total: progress.total().known(),
            is_complete: progress.is_complete(),
            phase: progress.phase(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Store error rendered as an HTTP response.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::PageOutOfRange { .. } => StatusCode::BAD_REQUEST,
            StoreError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Index request failed: {}", self.0);
        } else {
            warn!("Rejected index request: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn get_sync_progress(State(store): State<GuardedIndexStore>) -> Json<SyncProgressBody> {
    Json(store.progress().into())
}

async fn stream_sync_progress(
    State(store): State<GuardedIndexStore>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = store.subscribe_progress();
    // Emit the current value first
    receiver.mark_changed();

    let stream = stream::unfold(receiver, |mut receiver| async move {
        receiver.changed().await.ok()?;
        let body = SyncProgressBody::from(*receiver.borrow_and_update());
        let json = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());
        let event = Event::default().event("progress").data(json);
        Some((Ok(event), receiver))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn get_page(State(store): State<GuardedIndexStore>) -> impl IntoResponse {
    Json(store.page())
}

async fn post_query(
    State(store): State<GuardedIndexStore>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let page = store.query(request).await?;
    Ok(Json(page))
}

async fn post_clear(State(store): State<GuardedIndexStore>) -> Result<StatusCode, ApiError> {
    store.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn make_index_routes(state: ServerState) -> Router {
    Router::new()
        .route("/sync", get(get_sync_progress))
        .route("/sync/stream", get(stream_sync_progress))
        .route("/page", get(get_page))
        .route("/query", post(post_query))
        .route("/clear", post(post_clear))
        .with_state(state)
}
