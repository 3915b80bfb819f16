use anyhow::{Context, Result};
use std::time::Duration;

use tracing::info;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::{log_requests, make_index_routes, state::*, RequestsLoggingLevel, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub scope: String,
    pub page_size: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        scope: state.store.scope().to_string(),
        page_size: state.store.page_size().get(),
    };
    Json(stats)
}

pub fn make_app(config: ServerConfig, store: GuardedIndexStore) -> Router {
    let state = ServerState::new(config, store);

    let index_routes = make_index_routes(state.clone());

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router
        .nest("/v1/index", index_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    store: GuardedIndexStore,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
    };
    let app = make_app(config, store);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on 127.0.0.1:{}", port);

    Ok(axum::serve(listener, app).await?)
}
