//! HTTP and WebSocket server.
//!
//! One-shot handlers run exactly one search or lookup to completion and
//! answer with a single JSON body. `/pages-stream` upgrades to a WebSocket
//! and hands the connection to a [`Session`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/pages?criteria=&url=` | Matching pages, capped at `[query].max_results` |
//! | `GET`  | `/pages/{id}/content` | Content of one page as a JSON string |
//! | `GET`  | `/count-pages?criteria=&url=` | `{"count": n}` |
//! | `GET`  | `/forbidden-extensions` | Sorted list of extensions |
//! | `GET`  | `/pages-stream` | WebSocket command session |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! When `/pages` hits the ceiling the list is truncated and the response
//! carries `x-result-truncated: true`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_id", "message": "invalid id 'x': ..." } }
//! ```
//!
//! Error codes: `invalid_query` (400), `invalid_id` (400), `not_found` (404),
//! `store_error` (502), `timeout` (504).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::engine::QueryEngine;
use crate::error::QueryError;
use crate::models::{ForbiddenExtensionSet, SearchResultItem};
use crate::protocol::Inbound;
use crate::session::{Session, Transport, TransportError};
use crate::store::sqlite::SqliteRepository;

pub const TRUNCATED_HEADER: &str = "x-result-truncated";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: QueryEngine,
    config: Arc<Config>,
}

/// Starts the server on `[server].bind` against the configured SQLite
/// database. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let repo = Arc::new(SqliteRepository::new(pool));
    let engine = QueryEngine::from_config(repo, config);

    let listener = TcpListener::bind(&config.server.bind).await?;
    serve(listener, engine, Arc::new(config.clone())).await
}

/// Serves the API on an already-bound listener.
///
/// Tests bind `127.0.0.1:0` and pass an engine over an in-memory
/// repository.
pub async fn serve(
    listener: TcpListener,
    engine: QueryEngine,
    config: Arc<Config>,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(engine, config)).await?;
    Ok(())
}

/// Builds the application router.
pub fn router(engine: QueryEngine, config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/pages", get(handle_pages))
        .route("/pages/{id}/content", get(handle_content))
        .route("/count-pages", get(handle_count))
        .route("/forbidden-extensions", get(handle_extensions))
        .route("/pages-stream", get(handle_stream))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine, config })
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"invalid_id"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match &err {
            QueryError::InvalidQuery(_) | QueryError::InvalidId { .. } => StatusCode::BAD_REQUEST,
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            _ if err.code() == "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };

        if status.is_server_error() {
            error!(error = %err, "request failed");
        } else {
            warn!(error = %err, "request rejected");
        }

        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Search ============

/// Query string of `/pages` and `/count-pages`.
#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    criteria: String,
    url: Option<String>,
}

/// Handler for `GET /pages`.
async fn handle_pages(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, AppError> {
    let drained = state
        .engine
        .collect(
            params.url.as_deref(),
            &params.criteria,
            state.config.query.max_results,
        )
        .await?;

    let items: Vec<SearchResultItem> = drained.items;
    let mut response = Json(items).into_response();
    if drained.truncated {
        response.headers_mut().insert(
            HeaderName::from_static(TRUNCATED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    Ok(response)
}

#[derive(Serialize)]
struct CountResponse {
    count: u64,
}

/// Handler for `GET /count-pages`. Folds the stream without a ceiling.
async fn handle_count(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state
        .engine
        .count(params.url.as_deref(), &params.criteria)
        .await?;
    Ok(Json(CountResponse { count }))
}

// ============ Content and extensions ============

/// Handler for `GET /pages/{id}/content`.
async fn handle_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<String>, AppError> {
    let record = state.engine.get_by_id(&id).await?;
    Ok(Json(record.content))
}

async fn handle_extensions(
    State(state): State<AppState>,
) -> Result<Json<ForbiddenExtensionSet>, AppError> {
    Ok(Json(state.engine.list_forbidden_extensions().await?))
}

// ============ GET /pages-stream ============

async fn handle_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_pending = state.config.session.max_pending_commands;
    ws.on_upgrade(move |socket| async move {
        let session = Session::new(WsTransport { socket }, state.engine, max_pending);
        session.run().await;
    })
}

/// [`Transport`] over an upgraded axum WebSocket.
struct WsTransport {
    socket: WebSocket,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        loop {
            let message = match self.socket.recv().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Inbound::Text(text.as_str().to_owned()))),
                Message::Binary(bytes) => return Some(Ok(Inbound::Binary(bytes.to_vec()))),
                Message::Close(_) => return None,
                // Pings are answered by the socket itself.
                _ => {}
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
