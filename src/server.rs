use crate::app::query_use_case::QueryUseCase;
use crate::domain::ListOptions;
use crate::error::IndexerError;
use axum::{
    extract::{Path, Query},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Error body for the read API.
pub struct ApiError(IndexerError);

impl From<IndexerError> for ApiError {
    fn from(e: IndexerError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IndexerError::NotFound { .. } => StatusCode::NOT_FOUND,
            IndexerError::HttpStatus { status: 404, .. } => StatusCode::NOT_FOUND,
            IndexerError::HttpStatus { .. } | IndexerError::Http(_) | IndexerError::Page { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct ProtocolQuery {
    p: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CursorQuery {
    cursor: Option<i64>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ord-indexer",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_collections(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Query(opts): Query<ListOptions>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(query.list_collections(opts).await?))
}

async fn get_collection(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Path(tick): Path<String>,
    Query(q): Query<ProtocolQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let collection = query.get_collection(q.p.as_deref(), &tick).await?;
    Ok(Json(serde_json::json!({ "data": collection })))
}

async fn get_inscription_collection(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Path(inscription_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let collection = query.get_inscription_collection(inscription_id).await?;
    Ok(Json(serde_json::json!({ "data": collection })))
}

async fn list_tokens(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Query(opts): Query<ListOptions>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(query.list_tokens(opts).await?))
}

async fn get_token(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Path((tick, token_id)): Path<(String, u64)>,
    Query(q): Query<ProtocolQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let token = query.get_token(q.p.as_deref(), &tick, token_id).await?;
    Ok(Json(serde_json::json!({ "data": token })))
}

async fn get_inscription_token(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Path(inscription_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let token = query.get_inscription_token(inscription_id).await?;
    Ok(Json(serde_json::json!({ "data": token })))
}

async fn get_inscription(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Path(uid): Path<String>,
) -> ApiResult<serde_json::Value> {
    let inscription = query.get_inscription(&uid).await?;
    Ok(Json(serde_json::json!({ "data": inscription })))
}

async fn list_inscriptions(
    Extension(query): Extension<Arc<QueryUseCase>>,
    Query(q): Query<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(query.list_inscriptions(q.cursor).await?))
}

/// Create the read API router
pub fn create_server(query: Arc<QueryUseCase>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/collections", get(list_collections))
        .route("/v1/collections/:tick", get(get_collection))
        .route("/v1/tokens", get(list_tokens))
        .route("/v1/tokens/:tick/:token_id", get(get_token))
        .route("/v1/inscription/:uid", get(get_inscription))
        .route("/v1/inscriptions", get(list_inscriptions))
        .route("/v1/inscriptions/:id/collection", get(get_inscription_collection))
        .route("/v1/inscriptions/:id/token", get(get_inscription_token))
        .layer(Extension(query))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Serve the read API on `port` until `shutdown` resolves
pub async fn start_server<F>(query: Arc<QueryUseCase>, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let app = create_server(query);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
