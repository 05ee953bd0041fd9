//! RPC server
//!
//! HTTP/JSON surface of a registry node.
//!
//! # Endpoints
//!
//! - POST /api/plugins - Register a plugin from a path on the node
//! - GET /api/plugins?name=&version= - Discover plugins
//! - GET /api/plugins/:name/:version - Get one descriptor
//! - GET /api/content/:content_id - Download raw content bytes
//! - GET /api/status - Node identity and peer directory state
//! - POST /api/reconcile - Run a reconciliation sweep now

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sdk::{
    ContentId, DiscoverPluginsQuery, DiscoverPluginsResponse, ErrorBody, GetPluginResponse,
    ReconcileReport, RegisterPluginRequest, RegisterPluginResponse, RegistryError,
    RegistryErrorExt, StatusResponse,
};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::registry::RegistryService;

/// Server state shared across handlers
#[derive(Clone)]
pub struct ServerState {
    registry: Arc<RegistryService>,
}

impl ServerState {
    pub fn new(registry: Arc<RegistryService>) -> Self {
        Self { registry }
    }
}

/// A registry error on its way to the client
pub struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

/// HTTP status for a registry error
pub fn status_for(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        RegistryError::NotAFile(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RegistryError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        RegistryError::Registration { source, .. } => match status_for(source) {
            StatusCode::GATEWAY_TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            hint: self.0.user_hint().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router over `state`
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/plugins", post(register_handler).get(discover_handler))
        .route("/api/plugins/:name/:version", get(get_plugin_handler))
        .route("/api/content/:content_id", get(download_handler))
        .route("/api/status", get(status_handler))
        .route("/api/reconcile", post(reconcile_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: ServerState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Registry RPC listening on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("RPC server shutting down gracefully");
        })
        .await
}

async fn register_handler(
    State(state): State<ServerState>,
    Json(request): Json<RegisterPluginRequest>,
) -> Result<Json<RegisterPluginResponse>, ApiError> {
    let registration = state
        .registry
        .register(&request.name, &request.version, &request.source_path)
        .await?;

    Ok(Json(RegisterPluginResponse {
        message: registration.message(),
        reference_url: registration.reference,
        content_id: registration.descriptor.content_id,
        replicated: registration.replicated,
    }))
}

async fn discover_handler(
    State(state): State<ServerState>,
    Query(query): Query<DiscoverPluginsQuery>,
) -> Result<Json<DiscoverPluginsResponse>, ApiError> {
    let plugins = state
        .registry
        .discover(query.name.as_deref(), query.version.as_deref())
        .await?;
    Ok(Json(DiscoverPluginsResponse { plugins }))
}

async fn get_plugin_handler(
    State(state): State<ServerState>,
    Path((name, version)): Path<(String, String)>,
) -> Result<Json<GetPluginResponse>, ApiError> {
    let plugin = state.registry.get(&name, &version).await?;
    Ok(Json(GetPluginResponse { plugin }))
}

async fn download_handler(
    State(state): State<ServerState>,
    Path(content_id): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.registry.download(&ContentId::new(content_id)).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

async fn status_handler(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(state.registry.status().await)
}

async fn reconcile_handler(
    State(state): State<ServerState>,
) -> Result<Json<ReconcileReport>, ApiError> {
    Ok(Json(state.registry.reconcile().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(
            status_for(&RegistryError::not_found("plugin:p:1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RegistryError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RegistryError::NotAFile("bafydir".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&RegistryError::registration(
                "plugin:p:1",
                RegistryError::DeadlineExceeded("pin".into())
            )),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&RegistryError::registration(
                "plugin:p:1",
                RegistryError::pin("bafy", "missing")
            )),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
