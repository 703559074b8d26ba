use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartError, ws::WebSocketUpgrade, ConnectInfo, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lanchat_shared::constants::{DEFAULT_MEDIA_TYPE, WS_PATH};
use lanchat_shared::{synthesize_id, FileRef};

use crate::assets;
use crate::blob_store::{BlobStore, FileRecord};
use crate::config::ServerConfig;
use crate::coordinator::CoordinatorHandle;
use crate::error::ServerError;
use crate::session;

#[derive(Clone)]
pub struct AppState {
    pub blob_store: BlobStore,
    pub coordinator: CoordinatorHandle,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/version", get(version))
        .route(WS_PATH, get(ws_upgrade))
        .route("/upload", post(file_upload))
        .route("/file/{id}", get(file_download))
        .fallback(assets::serve)
        .layer(DefaultBodyLimit::max(state.config.upload_body_limit()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    clients: usize,
    files: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.coordinator.client_count(),
        files: state.blob_store.file_count().await,
    })
}

async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let coordinator = state.coordinator.clone();
    ws.max_message_size(state.config.ws_max_message_size())
        .on_upgrade(move |socket| session::handle_socket(socket, peer, coordinator))
}

fn multipart_error(e: MultipartError, max: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::UploadTooLarge { max }
    } else {
        ServerError::BadRequest(format!("Multipart error: {}", e))
    }
}

/// Store an out-of-band upload. No broadcast happens here; the client
/// announces the returned reference over the WebSocket itself.
async fn file_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileRef>, ServerError> {
    let max = state.config.max_upload_size;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let media_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;
        if data.len() > max {
            return Err(ServerError::UploadTooLarge { max });
        }

        let id = synthesize_id();
        let record = FileRecord {
            name,
            size: data.len() as u64,
            media_type,
            content: data,
        };
        let reference = record.reference(id.as_str());
        state.blob_store.set(&id, record).await;

        info!(
            id = %id,
            name = %reference.name,
            size = reference.size,
            "File uploaded"
        );

        return Ok(Json(reference));
    }

    Err(ServerError::BadRequest(
        "Missing 'file' field in multipart form".to_string(),
    ))
}

async fn file_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let Some(file) = state.blob_store.get(&id).await else {
        warn!(id = %id, "File not found");
        return Err(ServerError::FileNotFound(id));
    };

    if !file.has_content() {
        warn!(id = %id, "File has no content");
        return Err(ServerError::EmptyContent(id));
    }

    let media_type = if file.media_type.is_empty() {
        DEFAULT_MEDIA_TYPE
    } else {
        file.media_type.as_str()
    };
    let content_type = HeaderValue::from_str(media_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MEDIA_TYPE));

    info!(id = %id, name = %file.name, size = file.content.len(), "Serving file");

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition(&file.name)),
        ],
        file.content,
    )
        .into_response())
}

/// `attachment; filename="<name>"`, dropping the filename if it cannot be
/// carried in a header.
fn content_disposition(name: &str) -> HeaderValue {
    let escaped = name.replace(['"', '\\'], "_");
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", escaped))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
