mod download;
mod error;
mod formats;
mod routes;
mod urls;
mod ytdlp;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::{HeaderName, HeaderValue, Method, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::download::{STALE_DOWNLOAD_JOB_SECONDS, cleanup_stale_download_jobs};
use crate::error::ApiError;
use crate::ytdlp::{VideoSource, YtDlpSource};

const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn VideoSource>,
    pub download_semaphore: Arc<Semaphore>,
    pub transfer_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ytgrab=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let transfer_dir = std::env::temp_dir().join("youtube_downloads");
    tokio::fs::create_dir_all(&transfer_dir)
        .await
        .map_err(|error| {
            ApiError::upstream(format!(
                "No se pudo crear la carpeta temporal de descargas: {error}"
            ))
        })?;

    let max_concurrent_downloads = read_usize_env("MAX_CONCURRENT_DOWNLOADS")
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS);

    let state = AppState {
        source: Arc::new(YtDlpSource::new()),
        download_semaphore: Arc::new(Semaphore::new(max_concurrent_downloads)),
        transfer_dir,
    };

    cleanup_stale_download_jobs(&state.transfer_dir, STALE_DOWNLOAD_JOB_SECONDS).await;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/get_info", post(routes::get_info))
        .route(
            "/download_direct/{video_id}/{format_type}",
            get(routes::download_direct),
        )
        .route("/api/video/{video_id}", get(routes::api_video))
        .with_state(state)
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = resolve_bind_addr();
    let listener = TcpListener::bind(&addr).await.map_err(|error| {
        ApiError::upstream(format!("No se pudo iniciar el puerto {addr}: {error}"))
    })?;

    info!("Backend listo en http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::upstream(format!("Error del servidor HTTP: {error}")))
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer-when-downgrade"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=()"),
    );
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    response
}

fn read_usize_env(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    "0.0.0.0:5000".to_string()
}
