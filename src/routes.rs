use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::AppState;
use crate::download::{
    STALE_DOWNLOAD_JOB_SECONDS, build_content_disposition, cleanup_download_job,
    cleanup_stale_download_jobs, materialize_download, schedule_cleanup_download_job,
};
use crate::error::{ApiError, ErrorKind};
use crate::formats::{FormatKey, SelectedFormat, select_formats};
use crate::urls::extract_video_id;
use crate::ytdlp::VideoSummary;

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    title: String,
    thumbnail: String,
    author: String,
    video_id: String,
    duration: u64,
    view_count: u64,
    formats: Vec<SelectedFormat>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn get_info(
    State(state): State<AppState>,
    Json(payload): Json<InfoRequest>,
) -> Result<Json<InfoResponse>, ApiError> {
    let url = payload.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err(ApiError::invalid_url("Falta la URL del video."));
    }

    let video_id = extract_video_id(url)
        .ok_or_else(|| ApiError::invalid_url("La URL de YouTube no es valida."))?;

    let summary = state.source.resolve_metadata(&video_id).await?;

    // A failed format listing is not fatal; the client still gets offers.
    let formats = match state.source.list_formats(&video_id).await {
        Ok(raw) => select_formats(&raw),
        Err(error) => {
            warn!(
                "No se pudieron listar formatos para el video {video_id}: {}",
                error.message
            );
            select_formats(&[])
        }
    };

    Ok(Json(InfoResponse {
        title: summary.title,
        thumbnail: summary.thumbnail,
        author: summary.author,
        video_id,
        duration: summary.duration,
        view_count: summary.view_count,
        formats,
    }))
}

pub async fn download_direct(
    State(state): State<AppState>,
    Path((video_id, format_type)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let format_key = FormatKey::from_path(&format_type);

    let _permit = state
        .download_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::upstream("No se pudo reservar capacidad de descarga."))?;

    cleanup_stale_download_jobs(&state.transfer_dir, STALE_DOWNLOAD_JOB_SECONDS).await;

    let artifact = materialize_download(
        state.source.as_ref(),
        &state.transfer_dir,
        &video_id,
        format_key,
    )
    .await?;

    let prepared: Result<(HeaderMap, Body), ApiError> = async {
        let file = tokio::fs::File::open(&artifact.path).await.map_err(|error| {
            ApiError::download_failed(format!("No se pudo leer el archivo descargado: {error}"))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(artifact.content_type),
        );
        headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from_str(&artifact.content_length.to_string())
                .map_err(|_| ApiError::upstream("No se pudo crear la cabecera de tamano."))?,
        );
        let content_disposition = build_content_disposition(&artifact.filename);
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&content_disposition)
                .map_err(|_| ApiError::upstream("No se pudo crear la cabecera de descarga."))?,
        );

        Ok((headers, Body::from_stream(ReaderStream::new(file))))
    }
    .await;

    match prepared {
        Ok((headers, body)) => {
            schedule_cleanup_download_job(artifact.job_dir);
            Ok((headers, body).into_response())
        }
        Err(error) => {
            cleanup_download_job(&artifact.job_dir).await;
            Err(error)
        }
    }
}

pub async fn api_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoSummary>, ApiError> {
    state
        .source
        .resolve_metadata(&video_id)
        .await
        .map(Json)
        .map_err(|error| {
            if error.kind == ErrorKind::MetadataUnavailable {
                ApiError::not_found("Video no encontrado.")
            } else {
                error
            }
        })
}
