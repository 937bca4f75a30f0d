use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::formats::FormatKey;
use crate::ytdlp::{FetchSpec, VideoSource};

pub const DOWNLOAD_JOB_RETENTION_SECONDS: u64 = 20 * 60;
pub const STALE_DOWNLOAD_JOB_SECONDS: u64 = 2 * 60 * 60;

const MAX_TITLE_CHARS: usize = 50;

/// A verified downloaded file, ready to be streamed to the client. The job
/// directory must stay alive until the response stream finishes; callers
/// hand it to `schedule_cleanup_download_job` on success.
#[derive(Debug)]
pub struct DownloadArtifact {
    pub path: PathBuf,
    pub job_dir: PathBuf,
    pub filename: String,
    pub content_type: &'static str,
    pub content_length: u64,
}

/// Resolves the video, asks the extractor to write the requested format
/// into a fresh per-request job directory and verifies the artifact exists.
/// The job directory is removed on every failure path.
pub async fn materialize_download(
    source: &dyn VideoSource,
    transfer_dir: &Path,
    video_id: &str,
    format_key: FormatKey,
) -> Result<DownloadArtifact, ApiError> {
    let summary = source.resolve_metadata(video_id).await?;
    let safe_title = sanitize_title(&summary.title);
    let (spec, content_type, filename) = download_plan(format_key, &safe_title);

    // Per-request job directory; concurrent requests for the same video and
    // format can never collide on a filename.
    let job_dir = transfer_dir.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&job_dir).await.map_err(|error| {
        ApiError::download_failed(format!(
            "No se pudo preparar la carpeta temporal de descarga: {error}"
        ))
    })?;

    let output_path = job_dir.join(&filename);
    if let Err(error) = source.fetch_media(video_id, spec, &output_path).await {
        cleanup_download_job(&job_dir).await;
        return Err(error);
    }

    let metadata = match tokio::fs::metadata(&output_path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            cleanup_download_job(&job_dir).await;
            return Err(ApiError::download_failed(
                "No se encontro el archivo descargado.",
            ));
        }
    };

    Ok(DownloadArtifact {
        path: output_path,
        job_dir,
        filename,
        content_type,
        content_length: metadata.len(),
    })
}

fn download_plan(format_key: FormatKey, safe_title: &str) -> (FetchSpec, &'static str, String) {
    match format_key {
        FormatKey::Audio => (
            FetchSpec::AudioMp3,
            "audio/mpeg",
            format!("{safe_title}.mp3"),
        ),
        FormatKey::P720 => (
            FetchSpec::Video {
                selector: "best[height<=720]/best",
            },
            "video/mp4",
            format!("{safe_title}_{format_key}.mp4"),
        ),
        FormatKey::P480 => (
            FetchSpec::Video {
                selector: "best[height<=480]/best",
            },
            "video/mp4",
            format!("{safe_title}_{format_key}.mp4"),
        ),
        FormatKey::Best => (
            FetchSpec::Video { selector: "best" },
            "video/mp4",
            format!("{safe_title}_{format_key}.mp4"),
        ),
    }
}

/// Keeps alphanumerics, spaces, hyphens and underscores, strips trailing
/// whitespace and truncates to 50 characters. An empty result is allowed.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim_end().chars().take(MAX_TITLE_CHARS).collect()
}

/// Attachment header with an ASCII fallback plus the RFC 5987 encoded form
/// for titles that keep non-ASCII alphanumerics.
pub fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());

    for character in value.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_' | ' ') {
            sanitized.push(character);
        } else {
            sanitized.push('_');
        }
    }

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download.bin".to_string()
    } else {
        compact.to_string()
    }
}

pub async fn cleanup_download_job(job_dir: &Path) {
    if let Err(error) = tokio::fs::remove_dir_all(job_dir).await
        && error.kind() != ErrorKind::NotFound
    {
        info!("No se pudo limpiar la carpeta temporal: {error}");
    }
}

/// Keeps the artifact reachable while the response streams, then reaps it.
pub fn schedule_cleanup_download_job(job_dir: PathBuf) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(DOWNLOAD_JOB_RETENTION_SECONDS)).await;
        cleanup_download_job(&job_dir).await;
    });
}

/// Sweeps job directories (and stray files) older than `older_than_secs`
/// out of the transfer directory. Runs at startup and before each download.
pub async fn cleanup_stale_download_jobs(transfer_dir: &Path, older_than_secs: u64) {
    let mut entries = match tokio::fs::read_dir(transfer_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("No se pudo abrir la carpeta de transferencias para limpieza: {error}");
            }
            return;
        }
    };

    let max_age = Duration::from_secs(older_than_secs);
    let now = std::time::SystemTime::now();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        let removal = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        if let Err(error) = removal
            && error.kind() != ErrorKind::NotFound
        {
            warn!("No se pudo eliminar el trabajo temporal {:?}: {error}", path);
        }
    }
}
