use std::io::ErrorKind;
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::warn;

use crate::error::ApiError;
use crate::formats::RawFormat;
use crate::urls::watch_url;

const YT_DLP_TIMEOUT_SECONDS: u64 = 180;
const AUDIO_QUALITY: &str = "192K";

/// Per-video metadata served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub title: String,
    pub thumbnail: String,
    pub author: String,
    pub author_url: String,
    pub duration: u64,
    pub view_count: u64,
}

/// What to ask the extractor for when materializing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSpec {
    /// Best audio track, extracted to mp3.
    AudioMp3,
    /// Best stream matching a yt-dlp format selector.
    Video { selector: &'static str },
}

/// Boundary to the external extraction capability. Production uses the
/// yt-dlp binary; tests substitute a stub.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn resolve_metadata(&self, video_id: &str) -> Result<VideoSummary, ApiError>;

    async fn list_formats(&self, video_id: &str) -> Result<Vec<RawFormat>, ApiError>;

    /// Writes the requested media to `output_path`. The caller owns the
    /// directory the path lives in and verifies the artifact afterwards.
    async fn fetch_media(
        &self,
        video_id: &str,
        spec: FetchSpec,
        output_path: &Path,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    uploader_url: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

impl YtDlpVideoInfo {
    fn into_summary(self) -> VideoSummary {
        VideoSummary {
            title: self
                .title
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "Unknown Title".to_string()),
            thumbnail: self.thumbnail.unwrap_or_default(),
            author: self
                .uploader
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "Unknown Author".to_string()),
            author_url: self.uploader_url.unwrap_or_default(),
            duration: self.duration.map(|value| value.max(0.0) as u64).unwrap_or(0),
            view_count: self.view_count.unwrap_or(0),
        }
    }
}

/// `VideoSource` backed by the yt-dlp CLI.
#[derive(Debug, Default)]
pub struct YtDlpSource;

impl YtDlpSource {
    pub fn new() -> Self {
        Self
    }

    async fn probe(&self, video_id: &str) -> Result<YtDlpVideoInfo, ApiError> {
        let output = run_yt_dlp(vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            watch_url(video_id),
        ])
        .await?;

        if !output.status.success() {
            return Err(ApiError::metadata_unavailable(format!(
                "No se pudieron obtener metadatos del video: {}",
                run_error_message(&output.stderr)
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|error| {
            warn!("JSON invalido de yt-dlp para el video {video_id}: {error}");
            ApiError::metadata_unavailable("No se pudieron interpretar los metadatos del video.")
        })
    }
}

#[async_trait]
impl VideoSource for YtDlpSource {
    async fn resolve_metadata(&self, video_id: &str) -> Result<VideoSummary, ApiError> {
        Ok(self.probe(video_id).await?.into_summary())
    }

    async fn list_formats(&self, video_id: &str) -> Result<Vec<RawFormat>, ApiError> {
        Ok(self.probe(video_id).await?.formats)
    }

    async fn fetch_media(
        &self,
        video_id: &str,
        spec: FetchSpec,
        output_path: &Path,
    ) -> Result<(), ApiError> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-o".to_string(),
            output_path.to_string_lossy().into_owned(),
        ];

        match spec {
            FetchSpec::AudioMp3 => {
                args.push("-f".to_string());
                args.push("bestaudio/best".to_string());
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push("mp3".to_string());
                args.push("--audio-quality".to_string());
                args.push(AUDIO_QUALITY.to_string());
            }
            FetchSpec::Video { selector } => {
                args.push("-f".to_string());
                args.push(selector.to_string());
            }
        }

        args.push(watch_url(video_id));

        let output = run_yt_dlp(args).await?;
        if !output.status.success() {
            return Err(ApiError::download_failed(format!(
                "yt-dlp no pudo descargar el video: {}",
                run_error_message(&output.stderr)
            )));
        }

        Ok(())
    }
}

async fn run_yt_dlp(args: Vec<String>) -> Result<Output, ApiError> {
    let command_future = Command::new("yt-dlp").args(args).output();
    timeout(Duration::from_secs(YT_DLP_TIMEOUT_SECONDS), command_future)
        .await
        .map_err(|_| {
            ApiError::upstream("yt-dlp excedio el tiempo limite de ejecucion.")
        })?
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                ApiError::upstream(
                    "yt-dlp no esta instalado en el sistema. Instala yt-dlp y reinicia el backend.",
                )
            } else {
                ApiError::upstream(format!("No se pudo ejecutar yt-dlp: {error}"))
            }
        })
}

/// Distills yt-dlp's stderr down to its last non-empty line.
fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp no pudo completar la operacion")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_is_distilled_to_the_last_non_empty_line() {
        let stderr = b"WARNING: something\n\nERROR: Video unavailable\n\n";
        assert_eq!(run_error_message(stderr), "ERROR: Video unavailable");
        assert_eq!(
            run_error_message(b""),
            "yt-dlp no pudo completar la operacion"
        );
    }

    #[test]
    fn probe_payload_maps_to_summary_with_defaults() {
        let info: YtDlpVideoInfo = serde_json::from_str(
            r#"{"title":"  ","uploader":null,"duration":212.4,"view_count":7}"#,
        )
        .unwrap();
        let summary = info.into_summary();
        assert_eq!(summary.title, "Unknown Title");
        assert_eq!(summary.author, "Unknown Author");
        assert_eq!(summary.thumbnail, "");
        assert_eq!(summary.author_url, "");
        assert_eq!(summary.duration, 212);
        assert_eq!(summary.view_count, 7);
    }

    #[test]
    fn probe_payload_keeps_provided_fields_and_formats() {
        let info: YtDlpVideoInfo = serde_json::from_str(
            r#"{
                "title": "Never Gonna Give You Up",
                "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq720.jpg",
                "uploader": "Rick Astley",
                "uploader_url": "https://www.youtube.com/@RickAstley",
                "duration": 212,
                "view_count": 1000000,
                "formats": [
                    {"format_id": "140", "acodec": "mp4a.40.2", "vcodec": "none", "abr": 129.478}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(info.formats.len(), 1);
        assert_eq!(info.formats[0].format_id, "140");
        let summary = info.into_summary();
        assert_eq!(summary.title, "Never Gonna Give You Up");
        assert_eq!(summary.author, "Rick Astley");
        assert_eq!(summary.duration, 212);
    }
}
