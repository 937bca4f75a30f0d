use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One entry of the raw format list reported by yt-dlp. Everything except
/// the format id is optional upstream; `"none"` in a codec field means the
/// stream does not carry that track at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    pub format_id: String,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    pub height: Option<u32>,
    pub abr: Option<f32>,
    pub filesize: Option<f64>,
}

/// Closed set of client-selectable download options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormatKey {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "best")]
    Best,
}

impl FormatKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::Best => "best",
        }
    }

    /// Parses the `format_type` path segment. Unrecognized values fall
    /// through to `best`, matching the served contract.
    pub fn from_path(value: &str) -> Self {
        match value {
            "audio" => Self::Audio,
            "720p" => Self::P720,
            "480p" => Self::P480,
            _ => Self::Best,
        }
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// A client-facing download offer, computed fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedFormat {
    pub format_id: FormatKey,
    pub ext: &'static str,
    pub quality: String,
    pub filesize: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_info: Option<RawFormat>,
}

fn audio_present(format: &RawFormat) -> bool {
    format.acodec.as_deref() != Some("none")
}

fn video_present(format: &RawFormat) -> bool {
    format.vcodec.as_deref() != Some("none")
}

fn is_audio_only(format: &RawFormat) -> bool {
    audio_present(format) && !video_present(format)
}

fn is_combined(format: &RawFormat) -> bool {
    audio_present(format) && video_present(format)
}

fn approx_size_label(filesize: Option<f64>) -> String {
    match filesize {
        Some(bytes) if bytes > 0.0 => format!("~{}MB", bytes as u64 / 1_048_576),
        _ => "Unknown".to_string(),
    }
}

fn audio_quality_label(abr: Option<f32>) -> String {
    match abr {
        Some(kbps) => format!("Audio {kbps}kbps"),
        None => "Audio Unknownkbps".to_string(),
    }
}

/// Builds the normalized offer list from the raw upstream formats. Never
/// empty and never fails: an anomalous upstream list degrades to the static
/// fallback triple. Output order is fixed: audio, 720p, 480p, then the
/// best-available entry only when none of the first three fired.
pub fn select_formats(raw: &[RawFormat]) -> Vec<SelectedFormat> {
    let mut offers = Vec::new();

    let best_audio = raw.iter().filter(|format| is_audio_only(format)).max_by(|a, b| {
        a.abr
            .unwrap_or(0.0)
            .partial_cmp(&b.abr.unwrap_or(0.0))
            .unwrap_or(Ordering::Equal)
    });
    if let Some(format) = best_audio {
        offers.push(SelectedFormat {
            format_id: FormatKey::Audio,
            ext: "mp3",
            quality: audio_quality_label(format.abr),
            filesize: approx_size_label(format.filesize),
            kind: MediaKind::Audio,
            format_info: Some(format.clone()),
        });
    }

    let combined: Vec<&RawFormat> = raw.iter().filter(|format| is_combined(format)).collect();

    // 480p keeps the "HD" wording served to existing clients.
    for (height, key, label) in [(720, FormatKey::P720, "720p HD"), (480, FormatKey::P480, "480p HD")] {
        let best = combined
            .iter()
            .copied()
            .filter(|format| format.height == Some(height))
            .max_by(|a, b| {
                a.filesize
                    .unwrap_or(0.0)
                    .partial_cmp(&b.filesize.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            });
        if let Some(format) = best {
            offers.push(SelectedFormat {
                format_id: key,
                ext: "mp4",
                quality: label.to_string(),
                filesize: approx_size_label(format.filesize),
                kind: MediaKind::Video,
                format_info: Some(format.clone()),
            });
        }
    }

    if offers.is_empty() {
        let best = combined
            .iter()
            .copied()
            .max_by_key(|format| format.height.unwrap_or(0));
        match best {
            Some(format) => offers.push(SelectedFormat {
                format_id: FormatKey::Best,
                ext: "mp4",
                quality: format
                    .height
                    .map(|height| format!("{height}p"))
                    .unwrap_or_else(|| "Unknownp".to_string()),
                filesize: approx_size_label(format.filesize),
                kind: MediaKind::Video,
                format_info: Some(format.clone()),
            }),
            None => return static_fallback(),
        }
    }

    offers
}

/// Hard-coded offers served when the upstream list yields nothing usable.
fn static_fallback() -> Vec<SelectedFormat> {
    vec![
        SelectedFormat {
            format_id: FormatKey::Audio,
            ext: "mp3",
            quality: "Audio Only (MP3)".to_string(),
            filesize: "~5MB".to_string(),
            kind: MediaKind::Audio,
            format_info: None,
        },
        SelectedFormat {
            format_id: FormatKey::P720,
            ext: "mp4",
            quality: "720p HD".to_string(),
            filesize: "~50MB".to_string(),
            kind: MediaKind::Video,
            format_info: None,
        },
        SelectedFormat {
            format_id: FormatKey::P480,
            ext: "mp4",
            quality: "480p SD".to_string(),
            filesize: "~30MB".to_string(),
            kind: MediaKind::Video,
            format_info: None,
        },
    ]
}
