use url::Url;

/// Extracts the video identifier from the URL shapes the service accepts:
/// `youtube.com/watch?v=...`, `youtube.com/embed/...` and `youtu.be/...`.
/// Anything else, including input that does not parse as a URL, yields None.
pub fn extract_video_id(input: &str) -> Option<String> {
    let parsed = Url::parse(input).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    if host.contains("youtube.com") {
        if parsed.path() == "/watch" {
            return parsed
                .query_pairs()
                .find(|(key, value)| key == "v" && !value.is_empty())
                .map(|(_, value)| value.into_owned());
        }

        if let Some(rest) = parsed.path().strip_prefix("/embed/") {
            let segment = rest.split('/').next().unwrap_or_default();
            if !segment.is_empty() {
                return Some(segment.to_string());
            }
        }

        return None;
    }

    if host.contains("youtu.be") {
        let remainder = parsed.path().strip_prefix('/').unwrap_or_default();
        if !remainder.is_empty() {
            return Some(remainder.to_string());
        }
    }

    None
}

/// Canonical watch URL handed to yt-dlp for a given identifier.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_id_from_watch_url_with_extra_params() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?t=43&v=dQw4w9WgXcQ&list=PL123"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn watch_url_without_v_param_is_rejected() {
        assert_eq!(extract_video_id("https://www.youtube.com/watch?list=PL123"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v="), None);
    }

    #[test]
    fn extracts_id_from_embed_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ/extra"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn empty_embed_segment_is_rejected() {
        assert_eq!(extract_video_id("https://www.youtube.com/embed/"), None);
    }

    #[test]
    fn extracts_id_from_short_link() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        // Query parameters are not part of the identifier.
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc123"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn mobile_host_is_accepted() {
        assert_eq!(
            extract_video_id("https://m.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn unrecognized_shapes_are_rejected() {
        assert_eq!(extract_video_id("not a youtube url"), None);
        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://youtu.be/"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn watch_url_round_trips_through_the_parser() {
        let url = watch_url("dQw4w9WgXcQ");
        assert_eq!(url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(extract_video_id(&url), Some("dQw4w9WgXcQ".to_string()));
    }
}
