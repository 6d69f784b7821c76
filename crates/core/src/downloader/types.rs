use serde::{Deserialize, Serialize};
use std::path::Path;

/// What kind of stream the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Audio,
    Video,
}

impl Default for FormatKind {
    fn default() -> Self {
        FormatKind::Audio
    }
}

/// One download to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub format_kind: FormatKind,
    /// Site-specific format selector; opaque to us.
    #[serde(default)]
    pub format_id: Option<String>,
    /// Subtitle selection: a language code, `"all"`, or `"none"`/absent.
    #[serde(default)]
    pub subtitles: Option<String>,
    /// Explicit output file name (sanitized before use).
    #[serde(default)]
    pub filename: Option<String>,
}

impl DownloadRequest {
    pub fn wants_subtitles(&self) -> bool {
        matches!(&self.subtitles, Some(s) if !s.is_empty() && s != "none")
    }
}

/// One selectable remote format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFormat {
    pub format_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    /// Human-readable label for format pickers.
    pub label: String,
}

/// Metadata of a single remote video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMedia {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub subtitles: Vec<String>,
    #[serde(default)]
    pub formats: Vec<RemoteFormat>,
}

/// One entry of a remote playlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Result of probing a URL: either one video or a playlist listing.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FormatProbe {
    Single(RemoteMedia),
    Playlist {
        is_playlist: bool,
        videos: Vec<PlaylistEntry>,
        video_count: usize,
    },
}

/// Make a user-supplied filename safe for the filesystem.
///
/// Strips directory components and path traversal, replaces characters
/// that are invalid on Windows, trims leading/trailing dots and spaces,
/// and caps the length while keeping the extension.
pub fn sanitize_filename(filename: &str, max_length: usize) -> String {
    let without_traversal = filename.replace("..", "_");
    let base = Path::new(&without_traversal)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut sanitized: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();
    sanitized = sanitized.trim_matches(|c| c == ' ' || c == '.').to_string();

    if sanitized.len() > max_length {
        let (stem, ext) = match sanitized.rfind('.') {
            Some(dot) => (sanitized[..dot].to_string(), sanitized[dot..].to_string()),
            None => (sanitized.clone(), String::new()),
        };
        let keep = max_length.saturating_sub(ext.len());
        let stem: String = stem.chars().take(keep).collect();
        sanitized = format!("{stem}{ext}");
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_traversal_and_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd", 200), "passwd");
        assert_eq!(sanitize_filename("/tmp/evil.mp4", 200), "evil.mp4");
    }

    #[test]
    fn test_sanitize_replaces_invalid_characters() {
        assert_eq!(
            sanitize_filename("a<b>c:d\"e|f?g*h.mp4", 200),
            "a_b_c_d_e_f_g_h.mp4"
        );
    }

    #[test]
    fn test_sanitize_trims_dots_and_spaces() {
        assert_eq!(sanitize_filename("  name. ", 200), "name");
    }

    #[test]
    fn test_sanitize_caps_length_preserving_extension() {
        let long = format!("{}.mp4", "x".repeat(300));
        let out = sanitize_filename(&long, 40);
        assert!(out.len() <= 40);
        assert!(out.ends_with(".mp4"));
    }

    #[test]
    fn test_wants_subtitles() {
        let mut req = DownloadRequest {
            url: "u".to_string(),
            format_kind: FormatKind::Video,
            format_id: None,
            subtitles: None,
            filename: None,
        };
        assert!(!req.wants_subtitles());
        req.subtitles = Some("none".to_string());
        assert!(!req.wants_subtitles());
        req.subtitles = Some("en".to_string());
        assert!(req.wants_subtitles());
        req.subtitles = Some("all".to_string());
        assert!(req.wants_subtitles());
    }
}
