//! Local video file source.

use super::{spawn_error, SourceType, VideoMetadata, VideoSource};
use crate::error::{GlimtError, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

/// Supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpeg", "mpg", "3gp",
];

/// What ffprobe reports about a file.
#[derive(Debug, Default, PartialEq)]
struct ProbeInfo {
    duration: Option<f64>,
    title: Option<String>,
    resolution: Option<String>,
}

/// Local file source for video files.
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }

    /// Check if path is a supported video file.
    fn is_video_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Probe duration, title and resolution with ffprobe.
    async fn probe(path: &Path) -> Result<ProbeInfo> {
        let output = tokio::process::Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await
            .map_err(|e| spawn_error("ffprobe", e))?;

        if !output.status.success() {
            warn!("ffprobe could not read {:?}, continuing without metadata", path);
            return Ok(ProbeInfo::default());
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap_or_default();
        Ok(parse_probe(&json))
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_probe(json: &serde_json::Value) -> ProbeInfo {
    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok());

    let title = json["format"]["tags"]["title"].as_str().map(|s| s.to_string());

    let resolution = json["streams"].as_array().and_then(|streams| {
        streams
            .iter()
            .find(|s| s["codec_type"].as_str() == Some("video"))
            .and_then(|s| Some(format!("{}x{}", s["width"].as_u64()?, s["height"].as_u64()?)))
    });

    ProbeInfo {
        duration,
        title,
        resolution,
    }
}

#[async_trait]
impl VideoSource for LocalSource {
    fn source_type(&self) -> SourceType {
        SourceType::Local
    }

    fn can_handle(&self, input: &str) -> bool {
        Self::is_video_file(Path::new(input))
    }

    fn extract_id(&self, input: &str) -> Option<String> {
        let path = Path::new(input);
        if Self::is_video_file(path) {
            Some(input.to_string())
        } else {
            None
        }
    }

    async fn fetch_video(&self, id: &str) -> Result<VideoMetadata> {
        let path = Path::new(id);

        if !path.exists() {
            return Err(GlimtError::VideoNotFound(format!("File not found: {}", id)));
        }

        if !Self::is_video_file(path) {
            return Err(GlimtError::InvalidInput(format!(
                "Not a recognized video file: {}",
                id
            )));
        }

        let probe = Self::probe(path).await?;

        let canonical = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .to_string();

        let title = probe.title.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
                .to_string()
        });

        Ok(VideoMetadata {
            id: format!("local_{}", canonical.replace(['/', '\\', ' ', '.'], "_")),
            title,
            author: None,
            view_count: None,
            duration_seconds: probe.duration,
            resolution: probe.resolution,
            source_type: SourceType::Local,
            source_url: canonical.clone(),
            stream_url: canonical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file() {
        assert!(LocalSource::is_video_file(Path::new("video.mp4")));
        assert!(LocalSource::is_video_file(Path::new("video.MKV")));
        assert!(!LocalSource::is_video_file(Path::new("audio.mp3")));
        assert!(!LocalSource::is_video_file(Path::new("document.pdf")));
    }

    #[test]
    fn test_parse_probe() {
        let json = serde_json::json!({
            "format": { "duration": "61.500000", "tags": { "title": "Demo" } },
            "streams": [
                { "codec_type": "audio" },
                { "codec_type": "video", "width": 640, "height": 360 }
            ]
        });

        let probe = parse_probe(&json);
        assert_eq!(probe.duration, Some(61.5));
        assert_eq!(probe.title.as_deref(), Some("Demo"));
        assert_eq!(probe.resolution.as_deref(), Some("640x360"));
        assert_eq!(parse_probe(&serde_json::json!({})), ProbeInfo::default());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = LocalSource::new().fetch_video("/definitely/not/here.mp4").await;
        assert!(matches!(result, Err(GlimtError::VideoNotFound(_))));
    }
}
