//! YouTube source implementation.

use super::{spawn_error, SourceType, VideoMetadata, VideoSource};
use crate::error::{GlimtError, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, instrument};

/// YouTube video source.
pub struct YoutubeSource {
    video_id_regex: Regex,
}

impl YoutubeSource {
    pub fn new() -> Self {
        let video_id_regex = Regex::new(
            r"(?x)
            (?:
                (?:https?://)?
                (?:www\.|m\.)?
                (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/|youtube\.com/v/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("Invalid regex");

        Self { video_id_regex }
    }

    /// Extract video ID from a YouTube URL or bare ID.
    fn extract_video_id(&self, input: &str) -> Option<String> {
        let caps = self.video_id_regex.captures(input.trim())?;

        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    }

    /// Fetch metadata and the direct stream URL using yt-dlp.
    #[instrument(skip(self))]
    async fn fetch_metadata_ytdlp(&self, video_id: &str) -> Result<VideoMetadata> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);

        let output = tokio::process::Command::new("yt-dlp")
            .args([
                "--dump-json",
                "--no-download",
                "--no-warnings",
                "--no-playlist",
                "--format",
                "best[vcodec!=none]/best",
                &url,
            ])
            .output()
            .await
            .map_err(|e| spawn_error("yt-dlp", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GlimtError::VideoNotFound(format!(
                "Video {} not found or unavailable: {}",
                video_id,
                stderr.trim()
            )));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            GlimtError::VideoSource(format!("Failed to parse yt-dlp output: {}", e))
        })?;

        let metadata = metadata_from_json(video_id, &url, &json)?;
        debug!("Resolved stream for {} ({})", video_id, metadata.format_duration());
        Ok(metadata)
    }
}

impl Default for YoutubeSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Build metadata from a `yt-dlp --dump-json` document.
fn metadata_from_json(video_id: &str, url: &str, json: &serde_json::Value) -> Result<VideoMetadata> {
    let stream_url = json["url"]
        .as_str()
        .or_else(|| json["requested_formats"][0]["url"].as_str())
        .ok_or_else(|| {
            GlimtError::VideoSource(format!("No playable stream found for video {}", video_id))
        })?
        .to_string();

    let resolution = match (json["width"].as_u64(), json["height"].as_u64()) {
        (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
        _ => json["resolution"].as_str().map(|s| s.to_string()),
    };

    Ok(VideoMetadata {
        id: video_id.to_string(),
        title: json["title"]
            .as_str()
            .unwrap_or("Unknown Title")
            .to_string(),
        author: json["uploader"]
            .as_str()
            .or_else(|| json["channel"].as_str())
            .map(|s| s.to_string()),
        view_count: json["view_count"].as_u64(),
        duration_seconds: json["duration"].as_f64(),
        resolution,
        source_type: SourceType::YouTube,
        source_url: url.to_string(),
        stream_url,
    })
}

#[async_trait]
impl VideoSource for YoutubeSource {
    fn source_type(&self) -> SourceType {
        SourceType::YouTube
    }

    fn can_handle(&self, input: &str) -> bool {
        self.extract_video_id(input).is_some()
    }

    fn extract_id(&self, input: &str) -> Option<String> {
        self.extract_video_id(input)
    }

    async fn fetch_video(&self, id: &str) -> Result<VideoMetadata> {
        let video_id = self.extract_video_id(id).ok_or_else(|| {
            GlimtError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", id))
        })?;

        self.fetch_metadata_ytdlp(&video_id).await
    }
}
