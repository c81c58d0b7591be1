//! Video source abstraction for Glimt.
//!
//! Resolves user input (a YouTube URL, a bare video ID or a local file) into
//! metadata plus a stream URL that ffmpeg can read frames from.

mod local;
mod youtube;

pub use local::LocalSource;
pub use youtube::YoutubeSource;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Type of video source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    YouTube,
    Local,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::YouTube => write!(f, "youtube"),
            SourceType::Local => write!(f, "local"),
        }
    }
}

/// Metadata about a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Unique identifier.
    pub id: String,
    /// Title.
    pub title: String,
    /// Uploader or author (if available).
    pub author: Option<String>,
    /// View count (if available).
    pub view_count: Option<u64>,
    /// Duration in seconds (if known).
    pub duration_seconds: Option<f64>,
    /// Resolution as WIDTHxHEIGHT (if known).
    pub resolution: Option<String>,
    /// Type of source.
    pub source_type: SourceType,
    /// Page URL or file path the video was submitted as.
    pub source_url: String,
    /// URL or path ffmpeg reads frames from.
    pub stream_url: String,
}

impl VideoMetadata {
    /// Duration as M:SS, or "unknown".
    pub fn format_duration(&self) -> String {
        match self.duration_seconds {
            Some(seconds) => {
                let total = seconds.max(0.0) as u64;
                format!("{}:{:02}", total / 60, total % 60)
            }
            None => "unknown".to_string(),
        }
    }
}

/// Trait for video source providers.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Get the source type.
    fn source_type(&self) -> SourceType;

    /// Check if this source can handle the given input.
    fn can_handle(&self, input: &str) -> bool;

    /// Extract ID from input (URL, path, etc.).
    fn extract_id(&self, input: &str) -> Option<String>;

    /// Fetch metadata and the stream URL for a video.
    async fn fetch_video(&self, id: &str) -> Result<VideoMetadata>;
}

/// Detect the appropriate video source for the given input.
pub fn detect_source(input: &str) -> Option<Box<dyn VideoSource>> {
    let youtube = YoutubeSource::new();
    if youtube.can_handle(input) {
        return Some(Box::new(youtube));
    }

    let local = LocalSource::new();
    if local.can_handle(input) {
        return Some(Box::new(local));
    }

    None
}

/// Parse input and return the appropriate source and ID.
pub fn parse_input(input: &str) -> Option<(Box<dyn VideoSource>, String)> {
    let source = detect_source(input)?;
    let id = source.extract_id(input)?;
    Some((source, id))
}

/// Like [`parse_input`], but reports unrecognised input as an error.
pub fn resolve_input(input: &str) -> crate::error::Result<(Box<dyn VideoSource>, String)> {
    parse_input(input).ok_or_else(|| {
        crate::error::GlimtError::InvalidInput(format!("Could not parse input: {}", input))
    })
}

/// Map a failure to spawn an external tool to the matching error.
pub(crate) fn spawn_error(tool: &str, err: std::io::Error) -> crate::error::GlimtError {
    if err.kind() == std::io::ErrorKind::NotFound {
        crate::error::GlimtError::ToolNotFound(tool.to_string())
    } else {
        crate::error::GlimtError::ToolFailed(format!("Failed to run {}: {}", tool, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(duration: Option<f64>) -> VideoMetadata {
        VideoMetadata {
            id: "abc".to_string(),
            title: "Test".to_string(),
            author: None,
            view_count: None,
            duration_seconds: duration,
            resolution: None,
            source_type: SourceType::YouTube,
            source_url: "https://youtu.be/abc".to_string(),
            stream_url: "https://example.com/stream".to_string(),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(metadata(Some(0.0)).format_duration(), "0:00");
        assert_eq!(metadata(Some(125.7)).format_duration(), "2:05");
        assert_eq!(metadata(Some(3725.0)).format_duration(), "62:05");
        assert_eq!(metadata(None).format_duration(), "unknown");
    }

    #[test]
    fn test_parse_input() {
        let (source, id) = parse_input("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(source.source_type(), SourceType::YouTube);
        assert_eq!(id, "dQw4w9WgXcQ");

        let (source, _) = parse_input("/videos/talk.mp4").unwrap();
        assert_eq!(source.source_type(), SourceType::Local);

        assert!(parse_input("not a video").is_none());
    }
}
