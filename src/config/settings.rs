//! Configuration settings for Glimt.

use crate::error::{GlimtError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest and largest accepted per-modality K.
pub const K_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub frames: FrameSettings,
    pub captions: CaptionSettings,
    pub embedding: EmbeddingSettings,
    pub image_embedding: ImageEmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub synthesis: SynthesisSettings,
    pub display: DisplaySettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for frames, captions and the evidence store.
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.glimt".to_string(),
            temp_dir: "/tmp/glimt".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Frame sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Seconds between sampled frames.
    pub interval_seconds: f64,
    /// Image format written by ffmpeg (png, jpg).
    pub image_format: String,
    /// Upper bound on sampled frames (0 = unlimited).
    pub max_frames: usize,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 5.0,
            image_format: "png".to_string(),
            max_frames: 0,
        }
    }
}

/// Caption download and windowing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    /// Subtitle languages to request, in order of preference.
    pub languages: Vec<String>,
    /// Merge consecutive spans into passages of roughly this many seconds
    /// (0 = one span per passage).
    pub window_seconds: f64,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            window_seconds: 0.0,
        }
    }
}

/// Text embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Image embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageEmbeddingSettings {
    /// Base URL of the CLIP embedding server.
    pub endpoint: String,
    /// Model name sent with each request.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Maximum frames embedded concurrently.
    pub max_concurrent: usize,
}

impl Default for ImageEmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7997".to_string(),
            model: "openai/clip-vit-base-patch32".to_string(),
            dimensions: 512,
            max_concurrent: 4,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Caption passages returned per query (1-10).
    pub text_k: usize,
    /// Frames returned per query (1-10).
    pub image_k: usize,
    /// Seconds before a search is abandoned.
    pub timeout_seconds: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            text_k: crate::retriever::DEFAULT_TEXT_K,
            image_k: crate::retriever::DEFAULT_IMAGE_K,
            timeout_seconds: 30,
        }
    }
}

/// Answer synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    /// Vision-capable chat model.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Detail level requested for frames (low, high, auto).
    pub image_detail: String,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            image_detail: "low".to_string(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Frames listed alongside an answer.
    pub max_display_frames: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            max_display_frames: 3,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        check_k("retrieval.text_k", self.retrieval.text_k)?;
        check_k("retrieval.image_k", self.retrieval.image_k)?;

        if !(self.frames.interval_seconds.is_finite() && self.frames.interval_seconds > 0.0) {
            return Err(GlimtError::Config(format!(
                "frames.interval_seconds must be positive, got {}",
                self.frames.interval_seconds
            )));
        }

        if self.captions.window_seconds < 0.0 {
            return Err(GlimtError::Config(
                "captions.window_seconds must not be negative".to_string(),
            ));
        }

        if self.image_embedding.max_concurrent == 0 {
            return Err(GlimtError::Config(
                "image_embedding.max_concurrent must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| GlimtError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glimt")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Directory holding the sampled frames of the current video.
    pub fn frames_dir(&self) -> PathBuf {
        self.data_dir().join("frames")
    }

    /// Directory holding caption cache files.
    pub fn captions_dir(&self) -> PathBuf {
        self.data_dir().join("captions")
    }

    /// Path of the persisted evidence store.
    pub fn evidence_db_path(&self) -> PathBuf {
        self.data_dir().join("evidence.db")
    }
}

fn check_k(name: &str, value: usize) -> Result<()> {
    if K_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(GlimtError::Config(format!(
            "{} must be between {} and {}, got {}",
            name,
            K_RANGE.start(),
            K_RANGE.end(),
            value
        )))
    }
}

/// Validate a K override given on the command line or over HTTP.
pub fn validate_k(name: &str, value: usize) -> Result<usize> {
    check_k(name, value).map(|_| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.retrieval.text_k, 5);
        assert_eq!(settings.retrieval.image_k, 5);
        assert_eq!(settings.display.max_display_frames, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\ntext_k = 3\n").unwrap();

        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.retrieval.text_k, 3);
        assert_eq!(settings.retrieval.image_k, 5);
        assert_eq!(settings.frames.interval_seconds, 5.0);
    }

    #[test]
    fn test_out_of_range_k_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\nimage_k = 11\n").unwrap();

        match Settings::load_from(Some(&path)) {
            Err(GlimtError::Config(msg)) => assert!(msg.contains("image_k")),
            other => panic!("expected Config error, got {:?}", other),
        }

        assert!(validate_k("text_k", 0).is_err());
        assert_eq!(validate_k("text_k", 10).unwrap(), 10);
    }

    #[test]
    fn test_non_positive_interval_is_rejected() {
        let mut settings = Settings::default();
        settings.frames.interval_seconds = 0.0;
        assert!(matches!(settings.validate(), Err(GlimtError::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.general.data_dir = dir.path().to_string_lossy().to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.evidence_db_path(), dir.path().join("evidence.db"));
    }
}
