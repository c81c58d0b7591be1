//! Error types for Glimt.

use thiserror::Error;

/// Boxed error used to carry the original cause of a backend failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Library-level error type for Glimt operations.
#[derive(Error, Debug)]
pub enum GlimtError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query is empty; enter a question about the video")]
    EmptyQuery,

    #[error("No video has been processed yet; process a video before querying")]
    NotReady,

    #[error("Corrupt evidence index at entry {position}: {reason}")]
    CorruptIndex { position: usize, reason: String },

    #[error("Retrieval backend failed: {source}")]
    RetrievalBackend {
        #[source]
        source: BoxError,
    },

    #[error("Video source error: {0}")]
    VideoSource(String),

    #[error("Media extraction failed: {0}")]
    Extraction(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Answer synthesis failed: {0}")]
    Synthesis(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GlimtError {
    /// Wrap an arbitrary failure of the similarity search.
    pub fn backend<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        GlimtError::RetrievalBackend {
            source: source.into(),
        }
    }

    /// Errors the caller may retry (with backoff) against the same store.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GlimtError::RetrievalBackend { .. })
    }

    /// Errors the user can fix by re-prompting or finishing ingestion first.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, GlimtError::EmptyQuery | GlimtError::NotReady)
    }
}

/// Result type alias for Glimt operations.
pub type Result<T> = std::result::Result<T, GlimtError>;
