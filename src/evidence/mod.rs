//! Evidence store for Glimt.
//!
//! The evidence store is the frozen multimodal index over one video's sampled
//! frames and caption passages. It answers a single question: which evidence
//! items are most similar to a query, bounded per modality.
//!
//! Items are modelled as a two-case enum ([`EvidenceItem`]). What a store keeps
//! on disk is the looser [`EvidenceRecord`], which is converted (and validated)
//! at the retrieval boundary so that malformed entries fail loudly instead of
//! being dropped.

mod memory;
mod rank;
mod sqlite;

pub use memory::MemoryEvidenceStore;
pub use rank::{rank_records, QueryVectors};
pub use sqlite::SqliteEvidenceStore;

use crate::embedding::{Embedder, ImageEmbedder};
use crate::error::{GlimtError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Evidence modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Text,
}

impl Modality {
    /// Tag used when persisting a record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Text => "text",
        }
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image" => Ok(Modality::Image),
            "text" => Ok(Modality::Text),
            _ => Err(format!("Unknown modality: {}", s)),
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sampled video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEvidence {
    /// Path of the frame image on disk.
    pub file_path: PathBuf,
    /// Embedding in the image model's space.
    pub embedding: Vec<f32>,
    /// Position of the frame in the video (seconds), when known.
    pub source_timestamp: Option<f64>,
}

/// A caption passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEvidence {
    /// Caption text.
    pub text: String,
    /// Embedding in the text model's space.
    pub embedding: Vec<f32>,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
}

/// One indexed unit of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "lowercase")]
pub enum EvidenceItem {
    Image(ImageEvidence),
    Text(TextEvidence),
}

impl EvidenceItem {
    pub fn modality(&self) -> Modality {
        match self {
            EvidenceItem::Image(_) => Modality::Image,
            EvidenceItem::Text(_) => Modality::Text,
        }
    }

    pub fn embedding(&self) -> &[f32] {
        match self {
            EvidenceItem::Image(image) => &image.embedding,
            EvidenceItem::Text(text) => &text.embedding,
        }
    }
}

/// An evidence entry as persisted by a store.
///
/// Columns are optional because storage does not enforce the item invariants;
/// [`EvidenceItem::try_from`] does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Insertion position in the store (0-based, unique).
    pub ordinal: usize,
    /// Unique record ID.
    pub id: Uuid,
    /// Video this record belongs to.
    pub video_id: String,
    /// Raw modality tag.
    pub modality: String,
    /// Frame path (image records).
    pub file_path: Option<String>,
    /// Caption text (text records).
    pub text: Option<String>,
    /// Caption start in seconds (text records).
    pub start_seconds: Option<f64>,
    /// Caption end in seconds (text records).
    pub end_seconds: Option<f64>,
    /// Frame position in seconds (image records).
    pub source_timestamp: Option<f64>,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// When this record was indexed.
    pub indexed_at: DateTime<Utc>,
}

impl EvidenceRecord {
    /// Create a record for an evidence item.
    pub fn from_item(ordinal: usize, video_id: &str, item: &EvidenceItem) -> Self {
        let mut record = Self {
            ordinal,
            id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            modality: item.modality().as_str().to_string(),
            file_path: None,
            text: None,
            start_seconds: None,
            end_seconds: None,
            source_timestamp: None,
            embedding: item.embedding().to_vec(),
            indexed_at: Utc::now(),
        };

        match item {
            EvidenceItem::Image(image) => {
                record.file_path = Some(image.file_path.to_string_lossy().to_string());
                record.source_timestamp = image.source_timestamp;
            }
            EvidenceItem::Text(text) => {
                record.text = Some(text.text.clone());
                record.start_seconds = Some(text.start);
                record.end_seconds = Some(text.end);
            }
        }

        record
    }

    /// Parsed modality tag, `None` if the tag is not a known modality.
    pub fn modality(&self) -> Option<Modality> {
        self.modality.parse().ok()
    }

    /// Timestamp of this record in the video, formatted as MM:SS or HH:MM:SS.
    pub fn format_timestamp(&self) -> Option<String> {
        self.start_seconds
            .or(self.source_timestamp)
            .map(format_timestamp)
    }

    fn corrupt(&self, reason: impl Into<String>) -> GlimtError {
        GlimtError::CorruptIndex {
            position: self.ordinal,
            reason: reason.into(),
        }
    }
}

impl TryFrom<EvidenceRecord> for EvidenceItem {
    type Error = GlimtError;

    fn try_from(record: EvidenceRecord) -> Result<Self> {
        let modality = record.modality().ok_or_else(|| {
            record.corrupt(format!(
                "record {} is tagged '{}', which is neither image nor text",
                record.id, record.modality
            ))
        })?;

        if record.embedding.is_empty() {
            return Err(record.corrupt(format!("record {} has an empty embedding", record.id)));
        }

        match modality {
            Modality::Image => {
                let file_path = match record.file_path.as_deref() {
                    Some(path) if !path.is_empty() => PathBuf::from(path),
                    _ => {
                        return Err(record.corrupt(format!(
                            "image record {} has no file path",
                            record.id
                        )))
                    }
                };

                Ok(EvidenceItem::Image(ImageEvidence {
                    file_path,
                    embedding: record.embedding,
                    source_timestamp: record.source_timestamp,
                }))
            }
            Modality::Text => {
                let (start, end) = match (record.start_seconds, record.end_seconds) {
                    (Some(start), Some(end)) if valid_span(start, end) => (start, end),
                    (start, end) => {
                        return Err(record.corrupt(format!(
                            "text record {} has an invalid time span ({:?} - {:?})",
                            record.id, start, end
                        )))
                    }
                };

                let text = record.text.ok_or_else(|| GlimtError::CorruptIndex {
                    position: record.ordinal,
                    reason: format!("text record {} has no text", record.id),
                })?;

                Ok(EvidenceItem::Text(TextEvidence {
                    text,
                    embedding: record.embedding,
                    start,
                    end,
                }))
            }
        }
    }
}

/// Whether `start..end` is a valid caption span on the video timeline.
pub fn valid_span(start: f64, end: f64) -> bool {
    start.is_finite() && end.is_finite() && start >= 0.0 && start <= end
}

/// A ranked search hit.
#[derive(Debug, Clone)]
pub struct EvidenceHit {
    /// The matched record.
    pub record: EvidenceRecord,
    /// Similarity score (higher is better).
    pub score: f32,
}

/// Summary information about the video behind a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedVideo {
    /// Video ID.
    pub video_id: String,
    /// Video title.
    pub title: String,
    /// URL or path the video was ingested from.
    pub source_url: String,
    /// Number of frame records.
    pub frame_count: usize,
    /// Number of caption records.
    pub text_count: usize,
    /// Duration in seconds (if known).
    pub duration_seconds: Option<f64>,
    /// When the store was built.
    pub indexed_at: DateTime<Utc>,
}

/// Read contract of an evidence store.
///
/// Stores are frozen after construction, so implementations must be safe to
/// search from many tasks at once.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Search for the evidence most similar to `query`.
    ///
    /// Returns at most `text_k` text hits and `image_k` image hits (each
    /// clamped to `[1, available]`), merged in descending score order with
    /// ties broken by insertion order. Records with an unrecognised modality
    /// are appended after the ranked hits.
    async fn search(&self, query: &str, text_k: usize, image_k: usize) -> Result<Vec<EvidenceHit>>;

    /// Total number of records in the store.
    async fn len(&self) -> Result<usize>;

    /// Whether the store holds no records.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Video this store was built for.
    fn video_id(&self) -> &str;
}

/// Turns a query string into vectors for each modality's embedding space.
#[derive(Clone)]
pub struct QueryEncoder {
    text: Arc<dyn Embedder>,
    image: Arc<dyn ImageEmbedder>,
}

impl QueryEncoder {
    pub fn new(text: Arc<dyn Embedder>, image: Arc<dyn ImageEmbedder>) -> Self {
        Self { text, image }
    }

    /// Embed the query for every modality present in `records`.
    pub async fn encode(&self, query: &str, records: &[EvidenceRecord]) -> Result<QueryVectors> {
        let needs_text = records.iter().any(|r| r.modality() == Some(Modality::Text));
        let needs_image = records.iter().any(|r| r.modality() == Some(Modality::Image));

        let text = if needs_text {
            Some(self.text.embed(query).await?)
        } else {
            None
        };

        let image = if needs_image {
            Some(self.image.embed_query(query).await?)
        } else {
            None
        };

        debug!(needs_text, needs_image, "Encoded query");
        Ok(QueryVectors { text, image })
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_item(text: &str, start: f64, end: f64) -> EvidenceItem {
        EvidenceItem::Text(TextEvidence {
            text: text.to_string(),
            embedding: vec![1.0, 0.0],
            start,
            end,
        })
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_record_roundtrips_text_item() {
        let item = text_item("the speaker draws a graph", 12.5, 20.0);
        let record = EvidenceRecord::from_item(4, "vid", &item);

        assert_eq!(record.modality(), Some(Modality::Text));
        assert_eq!(record.format_timestamp().as_deref(), Some("00:12"));
        assert_eq!(EvidenceItem::try_from(record).unwrap(), item);
    }

    #[test]
    fn test_unknown_modality_is_corrupt() {
        let mut record = EvidenceRecord::from_item(7, "vid", &text_item("x", 0.0, 1.0));
        record.modality = "audio".to_string();

        match EvidenceItem::try_from(record) {
            Err(GlimtError::CorruptIndex { position, reason }) => {
                assert_eq!(position, 7);
                assert!(reason.contains("audio"));
            }
            other => panic!("expected CorruptIndex, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_span_is_corrupt() {
        let record = EvidenceRecord::from_item(0, "vid", &text_item("x", 5.0, 1.0));
        assert!(matches!(
            EvidenceItem::try_from(record),
            Err(GlimtError::CorruptIndex { position: 0, .. })
        ));
    }

    #[test]
    fn test_image_without_path_is_corrupt() {
        let item = EvidenceItem::Image(ImageEvidence {
            file_path: PathBuf::from("frame0000.png"),
            embedding: vec![0.5],
            source_timestamp: Some(0.0),
        });
        let mut record = EvidenceRecord::from_item(2, "vid", &item);
        record.file_path = None;

        assert!(matches!(
            EvidenceItem::try_from(record),
            Err(GlimtError::CorruptIndex { position: 2, .. })
        ));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(125.0), "02:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }
}
