//! Index construction.
//!
//! Embeds sampled frames and caption passages and freezes them into evidence
//! records. Frames come first (in file-name order), then caption passages in
//! time order; that sequence defines the ordinals used for tie-breaking.

mod window;

pub use window::{sanitize_spans, window_captions};

use crate::config::Settings;
use crate::embedding::{self, Embedder, ImageEmbedder};
use crate::error::{GlimtError, Result};
use crate::evidence::{
    EvidenceItem, EvidenceRecord, ImageEvidence, MemoryEvidenceStore, Modality, QueryEncoder,
    TextEvidence,
};
use crate::extract::{CaptionSpan, FrameSet};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Default number of frames embedded at once.
const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Builds evidence records for one video.
pub struct IndexBuilder {
    text: Arc<dyn Embedder>,
    image: Arc<dyn ImageEmbedder>,
    window_seconds: f64,
    max_concurrent: usize,
}

impl IndexBuilder {
    pub fn new(text: Arc<dyn Embedder>, image: Arc<dyn ImageEmbedder>) -> Self {
        Self {
            text,
            image,
            window_seconds: 0.0,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Create a builder using the configured embedders.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            embedding::text_embedder(settings)?,
            embedding::image_embedder(settings)?,
        )
        .with_window_seconds(settings.captions.window_seconds)
        .with_max_concurrent(settings.image_embedding.max_concurrent))
    }

    pub fn with_window_seconds(mut self, window_seconds: f64) -> Self {
        self.window_seconds = window_seconds;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Query encoder matching the embedders used to build the index.
    pub fn encoder(&self) -> QueryEncoder {
        QueryEncoder::new(self.text.clone(), self.image.clone())
    }

    /// Embed frames and captions into evidence records.
    #[instrument(skip(self, frames, captions), fields(frames = frames.len(), captions = captions.len()))]
    pub async fn build(
        &self,
        video_id: &str,
        frames: &FrameSet,
        captions: &[CaptionSpan],
    ) -> Result<Vec<EvidenceRecord>> {
        let mut items = self.embed_frames(frames).await?;
        items.extend(self.embed_captions(captions).await?);

        validate_items(&items)?;

        let records: Vec<EvidenceRecord> = items
            .iter()
            .enumerate()
            .map(|(ordinal, item)| EvidenceRecord::from_item(ordinal, video_id, item))
            .collect();

        info!("Built {} evidence records for {}", records.len(), video_id);
        Ok(records)
    }

    /// Build records and freeze them into an in-memory store.
    pub async fn build_store(
        &self,
        video_id: &str,
        frames: &FrameSet,
        captions: &[CaptionSpan],
    ) -> Result<MemoryEvidenceStore> {
        let records = self.build(video_id, frames, captions).await?;
        Ok(MemoryEvidenceStore::new(video_id, records, self.encoder()))
    }

    async fn embed_frames(&self, frames: &FrameSet) -> Result<Vec<EvidenceItem>> {
        for (position, frame) in frames.frames.iter().enumerate() {
            if !frame.path.is_file() {
                return Err(GlimtError::CorruptIndex {
                    position,
                    reason: format!("frame {:?} does not exist", frame.path),
                });
            }
        }

        debug!("Embedding {} frames", frames.len());

        stream::iter(frames.frames.clone())
            .map(|frame| {
                let image = Arc::clone(&self.image);
                async move {
                    let embedding = image.embed_image(&frame.path).await?;
                    Ok::<_, GlimtError>(EvidenceItem::Image(ImageEvidence {
                        file_path: frame.path,
                        embedding,
                        source_timestamp: Some(frame.timestamp),
                    }))
                }
            })
            .buffered(self.max_concurrent)
            .try_collect()
            .await
    }

    async fn embed_captions(&self, captions: &[CaptionSpan]) -> Result<Vec<EvidenceItem>> {
        let windows = window_captions(captions, self.window_seconds);
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} caption passages", windows.len());

        let texts: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();
        let embeddings = self.text.embed_batch(&texts).await?;

        if embeddings.len() != windows.len() {
            return Err(GlimtError::Embedding(format!(
                "Expected {} caption embeddings, got {}",
                windows.len(),
                embeddings.len()
            )));
        }

        Ok(windows
            .into_iter()
            .zip(embeddings)
            .map(|(window, embedding)| {
                EvidenceItem::Text(TextEvidence {
                    text: window.text,
                    embedding,
                    start: window.start,
                    end: window.end,
                })
            })
            .collect())
    }
}

/// Check that every item has a vector and that each modality uses a single
/// dimensionality.
pub fn validate_items(items: &[EvidenceItem]) -> Result<()> {
    let mut dims: HashMap<Modality, usize> = HashMap::new();

    for (position, item) in items.iter().enumerate() {
        let len = item.embedding().len();
        if len == 0 {
            return Err(GlimtError::CorruptIndex {
                position,
                reason: format!("{} item has an empty embedding", item.modality()),
            });
        }

        let expected = *dims.entry(item.modality()).or_insert(len);
        if expected != len {
            return Err(GlimtError::CorruptIndex {
                position,
                reason: format!(
                    "{} embedding has {} dimensions, expected {}",
                    item.modality(),
                    len,
                    expected
                ),
            });
        }
    }

    Ok(())
}
