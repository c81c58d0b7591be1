//! In-memory evidence store implementation.
//!
//! Holds a frozen list of records. Used for tests and for stores built in the
//! same process that queries them.

use super::{rank_records, EvidenceHit, EvidenceItem, EvidenceRecord, EvidenceStore, QueryEncoder};
use crate::error::Result;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// In-memory evidence store.
pub struct MemoryEvidenceStore {
    video_id: String,
    records: Vec<EvidenceRecord>,
    encoder: QueryEncoder,
}

impl MemoryEvidenceStore {
    /// Freeze a set of records into a searchable store.
    pub fn new(video_id: &str, mut records: Vec<EvidenceRecord>, encoder: QueryEncoder) -> Self {
        records.sort_by_key(|r| r.ordinal);
        Self {
            video_id: video_id.to_string(),
            records,
            encoder,
        }
    }

    /// Build a store from evidence items, assigning ordinals in order.
    pub fn from_items(video_id: &str, items: &[EvidenceItem], encoder: QueryEncoder) -> Self {
        let records = items
            .iter()
            .enumerate()
            .map(|(ordinal, item)| EvidenceRecord::from_item(ordinal, video_id, item))
            .collect();
        Self::new(video_id, records, encoder)
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    #[instrument(skip(self, query), fields(video_id = %self.video_id))]
    async fn search(&self, query: &str, text_k: usize, image_k: usize) -> Result<Vec<EvidenceHit>> {
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.encoder.encode(query, &self.records).await?;
        let hits = rank_records(&self.records, &vectors, text_k, image_k)?;

        debug!("Found {} matching records", hits.len());
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn video_id(&self) -> &str {
        &self.video_id
    }
}
