//! Query retriever.
//!
//! Wraps evidence store access behind a modality-partitioned API and owns the
//! top-K policy. Every call re-queries the store: nothing is cached.

use crate::error::{GlimtError, Result};
use crate::evidence::{EvidenceItem, EvidenceStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default number of caption passages per query.
pub const DEFAULT_TEXT_K: usize = 5;

/// Default number of frames per query.
pub const DEFAULT_IMAGE_K: usize = 5;

/// Evidence selected for one query, best match first within each modality.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    /// Frame paths.
    pub images: Vec<PathBuf>,
    /// Caption passages.
    pub texts: Vec<String>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.texts.is_empty()
    }
}

/// Retrieves frames and caption passages for natural-language queries.
#[derive(Clone)]
pub struct QueryRetriever {
    store: Arc<dyn EvidenceStore>,
    text_k: usize,
    image_k: usize,
}

impl std::fmt::Debug for QueryRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRetriever")
            .field("video_id", &self.store.video_id())
            .field("text_k", &self.text_k)
            .field("image_k", &self.image_k)
            .finish()
    }
}

impl QueryRetriever {
    /// Create a retriever. Both K values must be at least 1.
    pub fn new(store: Arc<dyn EvidenceStore>, text_k: usize, image_k: usize) -> Result<Self> {
        if text_k < 1 {
            return Err(GlimtError::Config(format!("text_k must be at least 1, got {}", text_k)));
        }
        if image_k < 1 {
            return Err(GlimtError::Config(format!("image_k must be at least 1, got {}", image_k)));
        }

        info!(
            "Retriever initialized with text_k={} and image_k={}",
            text_k, image_k
        );

        Ok(Self {
            store,
            text_k,
            image_k,
        })
    }

    /// Create a retriever with the default K values.
    pub fn with_defaults(store: Arc<dyn EvidenceStore>) -> Self {
        Self {
            store,
            text_k: DEFAULT_TEXT_K,
            image_k: DEFAULT_IMAGE_K,
        }
    }

    pub fn text_k(&self) -> usize {
        self.text_k
    }

    pub fn image_k(&self) -> usize {
        self.image_k
    }

    /// Retrieve the most relevant frames and caption passages for `query`.
    ///
    /// Dropping the returned future cancels the search; no partial result is
    /// ever produced.
    #[instrument(skip(self), fields(video_id = %self.store.video_id()))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(GlimtError::EmptyQuery);
        }

        info!("Processing query: {}", query);

        let hits = self
            .store
            .search(query, self.text_k, self.image_k)
            .await
            .map_err(into_backend_error)?;

        let mut result = RetrievalResult::default();

        for hit in hits {
            match EvidenceItem::try_from(hit.record)? {
                EvidenceItem::Image(image) => result.images.push(image.file_path),
                EvidenceItem::Text(text) => result.texts.push(text.text),
            }
        }

        info!(
            "Retrieved {} images and {} text segments",
            result.images.len(),
            result.texts.len()
        );

        Ok(result)
    }

    /// Like [`retrieve`](Self::retrieve), but gives up after `timeout`.
    ///
    /// A timed-out search is reported as a retrieval backend failure.
    pub async fn retrieve_with_timeout(&self, query: &str, timeout: Duration) -> Result<RetrievalResult> {
        match tokio::time::timeout(timeout, self.retrieve(query)).await {
            Ok(result) => result,
            Err(elapsed) => {
                debug!("Retrieval timed out after {:?}", timeout);
                Err(GlimtError::backend(elapsed))
            }
        }
    }
}

/// Store failures reach the caller as backend errors, except invariant
/// violations, which keep their own kind.
fn into_backend_error(err: GlimtError) -> GlimtError {
    match err {
        GlimtError::CorruptIndex { .. } | GlimtError::RetrievalBackend { .. } => err,
        other => GlimtError::backend(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::{FixedEmbedder, FixedImageEmbedder};
    use crate::evidence::{
        EvidenceHit, EvidenceRecord, ImageEvidence, MemoryEvidenceStore, QueryEncoder,
        TextEvidence,
    };
    use async_trait::async_trait;
    use std::error::Error as _;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    /// Unit vector whose cosine with [1, 0] is `score`.
    fn scored(score: f32) -> Vec<f32> {
        vec![score, (1.0 - score * score).sqrt()]
    }

    fn text(text: &str, score: f32, start: f64) -> EvidenceItem {
        EvidenceItem::Text(TextEvidence {
            text: text.to_string(),
            embedding: scored(score),
            start,
            end: start + 5.0,
        })
    }

    fn image(path: &str, score: f32) -> EvidenceItem {
        EvidenceItem::Image(ImageEvidence {
            file_path: PathBuf::from(path),
            embedding: scored(score),
            source_timestamp: None,
        })
    }

    fn encoder() -> QueryEncoder {
        QueryEncoder::new(
            Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
            Arc::new(FixedImageEmbedder::new(vec![1.0, 0.0])),
        )
    }

    fn store(items: &[EvidenceItem]) -> Arc<dyn EvidenceStore> {
        Arc::new(MemoryEvidenceStore::from_items("video1", items, encoder()))
    }

    /// Store that records how often it is searched and can be told to fail.
    struct ScriptedStore {
        hits: Vec<EvidenceHit>,
        fail_with: Option<fn() -> GlimtError>,
        searches: AtomicUsize,
    }

    #[async_trait]
    impl EvidenceStore for ScriptedStore {
        async fn search(&self, _query: &str, _text_k: usize, _image_k: usize) -> Result<Vec<EvidenceHit>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(make_err) => Err(make_err()),
                None => Ok(self.hits.clone()),
            }
        }

        async fn len(&self) -> Result<usize> {
            Ok(self.hits.len())
        }

        fn video_id(&self) -> &str {
            "scripted"
        }
    }

    fn scripted(hits: Vec<EvidenceHit>, fail_with: Option<fn() -> GlimtError>) -> Arc<ScriptedStore> {
        Arc::new(ScriptedStore {
            hits,
            fail_with,
            searches: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_scenario_summary_query() {
        let store = store(&[
            text("first", 0.9, 0.0),
            text("second", 0.5, 5.0),
            text("third", 0.2, 10.0),
            image("frame0000.png", 0.7),
        ]);
        let retriever = QueryRetriever::new(store, 2, 5).unwrap();

        let result = retriever.retrieve("summary").await.unwrap();
        assert_eq!(result.texts, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(result.images, vec![PathBuf::from("frame0000.png")]);
    }

    #[tokio::test]
    async fn test_results_are_bounded_and_ranked() {
        let items: Vec<EvidenceItem> = (0..8)
            .map(|i| {
                let score = 0.1 * (i as f32 + 1.0);
                if i % 2 == 0 {
                    image(&format!("frame{:04}.png", i), score)
                } else {
                    text(&format!("passage {}", i), score, i as f64)
                }
            })
            .collect();

        let retriever = QueryRetriever::new(store(&items), 3, 2).unwrap();
        let result = retriever.retrieve("what happens").await.unwrap();

        assert!(result.texts.len() <= 3);
        assert!(result.images.len() <= 2);
        assert_eq!(result.texts, vec!["passage 7", "passage 5", "passage 3"]);
        assert_eq!(
            result.images,
            vec![PathBuf::from("frame0006.png"), PathBuf::from("frame0004.png")]
        );
    }

    #[tokio::test]
    async fn test_every_hit_lands_in_exactly_one_partition() {
        let items = vec![
            image("a.png", 0.3),
            text("alpha", 0.4, 0.0),
            image("b.png", 0.8),
            text("beta", 0.6, 3.0),
        ];
        let retriever = QueryRetriever::new(store(&items), 10, 10).unwrap();

        let result = retriever.retrieve("anything").await.unwrap();
        assert_eq!(result.images, vec![PathBuf::from("b.png"), PathBuf::from("a.png")]);
        assert_eq!(result.texts, vec!["beta", "alpha"]);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_searching() {
        let store = scripted(Vec::new(), None);
        let retriever = QueryRetriever::new(store.clone(), 5, 5).unwrap();

        assert!(matches!(retriever.retrieve("").await, Err(GlimtError::EmptyQuery)));
        assert!(matches!(retriever.retrieve("   \t\n").await, Err(GlimtError::EmptyQuery)));
        assert_eq!(store.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_queries_are_identical_and_uncached() {
        let items = vec![
            text("same score a", 0.5, 0.0),
            text("same score b", 0.5, 1.0),
            image("x.png", 0.5),
            image("y.png", 0.5),
        ];
        let retriever = QueryRetriever::new(store(&items), 5, 5).unwrap();

        let first = assert_ok!(retriever.retrieve("q").await);
        let second = assert_ok!(retriever.retrieve("q").await);
        assert_eq!(first, second);
        assert_eq!(first.texts, vec!["same score a", "same score b"]);

        let scripted_store = scripted(Vec::new(), None);
        let retriever = QueryRetriever::with_defaults(scripted_store.clone());
        retriever.retrieve("q").await.unwrap();
        retriever.retrieve("q").await.unwrap();
        assert_eq!(scripted_store.searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_k_returns_everything() {
        let items = vec![image("only.png", 0.1), text("only text", 0.2, 0.0)];
        let retriever = QueryRetriever::new(store(&items), 10, 10).unwrap();

        let result = retriever.retrieve("q").await.unwrap();
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.texts.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty_result() {
        let retriever = QueryRetriever::with_defaults(store(&[]));
        let result = retriever.retrieve("anything").await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_modality_is_corrupt_index() {
        let mut records: Vec<EvidenceRecord> = [text("ok", 0.9, 0.0), text("odd", 0.1, 2.0)]
            .iter()
            .enumerate()
            .map(|(i, item)| EvidenceRecord::from_item(i, "video1", item))
            .collect();
        records[1].modality = "audio".to_string();

        let store = Arc::new(MemoryEvidenceStore::new("video1", records, encoder()));
        let retriever = QueryRetriever::with_defaults(store);

        match retriever.retrieve("q").await {
            Err(GlimtError::CorruptIndex { position, reason }) => {
                assert_eq!(position, 1);
                assert!(reason.contains("audio"));
            }
            other => panic!("expected CorruptIndex, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_wrapped_with_cause() {
        let retriever = QueryRetriever::with_defaults(scripted(
            Vec::new(),
            Some(|| GlimtError::Embedding("embedding service unavailable".to_string())),
        ));

        let err = assert_err!(retriever.retrieve("q").await);
        assert!(err.is_retryable());
        let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(cause.contains("embedding service unavailable"));
    }

    #[tokio::test]
    async fn test_store_corruption_is_not_wrapped() {
        let retriever = QueryRetriever::with_defaults(scripted(
            Vec::new(),
            Some(|| GlimtError::CorruptIndex {
                position: 4,
                reason: "dimension mismatch".to_string(),
            }),
        ));

        assert!(matches!(
            retriever.retrieve("q").await,
            Err(GlimtError::CorruptIndex { position: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_failing_query_embedder_is_backend_error() {
        let store = Arc::new(MemoryEvidenceStore::from_items(
            "video1",
            &[text("t", 0.5, 0.0)],
            QueryEncoder::new(
                Arc::new(FixedEmbedder::failing()),
                Arc::new(FixedImageEmbedder::new(vec![1.0, 0.0])),
            ),
        ));
        let retriever = QueryRetriever::with_defaults(store);

        assert!(matches!(
            retriever.retrieve("q").await,
            Err(GlimtError::RetrievalBackend { .. })
        ));
    }

    #[test]
    fn test_zero_k_is_configuration_error() {
        assert!(matches!(
            QueryRetriever::new(store(&[]), 0, 5),
            Err(GlimtError::Config(_))
        ));
        assert!(matches!(
            QueryRetriever::new(store(&[]), 5, 0),
            Err(GlimtError::Config(_))
        ));

        let retriever = QueryRetriever::with_defaults(store(&[]));
        assert_eq!((retriever.text_k(), retriever.image_k()), (5, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_backend_error() {
        struct SlowStore;

        #[async_trait]
        impl EvidenceStore for SlowStore {
            async fn search(&self, _q: &str, _t: usize, _i: usize) -> Result<Vec<EvidenceHit>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            }

            async fn len(&self) -> Result<usize> {
                Ok(0)
            }

            fn video_id(&self) -> &str {
                "slow"
            }
        }

        let retriever = QueryRetriever::with_defaults(Arc::new(SlowStore));
        let err = retriever
            .retrieve_with_timeout("q", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
