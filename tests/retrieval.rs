//! Retrieval behaviour through the public API.

use async_trait::async_trait;
use glimt::embedding::{Embedder, ImageEmbedder};
use glimt::evidence::{
    EvidenceItem, EvidenceRecord, ImageEvidence, MemoryEvidenceStore, QueryEncoder, TextEvidence,
};
use glimt::retriever::QueryRetriever;
use glimt::{GlimtError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Embeds every query as the unit x-axis.
struct AxisEmbedder;

#[async_trait]
impl Embedder for AxisEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }
}

#[async_trait]
impl ImageEmbedder for AxisEmbedder {
    async fn embed_image(&self, _path: &Path) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        2
    }
}

fn encoder() -> QueryEncoder {
    QueryEncoder::new(Arc::new(AxisEmbedder), Arc::new(AxisEmbedder))
}

/// A unit vector whose cosine similarity with the x-axis is `score`.
fn scored(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).sqrt()]
}

fn text(label: &str, score: f32) -> EvidenceItem {
    EvidenceItem::Text(TextEvidence {
        text: label.to_string(),
        embedding: scored(score),
        start: 0.0,
        end: 1.0,
    })
}

fn image(name: &str, score: f32) -> EvidenceItem {
    EvidenceItem::Image(ImageEvidence {
        file_path: PathBuf::from(name),
        embedding: scored(score),
        source_timestamp: None,
    })
}

fn retriever(items: &[EvidenceItem], text_k: usize, image_k: usize) -> QueryRetriever {
    let store = MemoryEvidenceStore::from_items("video", items, encoder());
    QueryRetriever::new(Arc::new(store), text_k, image_k).unwrap()
}

fn mixed_items() -> Vec<EvidenceItem> {
    vec![
        text("low", 0.2),
        image("frame0000.png", 0.7),
        text("high", 0.9),
        image("frame0001.png", 0.3),
        text("mid", 0.5),
    ]
}

#[tokio::test]
async fn top_k_per_modality_in_score_order() {
    let items = vec![
        text("ninety", 0.9),
        text("fifty", 0.5),
        text("twenty", 0.2),
        image("frame0000.png", 0.7),
    ];

    let result = retriever(&items, 2, 5).retrieve("summary").await.unwrap();

    assert_eq!(result.texts, vec!["ninety", "fifty"]);
    assert_eq!(result.images, vec![PathBuf::from("frame0000.png")]);
}

#[tokio::test]
async fn results_are_bounded_and_partitioned() {
    for (text_k, image_k) in [(1, 1), (2, 1), (3, 2), (10, 10)] {
        let result = retriever(&mixed_items(), text_k, image_k)
            .retrieve("what happens")
            .await
            .unwrap();

        assert!(result.texts.len() <= text_k);
        assert!(result.images.len() <= image_k);
        assert!(result
            .texts
            .iter()
            .all(|t| ["low", "mid", "high"].contains(&t.as_str())));
        assert!(result
            .images
            .iter()
            .all(|p| p.to_string_lossy().starts_with("frame")));
    }
}

#[tokio::test]
async fn nothing_is_dropped_when_k_covers_the_store() {
    let result = retriever(&mixed_items(), 10, 10)
        .retrieve("everything")
        .await
        .unwrap();

    assert_eq!(result.texts, vec!["high", "mid", "low"]);
    assert_eq!(
        result.images,
        vec![PathBuf::from("frame0000.png"), PathBuf::from("frame0001.png")]
    );
}

#[tokio::test]
async fn blank_queries_are_rejected() {
    let retriever = retriever(&mixed_items(), 5, 5);
    for query in ["", "   ", "\n\t"] {
        assert!(matches!(
            retriever.retrieve(query).await,
            Err(GlimtError::EmptyQuery)
        ));
    }
}

#[tokio::test]
async fn repeated_queries_are_identical() {
    let retriever = retriever(&mixed_items(), 2, 1);
    let first = retriever.retrieve("same question").await.unwrap();
    let second = retriever.retrieve("same question").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn oversized_image_k_returns_every_frame() {
    let items = vec![image("frame0000.png", 0.4), image("frame0001.png", 0.8)];
    let result = retriever(&items, 5, 10).retrieve("frames").await.unwrap();

    assert_eq!(
        result.images,
        vec![PathBuf::from("frame0001.png"), PathBuf::from("frame0000.png")]
    );
    assert!(result.texts.is_empty());
}

#[tokio::test]
async fn empty_store_returns_empty_result() {
    let result = retriever(&[], 5, 5).retrieve("anything").await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn unknown_modality_reports_its_position() {
    let mut records: Vec<EvidenceRecord> = mixed_items()
        .iter()
        .enumerate()
        .map(|(i, item)| EvidenceRecord::from_item(i, "video", item))
        .collect();
    records[3].modality = "audio".to_string();

    let store = MemoryEvidenceStore::new("video", records, encoder());
    let retriever = QueryRetriever::new(Arc::new(store), 5, 5).unwrap();

    match retriever.retrieve("anything").await {
        Err(GlimtError::CorruptIndex { position, .. }) => assert_eq!(position, 3),
        other => panic!("expected CorruptIndex, got {:?}", other),
    }
}

#[test]
fn zero_k_is_a_configuration_error() {
    let store = Arc::new(MemoryEvidenceStore::from_items("video", &[], encoder()));
    assert!(matches!(
        QueryRetriever::new(store.clone(), 0, 5),
        Err(GlimtError::Config(_))
    ));
    assert!(matches!(
        QueryRetriever::new(store, 5, 0),
        Err(GlimtError::Config(_))
    ));
}
