//! Embedding generation for semantic search and retrieval.
//!
//! Text passages and frames live in different embedding spaces: captions are
//! embedded with a text model, frames with an image model that can also embed
//! a text query into the image space.

mod clip;
mod openai;

pub use clip::ClipEmbedder;
pub(crate) use clip::image_data_url;
pub use openai::OpenAIEmbedder;

use crate::config::Settings;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Create the configured text embedder.
pub fn text_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OpenAIEmbedder::with_config(
        &settings.embedding.model,
        settings.embedding.dimensions as usize,
    )?))
}

/// Create the configured image embedder.
pub fn image_embedder(settings: &Settings) -> Result<Arc<dyn ImageEmbedder>> {
    let config = &settings.image_embedding;
    Ok(Arc::new(ClipEmbedder::new(
        &config.endpoint,
        &config.model,
        config.dimensions as usize,
    )?))
}

/// Trait for text embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Trait for image embedding generation in a joint text/image space.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    /// Embed an image file.
    async fn embed_image(&self, path: &Path) -> Result<Vec<f32>>;

    /// Embed a text query into the image space.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}
