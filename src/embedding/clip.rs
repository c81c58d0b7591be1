//! CLIP-style image embeddings over HTTP.
//!
//! Talks to any embedding server exposing an OpenAI-compatible `/embeddings`
//! route for a joint text/image model (for example infinity serving a CLIP
//! checkpoint). Images are sent as base64 data URLs and the request carries a
//! `modality` field so the server knows which encoder to use.

use super::ImageEmbedder;
use crate::error::{GlimtError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Default timeout for embedding requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    modality: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP client for a CLIP embedding server.
pub struct ClipEmbedder {
    client: reqwest::Client,
    url: Url,
    model: String,
    dimensions: usize,
}

impl ClipEmbedder {
    /// Create an embedder for the server at `endpoint` (e.g. `http://127.0.0.1:7997`).
    pub fn new(endpoint: &str, model: &str, dimensions: usize) -> Result<Self> {
        let base = Url::parse(endpoint).map_err(|e| {
            GlimtError::Config(format!("Invalid image embedding endpoint '{}': {}", endpoint, e))
        })?;
        let url = embeddings_url(&base)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url,
            model: model.to_string(),
            dimensions,
        })
    }

    async fn request(&self, input: String, modality: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: vec![input],
            modality,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: EmbeddingResponse = response.json().await?;
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        let embedding = data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GlimtError::Embedding("Empty embedding response".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(GlimtError::Embedding(format!(
                "Image model returned {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }

        Ok(embedding)
    }
}

#[async_trait]
impl ImageEmbedder for ClipEmbedder {
    #[instrument(skip(self))]
    async fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        let data_url = image_data_url(path)?;
        debug!("Embedding frame {:?}", path);
        self.request(data_url, "image").await
    }

    #[instrument(skip(self, text))]
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text.to_string(), "text").await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn embeddings_url(base: &Url) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("embeddings")
        .map_err(|e| GlimtError::Config(format!("Invalid image embedding endpoint: {}", e)))
}

/// MIME type for a frame file, based on its extension.
pub(crate) fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Read an image file into a base64 data URL.
pub(crate) fn image_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", image_mime(path), encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_url() {
        let base = Url::parse("http://127.0.0.1:7997").unwrap();
        assert_eq!(embeddings_url(&base).unwrap().as_str(), "http://127.0.0.1:7997/embeddings");

        let base = Url::parse("http://localhost:8080/v1").unwrap();
        assert_eq!(embeddings_url(&base).unwrap().as_str(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            ClipEmbedder::new("not a url", "clip", 512),
            Err(GlimtError::Config(_))
        ));
    }

    #[test]
    fn test_image_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame0000.jpg");
        std::fs::write(&path, [0xffu8, 0xd8, 0xff]).unwrap();

        let url = image_data_url(&path).unwrap();
        assert_eq!(url, "data:image/jpeg;base64,/9j/");
        assert_eq!(image_mime(Path::new("frame.PNG")), "image/png");
    }
}
