//! Embedding service client: a thin `reqwest` wrapper over a remote RPC that
//! turns raw image bytes into a fixed-length float vector, called
//! synchronously during image create and similarity-by-upload search.
//!
//! Shaped like the teacher's `inference::cloud::CloudBridge` — a
//! `reqwest::Client` plus a config struct plus a typed error enum — narrowed
//! from a chat-completions POST to a raw-bytes-in/float-vector-out call.

use std::time::Duration;

use serde::Deserialize;

use super::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub const EMBEDDING_DIM: usize = 512;

#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl EmbeddingClientConfig {
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// Sends raw image bytes to the embedding service and returns the
    /// resulting 512-dimensional vector.
    pub async fn embed(&self, image_bytes: &[u8]) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .header("Content-Type", "application/octet-stream")
            .body(image_bytes.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                backend: "embedding service",
                status,
                body,
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embedding.len() != EMBEDDING_DIM {
            return Err(Error::WrongDimension {
                expected: EMBEDDING_DIM,
                actual: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }
}
