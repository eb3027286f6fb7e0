//! HTTP-backed embedding provider.
//!
//! Posts text to a configurable endpoint and expects a JSON vector back.
//! Every failure mode (connect, timeout, bad status, malformed body) maps to
//! [`MemoryError::EmbeddingProvider`], which the [`FallbackEmbedder`]
//! recovers with the deterministic hashed embedder.
//!
//! [`FallbackEmbedder`]: super::FallbackEmbedder

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding provider backed by an HTTP endpoint.
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl RemoteEmbedder {
    /// Build a client with the configured per-request timeout, so a slow
    /// endpoint cannot stall a write indefinitely.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| MemoryError::EmbeddingProvider(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl EmbeddingProvider for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { text })
            .send()
            .map_err(|e| MemoryError::EmbeddingProvider(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(MemoryError::EmbeddingProvider(format!(
                "endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .map_err(|e| MemoryError::EmbeddingProvider(format!("malformed response: {e}")))?;

        Ok(body.embedding)
    }

    fn method(&self) -> &str {
        "remote-v1"
    }
}
