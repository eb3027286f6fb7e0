//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, the deterministic
//! [`hashed::HashedEmbedder`] (default, offline), the optional
//! [`remote::RemoteEmbedder`] (HTTP), and the [`FallbackEmbedder`] wrapper
//! that recovers from provider failures so a store is never failed by a
//! flaky embedding backend.

pub mod hashed;
pub mod remote;

use crate::config::EmbeddingConfig;
use crate::error::Result;

/// Number of dimensions in the embedding vectors. Constant per store
/// instance; every vector written to `patterns_vec` has exactly this length.
pub const EMBEDDING_DIM: usize = 256;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly [`EMBEDDING_DIM`]
/// dimensions so that cosine similarity is well-defined. All methods are
/// synchronous; the only implementation that blocks on I/O is the remote
/// provider, which is bounded by its client timeout.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier recorded as embedding provenance (`embeddings.method`).
    fn method(&self) -> &str;

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// A computed embedding together with the method that produced it.
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    pub vector: Vec<f32>,
    pub method: String,
}

/// Wraps an optional primary provider with the deterministic hashed fallback.
///
/// When the primary fails (network error, timeout, wrong dimension), the
/// embed is recomputed with the hashed embedder and the write proceeds. The
/// provenance records which provider actually produced the vector.
pub struct FallbackEmbedder {
    primary: Option<Box<dyn EmbeddingProvider>>,
    hashed: hashed::HashedEmbedder,
}

impl FallbackEmbedder {
    /// Build from config. `provider = "hashed"` runs with no primary;
    /// `provider = "remote"` wraps an HTTP provider.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let primary: Option<Box<dyn EmbeddingProvider>> = match config.provider.as_str() {
            "hashed" => None,
            "remote" => Some(Box::new(remote::RemoteEmbedder::new(config)?)),
            other => {
                return Err(crate::error::MemoryError::Validation(format!(
                    "unknown embedding provider: {other}. Supported: hashed, remote"
                )))
            }
        };
        Ok(Self {
            primary,
            hashed: hashed::HashedEmbedder::new(),
        })
    }

    /// Wrap an explicit primary provider. Used by tests to plug in doubles.
    pub fn with_primary(primary: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            primary: Some(primary),
            hashed: hashed::HashedEmbedder::new(),
        }
    }

    /// Deterministic-only embedder, no primary.
    pub fn hashed_only() -> Self {
        Self {
            primary: None,
            hashed: hashed::HashedEmbedder::new(),
        }
    }

    /// Embed text, falling back to the hashed embedder on any primary
    /// failure. Infallible by construction: the hashed embedder cannot fail.
    pub fn embed(&self, text: &str) -> EmbeddedText {
        if let Some(primary) = &self.primary {
            match primary.embed(text) {
                Ok(vector) if vector.len() == EMBEDDING_DIM => {
                    return EmbeddedText {
                        vector,
                        method: primary.method().to_string(),
                    };
                }
                Ok(vector) => {
                    tracing::warn!(
                        got = vector.len(),
                        expected = EMBEDDING_DIM,
                        "primary embedder returned wrong dimension, using hashed fallback"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "primary embedder failed, using hashed fallback");
                }
            }
        }

        let vector = self
            .hashed
            .embed(text)
            .expect("hashed embedder is infallible");
        EmbeddedText {
            vector,
            method: self.hashed.method().to_string(),
        }
    }

    /// Method identifier of the preferred provider (primary if configured).
    pub fn preferred_method(&self) -> &str {
        self.primary
            .as_ref()
            .map(|p| p.method())
            .unwrap_or_else(|| self.hashed.method())
    }
}
