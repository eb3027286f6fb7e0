//! Deterministic hashed-projection embedder.
//!
//! Maps text to a fixed-length unit vector with no model, no network, and no
//! training: each token and character trigram is hashed (FNV-1a) into a seed
//! for a SplitMix64 stream, which lays the feature down as a pseudo-random
//! signed projection over the full vector. Texts sharing tokens or trigrams
//! share projections, so textually similar inputs land closer under cosine
//! similarity. Same input always yields the same vector.

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::error::Result;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Relative weight of character trigram features versus whole tokens.
/// Trigrams blur morphological variants ("caching" vs "cache") together
/// without letting them dominate exact token matches.
const TRIGRAM_WEIGHT: f32 = 0.4;

/// The default, dependency-free embedding provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashedEmbedder;

impl HashedEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl EmbeddingProvider for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut acc = vec![0.0f32; EMBEDDING_DIM];

        for token in tokenize(text) {
            project_feature(&mut acc, token.as_bytes(), 1.0);

            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    project_feature(&mut acc, trigram.as_bytes(), TRIGRAM_WEIGHT);
                }
            }
        }

        normalize(&mut acc);
        Ok(acc)
    }

    fn method(&self) -> &str {
        "hashed-v1"
    }
}

/// Lowercased alphanumeric tokens.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Accumulate one feature's pseudo-random projection into the vector.
fn project_feature(acc: &mut [f32], feature: &[u8], weight: f32) {
    let mut state = fnv1a(feature);
    for slot in acc.iter_mut() {
        *slot += weight * unit_interval(splitmix64(&mut state));
    }
}

/// FNV-1a hash of a byte string.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// SplitMix64 step: advances the state and returns the next output.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Map a u64 to [-1, 1).
fn unit_interval(x: u64) -> f32 {
    (x >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
}

/// L2-normalize in place. The zero vector (empty text) stays zero.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn same_input_same_vector() {
        let e = HashedEmbedder::new();
        let a = e.embed("Use a cache for repeated reads").unwrap();
        let b = e.embed("Use a cache for repeated reads").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn output_is_unit_length() {
        let e = HashedEmbedder::new();
        let v = e.embed("normalize me").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashedEmbedder::new();
        let v = e.embed("").unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn shared_tokens_pull_vectors_together() {
        let e = HashedEmbedder::new();
        let cache_a = e.embed("use a cache for repeated reads").unwrap();
        let cache_b = e.embed("cache repeated database reads aggressively").unwrap();
        let unrelated = e.embed("rotate the tls certificates quarterly").unwrap();

        assert!(
            cosine(&cache_a, &cache_b) > cosine(&cache_a, &unrelated),
            "overlapping-token texts must score higher than unrelated text"
        );
    }

    #[test]
    fn case_and_punctuation_insensitive() {
        let e = HashedEmbedder::new();
        let a = e.embed("Cache, repeated reads!").unwrap();
        let b = e.embed("cache repeated reads").unwrap();
        assert!(cosine(&a, &b) > 0.999);
    }

    #[test]
    fn morphological_variants_overlap_via_trigrams() {
        let e = HashedEmbedder::new();
        let a = e.embed("caching strategy").unwrap();
        let b = e.embed("cached strategy").unwrap();
        let c = e.embed("zebra migration").unwrap();
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn cosine_is_symmetric() {
        let e = HashedEmbedder::new();
        let a = e.embed("alpha beta gamma").unwrap();
        let b = e.embed("delta epsilon").unwrap();
        assert!((cosine(&a, &b) - cosine(&b, &a)).abs() < 1e-7);
    }
}
