#![allow(dead_code)]

use mnemos::config::MnemosConfig;
use mnemos::db;
use mnemos::embedding::EMBEDDING_DIM;
use mnemos::engine::MemoryEngine;
use mnemos::memory::store::{store_pattern, NewPattern};
use rusqlite::Connection;

/// Fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Engine over an in-memory database with the hashed embedder.
pub fn test_engine() -> MemoryEngine {
    MemoryEngine::open_in_memory(MnemosConfig::default()).unwrap()
}

/// Deterministic unit embedding with a spike at position `seed`. Distinct
/// seeds produce orthogonal vectors.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// A unit vector with very high cosine similarity to `base` (> 0.99).
pub fn similar_embedding(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    for x in v.iter_mut() {
        if *x == 0.0 {
            *x = 0.004;
        }
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

/// Insert a pattern with an explicit embedding, bypassing the embedder.
pub fn insert_pattern(conn: &mut Connection, title: &str, embedding: &[f32]) -> String {
    store_pattern(
        conn,
        &NewPattern {
            namespace: "global",
            title,
            content: title,
            domain: None,
        },
        embedding,
        "hashed-v1",
    )
    .unwrap()
}

/// Set confidence and usage directly, for ranking and consolidation setups.
pub fn set_state(conn: &Connection, id: &str, confidence: f64, usage: u32) {
    conn.execute(
        "UPDATE patterns SET confidence = ?1, usage_count = ?2 WHERE id = ?3",
        rusqlite::params![confidence, usage, id],
    )
    .unwrap();
}
