//! Self-learning semantic memory for AI agents — store tactics, retrieve
//! them by meaning, and let retrieval quality improve with reported outcomes.
//!
//! Patterns live in SQLite with a [sqlite-vec](https://github.com/asg017/sqlite-vec)
//! vector index. Each pattern carries a confidence score that moves
//! multiplicatively with success/failure reports, so patterns that keep
//! working rise in the ranking and patterns that keep failing sink until
//! consolidation prunes them.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) with a vec0 virtual table for KNN retrieval
//! - **Embeddings**: deterministic feature-hashing embedder (256 dims),
//!   optionally fronted by a remote HTTP provider with automatic fallback
//! - **Ranking**: greedy MMR blending similarity, confidence, recency, and
//!   diversity, with a hard near-duplicate cutoff
//!
//! # Modules
//!
//! - [`config`] — TOML configuration with environment overrides
//! - [`db`] — database initialization, schema, and migrations
//! - [`embedding`] — text-to-vector providers and the fallback wrapper
//! - [`engine`] — the [`engine::MemoryEngine`] facade over everything below
//! - [`memory`] — store, search, ranking, confidence, links, trajectories,
//!   consolidation, and snapshots

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod memory;
