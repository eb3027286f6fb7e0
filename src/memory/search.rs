//! Candidate retrieval by vector similarity.
//!
//! KNN over the `patterns_vec` virtual table, over-fetching past the
//! namespace filter, then joining the `patterns` table. Distances come back
//! as L2 over unit vectors and are converted to cosine similarity. The
//! contract is a ranked-by-similarity candidate list; swapping the scan for
//! an ANN index later does not change it.

use rusqlite::{params, Connection, OptionalExtension};

use crate::embedding::EMBEDDING_DIM;
use crate::error::{MemoryError, Result};
use crate::memory::types::Pattern;

/// A scored search candidate. Carries the stored vector so the ranker can
/// compute pairwise similarities for diversity without re-reading the store.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pattern: Pattern,
    pub similarity: f64,
    pub vector: Vec<f32>,
}

/// Score stored vectors in a namespace against the query vector.
///
/// Returns up to `pool` candidates ordered by descending similarity,
/// excluding patterns below `min_confidence` and patterns with no current
/// embedding (pending backfill).
pub fn search_candidates(
    conn: &Connection,
    query: &[f32],
    namespace: &str,
    pool: usize,
    min_confidence: f64,
) -> Result<Vec<Candidate>> {
    if query.len() != EMBEDDING_DIM {
        return Err(MemoryError::Validation(format!(
            "query vector has {} dimensions, expected {EMBEDDING_DIM}",
            query.len()
        )));
    }
    if pool == 0 {
        return Ok(Vec::new());
    }

    // Over-fetch: KNN runs store-wide, the namespace filter applies after.
    let knn_limit = (pool * 3).max(pool);
    let query_bytes = super::embedding_to_bytes(query);

    let mut stmt = conn.prepare(
        "SELECT id, distance FROM patterns_vec \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let nearest: Vec<(String, f64)> = stmt
        .query_map(params![query_bytes, knn_limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut candidates = Vec::with_capacity(pool);
    for (id, distance) in nearest {
        if candidates.len() >= pool {
            break;
        }

        let pattern: Option<Pattern> = conn
            .query_row(
                "SELECT p.id, p.namespace, p.title, p.content, p.domain, p.confidence, \
                 p.usage_count, p.created_at, p.last_used_at \
                 FROM patterns p JOIN embeddings e ON e.pattern_id = p.id \
                 WHERE p.id = ?1 AND p.namespace = ?2 AND p.confidence >= ?3",
                params![id, namespace, min_confidence],
                super::store::pattern_from_row,
            )
            .optional()?;

        let Some(pattern) = pattern else { continue };

        let vector_bytes: Vec<u8> = conn.query_row(
            "SELECT embedding FROM patterns_vec WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        candidates.push(Candidate {
            pattern,
            similarity: super::l2_to_cosine(distance),
            vector: super::bytes_to_embedding(&vector_bytes),
        });
    }

    Ok(candidates)
}
