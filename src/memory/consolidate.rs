//! Namespace consolidation — prune and merge maintenance pass.
//!
//! Not a hot-path operation. Runs in one exclusive transaction: first prunes
//! patterns below the confidence floor with negligible usage, then merges
//! near-identical embeddings into a single surviving pattern whose
//! confidence is the usage-weighted average of the pair. Pattern ids of
//! pruned/merged entries are not stable across a consolidation.

use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::ConsolidationConfig;
use crate::error::Result;
use crate::memory::store::write_audit_log;

/// Counts reported by a consolidation pass.
#[derive(Debug, Serialize)]
pub struct ConsolidateResult {
    pub pruned: usize,
    pub merged: usize,
}

struct VectorRow {
    id: String,
    usage_count: u32,
    confidence: f64,
    vector: Vec<f32>,
}

/// Consolidate one namespace: prune, then deduplicate near-identical vectors.
pub fn consolidate(
    conn: &mut Connection,
    namespace: &str,
    config: &ConsolidationConfig,
) -> Result<ConsolidateResult> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;

    // Phase 1: prune low-confidence, negligible-usage patterns.
    let prune_ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM patterns \
             WHERE namespace = ?1 AND confidence < ?2 AND usage_count <= ?3",
        )?;
        let rows = stmt.query_map(
            params![namespace, config.confidence_floor, config.negligible_usage],
            |row| row.get(0),
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    for id in &prune_ids {
        tx.execute("DELETE FROM patterns_vec WHERE id = ?1", params![id])?;
        write_audit_log(
            &tx,
            "prune",
            id,
            Some(&serde_json::json!({"confidence_floor": config.confidence_floor})),
        )?;
        tx.execute("DELETE FROM patterns WHERE id = ?1", params![id])?;
    }

    // Phase 2: merge near-duplicates among the survivors.
    let mut rows: Vec<VectorRow> = {
        let mut stmt = tx.prepare(
            "SELECT p.id, p.usage_count, p.confidence, v.embedding \
             FROM patterns p JOIN patterns_vec v ON v.id = p.id \
             WHERE p.namespace = ?1 ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![namespace], |row| {
            let bytes: Vec<u8> = row.get(3)?;
            Ok(VectorRow {
                id: row.get(0)?,
                usage_count: row.get(1)?,
                confidence: row.get(2)?,
                vector: super::bytes_to_embedding(&bytes),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let mut absorbed: HashSet<usize> = HashSet::new();
    let mut merged = 0usize;

    for i in 0..rows.len() {
        if absorbed.contains(&i) {
            continue;
        }
        for j in (i + 1)..rows.len() {
            if absorbed.contains(&j) {
                continue;
            }
            let sim = super::cosine_similarity(&rows[i].vector, &rows[j].vector);
            if sim < config.merge_threshold {
                continue;
            }

            // Survivor: more used, then more trusted, then smaller id.
            let (survivor_idx, loser_idx) = if pick_first(&rows[i], &rows[j]) {
                (i, j)
            } else {
                (j, i)
            };

            let (usage, confidence) = merge_pair(&tx, &rows[survivor_idx], &rows[loser_idx])?;
            // A survivor can absorb again in a later pair, so its row must
            // reflect the merge it just won.
            rows[survivor_idx].usage_count = usage;
            rows[survivor_idx].confidence = confidence;
            absorbed.insert(loser_idx);
            merged += 1;

            if loser_idx == i {
                break; // rows[i] is gone, move to the next anchor
            }
        }
    }

    tx.commit()?;

    tracing::info!(
        namespace,
        pruned = prune_ids.len(),
        merged,
        "consolidation complete"
    );
    Ok(ConsolidateResult {
        pruned: prune_ids.len(),
        merged,
    })
}

/// True if `a` survives a merge with `b`.
fn pick_first(a: &VectorRow, b: &VectorRow) -> bool {
    match a.usage_count.cmp(&b.usage_count) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match a.confidence.total_cmp(&b.confidence) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => a.id < b.id,
        },
    }
}

/// Fold `loser` into `survivor`: usage-weighted confidence, summed usage,
/// re-pointed links, loser deleted. Returns the survivor's new state.
fn merge_pair(
    tx: &rusqlite::Transaction,
    survivor: &VectorRow,
    loser: &VectorRow,
) -> Result<(u32, f64)> {
    let total_usage = survivor.usage_count as f64 + loser.usage_count as f64;
    let confidence = if total_usage > 0.0 {
        (survivor.confidence * survivor.usage_count as f64
            + loser.confidence * loser.usage_count as f64)
            / total_usage
    } else {
        (survivor.confidence + loser.confidence) / 2.0
    };

    tx.execute(
        "UPDATE patterns SET confidence = ?1, usage_count = ?2 WHERE id = ?3",
        params![
            confidence,
            survivor.usage_count + loser.usage_count,
            survivor.id
        ],
    )?;

    // Edges between the pair would become self-loops; drop them first.
    tx.execute(
        "DELETE FROM pattern_links WHERE (source_id = ?1 AND target_id = ?2) \
         OR (source_id = ?2 AND target_id = ?1)",
        params![survivor.id, loser.id],
    )?;
    // Re-point the loser's remaining edges; edges that would duplicate an
    // existing (source, target, type) triple are left behind and swept below.
    tx.execute(
        "UPDATE OR IGNORE pattern_links SET source_id = ?1 WHERE source_id = ?2",
        params![survivor.id, loser.id],
    )?;
    tx.execute(
        "UPDATE OR IGNORE pattern_links SET target_id = ?1 WHERE target_id = ?2",
        params![survivor.id, loser.id],
    )?;
    tx.execute(
        "DELETE FROM pattern_links WHERE source_id = ?1 OR target_id = ?1",
        params![loser.id],
    )?;

    write_audit_log(
        tx,
        "merge",
        &survivor.id,
        Some(&serde_json::json!({
            "absorbed": loser.id,
            "confidence": confidence,
        })),
    )?;

    tx.execute("DELETE FROM patterns_vec WHERE id = ?1", params![loser.id])?;
    tx.execute("DELETE FROM patterns WHERE id = ?1", params![loser.id])?;

    Ok((survivor.usage_count + loser.usage_count, confidence))
}
