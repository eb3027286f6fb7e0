//! JSON snapshot export and import.
//!
//! Snapshots carry every pattern with its embedding, all links, and all
//! trajectories. Import preserves ids so links and external references
//! survive the round trip; patterns whose ids already exist are skipped
//! rather than overwritten.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::embedding::EMBEDDING_DIM;
use crate::error::{MemoryError, Result};
use crate::memory::store::write_audit_log;
use crate::memory::types::PatternLink;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub exported_at: String,
    pub patterns: Vec<SnapshotPattern>,
    pub links: Vec<PatternLink>,
    pub trajectories: Vec<SnapshotTrajectory>,
}

/// A pattern row together with its embedding, if it has one.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotPattern {
    pub id: String,
    pub namespace: String,
    pub title: String,
    pub content: String,
    pub domain: Option<String>,
    pub confidence: f64,
    pub usage_count: u32,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub embedding: Option<SnapshotEmbedding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotEmbedding {
    pub method: String,
    pub generated_at: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotTrajectory {
    pub task_id: String,
    pub outcome: String,
    pub confidence: f64,
    pub created_at: String,
    pub ended_at: Option<String>,
    pub steps: Vec<SnapshotStep>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotStep {
    pub seq: u32,
    pub content: String,
    pub created_at: String,
}

/// Counts reported by an import.
#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub patterns_imported: usize,
    pub patterns_skipped: usize,
    pub links_imported: usize,
    pub trajectories_imported: usize,
}

/// Read the store into a snapshot. `namespace` restricts the export to one
/// namespace's patterns and the links fully inside it; `None` exports
/// everything. Trajectories are namespace-agnostic and always included.
pub fn export_snapshot(conn: &Connection, namespace: Option<&str>) -> Result<Snapshot> {
    let patterns = {
        let mut stmt = conn.prepare(
            "SELECT p.id, p.namespace, p.title, p.content, p.domain, p.confidence, \
                    p.usage_count, p.created_at, p.last_used_at, \
                    e.method, e.generated_at, v.embedding \
             FROM patterns p \
             LEFT JOIN embeddings e ON e.pattern_id = p.id \
             LEFT JOIN patterns_vec v ON v.id = p.id \
             WHERE ?1 IS NULL OR p.namespace = ?1 \
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![namespace], |row| {
            let method: Option<String> = row.get(9)?;
            let generated_at: Option<String> = row.get(10)?;
            let bytes: Option<Vec<u8>> = row.get(11)?;
            let embedding = match (method, generated_at, bytes) {
                (Some(method), Some(generated_at), Some(bytes)) => Some(SnapshotEmbedding {
                    method,
                    generated_at,
                    vector: super::bytes_to_embedding(&bytes),
                }),
                _ => None,
            };
            Ok(SnapshotPattern {
                id: row.get(0)?,
                namespace: row.get(1)?,
                title: row.get(2)?,
                content: row.get(3)?,
                domain: row.get(4)?,
                confidence: row.get(5)?,
                usage_count: row.get(6)?,
                created_at: row.get(7)?,
                last_used_at: row.get(8)?,
                embedding,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let links = {
        let mut stmt = conn.prepare(
            "SELECT id, source_id, target_id, link_type, strength, created_at, updated_at \
             FROM pattern_links l \
             WHERE ?1 IS NULL \
                OR (l.source_id IN (SELECT id FROM patterns WHERE namespace = ?1) \
                    AND l.target_id IN (SELECT id FROM patterns WHERE namespace = ?1)) \
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![namespace], super::links::link_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let trajectories = {
        let mut stmt = conn.prepare(
            "SELECT task_id, outcome, confidence, created_at, ended_at \
             FROM trajectories ORDER BY task_id",
        )?;
        let headers: Vec<(String, String, f64, String, Option<String>)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut step_stmt = conn.prepare(
            "SELECT seq, content, created_at FROM trajectory_steps \
             WHERE task_id = ?1 ORDER BY seq",
        )?;
        let mut out = Vec::with_capacity(headers.len());
        for (task_id, outcome, confidence, created_at, ended_at) in headers {
            let steps = step_stmt
                .query_map(params![task_id], |row| {
                    Ok(SnapshotStep {
                        seq: row.get(0)?,
                        content: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            out.push(SnapshotTrajectory {
                task_id,
                outcome,
                confidence,
                created_at,
                ended_at,
                steps,
            });
        }
        out
    };

    Ok(Snapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        patterns,
        links,
        trajectories,
    })
}

/// Import a snapshot, preserving ids. Existing ids are skipped. Runs in one
/// transaction: a malformed snapshot imports nothing.
pub fn import_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> Result<ImportResult> {
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(MemoryError::Validation(format!(
            "unsupported snapshot format version {}",
            snapshot.format_version
        )));
    }
    for pattern in &snapshot.patterns {
        if let Some(embedding) = &pattern.embedding {
            if embedding.vector.len() != EMBEDDING_DIM {
                return Err(MemoryError::Validation(format!(
                    "snapshot embedding for {} has {} dimensions, expected {EMBEDDING_DIM}",
                    pattern.id,
                    embedding.vector.len()
                )));
            }
        }
    }

    let tx = conn.transaction()?;
    let mut result = ImportResult {
        patterns_imported: 0,
        patterns_skipped: 0,
        links_imported: 0,
        trajectories_imported: 0,
    };

    for pattern in &snapshot.patterns {
        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM patterns WHERE id = ?1",
                params![pattern.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            result.patterns_skipped += 1;
            continue;
        }

        tx.execute(
            "INSERT INTO patterns (id, namespace, title, content, domain, confidence, \
             usage_count, created_at, last_used_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                pattern.id,
                pattern.namespace,
                pattern.title,
                pattern.content,
                pattern.domain,
                pattern.confidence,
                pattern.usage_count,
                pattern.created_at,
                pattern.last_used_at,
            ],
        )?;
        if let Some(embedding) = &pattern.embedding {
            tx.execute(
                "INSERT INTO patterns_vec (id, embedding) VALUES (?1, ?2)",
                params![pattern.id, super::embedding_to_bytes(&embedding.vector)],
            )?;
            tx.execute(
                "INSERT INTO embeddings (pattern_id, method, generated_at) VALUES (?1, ?2, ?3)",
                params![pattern.id, embedding.method, embedding.generated_at],
            )?;
        }
        write_audit_log(&tx, "import", &pattern.id, None)?;
        result.patterns_imported += 1;
    }

    for link in &snapshot.links {
        // Skipped patterns keep their existing links; OR IGNORE also covers
        // a link re-imported on top of itself.
        let changed = tx.execute(
            "INSERT OR IGNORE INTO pattern_links \
             (id, source_id, target_id, link_type, strength, created_at, updated_at) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7 \
             WHERE EXISTS (SELECT 1 FROM patterns WHERE id = ?2) \
               AND EXISTS (SELECT 1 FROM patterns WHERE id = ?3)",
            params![
                link.id,
                link.source_id,
                link.target_id,
                link.link_type.as_str(),
                link.strength,
                link.created_at,
                link.updated_at,
            ],
        )?;
        result.links_imported += changed;
    }

    for trajectory in &snapshot.trajectories {
        let changed = tx.execute(
            "INSERT OR IGNORE INTO trajectories \
             (task_id, outcome, confidence, created_at, ended_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                trajectory.task_id,
                trajectory.outcome,
                trajectory.confidence,
                trajectory.created_at,
                trajectory.ended_at,
            ],
        )?;
        if changed == 0 {
            continue;
        }
        for step in &trajectory.steps {
            tx.execute(
                "INSERT INTO trajectory_steps (task_id, seq, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![trajectory.task_id, step.seq, step.content, step.created_at],
            )?;
        }
        result.trajectories_imported += 1;
    }

    tx.commit()?;

    tracing::info!(
        imported = result.patterns_imported,
        skipped = result.patterns_skipped,
        "snapshot import complete"
    );
    Ok(result)
}
