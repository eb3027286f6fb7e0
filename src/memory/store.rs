//! Write path — pattern persistence with atomic multi-table commits.
//!
//! [`store_pattern`] inserts the pattern row, its vector, and its embedding
//! provenance inside one transaction: either the pattern becomes fully
//! searchable or nothing is written. Reads, deletes, and usage tracking for
//! the `patterns` table also live here.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::embedding::EMBEDDING_DIM;
use crate::error::{MemoryError, Result};
use crate::memory::types::{Pattern, CONFIDENCE_INITIAL};

/// Input for a new pattern. Confidence always starts at [`CONFIDENCE_INITIAL`].
#[derive(Debug, Clone)]
pub struct NewPattern<'a> {
    pub namespace: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub domain: Option<&'a str>,
}

/// Full write path: validate → insert pattern + vector + provenance → audit log.
///
/// Returns the new pattern's id.
pub fn store_pattern(
    conn: &mut Connection,
    new: &NewPattern<'_>,
    embedding: &[f32],
    method: &str,
) -> Result<String> {
    if new.content.trim().is_empty() {
        return Err(MemoryError::Validation("content must not be empty".into()));
    }
    if new.title.trim().is_empty() {
        return Err(MemoryError::Validation("title must not be empty".into()));
    }
    if embedding.len() != EMBEDDING_DIM {
        return Err(MemoryError::Validation(format!(
            "embedding has {} dimensions, expected {EMBEDDING_DIM}",
            embedding.len()
        )));
    }

    let tx = conn.transaction()?;

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO patterns (id, namespace, title, content, domain, confidence, usage_count, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        params![
            id,
            new.namespace,
            new.title,
            new.content,
            new.domain,
            CONFIDENCE_INITIAL,
            now,
        ],
    )?;

    insert_vector(&tx, &id, embedding, method, &now)?;
    write_audit_log(&tx, "create", &id, None)?;

    tx.commit()?;

    tracing::debug!(pattern_id = %id, namespace = new.namespace, "pattern stored");
    Ok(id)
}

/// Insert (or replace) a pattern's vector and embedding provenance.
pub(crate) fn insert_vector(
    tx: &Transaction,
    pattern_id: &str,
    embedding: &[f32],
    method: &str,
    now: &str,
) -> Result<()> {
    let embedding_bytes = super::embedding_to_bytes(embedding);
    tx.execute(
        "DELETE FROM patterns_vec WHERE id = ?1",
        params![pattern_id],
    )?;
    tx.execute(
        "INSERT INTO patterns_vec (id, embedding) VALUES (?1, ?2)",
        params![pattern_id, embedding_bytes],
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO embeddings (pattern_id, method, generated_at) \
         VALUES (?1, ?2, ?3)",
        params![pattern_id, method, now],
    )?;
    Ok(())
}

/// Fetch a single pattern by id.
pub fn get_pattern(conn: &Connection, id: &str) -> Result<Pattern> {
    conn.query_row(
        "SELECT id, namespace, title, content, domain, confidence, usage_count, \
         created_at, last_used_at FROM patterns WHERE id = ?1",
        params![id],
        pattern_from_row,
    )
    .optional()?
    .ok_or_else(|| MemoryError::NotFound(format!("pattern: {id}")))
}

/// Delete a pattern, its vector, and its provenance row. Links cascade via FK.
pub fn delete_pattern(conn: &mut Connection, id: &str) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM patterns_vec WHERE id = ?1", params![id])?;
    write_audit_log(&tx, "delete", id, None)?;
    let rows = tx.execute("DELETE FROM patterns WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(MemoryError::NotFound(format!("pattern: {id}")));
    }

    tx.commit()?;
    Ok(())
}

/// List all patterns in a namespace, newest first.
pub fn list_namespace(conn: &Connection, namespace: &str) -> Result<Vec<Pattern>> {
    let mut stmt = conn.prepare(
        "SELECT id, namespace, title, content, domain, confidence, usage_count, \
         created_at, last_used_at FROM patterns WHERE namespace = ?1 ORDER BY created_at DESC",
    )?;
    let patterns = stmt
        .query_map(params![namespace], pattern_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(patterns)
}

/// Batch update usage_count and last_used_at for patterns returned by a query.
pub fn touch_usage(conn: &Connection, ids: &[&str]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "UPDATE patterns SET usage_count = usage_count + 1, last_used_at = ?1 WHERE id = ?2",
    )?;
    for id in ids {
        stmt.execute(params![now, id])?;
    }
    Ok(())
}

/// Write an entry to the pattern_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    pattern_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO pattern_log (operation, pattern_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, pattern_id, details_json, now],
    )?;
    Ok(())
}

/// Map a `patterns` SELECT row (canonical column order) to a [`Pattern`].
pub(crate) fn pattern_from_row(row: &Row<'_>) -> rusqlite::Result<Pattern> {
    Ok(Pattern {
        id: row.get(0)?,
        namespace: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        domain: row.get(4)?,
        confidence: row.get(5)?,
        usage_count: row.get(6)?,
        created_at: row.get(7)?,
        last_used_at: row.get(8)?,
    })
}
