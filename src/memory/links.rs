//! Typed directed relationships between patterns.
//!
//! Edges form a light knowledge graph kept in an adjacency table keyed by
//! pattern id. Storing the same (source, target, type) twice merges into one
//! edge carrying the latest strength. Traversal is one-hop only; transitive
//! closure is a caller concern.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{MemoryError, Result};
use crate::memory::store::write_audit_log;
use crate::memory::types::{LinkType, Pattern, PatternLink};

/// Result of a link upsert.
#[derive(Debug, serde::Serialize)]
pub struct LinkResult {
    /// UUID of the created (or updated) edge.
    pub id: String,
    /// `true` if an existing edge of the same triple was updated in place.
    pub merged: bool,
}

/// Create or merge a typed edge between two patterns.
///
/// Self-loops and strengths outside [0, 1] are `Validation` errors; missing
/// endpoints are `NotFound`. Runs in one transaction.
pub fn link(
    conn: &mut Connection,
    source_id: &str,
    target_id: &str,
    link_type: LinkType,
    strength: f64,
) -> Result<LinkResult> {
    if source_id == target_id {
        return Err(MemoryError::Validation(format!(
            "self-loop rejected: {source_id}"
        )));
    }
    if !(0.0..=1.0).contains(&strength) {
        return Err(MemoryError::Validation(format!(
            "strength must be in [0, 1], got {strength}"
        )));
    }

    let tx = conn.transaction()?;

    for (role, id) in [("source", source_id), ("target", target_id)] {
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM patterns WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(MemoryError::NotFound(format!("{role} pattern: {id}")));
        }
    }

    let now = chrono::Utc::now().to_rfc3339();

    // Merge-on-duplicate: the triple is unique, only strength moves.
    let existing_id: Option<String> = tx
        .query_row(
            "SELECT id FROM pattern_links \
             WHERE source_id = ?1 AND target_id = ?2 AND link_type = ?3",
            params![source_id, target_id, link_type.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    let result = if let Some(id) = existing_id {
        tx.execute(
            "UPDATE pattern_links SET strength = ?1, updated_at = ?2 WHERE id = ?3",
            params![strength, now, id],
        )?;
        LinkResult { id, merged: true }
    } else {
        let id = uuid::Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO pattern_links (id, source_id, target_id, link_type, strength, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, source_id, target_id, link_type.as_str(), strength, now],
        )?;
        LinkResult { id, merged: false }
    };

    write_audit_log(
        &tx,
        "link",
        source_id,
        Some(&serde_json::json!({
            "target": target_id,
            "link_type": link_type.as_str(),
            "strength": strength,
            "merged": result.merged,
        })),
    )?;

    tx.commit()?;
    Ok(result)
}

/// All edges touching a pattern, in either direction.
pub fn links_of(conn: &Connection, pattern_id: &str) -> Result<Vec<PatternLink>> {
    ensure_pattern_exists(conn, pattern_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, source_id, target_id, link_type, strength, created_at, updated_at \
         FROM pattern_links WHERE source_id = ?1 OR target_id = ?1 ORDER BY created_at",
    )?;
    let links = stmt
        .query_map(params![pattern_id], link_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(links)
}

/// One-hop expansion: the patterns on the far end of every edge touching
/// `pattern_id`, paired with the connecting edge.
pub fn neighbors(conn: &Connection, pattern_id: &str) -> Result<Vec<(PatternLink, Pattern)>> {
    let edges = links_of(conn, pattern_id)?;
    let mut out = Vec::with_capacity(edges.len());

    for edge in edges {
        let other_id = if edge.source_id == pattern_id {
            &edge.target_id
        } else {
            &edge.source_id
        };
        let pattern = super::store::get_pattern(conn, other_id)?;
        out.push((edge, pattern));
    }

    Ok(out)
}

fn ensure_pattern_exists(conn: &Connection, pattern_id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM patterns WHERE id = ?1",
        params![pattern_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(MemoryError::NotFound(format!("pattern: {pattern_id}")));
    }
    Ok(())
}

pub(crate) fn link_from_row(row: &Row<'_>) -> rusqlite::Result<PatternLink> {
    let link_type_str: String = row.get(3)?;
    Ok(PatternLink {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        link_type: link_type_str
            .parse()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        strength: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::EMBEDDING_DIM;
    use crate::memory::store::{store_pattern, NewPattern};

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn insert(conn: &mut Connection, title: &str, dim: usize) -> String {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[dim % EMBEDDING_DIM] = 1.0;
        store_pattern(
            conn,
            &NewPattern {
                namespace: "global",
                title,
                content: title,
                domain: None,
            },
            &v,
            "hashed-v1",
        )
        .unwrap()
    }

    #[test]
    fn link_basic() {
        let mut conn = test_db();
        let a = insert(&mut conn, "retry with backoff", 0);
        let b = insert(&mut conn, "idempotent handlers", 1);

        let result = link(&mut conn, &a, &b, LinkType::Requires, 0.8).unwrap();
        assert!(!result.merged);

        let links = links_of(&conn, &a).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source_id, a);
        assert_eq!(links[0].target_id, b);
        assert_eq!(links[0].link_type, LinkType::Requires);
        assert!((links[0].strength - 0.8).abs() < 1e-9);
    }

    #[test]
    fn self_loop_is_validation_error() {
        let mut conn = test_db();
        let a = insert(&mut conn, "pattern", 0);

        let result = link(&mut conn, &a, &a, LinkType::Causes, 0.5);
        assert!(matches!(result, Err(MemoryError::Validation(_))));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pattern_links", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn strength_out_of_range_is_validation_error() {
        let mut conn = test_db();
        let a = insert(&mut conn, "a", 0);
        let b = insert(&mut conn, "b", 1);

        assert!(matches!(
            link(&mut conn, &a, &b, LinkType::Causes, 1.5),
            Err(MemoryError::Validation(_))
        ));
        assert!(matches!(
            link(&mut conn, &a, &b, LinkType::Causes, -0.1),
            Err(MemoryError::Validation(_))
        ));
    }

    #[test]
    fn missing_endpoint_is_not_found() {
        let mut conn = test_db();
        let a = insert(&mut conn, "a", 0);

        assert!(matches!(
            link(&mut conn, &a, "nonexistent", LinkType::Causes, 0.5),
            Err(MemoryError::NotFound(_))
        ));
        assert!(matches!(
            link(&mut conn, "nonexistent", &a, LinkType::Causes, 0.5),
            Err(MemoryError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_triple_merges_with_latest_strength() {
        let mut conn = test_db();
        let a = insert(&mut conn, "a", 0);
        let b = insert(&mut conn, "b", 1);

        let r1 = link(&mut conn, &a, &b, LinkType::Enhances, 0.3).unwrap();
        assert!(!r1.merged);

        let r2 = link(&mut conn, &a, &b, LinkType::Enhances, 0.9).unwrap();
        assert!(r2.merged);
        assert_eq!(r2.id, r1.id);

        let links = links_of(&conn, &a).unwrap();
        assert_eq!(links.len(), 1, "duplicate triple must not create a second edge");
        assert!((links[0].strength - 0.9).abs() < 1e-9);
    }

    #[test]
    fn different_type_same_pair_is_a_new_edge() {
        let mut conn = test_db();
        let a = insert(&mut conn, "a", 0);
        let b = insert(&mut conn, "b", 1);

        link(&mut conn, &a, &b, LinkType::Enhances, 0.5).unwrap();
        let r = link(&mut conn, &a, &b, LinkType::Conflicts, 0.5).unwrap();
        assert!(!r.merged);

        assert_eq!(links_of(&conn, &a).unwrap().len(), 2);
    }

    #[test]
    fn links_of_includes_incoming_edges() {
        let mut conn = test_db();
        let a = insert(&mut conn, "a", 0);
        let b = insert(&mut conn, "b", 1);

        link(&mut conn, &a, &b, LinkType::Causes, 0.5).unwrap();

        let from_b = links_of(&conn, &b).unwrap();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].source_id, a);
    }

    #[test]
    fn neighbors_one_hop() {
        let mut conn = test_db();
        let a = insert(&mut conn, "a", 0);
        let b = insert(&mut conn, "b", 1);
        let c = insert(&mut conn, "c", 2);

        link(&mut conn, &a, &b, LinkType::Causes, 0.5).unwrap();
        link(&mut conn, &c, &a, LinkType::Alternative, 0.4).unwrap();

        let hood = neighbors(&conn, &a).unwrap();
        let ids: Vec<&str> = hood.iter().map(|(_, p)| p.id.as_str()).collect();
        assert_eq!(hood.len(), 2);
        assert!(ids.contains(&b.as_str()));
        assert!(ids.contains(&c.as_str()));
    }

    #[test]
    fn links_of_unknown_pattern_is_not_found() {
        let conn = test_db();
        assert!(matches!(
            links_of(&conn, "nonexistent"),
            Err(MemoryError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_pattern_cascades_links() {
        let mut conn = test_db();
        let a = insert(&mut conn, "a", 0);
        let b = insert(&mut conn, "b", 1);
        link(&mut conn, &a, &b, LinkType::Causes, 0.5).unwrap();

        crate::memory::store::delete_pattern(&mut conn, &a).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pattern_links", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
