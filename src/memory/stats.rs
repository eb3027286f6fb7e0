//! Per-namespace store statistics.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub pattern_count: u32,
    pub total_usage: u64,
    pub mean_confidence: f64,
    pub link_count: u32,
    pub trajectory_count: u32,
    pub open_trajectories: u32,
    pub by_domain: Vec<DomainCount>,
    /// Most recently active patterns, newest first.
    pub recent: Vec<RecentPattern>,
}

#[derive(Debug, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct RecentPattern {
    pub id: String,
    pub title: String,
    pub confidence: f64,
    pub active_at: String,
}

const RECENT_LIMIT: i64 = 5;

/// Summarize one namespace. Empty namespaces report zero counts rather
/// than an error.
pub fn namespace_stats(conn: &Connection, namespace: &str) -> Result<NamespaceStats> {
    let usage: Option<(u32, Option<i64>, Option<f64>)> = conn
        .query_row(
            "SELECT pattern_count, total_usage, mean_confidence \
             FROM namespace_usage WHERE namespace = ?1",
            params![namespace],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (pattern_count, total_usage, mean_confidence) = match usage {
        Some((count, total, mean)) => (count, total.unwrap_or(0) as u64, mean.unwrap_or(0.0)),
        None => (0, 0, 0.0),
    };

    // Each stored edge counts once, even when both endpoints share the
    // namespace.
    let link_count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM pattern_links l \
         WHERE l.source_id IN (SELECT id FROM patterns WHERE namespace = ?1) \
            OR l.target_id IN (SELECT id FROM patterns WHERE namespace = ?1)",
        params![namespace],
        |row| row.get(0),
    )?;

    // Trajectories are namespace-agnostic; reported as store-wide totals.
    let (trajectory_count, open_trajectories): (u32, u32) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(outcome = 'open'), 0) FROM trajectories",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut domain_stmt = conn.prepare(
        "SELECT COALESCE(domain, ''), COUNT(*) FROM patterns \
         WHERE namespace = ?1 GROUP BY domain ORDER BY COUNT(*) DESC, domain",
    )?;
    let by_domain: Vec<DomainCount> = domain_stmt
        .query_map(params![namespace], |row| {
            Ok(DomainCount {
                domain: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut recent_stmt = conn.prepare(
        "SELECT id, title, confidence, active_at FROM recent_patterns \
         WHERE namespace = ?1 LIMIT ?2",
    )?;
    let recent: Vec<RecentPattern> = recent_stmt
        .query_map(params![namespace, RECENT_LIMIT], |row| {
            Ok(RecentPattern {
                id: row.get(0)?,
                title: row.get(1)?,
                confidence: row.get(2)?,
                active_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(NamespaceStats {
        namespace: namespace.to_string(),
        pattern_count,
        total_usage,
        mean_confidence,
        link_count,
        trajectory_count,
        open_trajectories,
        by_domain,
        recent,
    })
}

/// List every namespace present in the store, most patterns first.
pub fn list_namespaces(conn: &Connection) -> Result<Vec<(String, u32)>> {
    let mut stmt = conn.prepare(
        "SELECT namespace, pattern_count FROM namespace_usage \
         ORDER BY pattern_count DESC, namespace",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::EMBEDDING_DIM;
    use crate::memory::store::{store_pattern, NewPattern};
    use crate::memory::types::LinkType;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn insert(conn: &mut Connection, namespace: &str, title: &str, domain: Option<&str>) -> String {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[title.len() % EMBEDDING_DIM] = 1.0;
        store_pattern(
            conn,
            &NewPattern {
                namespace,
                title,
                content: title,
                domain,
            },
            &v,
            "hashed-v1",
        )
        .unwrap()
    }

    #[test]
    fn empty_namespace_reports_zeros() {
        let conn = test_db();
        let stats = namespace_stats(&conn, "nothing-here").unwrap();
        assert_eq!(stats.pattern_count, 0);
        assert_eq!(stats.total_usage, 0);
        assert_eq!(stats.link_count, 0);
        assert!(stats.by_domain.is_empty());
    }

    #[test]
    fn counts_patterns_links_and_domains() {
        let mut conn = test_db();
        let a = insert(&mut conn, "global", "alpha", Some("rust"));
        let b = insert(&mut conn, "global", "beta four", Some("rust"));
        insert(&mut conn, "global", "gamma x", Some("sql"));
        insert(&mut conn, "other", "elsewhere", None);
        crate::memory::links::link(&mut conn, &a, &b, LinkType::Enhances, 0.5).unwrap();

        let stats = namespace_stats(&conn, "global").unwrap();
        assert_eq!(stats.pattern_count, 3);
        assert_eq!(stats.link_count, 1);
        assert_eq!(stats.by_domain.len(), 2);
        assert_eq!(stats.by_domain[0].domain, "rust");
        assert_eq!(stats.by_domain[0].count, 2);
        assert!((stats.mean_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn link_counted_once_when_both_endpoints_share_namespace() {
        let mut conn = test_db();
        let a = insert(&mut conn, "global", "alpha", None);
        let b = insert(&mut conn, "global", "beta four", None);
        let c = insert(&mut conn, "other", "elsewhere", None);
        crate::memory::links::link(&mut conn, &a, &b, LinkType::Requires, 0.5).unwrap();
        crate::memory::links::link(&mut conn, &b, &c, LinkType::Causes, 0.5).unwrap();

        let stats = namespace_stats(&conn, "global").unwrap();
        assert_eq!(stats.link_count, 2);
        let other = namespace_stats(&conn, "other").unwrap();
        assert_eq!(other.link_count, 1);
    }

    #[test]
    fn trajectory_counts_are_store_wide() {
        let mut conn = test_db();
        crate::memory::trajectory::start_trajectory(&mut conn, "t1").unwrap();
        crate::memory::trajectory::start_trajectory(&mut conn, "t2").unwrap();
        crate::memory::trajectory::end_trajectory(
            &mut conn,
            "t2",
            crate::memory::types::TrajectoryOutcome::Failure,
        )
        .unwrap();

        let stats = namespace_stats(&conn, "global").unwrap();
        assert_eq!(stats.trajectory_count, 2);
        assert_eq!(stats.open_trajectories, 1);
    }

    #[test]
    fn recent_lists_active_patterns_first() {
        let mut conn = test_db();
        let older = insert(&mut conn, "global", "stored first", None);
        let newer = insert(&mut conn, "global", "used later", None);
        crate::memory::store::touch_usage(&conn, &[newer.as_str()]).unwrap();

        let stats = namespace_stats(&conn, "global").unwrap();
        assert_eq!(stats.recent.len(), 2);
        assert_eq!(stats.recent[0].id, newer);
        assert_eq!(stats.recent[1].id, older);
    }

    #[test]
    fn lists_namespaces_by_size() {
        let mut conn = test_db();
        insert(&mut conn, "big", "one", None);
        insert(&mut conn, "big", "two x", None);
        insert(&mut conn, "small", "only", None);

        let namespaces = list_namespaces(&conn).unwrap();
        assert_eq!(namespaces[0], ("big".to_string(), 2));
        assert_eq!(namespaces[1], ("small".to_string(), 1));
    }
}
