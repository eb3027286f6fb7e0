//! SQL DDL for all mnemos tables.
//!
//! Defines the `patterns`, `patterns_vec` (vec0), `embeddings`,
//! `pattern_links`, `trajectories`, `trajectory_steps`, `pattern_log`, and
//! `schema_meta` tables, plus the `recent_patterns` and `namespace_usage`
//! read views. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

use crate::embedding::EMBEDDING_DIM;

/// All schema DDL statements for mnemos core tables.
const SCHEMA_SQL: &str = r#"
-- Core pattern storage
CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL DEFAULT 'global',
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    domain TEXT,
    confidence REAL NOT NULL DEFAULT 0.5 CHECK(confidence >= 0.05 AND confidence <= 0.95),
    usage_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_patterns_namespace ON patterns(namespace);
CREATE INDEX IF NOT EXISTS idx_patterns_domain ON patterns(domain);
CREATE INDEX IF NOT EXISTS idx_patterns_confidence ON patterns(confidence);

-- Embedding provenance. A pattern without a row here has no current
-- embedding and is excluded from search until backfilled.
CREATE TABLE IF NOT EXISTS embeddings (
    pattern_id TEXT PRIMARY KEY REFERENCES patterns(id) ON DELETE CASCADE,
    method TEXT NOT NULL,
    generated_at TEXT NOT NULL
);

-- Typed directed edges between patterns
CREATE TABLE IF NOT EXISTS pattern_links (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL CHECK(link_type IN ('causes','requires','conflicts','enhances','alternative')),
    strength REAL NOT NULL CHECK(strength >= 0.0 AND strength <= 1.0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK(source_id <> target_id),
    UNIQUE(source_id, target_id, link_type)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON pattern_links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON pattern_links(target_id);

-- Task trajectories: append-then-seal step sequences
CREATE TABLE IF NOT EXISTS trajectories (
    task_id TEXT PRIMARY KEY,
    outcome TEXT NOT NULL DEFAULT 'open' CHECK(outcome IN ('open','success','failure')),
    confidence REAL NOT NULL DEFAULT 0.5 CHECK(confidence >= 0.05 AND confidence <= 0.95),
    created_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE TABLE IF NOT EXISTS trajectory_steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL REFERENCES trajectories(task_id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(task_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_steps_task ON trajectory_steps(task_id);

-- Audit log
CREATE TABLE IF NOT EXISTS pattern_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','outcome','link','merge','prune','delete','import')),
    pattern_id TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Read-optimized views for hot paths
CREATE VIEW IF NOT EXISTS recent_patterns AS
    SELECT id, namespace, title, domain, confidence, usage_count,
           COALESCE(last_used_at, created_at) AS active_at
    FROM patterns
    ORDER BY active_at DESC;

CREATE VIEW IF NOT EXISTS namespace_usage AS
    SELECT namespace,
           COUNT(*) AS pattern_count,
           SUM(usage_count) AS total_usage,
           AVG(confidence) AS mean_confidence
    FROM patterns
    GROUP BY namespace;
"#;

/// vec0 virtual table must be created separately (sqlite-vec syntax).
fn vec_table_sql() -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS patterns_vec USING vec0(\n\
         id TEXT PRIMARY KEY,\n\
         embedding FLOAT[{EMBEDDING_DIM}]\n\
         );"
    )
}

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(&vec_table_sql())?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
