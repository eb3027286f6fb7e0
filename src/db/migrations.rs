//! Forward-only schema migrations plus the `schema_meta` key/value store.
//!
//! `schema_meta` carries two markers: `schema_version`, which gates the
//! migration table below, and `embedding_method`, which records the provider
//! the stored vectors were generated with. The engine compares that marker
//! against the configured provider on open and re-embeds the store when they
//! disagree, so vectors from different methods never share a search space.

use rusqlite::{Connection, OptionalExtension};

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Ordered migration table. Entry `n` upgrades version `n` to `n + 1`.
const MIGRATIONS: &[(u32, fn(&Connection) -> rusqlite::Result<()>)] =
    &[(2, record_default_embedding_method)];

fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Schema version of an initialized database. Unparsable or absent values
/// read as 0, which forces the full migration chain.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw = read_meta(conn, "schema_version")?;
    Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// The embedding method the stored vectors were generated with, if recorded.
pub fn get_embedding_method(conn: &Connection) -> rusqlite::Result<Option<String>> {
    read_meta(conn, "embedding_method")
}

/// Record the embedding method after a (re-)embed pass.
pub fn set_embedding_method(conn: &Connection, method: &str) -> rusqlite::Result<()> {
    write_meta(conn, "embedding_method", method)
}

/// Bring the database up to [`CURRENT_SCHEMA_VERSION`], one step at a time.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(
        schema_version = version,
        target = CURRENT_SCHEMA_VERSION,
        "checking migrations"
    );

    for (target, migrate) in MIGRATIONS {
        if version >= *target {
            continue;
        }
        tracing::info!(from = version, to = target, "running migration");
        migrate(conn)?;
        write_meta(conn, "schema_version", &target.to_string())?;
        version = *target;
    }

    Ok(())
}

/// v1 -> v2: databases created before the method marker existed hold
/// hashed-v1 vectors, so seed the marker accordingly.
fn record_default_embedding_method(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_method', 'hashed-v1')",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn get_schema_version_returns_1_on_fresh_db() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_to_v2_records_embedding_method() {
        let conn = test_db();
        assert!(get_embedding_method(&conn).unwrap().is_none());

        run_migrations(&conn).unwrap();

        let method = get_embedding_method(&conn).unwrap();
        assert_eq!(method, Some("hashed-v1".to_string()));
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn set_and_get_embedding_method() {
        let conn = test_db();
        run_migrations(&conn).unwrap();

        set_embedding_method(&conn, "remote-v2").unwrap();
        assert_eq!(
            get_embedding_method(&conn).unwrap(),
            Some("remote-v2".to_string())
        );
    }
}
