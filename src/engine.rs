//! High-level engine facade.
//!
//! [`MemoryEngine`] owns the SQLite connection and the embedder, and exposes
//! the full operation surface behind `&self`. The connection sits behind a
//! mutex, so one engine can be shared across threads; writes that lose the
//! SQLite lock are retried a bounded number of times before surfacing
//! [`MemoryError::Conflict`].

use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::Mutex;

use crate::config::MnemosConfig;
use crate::db;
use crate::embedding::FallbackEmbedder;
use crate::error::{MemoryError, Result};
use crate::memory::consolidate::{self, ConsolidateResult};
use crate::memory::rank::{self, RankParams, Ranked};
use crate::memory::snapshot::{self, ImportResult, Snapshot};
use crate::memory::stats::{self, NamespaceStats};
use crate::memory::types::{LinkType, Pattern, PatternLink, TaskTrajectory, TrajectoryOutcome};
use crate::memory::{confidence, links, search, store, trajectory};

const WRITE_RETRIES: u32 = 3;

/// One query result: the pattern plus the similarity and final rank score
/// it was selected with.
#[derive(Debug, serde::Serialize)]
pub struct QueryHit {
    pub pattern: Pattern,
    pub similarity: f64,
    pub score: f64,
}

pub struct MemoryEngine {
    conn: Mutex<Connection>,
    embedder: FallbackEmbedder,
    config: MnemosConfig,
}

impl MemoryEngine {
    /// Open (creating if needed) the store at the configured path.
    pub fn open(config: MnemosConfig) -> Result<Self> {
        let path = config.resolved_db_path();
        let conn = db::open_database(&path, config.storage.busy_timeout_ms)?;
        let embedder = FallbackEmbedder::from_config(&config.embedding)?;
        tracing::info!(path = %path.display(), provider = embedder.preferred_method(), "engine open");
        let engine = Self {
            conn: Mutex::new(conn),
            embedder,
            config,
        };
        engine.sync_embedding_method()?;
        Ok(engine)
    }

    /// In-memory engine with the hashed embedder. Used by tests and `--db :memory:`.
    pub fn open_in_memory(config: MnemosConfig) -> Result<Self> {
        let conn = db::open_memory_database()?;
        let embedder = FallbackEmbedder::from_config(&config.embedding)?;
        let engine = Self {
            conn: Mutex::new(conn),
            embedder,
            config,
        };
        engine.sync_embedding_method()?;
        Ok(engine)
    }

    /// Vectors are only comparable within one embedding method. When the
    /// configured provider differs from the method recorded in the store,
    /// every vector is regenerated in one transaction and the marker is
    /// updated, so a provider switch never mixes vector spaces silently.
    /// Returns the number of patterns re-embedded.
    fn sync_embedding_method(&self) -> Result<usize> {
        let mut conn = self.lock()?;
        let stored = db::migrations::get_embedding_method(&conn)?;
        let active = self.embedder.preferred_method();
        if stored.as_deref() == Some(active) {
            return Ok(0);
        }
        tracing::warn!(
            stored = stored.as_deref().unwrap_or("none"),
            active,
            "embedding method changed, re-embedding store"
        );

        let tx = conn.transaction()?;
        let rows: Vec<(String, String)> = {
            let mut stmt = tx.prepare("SELECT id, content FROM patterns ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        let now = Utc::now().to_rfc3339();
        for (id, content) in &rows {
            let embedded = self.embedder.embed(content);
            tx.execute("DELETE FROM patterns_vec WHERE id = ?1", params![id])?;
            tx.execute(
                "INSERT INTO patterns_vec (id, embedding) VALUES (?1, ?2)",
                params![id, crate::memory::embedding_to_bytes(&embedded.vector)],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO embeddings (pattern_id, method, generated_at) \
                 VALUES (?1, ?2, ?3)",
                params![id, embedded.method, now],
            )?;
        }
        db::migrations::set_embedding_method(&tx, active)?;
        tx.commit()?;

        Ok(rows.len())
    }

    fn namespace<'a>(&'a self, namespace: Option<&'a str>) -> &'a str {
        namespace.unwrap_or(&self.config.storage.default_namespace)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MemoryError::Conflict("connection mutex poisoned".into()))
    }

    /// Run a write, retrying on transient lock contention.
    fn with_write<T>(&self, mut op: impl FnMut(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let mut attempt = 0;
        loop {
            match op(&mut conn) {
                Err(e) if e.is_contention() && attempt < WRITE_RETRIES => {
                    attempt += 1;
                    tracing::debug!(attempt, "write contention, retrying");
                    std::thread::sleep(std::time::Duration::from_millis(20 * attempt as u64));
                }
                Err(e) if e.is_contention() => {
                    return Err(MemoryError::Conflict(format!(
                        "write lost the database lock after {WRITE_RETRIES} retries: {e}"
                    )));
                }
                other => return other,
            }
        }
    }

    /// Embed and persist a new pattern. Returns the stored pattern.
    pub fn store(
        &self,
        namespace: Option<&str>,
        title: &str,
        content: &str,
        domain: Option<&str>,
    ) -> Result<Pattern> {
        let embedded = self.embedder.embed(content);
        let new = store::NewPattern {
            namespace: self.namespace(namespace),
            title,
            content,
            domain,
        };
        self.with_write(|conn| {
            let id = store::store_pattern(conn, &new, &embedded.vector, &embedded.method)?;
            store::get_pattern(conn, &id)
        })
    }

    /// Semantic query: embed, retrieve candidates, MMR-rank, record usage.
    /// `k` and `min_confidence` default to their configured values.
    pub fn query(
        &self,
        text: &str,
        namespace: Option<&str>,
        k: Option<usize>,
        min_confidence: Option<f64>,
    ) -> Result<Vec<QueryHit>> {
        let k = k.unwrap_or(self.config.retrieval.default_k);
        if k == 0 {
            return Ok(Vec::new());
        }
        let embedded = self.embedder.embed(text);
        let namespace = self.namespace(namespace);
        let retrieval = &self.config.retrieval;
        let min_confidence = min_confidence.unwrap_or(retrieval.min_confidence);

        let ranked: Vec<Ranked> = self.with_write(|conn| {
            let candidates = search::search_candidates(
                conn,
                &embedded.vector,
                namespace,
                retrieval.candidate_pool,
                min_confidence,
            )?;
            let ranked = rank::rank(
                candidates,
                k,
                Utc::now(),
                &RankParams {
                    near_duplicate_threshold: retrieval.near_duplicate_threshold,
                    recency_half_life_days: retrieval.recency_half_life_days,
                },
            );
            let ids: Vec<&str> = ranked.iter().map(|r| r.candidate.pattern.id.as_str()).collect();
            store::touch_usage(conn, &ids)?;
            Ok(ranked)
        })?;

        Ok(ranked
            .into_iter()
            .map(|r| QueryHit {
                similarity: r.candidate.similarity,
                score: r.score,
                pattern: r.candidate.pattern,
            })
            .collect())
    }

    pub fn get(&self, id: &str) -> Result<Pattern> {
        let conn = self.lock()?;
        store::get_pattern(&conn, id)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.with_write(|conn| store::delete_pattern(conn, id))
    }

    pub fn list(&self, namespace: Option<&str>) -> Result<Vec<Pattern>> {
        let conn = self.lock()?;
        store::list_namespace(&conn, self.namespace(namespace))
    }

    /// Apply a success or failure outcome; returns the new confidence.
    pub fn report_outcome(&self, pattern_id: &str, success: bool) -> Result<f64> {
        self.with_write(|conn| confidence::report_outcome(conn, pattern_id, success))
    }

    pub fn link(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: LinkType,
        strength: f64,
    ) -> Result<links::LinkResult> {
        self.with_write(|conn| links::link(conn, source_id, target_id, link_type, strength))
    }

    pub fn links_of(&self, pattern_id: &str) -> Result<Vec<PatternLink>> {
        let conn = self.lock()?;
        links::links_of(&conn, pattern_id)
    }

    pub fn neighbors(&self, pattern_id: &str) -> Result<Vec<(PatternLink, Pattern)>> {
        let conn = self.lock()?;
        links::neighbors(&conn, pattern_id)
    }

    pub fn trajectory_start(&self, task_id: &str) -> Result<()> {
        self.with_write(|conn| trajectory::start_trajectory(conn, task_id))
    }

    /// Append a step; returns its sequence number.
    pub fn trajectory_step(&self, task_id: &str, content: &str) -> Result<u32> {
        self.with_write(|conn| trajectory::append_step(conn, task_id, content))
    }

    /// Seal a trajectory; returns its final confidence.
    pub fn trajectory_end(&self, task_id: &str, outcome: TrajectoryOutcome) -> Result<f64> {
        self.with_write(|conn| trajectory::end_trajectory(conn, task_id, outcome))
    }

    pub fn trajectory_get(&self, task_id: &str) -> Result<TaskTrajectory> {
        let conn = self.lock()?;
        trajectory::get_trajectory(&conn, task_id)
    }

    /// Export the whole store, or one namespace when given.
    pub fn export(&self, namespace: Option<&str>) -> Result<Snapshot> {
        let conn = self.lock()?;
        snapshot::export_snapshot(&conn, namespace)
    }

    pub fn import(&self, snapshot: &Snapshot) -> Result<ImportResult> {
        self.with_write(|conn| snapshot::import_snapshot(conn, snapshot))
    }

    /// Consolidate a namespace. `confidence_floor` overrides the configured
    /// prune threshold for this pass only.
    pub fn consolidate(
        &self,
        namespace: Option<&str>,
        confidence_floor: Option<f64>,
    ) -> Result<ConsolidateResult> {
        let namespace = self.namespace(namespace);
        let mut consolidation = self.config.consolidation.clone();
        if let Some(floor) = confidence_floor {
            consolidation.confidence_floor = floor;
        }
        self.with_write(|conn| consolidate::consolidate(conn, namespace, &consolidation))
    }

    pub fn stats(&self, namespace: Option<&str>) -> Result<NamespaceStats> {
        let conn = self.lock()?;
        stats::namespace_stats(&conn, self.namespace(namespace))
    }

    pub fn namespaces(&self) -> Result<Vec<(String, u32)>> {
        let conn = self.lock()?;
        stats::list_namespaces(&conn)
    }

    pub fn config(&self) -> &MnemosConfig {
        &self.config
    }
}
