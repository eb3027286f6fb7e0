//! Task trajectory tracking.
//!
//! A narrow state machine: `open → open (append*) → {success | failure}`.
//! Steps are append-only while open, preserve insertion order, and the
//! record becomes immutable once sealed. Sealing applies the same
//! confidence rule patterns use.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{MemoryError, Result};
use crate::memory::confidence::updated_confidence;
use crate::memory::types::{TaskTrajectory, TrajectoryOutcome, TrajectoryStep};

/// Create a new open trajectory for a task attempt.
pub fn start_trajectory(conn: &mut Connection, task_id: &str) -> Result<()> {
    if task_id.trim().is_empty() {
        return Err(MemoryError::Validation("task_id must not be empty".into()));
    }

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM trajectories WHERE task_id = ?1",
        params![task_id],
        |row| row.get(0),
    )?;
    if exists {
        return Err(MemoryError::Validation(format!(
            "trajectory already exists: {task_id}"
        )));
    }

    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO trajectories (task_id, outcome, created_at) VALUES (?1, 'open', ?2)",
        params![task_id, now],
    )?;

    tracing::debug!(task_id, "trajectory started");
    Ok(())
}

/// Append a step to an open trajectory.
///
/// `Validation` if the trajectory is sealed — the record is left untouched.
pub fn append_step(conn: &mut Connection, task_id: &str, content: &str) -> Result<u32> {
    let tx = conn.transaction()?;

    let outcome = fetch_outcome(&tx, task_id)?;
    if outcome.is_terminal() {
        return Err(MemoryError::Validation(format!(
            "trajectory {task_id} is sealed ({outcome}), cannot append"
        )));
    }

    let seq: u32 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM trajectory_steps WHERE task_id = ?1",
        params![task_id],
        |row| row.get(0),
    )?;

    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO trajectory_steps (task_id, seq, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![task_id, seq, content, now],
    )?;

    tx.commit()?;
    Ok(seq)
}

/// Seal a trajectory with its terminal outcome.
///
/// Applies the trajectory-level confidence update and stamps `ended_at`.
/// `Validation` if the trajectory is already sealed or the outcome is `Open`.
pub fn end_trajectory(
    conn: &mut Connection,
    task_id: &str,
    outcome: TrajectoryOutcome,
) -> Result<f64> {
    if !outcome.is_terminal() {
        return Err(MemoryError::Validation(
            "end_trajectory requires success or failure".into(),
        ));
    }

    let tx = conn.transaction()?;

    let current = fetch_outcome(&tx, task_id)?;
    if current.is_terminal() {
        return Err(MemoryError::Validation(format!(
            "trajectory {task_id} is already sealed ({current})"
        )));
    }

    let confidence: f64 = tx.query_row(
        "SELECT confidence FROM trajectories WHERE task_id = ?1",
        params![task_id],
        |row| row.get(0),
    )?;
    let updated = updated_confidence(confidence, outcome == TrajectoryOutcome::Success);

    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "UPDATE trajectories SET outcome = ?1, confidence = ?2, ended_at = ?3 WHERE task_id = ?4",
        params![outcome.as_str(), updated, now, task_id],
    )?;

    tx.commit()?;

    tracing::debug!(task_id, outcome = %outcome, confidence = updated, "trajectory sealed");
    Ok(updated)
}

/// Fetch a trajectory with its ordered steps.
pub fn get_trajectory(conn: &Connection, task_id: &str) -> Result<TaskTrajectory> {
    let header: Option<(String, f64, String, Option<String>)> = conn
        .query_row(
            "SELECT outcome, confidence, created_at, ended_at FROM trajectories WHERE task_id = ?1",
            params![task_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let (outcome_str, confidence, created_at, ended_at) =
        header.ok_or_else(|| MemoryError::NotFound(format!("trajectory: {task_id}")))?;

    let mut stmt = conn.prepare(
        "SELECT seq, content, created_at FROM trajectory_steps WHERE task_id = ?1 ORDER BY seq",
    )?;
    let steps = stmt
        .query_map(params![task_id], |row| {
            Ok(TrajectoryStep {
                seq: row.get(0)?,
                content: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(TaskTrajectory {
        task_id: task_id.to_string(),
        outcome: outcome_str
            .parse()
            .map_err(|e: String| MemoryError::Validation(e))?,
        confidence,
        steps,
        created_at,
        ended_at,
    })
}

fn fetch_outcome(conn: &Connection, task_id: &str) -> Result<TrajectoryOutcome> {
    let outcome: Option<String> = conn
        .query_row(
            "SELECT outcome FROM trajectories WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )
        .optional()?;

    outcome
        .ok_or_else(|| MemoryError::NotFound(format!("trajectory: {task_id}")))?
        .parse()
        .map_err(|e: String| MemoryError::Validation(e))
}
