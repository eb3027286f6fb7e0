//! Online confidence learning from usage outcomes.
//!
//! A bounded multiplicative rule: success multiplies confidence by 1.20,
//! failure by 0.85, clamped to [0.05, 0.95]. Closed-form scalar update, no
//! retraining. A consistently successful pattern reaches the ceiling within
//! 3-4 reinforcements; a failing one hits the floor within a handful of
//! failures.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{MemoryError, Result};
use crate::memory::store::write_audit_log;
use crate::memory::types::{CONFIDENCE_CEILING, CONFIDENCE_FLOOR};

/// Multiplier applied on a reported success.
pub const SUCCESS_FACTOR: f64 = 1.20;
/// Multiplier applied on a reported failure.
pub const FAILURE_FACTOR: f64 = 0.85;

/// Pure update rule: `(current, outcome) -> new`, always within the clamp bounds.
pub fn updated_confidence(current: f64, success: bool) -> f64 {
    if success {
        (current * SUCCESS_FACTOR).min(CONFIDENCE_CEILING)
    } else {
        (current * FAILURE_FACTOR).max(CONFIDENCE_FLOOR)
    }
}

/// Apply one success/failure outcome to a pattern's confidence, atomically.
///
/// Returns the new confidence. Each call counts exactly one outcome; callers
/// report once per use, so there is no double-counting inside the engine.
pub fn report_outcome(conn: &mut Connection, pattern_id: &str, success: bool) -> Result<f64> {
    let tx = conn.transaction()?;

    let current: Option<f64> = tx
        .query_row(
            "SELECT confidence FROM patterns WHERE id = ?1",
            params![pattern_id],
            |row| row.get(0),
        )
        .optional()?;

    let current =
        current.ok_or_else(|| MemoryError::NotFound(format!("pattern: {pattern_id}")))?;
    let updated = updated_confidence(current, success);

    tx.execute(
        "UPDATE patterns SET confidence = ?1 WHERE id = ?2",
        params![updated, pattern_id],
    )?;

    write_audit_log(
        &tx,
        "outcome",
        pattern_id,
        Some(&serde_json::json!({
            "success": success,
            "confidence_before": current,
            "confidence_after": updated,
        })),
    )?;

    tx.commit()?;

    tracing::debug!(
        pattern_id,
        success,
        confidence = updated,
        "outcome recorded"
    );
    Ok(updated)
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

    fn insert_pattern(conn: &mut Connection) -> String {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = 1.0;
        store_pattern(
            conn,
            &NewPattern {
                namespace: "global",
                title: "t",
                content: "c",
                domain: None,
            },
            &v,
            "hashed-v1",
        )
        .unwrap()
    }

    #[test]
    fn success_trajectory_from_half() {
        // 0.50 → 0.60 → 0.72 → 0.864 → 0.95 (capped) → 0.95 (capped)
        let mut c = 0.50;
        let expected = [0.60, 0.72, 0.864, 0.95, 0.95];
        for want in expected {
            c = updated_confidence(c, true);
            assert!((c - want).abs() < 1e-9, "got {c}, want {want}");
        }
    }

    #[test]
    fn failure_trajectory_from_half() {
        // 0.50 → 0.425 → 0.36125
        let mut c = 0.50;
        c = updated_confidence(c, false);
        assert!((c - 0.425).abs() < 1e-9);
        c = updated_confidence(c, false);
        assert!((c - 0.36125).abs() < 1e-9);
    }

    #[test]
    fn confidence_stays_within_bounds() {
        let mut c = 0.50;
        for _ in 0..100 {
            c = updated_confidence(c, false);
            assert!((CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&c));
        }
        assert!((c - CONFIDENCE_FLOOR).abs() < 1e-9);

        for _ in 0..100 {
            c = updated_confidence(c, true);
            assert!((CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&c));
        }
        assert!((c - CONFIDENCE_CEILING).abs() < 1e-9);
    }

    #[test]
    fn mixed_outcome_sequences_stay_bounded() {
        let mut c = 0.50;
        for i in 0..1000 {
            c = updated_confidence(c, i % 3 == 0);
            assert!((CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&c));
        }
    }

    #[test]
    fn report_outcome_persists_update() {
        let mut conn = test_db();
        let id = insert_pattern(&mut conn);

        let after = report_outcome(&mut conn, &id, true).unwrap();
        assert!((after - 0.60).abs() < 1e-9);

        let stored: f64 = conn
            .query_row(
                "SELECT confidence FROM patterns WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert!((stored - 0.60).abs() < 1e-9);
    }

    #[test]
    fn report_outcome_unknown_id_is_not_found() {
        let mut conn = test_db();
        let result = report_outcome(&mut conn, "nonexistent", true);
        assert!(matches!(result, Err(MemoryError::NotFound(_))));
    }

    #[test]
    fn report_outcome_writes_audit_row() {
        let mut conn = test_db();
        let id = insert_pattern(&mut conn);
        report_outcome(&mut conn, &id, false).unwrap();

        let details: String = conn
            .query_row(
                "SELECT details FROM pattern_log WHERE pattern_id = ?1 AND operation = 'outcome'",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&details).unwrap();
        assert_eq!(parsed["success"], false);
    }
}
