//! Maximal-marginal-relevance ranking.
//!
//! Combines similarity, confidence, recency, and diversity into one score
//! and greedily selects a top-k set free of near-duplicates:
//!
//! `score = 0.4·similarity + 0.3·confidence + 0.2·recency + 0.1·diversity`
//!
//! Each round picks the best-scoring remaining candidate, then the diversity
//! term of the rest drops toward zero as their similarity to the selected
//! set grows. Candidates over the near-duplicate threshold against any
//! selected result are dropped outright, so the returned set never contains
//! a near-duplicate pair even when the pool is full of clones. Deterministic
//! given identical inputs: ties break by confidence, then `last_used_at`,
//! then lexicographic id.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::memory::search::Candidate;

pub const WEIGHT_SIMILARITY: f64 = 0.4;
pub const WEIGHT_CONFIDENCE: f64 = 0.3;
pub const WEIGHT_RECENCY: f64 = 0.2;
pub const WEIGHT_DIVERSITY: f64 = 0.1;

/// Ranking knobs, resolved from config by the engine.
#[derive(Debug, Clone, Copy)]
pub struct RankParams {
    /// Pairwise cosine similarity above which two results are near-duplicates.
    pub near_duplicate_threshold: f64,
    /// Half-life of the recency score, in days.
    pub recency_half_life_days: f64,
}

/// A candidate selected by the ranker, with its score at selection time.
#[derive(Debug, Clone)]
pub struct Ranked {
    pub candidate: Candidate,
    pub score: f64,
}

/// Greedy MMR selection of up to `k` candidates.
///
/// `now` is caller-supplied so that identical inputs rank identically.
pub fn rank(
    candidates: Vec<Candidate>,
    k: usize,
    now: DateTime<Utc>,
    params: &RankParams,
) -> Vec<Ranked> {
    let mut remaining: Vec<Scored> = candidates
        .into_iter()
        .map(|c| {
            let recency = recency_score(&c, now, params.recency_half_life_days);
            Scored {
                base: WEIGHT_SIMILARITY * c.similarity
                    + WEIGHT_CONFIDENCE * c.pattern.confidence
                    + WEIGHT_RECENCY * recency,
                max_sim_to_selected: 0.0,
                candidate: c,
            }
        })
        .collect();

    let mut selected: Vec<Ranked> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        // Diversity is 1.0 before anything is selected, then shrinks with
        // the candidate's closest selected neighbor.
        let best_idx = remaining
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| compare(a, b))
            .map(|(i, _)| i)
            .expect("remaining is non-empty");

        let picked = remaining.swap_remove(best_idx);
        let score = picked.score();

        // Drop near-duplicates of the pick, then fold the pick's similarity
        // into the remaining candidates' diversity terms.
        remaining.retain_mut(|other| {
            let sim = super::cosine_similarity(&other.candidate.vector, &picked.candidate.vector);
            if sim > params.near_duplicate_threshold {
                return false;
            }
            if sim > other.max_sim_to_selected {
                other.max_sim_to_selected = sim;
            }
            true
        });

        selected.push(Ranked {
            candidate: picked.candidate,
            score,
        });
    }

    selected
}

struct Scored {
    candidate: Candidate,
    /// Similarity + confidence + recency portion; independent of selection.
    base: f64,
    max_sim_to_selected: f64,
}

impl Scored {
    fn diversity(&self) -> f64 {
        (1.0 - self.max_sim_to_selected).clamp(0.0, 1.0)
    }

    fn score(&self) -> f64 {
        self.base + WEIGHT_DIVERSITY * self.diversity()
    }
}

/// Full deterministic ordering: score, then confidence, then most recent
/// `last_used_at`, then lexicographically smallest id.
fn compare(a: &Scored, b: &Scored) -> Ordering {
    a.score()
        .total_cmp(&b.score())
        .then(a.candidate.pattern.confidence.total_cmp(&b.candidate.pattern.confidence))
        .then(a.candidate.pattern.last_used_at.cmp(&b.candidate.pattern.last_used_at))
        .then(b.candidate.pattern.id.cmp(&a.candidate.pattern.id))
}

/// Half-life decay of time since last use (falling back to creation time),
/// bounded to [0, 1]. Unparseable timestamps score zero.
fn recency_score(candidate: &Candidate, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let stamp = candidate
        .pattern
        .last_used_at
        .as_deref()
        .unwrap_or(&candidate.pattern.created_at);

    let Ok(parsed) = DateTime::parse_from_rfc3339(stamp) else {
        return 0.0;
    };

    let age_secs = (now - parsed.with_timezone(&Utc)).num_seconds();
    if age_secs <= 0 {
        return 1.0;
    }

    let age_days = age_secs as f64 / 86_400.0;
    0.5f64.powf(age_days / half_life_days).clamp(0.0, 1.0)
}
