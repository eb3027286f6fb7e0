//! Core type definitions.
//!
//! Defines [`Pattern`] (a stored knowledge fragment), [`LinkType`] and
//! [`PatternLink`] (typed graph edges), and [`TrajectoryOutcome`] /
//! [`TaskTrajectory`] (append-then-seal step records).

use serde::{Deserialize, Serialize};

/// Lowest confidence any pattern or trajectory can reach.
pub const CONFIDENCE_FLOOR: f64 = 0.05;
/// Highest confidence any pattern or trajectory can reach.
pub const CONFIDENCE_CEILING: f64 = 0.95;
/// Confidence assigned to newly stored patterns and trajectories.
pub const CONFIDENCE_INITIAL: f64 = 0.5;

/// A stored knowledge fragment, matching the `patterns` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Logical partition this pattern belongs to. Exactly one per pattern.
    pub namespace: String,
    pub title: String,
    /// The full text content of the pattern.
    pub content: String,
    /// Optional classification tag (e.g. `"perf"`, `"deploy"`).
    pub domain: Option<String>,
    /// Reliability estimate in `[0.05, 0.95]`, learned from outcomes.
    pub confidence: f64,
    /// Number of times this pattern has been returned in query results.
    pub usage_count: u32,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 timestamp of the last use, or `None` if never used.
    pub last_used_at: Option<String>,
}

/// The five relationship kinds between patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Applying the source tends to produce the target's situation.
    Causes,
    /// The source only works when the target is in place.
    Requires,
    /// The source and target should not be applied together.
    Conflicts,
    /// The source works better when combined with the target.
    Enhances,
    /// The source and target solve the same problem differently.
    Alternative,
}

impl LinkType {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causes => "causes",
            Self::Requires => "requires",
            Self::Conflicts => "conflicts",
            Self::Enhances => "enhances",
            Self::Alternative => "alternative",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "causes" => Ok(Self::Causes),
            "requires" => Ok(Self::Requires),
            "conflicts" => Ok(Self::Conflicts),
            "enhances" => Ok(Self::Enhances),
            "alternative" => Ok(Self::Alternative),
            _ => Err(format!("unknown link type: {s}")),
        }
    }
}

/// A typed directed edge between two patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternLink {
    /// UUID v7 primary key.
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub link_type: LinkType,
    /// Edge weight in `[0, 1]`. Duplicate edges merge to the latest strength.
    pub strength: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Terminal state of a task trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryOutcome {
    Open,
    Success,
    Failure,
}

impl TrajectoryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// `true` once the trajectory has been sealed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for TrajectoryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrajectoryOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(format!("unknown trajectory outcome: {s}")),
        }
    }
}

/// One step within a trajectory. `seq` preserves insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub seq: u32,
    pub content: String,
    pub created_at: String,
}

/// An ordered sequence of steps belonging to one task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTrajectory {
    pub task_id: String,
    pub outcome: TrajectoryOutcome,
    /// Trajectory-level reliability, same update rule as patterns.
    pub confidence: f64,
    pub steps: Vec<TrajectoryStep>,
    pub created_at: String,
    pub ended_at: Option<String>,
}
