//! Workout session and set models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by client-generated session ids before their first
/// successful sync. The remote store never sees it.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Strip the ephemeral-creation prefix from a session identifier.
///
/// Idempotent: an already-canonical id is returned unchanged, and
/// normalizing twice equals normalizing once. All merge matching and
/// outbox de-duplication operate on the canonical form; display and
/// storage may keep the original.
#[must_use]
pub fn normalize_session_id(id: &str) -> &str {
    id.strip_prefix(LOCAL_ID_PREFIX).unwrap_or(id)
}

/// Kind of a logged set. Warm-up sets never count toward personal records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    #[default]
    Working,
    Warmup,
}

/// A single logged set within a workout session.
///
/// Sets are immutable once synced from the engine's point of view;
/// corrections are new writes, never in-place mutation of flushed rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLog {
    /// Unique identifier
    pub id: String,
    /// Owning session id (may carry the local prefix)
    pub session_id: String,
    /// Exercise reference
    pub exercise_id: String,
    /// Cached human-readable exercise name (display metadata, may be absent)
    pub exercise_name: Option<String>,
    /// Position within the session
    pub ordinal: u32,
    /// Working or warm-up set
    #[serde(default)]
    pub kind: SetKind,
    /// Prescribed weight from the program, if any
    pub prescribed_weight: Option<f64>,
    /// Prescribed reps from the program, if any
    pub prescribed_reps: Option<u32>,
    /// Actual weight lifted
    pub weight: Option<f64>,
    /// Actual reps performed
    pub reps: Option<u32>,
    /// Intensity rating (RPE)
    pub rpe: Option<f64>,
    /// Whether the set was actually performed (not skipped)
    pub completed: bool,
    /// When the set was performed (Unix ms), used as record provenance
    pub performed_at: i64,
}

impl SetLog {
    /// Create a new, not-yet-completed set for a session.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        exercise_id: impl Into<String>,
        ordinal: u32,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            exercise_id: exercise_id.into(),
            exercise_name: None,
            ordinal,
            kind: SetKind::Working,
            prescribed_weight: None,
            prescribed_reps: None,
            weight: None,
            reps: None,
            rpe: None,
            completed: false,
            performed_at: crate::util::unix_timestamp_ms(),
        }
    }

    /// Volume moved by this set (weight x reps), `None` unless both present.
    #[must_use]
    pub fn volume(&self) -> Option<f64> {
        let weight = self.weight?;
        let reps = self.reps?;
        if weight > 0.0 && reps > 0 {
            Some(weight * f64::from(reps))
        } else {
            None
        }
    }
}

/// A workout session: temporal fields, its sets, and derived summary fields.
///
/// The set list is the source of truth for the summary fields; callers must
/// go through [`WorkoutSession::recompute_totals`] after editing sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSession {
    /// Unique identifier (may carry [`LOCAL_ID_PREFIX`] until synced)
    pub id: String,
    /// Calendar date of the workout
    pub date: chrono::NaiveDate,
    /// Session start (Unix ms)
    pub started_at: i64,
    /// Session end (Unix ms), `None` while in progress
    pub ended_at: Option<i64>,
    /// Logged sets, ordered by ordinal
    pub sets: Vec<SetLog>,
    /// Derived: total volume across completed sets
    pub total_volume: f64,
    /// Derived: mean RPE across completed sets
    pub avg_intensity: Option<f64>,
    /// Whether the remote store has acknowledged this session
    #[serde(default)]
    pub synced: bool,
    /// Soft-delete tombstone (Unix ms), supports undo/restore
    pub deleted_at: Option<i64>,
}

impl WorkoutSession {
    /// Create a new local-only session starting now.
    #[must_use]
    pub fn new() -> Self {
        let now = crate::util::unix_timestamp_ms();
        Self {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7()),
            date: chrono::Utc::now().date_naive(),
            started_at: now,
            ended_at: None,
            sets: Vec::new(),
            total_volume: 0.0,
            avg_intensity: None,
            synced: false,
            deleted_at: None,
        }
    }

    /// Append a set and refresh the derived summary fields.
    pub fn push_set(&mut self, set: SetLog) {
        self.sets.push(set);
        self.recompute_totals();
    }

    /// Recompute `total_volume` and `avg_intensity` from the set list.
    pub fn recompute_totals(&mut self) {
        let completed: Vec<&SetLog> = self.sets.iter().filter(|set| set.completed).collect();
        self.total_volume = completed.iter().filter_map(|set| set.volume()).sum();

        let ratings: Vec<f64> = completed.iter().filter_map(|set| set.rpe).collect();
        self.avg_intensity = if ratings.is_empty() {
            None
        } else {
            #[allow(clippy::cast_precision_loss)]
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };
    }

    /// Most-recent-activity timestamp used for merge ordering.
    #[must_use]
    pub fn recency(&self) -> i64 {
        self.ended_at
            .or_else(|| self.sets.iter().map(|set| set.performed_at).max())
            .unwrap_or(self.started_at)
    }

    /// Canonical identifier for comparisons and merge matching.
    #[must_use]
    pub fn canonical_id(&self) -> &str {
        normalize_session_id(&self.id)
    }

    /// Whether this session only exists on this device so far.
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        !self.synced
    }

    /// Whether this session carries a soft-delete tombstone.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Default for WorkoutSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn completed_set(session_id: &str, weight: f64, reps: u32, rpe: Option<f64>) -> SetLog {
        let mut set = SetLog::new(session_id, "squat", 0);
        set.weight = Some(weight);
        set.reps = Some(reps);
        set.rpe = rpe;
        set.completed = true;
        set
    }

    #[test]
    fn normalize_is_idempotent() {
        assert_eq!(normalize_session_id("local_abc"), "abc");
        assert_eq!(normalize_session_id("abc"), "abc");
        assert_eq!(
            normalize_session_id(normalize_session_id("local_abc")),
            normalize_session_id("local_abc")
        );
    }

    #[test]
    fn new_session_carries_local_prefix() {
        let session = WorkoutSession::new();
        assert!(session.id.starts_with(LOCAL_ID_PREFIX));
        assert!(!session.canonical_id().starts_with(LOCAL_ID_PREFIX));
        assert!(session.is_local_only());
        assert!(!session.is_deleted());
    }

    #[test]
    fn totals_follow_the_set_list() {
        let mut session = WorkoutSession::new();
        let id = session.id.clone();
        session.push_set(completed_set(&id, 100.0, 5, Some(8.0)));
        session.push_set(completed_set(&id, 100.0, 5, Some(9.0)));

        let mut skipped = SetLog::new(&id, "squat", 2);
        skipped.weight = Some(200.0);
        skipped.reps = Some(5);
        session.push_set(skipped);

        assert!((session.total_volume - 1000.0).abs() < f64::EPSILON);
        assert_eq!(session.avg_intensity, Some(8.5));
    }

    #[test]
    fn recency_prefers_end_then_last_set() {
        let mut session = WorkoutSession::new();
        session.started_at = 100;
        assert_eq!(session.recency(), 100);

        let mut set = completed_set(&session.id.clone(), 100.0, 5, None);
        set.performed_at = 250;
        session.push_set(set);
        assert_eq!(session.recency(), 250);

        session.ended_at = Some(300);
        assert_eq!(session.recency(), 300);
    }

    #[test]
    fn set_volume_requires_positive_inputs() {
        let mut set = SetLog::new("s", "bench", 0);
        assert_eq!(set.volume(), None);
        set.weight = Some(225.0);
        set.reps = Some(5);
        assert_eq!(set.volume(), Some(1125.0));
        set.reps = Some(0);
        assert_eq!(set.volume(), None);
    }
}
