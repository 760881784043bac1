//! Deterministic merge of a local and a remote collection.
//!
//! The merge is asymmetric and rule-based rather than last-write-wins:
//! the remote store is the single authority for "this write happened",
//! local storage is the authority for "this write hasn't happened yet".
//! Remote entries win by default; a local entry wins only when the remote
//! has no entry for its key, or when the remote entry came back with an
//! empty child collection while the local one has children (partial remote
//! state is less trustworthy than complete local state). Note this can
//! mask a genuinely empty remote session as "incomplete" — a known
//! ambiguity of the heuristic.

use std::collections::HashMap;

use crate::models::WorkoutSession;

/// Entity type that can be merged across the local/remote boundary.
pub trait Mergeable: Clone {
    /// Normalized identifier used for matching entries across replicas.
    fn merge_key(&self) -> String;

    /// Most-recent-activity timestamp, for output ordering.
    fn recency(&self) -> i64;

    /// Whether the entry carries a non-empty child collection.
    fn has_children(&self) -> bool;

    /// Reconcile child-level display metadata from the local copy into a
    /// remote-won entry. Must be idempotent.
    fn adopt_local_metadata(&mut self, local: &Self);
}

/// Merge `local` and `remote` into one unified, deduplicated collection.
///
/// Output is ordered by recency descending; ties keep the original
/// collection order (remote entries first, then local-only ones).
/// Idempotent: merging the result against the same remote collection
/// again yields the same result.
pub fn merge<T: Mergeable>(local: &[T], remote: &[T]) -> Vec<T> {
    let mut result: Vec<T> = Vec::with_capacity(remote.len() + local.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for entry in remote {
        by_key.insert(entry.merge_key(), result.len());
        result.push(entry.clone());
    }

    for entry in local {
        let key = entry.merge_key();
        match by_key.get(&key) {
            None => {
                // Pending, not-yet-synced local-only record.
                by_key.insert(key, result.len());
                result.push(entry.clone());
            }
            Some(&position) => {
                if !result[position].has_children() && entry.has_children() {
                    // Partial remote record: local wins entirely, not
                    // merely for the empty field.
                    result[position] = entry.clone();
                } else {
                    result[position].adopt_local_metadata(entry);
                }
            }
        }
    }

    result.sort_by(|a, b| b.recency().cmp(&a.recency()));
    result
}

impl Mergeable for WorkoutSession {
    fn merge_key(&self) -> String {
        self.canonical_id().to_string()
    }

    fn recency(&self) -> i64 {
        Self::recency(self)
    }

    fn has_children(&self) -> bool {
        !self.sets.is_empty()
    }

    fn adopt_local_metadata(&mut self, local: &Self) {
        for set in &mut self.sets {
            if set.exercise_name.is_some() {
                continue;
            }
            let cached = local
                .sets
                .iter()
                .find(|candidate| candidate.id == set.id)
                .or_else(|| {
                    local.sets.iter().find(|candidate| {
                        candidate.exercise_id == set.exercise_id
                            && candidate.ordinal == set.ordinal
                    })
                })
                .and_then(|candidate| candidate.exercise_name.clone());
            if cached.is_some() {
                set.exercise_name = cached;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{normalize_session_id, SetLog};
    use pretty_assertions::assert_eq;

    fn session(id: &str, set_count: usize, recency: i64) -> WorkoutSession {
        let mut session = WorkoutSession::new();
        session.id = id.to_string();
        session.started_at = recency;
        for ordinal in 0..set_count {
            #[allow(clippy::cast_possible_truncation)]
            let mut set = SetLog::new(id, "squat", ordinal as u32);
            set.weight = Some(100.0);
            set.reps = Some(5);
            set.completed = true;
            set.performed_at = recency;
            session.sets.push(set);
        }
        session.recompute_totals();
        session
    }

    fn remote_session(id: &str, set_count: usize, recency: i64) -> WorkoutSession {
        let mut session = session(id, set_count, recency);
        session.synced = true;
        session
    }

    #[test]
    fn local_only_session_passes_through() {
        let local = vec![session("local_s1", 3, 100)];
        let merged = merge(&local, &[]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].sets.len(), 3);
        assert!(merged[0].is_local_only());
    }

    #[test]
    fn remote_wins_over_stale_local_placeholder() {
        // Remote has the full session; local still holds a prefixed,
        // set-less placeholder for the same normalized id.
        let remote = vec![remote_session("abc", 3, 200)];
        let local = vec![session("local_abc", 0, 100)];

        let merged = merge(&local, &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "abc");
        assert_eq!(merged[0].sets.len(), 3);
        assert!(merged[0].synced);
    }

    #[test]
    fn complete_local_beats_empty_remote() {
        let remote = vec![remote_session("abc", 0, 200)];
        let local = vec![session("local_abc", 3, 100)];

        let merged = merge(&local, &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], local[0]);
    }

    #[test]
    fn merge_is_idempotent() {
        let remote = vec![remote_session("abc", 3, 300), remote_session("def", 0, 200)];
        let local = vec![session("local_def", 2, 150), session("local_ghi", 1, 100)];

        let once = merge(&local, &remote);
        let twice = merge(&once, &remote);
        assert_eq!(once, twice);
    }

    #[test]
    fn output_is_recency_descending_with_stable_ties() {
        let remote = vec![remote_session("a", 1, 100), remote_session("b", 1, 100)];
        let local = vec![session("local_c", 1, 500)];

        let merged = merge(&local, &remote);
        let ids: Vec<&str> = merged.iter().map(|s| s.canonical_id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn remote_winner_adopts_cached_exercise_name() {
        let mut remote = remote_session("abc", 1, 200);
        remote.sets[0].exercise_name = None;

        let mut local = session("local_abc", 1, 100);
        local.sets[0].exercise_id = remote.sets[0].exercise_id.clone();
        local.sets[0].ordinal = remote.sets[0].ordinal;
        local.sets[0].exercise_name = Some("Back Squat".to_string());

        let merged = merge(&[local], &[remote]);
        assert_eq!(
            merged[0].sets[0].exercise_name.as_deref(),
            Some("Back Squat")
        );
        assert!(merged[0].synced);
    }

    #[test]
    fn merge_keys_use_normalized_ids() {
        assert_eq!(normalize_session_id("local_abc"), "abc");
        assert_eq!(session("local_abc", 0, 0).merge_key(), "abc");
    }
}
