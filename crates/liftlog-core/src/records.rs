//! Personal-record tracking over merged set data.
//!
//! For every (account, exercise, metric) key exactly one record is
//! current; superseded records are kept with `is_current = false`
//! (append-only history). Improvement uses strict `>` so re-running the
//! same batch is idempotent and ties keep the earlier record.

use std::collections::HashMap;

use crate::error::Result;
use crate::models::{
    estimated_one_rep_max, PersonalRecord, RecordMetric, SetKind, SetLog,
};
use crate::store::{keys, KeyValueStore, NamespaceHandle, NamespaceStore};

/// A newly established personal record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHit {
    /// Exercise the record belongs to
    pub exercise_id: String,
    /// Metric that improved
    pub metric: RecordMetric,
    /// New best value
    pub value: f64,
    /// Value it superseded, if any
    pub previous: Option<f64>,
    /// The new current record row
    pub record: PersonalRecord,
}

/// Tracks best-ever values per (account, exercise, metric) in the
/// namespace store's record cache.
pub struct RecordTracker<'a, S> {
    store: &'a NamespaceStore<S>,
    handle: &'a NamespaceHandle,
}

impl<'a, S: KeyValueStore> RecordTracker<'a, S> {
    /// Create a tracker bound to the active namespace.
    pub const fn new(store: &'a NamespaceStore<S>, handle: &'a NamespaceHandle) -> Self {
        Self { store, handle }
    }

    /// All cached records, history included.
    pub fn all_records(&self) -> Result<Vec<PersonalRecord>> {
        self.store.read_collection(self.handle, keys::RECORDS)
    }

    /// The current record per key.
    pub fn current_records(&self) -> Result<Vec<PersonalRecord>> {
        let mut records = self.all_records()?;
        records.retain(|record| record.is_current);
        Ok(records)
    }

    /// Fold acknowledged remote records into the local cache, keeping the
    /// monotonicity invariant: a remote current record only supersedes a
    /// local one when its value is strictly greater or the key is new.
    pub fn absorb_remote(&self, remote: &[PersonalRecord]) -> Result<()> {
        let mut records = self.all_records()?;

        for incoming in remote.iter().filter(|record| record.is_current) {
            let current = records.iter_mut().find(|r| {
                r.is_current
                    && r.exercise_id == incoming.exercise_id
                    && r.metric == incoming.metric
            });

            match current {
                Some(existing) if incoming.value <= existing.value => {}
                Some(existing) => {
                    existing.is_current = false;
                    records.push(incoming.clone());
                }
                None => records.push(incoming.clone()),
            }
        }

        self.store
            .write_collection(self.handle, keys::RECORDS, &records)
    }

    /// Evaluate a batch of merged sets against the cached records.
    ///
    /// Incomplete, skipped, and warm-up sets are excluded, as are metrics
    /// whose source value is non-positive or absent. Safe to re-run on the
    /// same batch: an unchanged best value never creates a new current row.
    pub fn update_records(
        &self,
        account_id: &str,
        completed_sets: &[SetLog],
    ) -> Result<Vec<RecordHit>> {
        let mut best: HashMap<(String, RecordMetric), (f64, &SetLog)> = HashMap::new();
        for set in completed_sets {
            if !set.completed || set.kind == SetKind::Warmup {
                continue;
            }
            for (metric, value) in candidate_values(set) {
                let key = (set.exercise_id.clone(), metric);
                match best.get(&key) {
                    // Strict improvement only; within-batch ties keep the
                    // first (earlier) candidate.
                    Some((current, _)) if value <= *current => {}
                    _ => {
                        best.insert(key, (value, set));
                    }
                }
            }
        }

        if best.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = self.all_records()?;
        let mut hits = Vec::new();

        let mut groups: Vec<((String, RecordMetric), (f64, &SetLog))> = best.into_iter().collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));

        for ((exercise_id, metric), (value, set)) in groups {
            let current = records
                .iter_mut()
                .find(|r| r.is_current && r.exercise_id == exercise_id && r.metric == metric);

            let previous = match current {
                Some(existing) if value <= existing.value => continue,
                Some(existing) => {
                    existing.is_current = false;
                    Some(existing.value)
                }
                None => None,
            };

            let record = PersonalRecord::new(
                account_id,
                exercise_id.clone(),
                metric,
                value,
                set.id.clone(),
                set.performed_at,
            );
            hits.push(RecordHit {
                exercise_id,
                metric,
                value,
                previous,
                record: record.clone(),
            });
            records.push(record);
        }

        if !hits.is_empty() {
            self.store
                .write_collection(self.handle, keys::RECORDS, &records)?;
        }

        Ok(hits)
    }
}

/// Candidate (metric, value) pairs for one set. Metrics with non-positive
/// or absent source values are skipped.
fn candidate_values(set: &SetLog) -> Vec<(RecordMetric, f64)> {
    let mut candidates = Vec::with_capacity(4);

    if let Some(weight) = set.weight.filter(|w| *w > 0.0) {
        candidates.push((RecordMetric::MaxWeight, weight));
        if let Some(reps) = set.reps.filter(|r| *r > 0) {
            candidates.push((
                RecordMetric::MaxEstOneRm,
                estimated_one_rep_max(weight, reps),
            ));
        }
    }
    if let Some(reps) = set.reps.filter(|r| *r > 0) {
        candidates.push((RecordMetric::MaxReps, f64::from(reps)));
    }
    if let Some(volume) = set.volume() {
        candidates.push((RecordMetric::MaxVolume, volume));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Namespace};
    use pretty_assertions::assert_eq;

    fn setup() -> (NamespaceStore<MemoryStore>, NamespaceHandle) {
        let store = NamespaceStore::new(MemoryStore::new());
        let handle = store.switch_namespace(Namespace::Account("acct".to_string()));
        (store, handle)
    }

    fn working_set(weight: f64, reps: u32, performed_at: i64) -> SetLog {
        let mut set = SetLog::new("session", "bench", 0);
        set.weight = Some(weight);
        set.reps = Some(reps);
        set.completed = true;
        set.performed_at = performed_at;
        set
    }

    #[test]
    fn first_set_creates_all_applicable_records() {
        let (store, handle) = setup();
        let tracker = RecordTracker::new(&store, &handle);

        let hits = tracker
            .update_records("acct", &[working_set(225.0, 5, 1000)])
            .unwrap();

        assert_eq!(hits.len(), 4);
        let value_of = |metric: RecordMetric| {
            hits.iter().find(|hit| hit.metric == metric).unwrap().value
        };
        assert!((value_of(RecordMetric::MaxWeight) - 225.0).abs() < f64::EPSILON);
        assert!((value_of(RecordMetric::MaxReps) - 5.0).abs() < f64::EPSILON);
        assert!((value_of(RecordMetric::MaxVolume) - 1125.0).abs() < f64::EPSILON);
        assert!((value_of(RecordMetric::MaxEstOneRm) - 262.5).abs() < f64::EPSILON);

        // Provenance: contributing set id and real performance time.
        let hit = &hits[0];
        assert_eq!(hit.record.achieved_at, 1000);
        assert!(hit.record.is_current);
    }

    #[test]
    fn equal_values_never_create_a_new_record() {
        let (store, handle) = setup();
        let tracker = RecordTracker::new(&store, &handle);

        tracker
            .update_records("acct", &[working_set(225.0, 5, 1000)])
            .unwrap();
        let before = tracker.all_records().unwrap();

        let hits = tracker
            .update_records("acct", &[working_set(225.0, 5, 2000)])
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(tracker.all_records().unwrap(), before);
    }

    #[test]
    fn improvement_supersedes_and_keeps_history() {
        let (store, handle) = setup();
        let tracker = RecordTracker::new(&store, &handle);

        tracker
            .update_records("acct", &[working_set(225.0, 5, 1000)])
            .unwrap();
        let hits = tracker
            .update_records("acct", &[working_set(245.0, 5, 2000)])
            .unwrap();

        // Weight, volume and e1rm improved; reps tied at 5.
        assert_eq!(hits.len(), 3);
        let weight_hit = hits
            .iter()
            .find(|hit| hit.metric == RecordMetric::MaxWeight)
            .unwrap();
        assert_eq!(weight_hit.previous, Some(225.0));

        let all = tracker.all_records().unwrap();
        let weight_rows: Vec<&PersonalRecord> = all
            .iter()
            .filter(|r| r.metric == RecordMetric::MaxWeight)
            .collect();
        assert_eq!(weight_rows.len(), 2);
        assert_eq!(
            weight_rows.iter().filter(|r| r.is_current).count(),
            1,
            "exactly one current record per key"
        );
    }

    #[test]
    fn warmup_and_incomplete_sets_are_excluded() {
        let (store, handle) = setup();
        let tracker = RecordTracker::new(&store, &handle);

        let mut warmup = working_set(135.0, 10, 1000);
        warmup.kind = SetKind::Warmup;
        let mut skipped = working_set(315.0, 1, 1000);
        skipped.completed = false;

        let hits = tracker.update_records("acct", &[warmup, skipped]).unwrap();
        assert!(hits.is_empty());
        assert!(tracker.all_records().unwrap().is_empty());
    }

    #[test]
    fn batch_keeps_only_best_candidate_per_group() {
        let (store, handle) = setup();
        let tracker = RecordTracker::new(&store, &handle);

        let hits = tracker
            .update_records(
                "acct",
                &[working_set(200.0, 5, 1000), working_set(225.0, 3, 2000)],
            )
            .unwrap();

        let weight_hit = hits
            .iter()
            .find(|hit| hit.metric == RecordMetric::MaxWeight)
            .unwrap();
        assert!((weight_hit.value - 225.0).abs() < f64::EPSILON);
        let reps_hit = hits
            .iter()
            .find(|hit| hit.metric == RecordMetric::MaxReps)
            .unwrap();
        assert!((reps_hit.value - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn absorb_remote_respects_monotonicity() {
        let (store, handle) = setup();
        let tracker = RecordTracker::new(&store, &handle);

        tracker
            .update_records("acct", &[working_set(225.0, 5, 1000)])
            .unwrap();

        let weaker = PersonalRecord::new(
            "acct",
            "bench",
            RecordMetric::MaxWeight,
            200.0,
            "remote-set",
            500,
        );
        let stronger = PersonalRecord::new(
            "acct",
            "bench",
            RecordMetric::MaxWeight,
            250.0,
            "remote-set-2",
            1500,
        );
        tracker.absorb_remote(&[weaker, stronger]).unwrap();

        let current = tracker.current_records().unwrap();
        let weight = current
            .iter()
            .find(|r| r.metric == RecordMetric::MaxWeight)
            .unwrap();
        assert!((weight.value - 250.0).abs() < f64::EPSILON);
    }
}
