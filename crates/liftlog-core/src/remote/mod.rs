//! Remote authoritative store boundary.
//!
//! The engine talks to the remote through the [`RemoteClient`] capability.
//! Rows coming back are duck-typed JSON; they are modeled as loose structs
//! with defaulted fields and normalized into domain types here, at the
//! boundary — field presence is never trusted downstream of it.

mod http;

pub use http::HttpRemoteClient;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{
    normalize_session_id, PersonalRecord, RecordMetric, SetKind, SetLog, WorkoutSession,
};

/// Capability trait for the authenticated remote API.
#[allow(async_fn_in_trait)]
pub trait RemoteClient {
    /// Fetch all sessions for an account (including tombstoned ones).
    async fn fetch_sessions(&self, account_id: &str) -> Result<Vec<WorkoutSession>>;

    /// Create or replace a session (with nested set rows) remotely.
    async fn upsert_session(&self, account_id: &str, session: &WorkoutSession) -> Result<()>;

    /// Soft-delete a session remotely (tombstone, supports undo/restore).
    async fn delete_session(&self, account_id: &str, session_id: &str) -> Result<()>;

    /// Fetch all personal records for an account.
    async fn fetch_records(&self, account_id: &str) -> Result<Vec<PersonalRecord>>;

    /// Upsert a personal record scoped by (account, exercise, metric).
    async fn upsert_record(&self, account_id: &str, record: &PersonalRecord) -> Result<()>;
}

/// Wire payload for a session upsert. The remote store only ever sees
/// canonical identifiers: the ephemeral local prefix is stripped here.
pub fn session_payload(session: &WorkoutSession) -> serde_json::Value {
    let mut outgoing = session.clone();
    outgoing.id = outgoing.canonical_id().to_string();
    let canonical = outgoing.id.clone();
    for set in &mut outgoing.sets {
        set.session_id.clone_from(&canonical);
    }
    serde_json::to_value(&outgoing).unwrap_or(serde_json::Value::Null)
}

/// Loose session row as returned by the remote collection API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRow {
    pub id: Option<String>,
    pub date: Option<chrono::NaiveDate>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub sets: Option<Vec<SetRow>>,
}

/// Loose set row nested in a session row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetRow {
    pub id: Option<String>,
    pub exercise_id: Option<String>,
    pub exercise_name: Option<String>,
    pub ordinal: Option<u32>,
    pub kind: Option<SetKind>,
    pub prescribed_weight: Option<f64>,
    pub prescribed_reps: Option<u32>,
    pub weight: Option<f64>,
    pub reps: Option<u32>,
    pub rpe: Option<f64>,
    pub completed: Option<bool>,
    pub performed_at: Option<i64>,
}

impl SessionRow {
    /// Normalize into a domain session. Rows without an identifier are
    /// unusable and yield `None`; everything coming through here is, by
    /// definition, acknowledged remote state (`synced = true`).
    #[must_use]
    pub fn normalize(self) -> Option<WorkoutSession> {
        let id = crate::util::normalize_text_option(self.id)?;
        let id = normalize_session_id(&id).to_string();
        let started_at = self.started_at.unwrap_or_default();

        let sets: Vec<SetLog> = self
            .sets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.normalize(&id))
            .collect();

        let mut session = WorkoutSession {
            id,
            date: self.date.unwrap_or_else(|| {
                chrono::DateTime::from_timestamp_millis(started_at)
                    .map_or_else(|| chrono::Utc::now().date_naive(), |dt| dt.date_naive())
            }),
            started_at,
            ended_at: self.ended_at,
            sets,
            total_volume: 0.0,
            avg_intensity: None,
            synced: true,
            deleted_at: self.deleted_at,
        };
        // The set list is the source of truth for summary fields.
        session.recompute_totals();
        Some(session)
    }
}

impl SetRow {
    fn normalize(self, session_id: &str) -> Option<SetLog> {
        let id = crate::util::normalize_text_option(self.id)?;
        let exercise_id = crate::util::normalize_text_option(self.exercise_id)?;
        Some(SetLog {
            id,
            session_id: session_id.to_string(),
            exercise_id,
            exercise_name: crate::util::normalize_text_option(self.exercise_name),
            ordinal: self.ordinal.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
            prescribed_weight: self.prescribed_weight,
            prescribed_reps: self.prescribed_reps,
            weight: self.weight,
            reps: self.reps,
            rpe: self.rpe,
            completed: self.completed.unwrap_or_default(),
            performed_at: self.performed_at.unwrap_or_default(),
        })
    }
}

/// Loose personal-record row as returned by the remote API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordRow {
    pub id: Option<String>,
    pub account_id: Option<String>,
    pub exercise_id: Option<String>,
    pub metric: Option<RecordMetric>,
    pub value: Option<f64>,
    pub set_id: Option<String>,
    pub achieved_at: Option<i64>,
    pub is_current: Option<bool>,
}

impl RecordRow {
    /// Normalize into a domain record; rows missing the key fields are skipped.
    #[must_use]
    pub fn normalize(self, account_id: &str) -> Option<PersonalRecord> {
        Some(PersonalRecord {
            id: crate::util::normalize_text_option(self.id)?,
            account_id: account_id.to_string(),
            exercise_id: crate::util::normalize_text_option(self.exercise_id)?,
            metric: self.metric?,
            value: self.value?,
            set_id: self.set_id.unwrap_or_default(),
            achieved_at: self.achieved_at.unwrap_or_default(),
            is_current: self.is_current.unwrap_or_default(),
        })
    }
}
