//! Data models for LiftLog

mod outbox;
mod record;
mod session;

pub use outbox::{Collection, OutboxItem, OutboxOp, MAX_RETRIES};
pub use record::{estimated_one_rep_max, PersonalRecord, RecordMetric};
pub use session::{normalize_session_id, SetKind, SetLog, WorkoutSession, LOCAL_ID_PREFIX};
