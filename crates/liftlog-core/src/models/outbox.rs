//! Outbox item model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retry ceiling for a pending mutation. An item whose counter exceeds
/// this is evicted from the queue and counted as failed.
pub const MAX_RETRIES: u32 = 5;

/// Kind of pending remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOp {
    Create,
    Update,
    Delete,
}

/// Remote collection an outbox item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Sessions,
    Records,
}

impl Collection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Records => "records",
        }
    }
}

/// A durable, not-yet-confirmed remote mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxItem {
    /// Unique queue-item identifier
    pub id: String,
    /// Mutation kind
    pub op: OutboxOp,
    /// Target collection
    pub collection: Collection,
    /// Canonical (normalized) id of the target entity, used for
    /// queue de-duplication
    pub entity_id: String,
    /// Opaque serialized entity payload
    pub payload: serde_json::Value,
    /// When the mutation was recorded locally (Unix ms)
    pub created_at: i64,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub retries: u32,
}

impl OutboxItem {
    /// Create a fresh queue item for a mutation.
    #[must_use]
    pub fn new(
        op: OutboxOp,
        collection: Collection,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            op,
            collection,
            entity_id: entity_id.into(),
            payload,
            created_at: crate::util::unix_timestamp_ms(),
            retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_starts_unretried() {
        let item = OutboxItem::new(
            OutboxOp::Create,
            Collection::Sessions,
            "abc",
            serde_json::json!({"id": "abc"}),
        );
        assert_eq!(item.retries, 0);
        assert_eq!(item.collection.as_str(), "sessions");
    }

    #[test]
    fn item_round_trips_through_serde() {
        let item = OutboxItem::new(
            OutboxOp::Delete,
            Collection::Records,
            "abc",
            serde_json::Value::Null,
        );
        let json = serde_json::to_string(&item).unwrap();
        let parsed: OutboxItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }
}
