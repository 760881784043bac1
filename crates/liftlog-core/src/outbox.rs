//! Durable outbox of pending remote mutations.
//!
//! Every local write is appended here alongside the unconditional write to
//! the namespace store. The queue persists itself after every mutation so a
//! killed process resumes with the same pending set. Items are delivered in
//! FIFO order; transient failures bump a per-item retry counter and the
//! item is evicted once the counter exceeds [`MAX_RETRIES`]. Evicted items
//! are surfaced via [`OutboxQueue::dropped`] rather than silently lost.

use std::collections::HashSet;
use std::future::Future;

use crate::error::Result;
use crate::models::{Collection, OutboxItem, OutboxOp, MAX_RETRIES};
use crate::store::{keys, KeyValueStore, NamespaceHandle, NamespaceStore};

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items confirmed applied remotely and removed
    pub processed: usize,
    /// Items dropped (terminal error or retry ceiling exceeded)
    pub failed: usize,
}

/// Delivery failure reported by the apply seam.
#[derive(Debug)]
pub enum DeliveryError {
    /// Retryable (network timeout, 5xx); the item stays queued
    Transient(crate::Error),
    /// Can never succeed (malformed payload); the item is dropped at once
    Terminal(crate::Error),
}

/// Ordered queue of not-yet-confirmed remote mutations.
pub struct OutboxQueue {
    items: Vec<OutboxItem>,
    confirmed: Vec<OutboxItem>,
    dropped: Vec<OutboxItem>,
}

impl OutboxQueue {
    /// Load the pending set persisted for the handle's namespace.
    pub fn load<S: KeyValueStore>(
        store: &NamespaceStore<S>,
        handle: &NamespaceHandle,
    ) -> Result<Self> {
        let items = store.read_collection(handle, keys::OUTBOX)?;
        Ok(Self {
            items,
            confirmed: Vec::new(),
            dropped: Vec::new(),
        })
    }

    fn persist<S: KeyValueStore>(
        &self,
        store: &NamespaceStore<S>,
        handle: &NamespaceHandle,
    ) -> Result<()> {
        store.write_collection(handle, keys::OUTBOX, &self.items)
    }

    /// Append a mutation, coalescing with a pending upsert for the same
    /// normalized entity. A delete supersedes pending upserts for its key.
    pub fn enqueue<S: KeyValueStore>(
        &mut self,
        store: &NamespaceStore<S>,
        handle: &NamespaceHandle,
        op: OutboxOp,
        collection: Collection,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<()> {
        let entity_id = entity_id.into();

        match op {
            OutboxOp::Delete => {
                self.items
                    .retain(|item| !(item.collection == collection && item.entity_id == entity_id));
                self.items
                    .push(OutboxItem::new(op, collection, entity_id, payload));
            }
            OutboxOp::Create | OutboxOp::Update => {
                let existing = self.items.iter_mut().find(|item| {
                    item.collection == collection
                        && item.entity_id == entity_id
                        && item.op != OutboxOp::Delete
                });
                if let Some(item) = existing {
                    // Keep the original op and position; a create the remote
                    // has never seen must stay a create.
                    item.payload = payload;
                    item.retries = 0;
                } else {
                    self.items
                        .push(OutboxItem::new(op, collection, entity_id, payload));
                }
            }
        }

        self.persist(store, handle)
    }

    /// Deliver pending items in FIFO order through `apply`.
    ///
    /// The batch-level connectivity/account gate belongs to the caller and
    /// is checked once before this runs, never mid-iteration. Each item
    /// still gets its own failure handling. The queue re-persists after
    /// every item so an interrupted drain resumes correctly.
    pub async fn drain<S, F, Fut>(
        &mut self,
        store: &NamespaceStore<S>,
        handle: &NamespaceHandle,
        mut apply: F,
    ) -> Result<DrainReport>
    where
        S: KeyValueStore,
        F: FnMut(OutboxItem) -> Fut,
        Fut: Future<Output = std::result::Result<(), DeliveryError>>,
    {
        let mut report = DrainReport::default();
        let pending = std::mem::take(&mut self.items);
        let drained_ids: HashSet<String> = pending.iter().map(|item| item.id.clone()).collect();
        let mut remaining = pending.into_iter().collect::<std::collections::VecDeque<_>>();

        while let Some(mut item) = remaining.pop_front() {
            match apply(item.clone()).await {
                Ok(()) => {
                    report.processed += 1;
                    self.confirmed.push(item);
                }
                Err(DeliveryError::Terminal(error)) => {
                    tracing::warn!(
                        "dropping outbox item for {}/{}: {error}",
                        item.collection.as_str(),
                        item.entity_id
                    );
                    report.failed += 1;
                    self.dropped.push(item);
                }
                Err(DeliveryError::Transient(error)) => {
                    item.retries += 1;
                    if item.retries > MAX_RETRIES {
                        tracing::warn!(
                            "evicting outbox item for {}/{} after {} attempts: {error}",
                            item.collection.as_str(),
                            item.entity_id,
                            item.retries
                        );
                        report.failed += 1;
                        self.dropped.push(item);
                    } else {
                        tracing::debug!(
                            "outbox item for {}/{} failed (attempt {}): {error}",
                            item.collection.as_str(),
                            item.entity_id,
                            item.retries
                        );
                        self.items.push(item);
                    }
                }
            }

            // Persist the surviving set: retried items plus the untried
            // tail, plus anything another queue instance enqueued while
            // `apply` was suspended. Writing only this instance's view
            // would erase those concurrent mutations from the durable set.
            let mut snapshot = self.items.clone();
            snapshot.extend(remaining.iter().cloned());
            let persisted: Vec<OutboxItem> = store.read_collection(handle, keys::OUTBOX)?;
            for concurrent in persisted {
                if !drained_ids.contains(&concurrent.id)
                    && snapshot.iter().all(|kept| kept.id != concurrent.id)
                {
                    snapshot.push(concurrent);
                }
            }
            store.write_collection(handle, keys::OUTBOX, &snapshot)?;
        }

        // Adopt the final durable set so this instance's view includes
        // items enqueued concurrently during the drain.
        self.items = store.read_collection(handle, keys::OUTBOX)?;

        Ok(report)
    }

    /// All pending items, FIFO order.
    #[must_use]
    pub fn peek_all(&self) -> &[OutboxItem] {
        &self.items
    }

    /// Items confirmed applied remotely by drains on this queue instance.
    /// Only these may be treated as acknowledged; absence from the pending
    /// set says nothing (an item may have been evicted unacknowledged).
    #[must_use]
    pub fn confirmed(&self) -> &[OutboxItem] {
        &self.confirmed
    }

    /// Items dropped by drains on this queue instance (terminal errors and
    /// retry-ceiling evictions). Never auto-requeued.
    #[must_use]
    pub fn dropped(&self) -> &[OutboxItem] {
        &self.dropped
    }

    /// Number of pending items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue has no pending items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
