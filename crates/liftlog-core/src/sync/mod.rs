//! Sync coordination between the local replica and the remote store.
//!
//! A write is applied to the namespace store immediately and
//! unconditionally, and appended to the outbox in the same call. The
//! coordinator later drains the outbox and pulls+merges remote state when
//! its triggers fire (connectivity regained, app foreground, account
//! change, workout saved). At most one load/sync pass is in flight per
//! namespace: overlapping triggers coalesce into the running pass via a
//! `try_lock`ed guard and are dropped, never queued — the cost of a
//! skipped cycle is bounded staleness, not data loss, because the outbox
//! already holds the mutation durably.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};

use crate::error::{Error, Result};
use crate::merge::merge;
use crate::models::{Collection, OutboxItem, OutboxOp, PersonalRecord, WorkoutSession};
use crate::outbox::{DeliveryError, DrainReport, OutboxQueue};
use crate::records::RecordTracker;
use crate::remote::{session_payload, RemoteClient};
use crate::store::{keys, KeyValueStore, Namespace, NamespaceHandle, NamespaceStore};

/// Coarse engine phase exposed to the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    /// Serving local data (never blocks on network)
    Loading,
    /// Remote pull + merge in progress
    Syncing,
    /// Outbox drain in progress
    Flushing,
}

/// Account lifecycle events consumed from the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    SignedIn(String),
    SignedOut,
    /// Initial auth resolution; `None` means definitively no account.
    SessionResolved(Option<String>),
}

/// Orchestrates outbox flushes and pull+merge passes for the active
/// account namespace.
pub struct SyncCoordinator<S, R> {
    store: NamespaceStore<S>,
    remote: Option<R>,
    handle: StdMutex<NamespaceHandle>,
    view: StdMutex<Vec<WorkoutSession>>,
    phase: StdMutex<SyncPhase>,
    online: AtomicBool,
    syncing: AtomicBool,
    pass_guard: tokio::sync::Mutex<()>,
}

impl<S: KeyValueStore, R: RemoteClient> SyncCoordinator<S, R> {
    /// Create a coordinator in the guest namespace. `remote` is `None` in
    /// local-only mode; flushes and pulls are then no-ops.
    pub fn new(store: NamespaceStore<S>, remote: Option<R>) -> Self {
        let handle = store.handle();
        Self {
            store,
            remote,
            handle: StdMutex::new(handle),
            view: StdMutex::new(Vec::new()),
            phase: StdMutex::new(SyncPhase::Idle),
            online: AtomicBool::new(true),
            syncing: AtomicBool::new(false),
            pass_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// The underlying namespaced store.
    pub const fn namespace_store(&self) -> &NamespaceStore<S> {
        &self.store
    }

    /// Handle for the namespace this coordinator currently serves.
    pub fn current_handle(&self) -> NamespaceHandle {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a load or sync pass is in flight.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Current coarse phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, next: SyncPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// The unified, deduplicated collection (tombstoned sessions hidden).
    pub fn merged_view(&self) -> Vec<WorkoutSession> {
        self.view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|session| !session.is_deleted())
            .cloned()
            .collect()
    }

    fn set_view(&self, sessions: Vec<WorkoutSession>) {
        *self.view.lock().unwrap_or_else(PoisonError::into_inner) = sessions;
    }

    /// Consume an account lifecycle event. Switching namespaces tears down
    /// the previous handle (its in-flight writes are discarded) and starts
    /// a fresh load for the new one.
    pub async fn handle_account_event(&self, event: AccountEvent) {
        let next = match event {
            AccountEvent::SignedIn(id) => Namespace::from_account(Some(id)),
            AccountEvent::SignedOut | AccountEvent::SessionResolved(None) => Namespace::Guest,
            AccountEvent::SessionResolved(Some(id)) => Namespace::from_account(Some(id)),
        };

        {
            let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            if *handle.namespace() == next {
                return;
            }
            *handle = self.store.switch_namespace(next);
        }
        // Previous views must be invalidated, not left stale.
        self.set_view(Vec::new());

        self.trigger_sync().await;
    }

    /// Consume the connectivity signal. A false→true edge triggers a
    /// flush-and-sync attempt.
    pub async fn handle_connectivity(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            tracing::debug!("connectivity regained, triggering sync");
            self.trigger_sync().await;
        }
    }

    /// App came to the foreground / became visible.
    pub async fn handle_foreground(&self) {
        self.trigger_sync().await;
    }

    /// Persist a workout locally and stage it for remote delivery.
    ///
    /// The local write is unconditional (offline included); the outbox
    /// append happens synchronously in the same call, before any drain
    /// the caller may trigger next.
    pub fn save_workout(&self, session: &WorkoutSession) -> Result<()> {
        let handle = self.current_handle();
        let mut session = session.clone();
        session.recompute_totals();

        let mut sessions: Vec<WorkoutSession> =
            self.store.read_collection(&handle, keys::SESSIONS)?;
        let canonical = session.canonical_id().to_string();
        match sessions
            .iter_mut()
            .find(|existing| existing.canonical_id() == canonical)
        {
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }
        self.store
            .write_collection(&handle, keys::SESSIONS, &sessions)?;
        self.set_view(sessions);

        let op = if session.synced {
            OutboxOp::Update
        } else {
            OutboxOp::Create
        };
        let mut queue = OutboxQueue::load(&self.store, &handle)?;
        queue.enqueue(
            &self.store,
            &handle,
            op,
            Collection::Sessions,
            canonical,
            session_payload(&session),
        )?;
        Ok(())
    }

    /// Tombstone a workout locally and stage the soft-delete.
    pub fn delete_workout(&self, session_id: &str) -> Result<()> {
        let handle = self.current_handle();
        let canonical = crate::models::normalize_session_id(session_id).to_string();

        let mut sessions: Vec<WorkoutSession> =
            self.store.read_collection(&handle, keys::SESSIONS)?;
        let Some(session) = sessions
            .iter_mut()
            .find(|existing| existing.canonical_id() == canonical)
        else {
            return Err(Error::NotFound(session_id.to_string()));
        };
        session.deleted_at = Some(crate::util::unix_timestamp_ms());
        self.store
            .write_collection(&handle, keys::SESSIONS, &sessions)?;
        self.set_view(sessions);

        let mut queue = OutboxQueue::load(&self.store, &handle)?;
        queue.enqueue(
            &self.store,
            &handle,
            OutboxOp::Delete,
            Collection::Sessions,
            canonical,
            serde_json::Value::Null,
        )?;
        Ok(())
    }

    /// Explicit "workout saved" signal: persist, then re-enter syncing.
    pub async fn save_workout_and_sync(&self, session: &WorkoutSession) -> Result<()> {
        self.save_workout(session)?;
        self.trigger_sync().await;
        Ok(())
    }

    /// Run one pass and return the refreshed merged view.
    pub async fn reload(&self) -> Result<Vec<WorkoutSession>> {
        self.sync_pass().await?;
        Ok(self.merged_view())
    }

    /// Attempt a pass, dropping the trigger if one is already in flight
    /// and swallowing (but logging) pass errors.
    pub async fn trigger_sync(&self) {
        if let Err(error) = self.sync_pass().await {
            tracing::warn!("sync pass failed: {error}");
        }
    }

    /// One coordinator pass: serve local data, then pull+merge+write-back,
    /// then opportunistically flush the outbox.
    async fn sync_pass(&self) -> Result<()> {
        // Single in-flight pass per namespace; concurrent triggers coalesce.
        let Ok(_guard) = self.pass_guard.try_lock() else {
            tracing::debug!("sync pass already in flight, dropping trigger");
            return Ok(());
        };

        self.syncing.store(true, Ordering::SeqCst);
        let result = self.run_pass().await;
        // Guard and flags are restored on every path; an error mid-pass
        // can never leave the engine locked.
        self.syncing.store(false, Ordering::SeqCst);
        self.set_phase(SyncPhase::Idle);

        match result {
            // A namespace switch raced this pass; its output was discarded.
            Err(Error::StaleNamespace(ns)) => {
                tracing::warn!("discarded sync pass for inactive namespace {ns}");
                Ok(())
            }
            other => other,
        }
    }

    async fn run_pass(&self) -> Result<()> {
        let handle = self.current_handle();

        // Loading: local data first, never block the UI on network.
        self.set_phase(SyncPhase::Loading);
        let local: Vec<WorkoutSession> = self.store.read_collection(&handle, keys::SESSIONS)?;
        self.set_view(local.clone());

        let account_active = handle.account_id().is_some();
        let online = self.online.load(Ordering::SeqCst);

        if account_active && online {
            if let Some(remote) = self.remote.as_ref() {
                self.set_phase(SyncPhase::Syncing);
                self.pull_and_merge(remote, &handle, local).await?;
            }
        }

        // Flushing runs opportunistically after the read path; its own
        // batch gate re-checks connectivity and account once.
        self.flush_outbox().await?;
        Ok(())
    }

    async fn pull_and_merge(
        &self,
        remote: &R,
        handle: &NamespaceHandle,
        local: Vec<WorkoutSession>,
    ) -> Result<()> {
        let account = handle.account_id().unwrap_or_default().to_string();

        let remote_sessions = match remote.fetch_sessions(&account).await {
            Ok(sessions) => sessions,
            Err(error) => {
                // Transient pull failure: keep serving local data.
                tracing::warn!("remote pull failed, serving local data: {error}");
                return Ok(());
            }
        };

        let merged = merge(&local, &remote_sessions);
        self.store
            .write_collection(handle, keys::SESSIONS, &merged)?;
        self.set_view(merged.clone());

        let tracker = RecordTracker::new(&self.store, handle);
        match remote.fetch_records(&account).await {
            Ok(remote_records) => tracker.absorb_remote(&remote_records)?,
            Err(error) => {
                tracing::warn!("remote record pull failed: {error}");
            }
        }

        let completed_sets: Vec<crate::models::SetLog> = merged
            .iter()
            .filter(|session| !session.is_deleted())
            .flat_map(|session| session.sets.iter().filter(|set| set.completed).cloned())
            .collect();
        let hits = tracker.update_records(&account, &completed_sets)?;

        if !hits.is_empty() {
            let mut queue = OutboxQueue::load(&self.store, handle)?;
            for hit in hits {
                tracing::info!(
                    "new personal record: {} {} = {}",
                    hit.exercise_id,
                    hit.metric,
                    hit.value
                );
                queue.enqueue(
                    &self.store,
                    handle,
                    OutboxOp::Update,
                    Collection::Records,
                    format!("{}:{}", hit.exercise_id, hit.metric),
                    serde_json::to_value(&hit.record)?,
                )?;
            }
        }

        Ok(())
    }

    /// Drain the outbox against the remote store.
    ///
    /// The connectivity/account gate is checked once here, at the start of
    /// the batch — a queue is never partially drained because connectivity
    /// flapped mid-iteration.
    pub async fn flush_outbox(&self) -> Result<DrainReport> {
        if !self.online.load(Ordering::SeqCst) {
            return Ok(DrainReport::default());
        }
        let handle = self.current_handle();
        let Some(account) = handle.account_id() else {
            return Ok(DrainReport::default());
        };
        let Some(remote) = self.remote.as_ref() else {
            return Ok(DrainReport::default());
        };

        let mut queue = OutboxQueue::load(&self.store, &handle)?;
        if queue.is_empty() {
            return Ok(DrainReport::default());
        }

        self.set_phase(SyncPhase::Flushing);
        let report = queue
            .drain(&self.store, &handle, |item| async move {
                Self::apply_item(remote, account, item).await
            })
            .await?;

        if report.processed > 0 {
            self.mark_flushed_sessions_synced(&handle, &queue)?;
        }

        tracing::debug!(
            "outbox flush done: {} processed, {} failed",
            report.processed,
            report.failed
        );
        Ok(report)
    }

    /// Sessions whose mutation was confirmed applied in this drain are now
    /// acknowledged remote state. Only confirmation counts: a session whose
    /// item was evicted unacknowledged has no pending item either, and must
    /// stay local-only.
    fn mark_flushed_sessions_synced(
        &self,
        handle: &NamespaceHandle,
        queue: &OutboxQueue,
    ) -> Result<()> {
        let pending: HashSet<&str> = queue
            .peek_all()
            .iter()
            .filter(|item| item.collection == Collection::Sessions)
            .map(|item| item.entity_id.as_str())
            .collect();
        let confirmed: HashSet<&str> = queue
            .confirmed()
            .iter()
            .filter(|item| item.collection == Collection::Sessions && item.op != OutboxOp::Delete)
            .map(|item| item.entity_id.as_str())
            // A newer mutation re-queued during the flush keeps the
            // session unacknowledged.
            .filter(|id| !pending.contains(id))
            .collect();
        if confirmed.is_empty() {
            return Ok(());
        }

        let mut sessions: Vec<WorkoutSession> =
            self.store.read_collection(handle, keys::SESSIONS)?;
        let mut changed = false;
        for session in &mut sessions {
            if !session.synced && confirmed.contains(session.canonical_id()) {
                session.synced = true;
                changed = true;
            }
        }
        if changed {
            self.store
                .write_collection(handle, keys::SESSIONS, &sessions)?;
            self.set_view(sessions);
        }
        Ok(())
    }

    async fn apply_item(
        remote: &R,
        account: &str,
        item: OutboxItem,
    ) -> std::result::Result<(), DeliveryError> {
        match (item.collection, item.op) {
            (Collection::Sessions, OutboxOp::Delete) => remote
                .delete_session(account, &item.entity_id)
                .await
                .map_err(DeliveryError::Transient),
            (Collection::Sessions, _) => {
                // A payload that cannot deserialize can never succeed.
                let session: WorkoutSession = serde_json::from_value(item.payload)
                    .map_err(|error| DeliveryError::Terminal(error.into()))?;
                remote
                    .upsert_session(account, &session)
                    .await
                    .map_err(DeliveryError::Transient)
            }
            (Collection::Records, OutboxOp::Delete) => Ok(()),
            (Collection::Records, _) => {
                let record: PersonalRecord = serde_json::from_value(item.payload)
                    .map_err(|error| DeliveryError::Terminal(error.into()))?;
                remote
                    .upsert_record(account, &record)
                    .await
                    .map_err(DeliveryError::Transient)
            }
        }
    }
}
