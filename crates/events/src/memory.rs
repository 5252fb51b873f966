//! In-process implementation of the store ports.
//!
//! Used by the test suites and for running the engine without a database.
//! All state sits behind one `RwLock`, so every operation is atomic with
//! respect to every other, which gives the same compare-and-set guarantees
//! as the conditional updates in [`PgStore`](crate::pg::PgStore).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tandem_core::cross_role::{CrossRoleEvent, EventQuery, NewCrossRoleEvent};
use tandem_core::notification::{
    DeliveryQuery, DeliveryStatus, DeliveryUpdate, NewDeliveryRecord, NotificationCategory,
    NotificationDeliveryRecord, NotificationPreference,
};
use tandem_core::service::{RequestRef, RequestStatus};
use tandem_core::sync::{AckRole, Location, RoleSyncStatus, TransitionRequest};
use tandem_core::types::{DbId, Timestamp};
use tandem_db::models::assignment::{Assignment, Reassign};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{
    AssignmentStore, DeliveryLogStore, EventStore, PreferenceBackend, RecipientDirectory,
    SyncStatusStore,
};

#[derive(Default)]
struct Inner {
    sync: HashMap<RequestRef, RoleSyncStatus>,
    events: Vec<CrossRoleEvent>,
    preferences: BTreeMap<(DbId, NotificationCategory), NotificationPreference>,
    deliveries: BTreeMap<DbId, NotificationDeliveryRecord>,
    assignments: HashMap<RequestRef, Assignment>,
    administrators: BTreeSet<DbId>,
    next_event_id: DbId,
    next_delivery_id: DbId,
}

/// Cheaply cloneable in-memory store; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active administrator for critical alert fan-out.
    pub async fn add_administrator(&self, actor_id: DbId) {
        self.inner.write().await.administrators.insert(actor_id);
    }

    /// Create (or replace) the assignment row for a request at version 0.
    pub async fn seed_assignment(&self, request: RequestRef, assignee_id: Option<DbId>) {
        let assignment = Assignment {
            service_type: request.service_type.as_str().to_string(),
            request_id: request.request_id,
            assignee_id,
            version: 0,
            reassigned_at: None,
            reason: None,
            notes: None,
        };
        self.inner.write().await.assignments.insert(request, assignment);
    }
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl SyncStatusStore for MemoryStore {
    async fn get_sync_status(
        &self,
        request: &RequestRef,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        Ok(self.inner.read().await.sync.get(request).cloned())
    }

    async fn insert_sync_status(
        &self,
        status: &RoleSyncStatus,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.sync.contains_key(&status.request) {
            return Ok(None);
        }
        inner.sync.insert(status.request, status.clone());
        Ok(Some(status.clone()))
    }

    async fn advance_sync_status(
        &self,
        expected: RequestStatus,
        transition: &TransitionRequest,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.sync.get_mut(&transition.request) else {
            return Ok(None);
        };
        if row.current_status != expected {
            return Ok(None);
        }
        row.apply_transition(transition, Utc::now());
        Ok(Some(row.clone()))
    }

    async fn update_sync_location(
        &self,
        request: &RequestRef,
        location: &Location,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.sync.get_mut(request).map(|row| {
            row.location = Some(*location);
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn acknowledge_sync(
        &self,
        request: &RequestRef,
        role: AckRole,
        actor_id: Option<DbId>,
        at: Timestamp,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.sync.get_mut(request) else {
            return Ok(None);
        };
        if !row.acks.acknowledge(role, actor_id, at) {
            return Ok(None);
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn record_sync_failure(
        &self,
        request: &RequestRef,
        error: &str,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.sync.get_mut(request).map(|row| {
            row.sync_attempts = row.sync_attempts.saturating_add(1);
            row.last_sync_error = Some(error.to_string());
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn list_sync_statuses(
        &self,
        participant: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RoleSyncStatus>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<RoleSyncStatus> = inner
            .sync
            .values()
            .filter(|row| participant.is_none_or(|id| row.participants().contains(&id)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.request.request_id.cmp(&b.request.request_id))
        });
        Ok(page(rows, limit, offset))
    }

    async fn archive_terminal_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut archived = 0;
        for row in inner.sync.values_mut() {
            if row.archived_at.is_none()
                && row.current_status.is_terminal()
                && row.updated_at < cutoff
            {
                row.archived_at = Some(now);
                archived += 1;
            }
        }
        Ok(archived)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_event(&self, event: &NewCrossRoleEvent) -> Result<CrossRoleEvent, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_event_id += 1;
        let stored = event.clone().into_event(inner.next_event_id, Utc::now());
        inner.events.push(stored.clone());
        Ok(stored)
    }

    async fn recent_events(&self, query: &EventQuery) -> Result<Vec<CrossRoleEvent>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<CrossRoleEvent> = inner
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page(rows, query.limit, query.offset))
    }
}

#[async_trait]
impl PreferenceBackend for MemoryStore {
    async fn insert_missing_preferences(
        &self,
        recipient_id: DbId,
        categories: &[NotificationCategory],
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut inserted = 0;
        for &category in categories {
            inner
                .preferences
                .entry((recipient_id, category))
                .or_insert_with(|| {
                    inserted += 1;
                    NotificationPreference {
                        recipient_id,
                        category,
                        enabled: true,
                        created_at: now,
                        updated_at: now,
                    }
                });
        }
        Ok(inserted)
    }

    async fn get_preference(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPreference>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.preferences.get(&(recipient_id, category)).cloned())
    }

    async fn list_preferences(
        &self,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreference>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .preferences
            .values()
            .filter(|p| p.recipient_id == recipient_id)
            .cloned()
            .collect())
    }

    async fn upsert_preference(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<NotificationPreference, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let pref = inner
            .preferences
            .entry((recipient_id, category))
            .and_modify(|p| {
                p.enabled = enabled;
                p.updated_at = now;
            })
            .or_insert_with(|| NotificationPreference {
                recipient_id,
                category,
                enabled,
                created_at: now,
                updated_at: now,
            });
        Ok(pref.clone())
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryStore {
    async fn insert_pending_delivery(
        &self,
        record: &NewDeliveryRecord,
    ) -> Result<NotificationDeliveryRecord, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_delivery_id += 1;
        let id = inner.next_delivery_id;
        let stored = NotificationDeliveryRecord {
            id,
            recipient_id: record.recipient_id,
            notification_type: record.notification_type.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            silent: record.silent,
            request_id: record.request_id,
            data: record.data.clone(),
            status: DeliveryStatus::Pending,
            error_message: None,
            sent_at: Utc::now(),
            delivered_at: None,
            latency_ms: None,
        };
        inner.deliveries.insert(id, stored.clone());
        Ok(stored)
    }

    async fn transition_delivery(
        &self,
        id: DbId,
        from: &[DeliveryStatus],
        update: &DeliveryUpdate,
    ) -> Result<Option<NotificationDeliveryRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&record.status) {
            return Ok(None);
        }
        record.status = update.to;
        if update.error_message.is_some() {
            record.error_message = update.error_message.clone();
        }
        if update.delivered_at.is_some() {
            record.delivered_at = update.delivered_at;
        }
        if update.latency_ms.is_some() {
            record.latency_ms = update.latency_ms;
        }
        Ok(Some(record.clone()))
    }

    async fn get_delivery(
        &self,
        id: DbId,
    ) -> Result<Option<NotificationDeliveryRecord>, StoreError> {
        Ok(self.inner.read().await.deliveries.get(&id).cloned())
    }

    async fn list_deliveries(
        &self,
        query: &DeliveryQuery,
    ) -> Result<Vec<NotificationDeliveryRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<NotificationDeliveryRecord> = inner
            .deliveries
            .values()
            .filter(|r| query.recipient_id.is_none_or(|id| r.recipient_id == Some(id)))
            .filter(|r| query.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page(rows, query.limit, query.offset))
    }

    async fn expire_sent_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut expired = 0;
        for record in inner.deliveries.values_mut() {
            if record.status == DeliveryStatus::Sent && record.sent_at < cutoff {
                record.status = DeliveryStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn current_assignment(
        &self,
        request: &RequestRef,
    ) -> Result<Option<Assignment>, StoreError> {
        Ok(self.inner.read().await.assignments.get(request).cloned())
    }

    async fn compare_and_reassign(
        &self,
        request: &RequestRef,
        expected_version: i64,
        input: &Reassign,
    ) -> Result<Option<Assignment>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(assignment) = inner.assignments.get_mut(request) else {
            return Ok(None);
        };
        if assignment.version != expected_version {
            return Ok(None);
        }
        assignment.assignee_id = Some(input.new_assignee_id);
        assignment.reason = input.reason.clone();
        assignment.notes = input.notes.clone();
        assignment.version += 1;
        assignment.reassigned_at = Some(Utc::now());
        Ok(Some(assignment.clone()))
    }
}

#[async_trait]
impl RecipientDirectory for MemoryStore {
    async fn administrator_ids(&self) -> Result<Vec<DbId>, StoreError> {
        Ok(self.inner.read().await.administrators.iter().copied().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::service::ServiceType;
    use uuid::Uuid;

    fn request() -> RequestRef {
        RequestRef::new(ServiceType::Ride, Uuid::new_v4())
    }

    #[tokio::test]
    async fn advance_is_compare_and_set() {
        let store = MemoryStore::new();
        let req = request();
        let row = RoleSyncStatus::first_observation(req, RequestStatus::Matched, Utc::now());
        store.insert_sync_status(&row).await.unwrap();

        let to_arriving = TransitionRequest::new(req, RequestStatus::Arriving);
        let stale = store
            .advance_sync_status(RequestStatus::Pending, &to_arriving)
            .await
            .unwrap();
        assert!(stale.is_none());

        let advanced = store
            .advance_sync_status(RequestStatus::Matched, &to_arriving)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(advanced.current_status, RequestStatus::Arriving);
        assert_eq!(advanced.previous_status, Some(RequestStatus::Matched));
    }

    #[tokio::test]
    async fn second_insert_does_not_overwrite() {
        let store = MemoryStore::new();
        let req = request();
        let first = RoleSyncStatus::first_observation(req, RequestStatus::Matched, Utc::now());
        let second = RoleSyncStatus::first_observation(req, RequestStatus::Arriving, Utc::now());
        assert!(store.insert_sync_status(&first).await.unwrap().is_some());
        assert!(store.insert_sync_status(&second).await.unwrap().is_none());
        let stored = store.get_sync_status(&req).await.unwrap().unwrap();
        assert_eq!(stored.current_status, RequestStatus::Matched);
    }

    #[tokio::test]
    async fn reassign_bumps_version_once() {
        let store = MemoryStore::new();
        let req = request();
        store.seed_assignment(req, Some(1)).await;
        let input = Reassign {
            new_assignee_id: 2,
            reason: None,
            notes: None,
        };
        let won = store.compare_and_reassign(&req, 0, &input).await.unwrap().unwrap();
        assert_eq!(won.version, 1);
        assert!(store.compare_and_reassign(&req, 0, &input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expiry_only_touches_sent_records() {
        let store = MemoryStore::new();
        let new = NewDeliveryRecord {
            recipient_id: Some(1),
            notification_type: "job_update".into(),
            title: "t".into(),
            body: None,
            silent: false,
            request_id: None,
            data: serde_json::json!({}),
        };
        let pending = store.insert_pending_delivery(&new).await.unwrap();
        let sent = store.insert_pending_delivery(&new).await.unwrap();
        store
            .transition_delivery(
                sent.id,
                &[DeliveryStatus::Pending],
                &DeliveryUpdate {
                    to: DeliveryStatus::Sent,
                    error_message: None,
                    delivered_at: None,
                    latency_ms: Some(3),
                },
            )
            .await
            .unwrap();

        let expired = store
            .expire_sent_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(expired, 1);
        let pending = store.get_delivery(pending.id).await.unwrap().unwrap();
        assert_eq!(pending.status, DeliveryStatus::Pending);
    }
}
