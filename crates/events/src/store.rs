//! Store ports.
//!
//! Every engine component talks to the shared store through one of these
//! traits. [`PgStore`](crate::pg::PgStore) implements them over PostgreSQL;
//! [`MemoryStore`](crate::memory::MemoryStore) keeps everything in process.
//! Method names are unique across traits so one type can implement all of
//! them without call-site ambiguity.

use async_trait::async_trait;
use tandem_core::cross_role::{CrossRoleEvent, EventQuery, NewCrossRoleEvent};
use tandem_core::notification::{
    DeliveryQuery, DeliveryStatus, DeliveryUpdate, NewDeliveryRecord, NotificationCategory,
    NotificationDeliveryRecord, NotificationPreference,
};
use tandem_core::service::{RequestRef, RequestStatus};
use tandem_core::sync::{AckRole, Location, RoleSyncStatus, TransitionRequest};
use tandem_core::types::{DbId, Timestamp};
use tandem_db::models::assignment::{Assignment, Reassign};

use crate::error::StoreError;

/// Page size used when a caller passes a non-positive limit.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Largest page any list operation returns.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Sync rows, one per observed request.
#[async_trait]
pub trait SyncStatusStore: Send + Sync {
    async fn get_sync_status(
        &self,
        request: &RequestRef,
    ) -> Result<Option<RoleSyncStatus>, StoreError>;

    /// Insert a new row. Returns `None` if a row for the request already
    /// exists; the existing row is left untouched.
    async fn insert_sync_status(
        &self,
        status: &RoleSyncStatus,
    ) -> Result<Option<RoleSyncStatus>, StoreError>;

    /// Compare-and-set advance from `expected` to `transition.new_status`.
    /// Resets acknowledgments. Returns `None` if the row is no longer at
    /// `expected` (or does not exist).
    async fn advance_sync_status(
        &self,
        expected: RequestStatus,
        transition: &TransitionRequest,
    ) -> Result<Option<RoleSyncStatus>, StoreError>;

    async fn update_sync_location(
        &self,
        request: &RequestRef,
        location: &Location,
    ) -> Result<Option<RoleSyncStatus>, StoreError>;

    /// Set `role`'s acknowledgment. Returns the updated row only if this call
    /// changed it.
    async fn acknowledge_sync(
        &self,
        request: &RequestRef,
        role: AckRole,
        actor_id: Option<DbId>,
        at: Timestamp,
    ) -> Result<Option<RoleSyncStatus>, StoreError>;

    async fn record_sync_failure(
        &self,
        request: &RequestRef,
        error: &str,
    ) -> Result<Option<RoleSyncStatus>, StoreError>;

    /// Rows newest-first; `participant` restricts to rows naming that actor.
    async fn list_sync_statuses(
        &self,
        participant: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RoleSyncStatus>, StoreError>;

    async fn archive_terminal_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

/// The append-only cross-role event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_event(&self, event: &NewCrossRoleEvent) -> Result<CrossRoleEvent, StoreError>;

    /// Newest first. `query` is already clamped.
    async fn recent_events(&self, query: &EventQuery) -> Result<Vec<CrossRoleEvent>, StoreError>;
}

/// Per-recipient notification preferences.
#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    /// Insert an enabled row for each listed category that has none.
    /// Returns how many rows were inserted.
    async fn insert_missing_preferences(
        &self,
        recipient_id: DbId,
        categories: &[NotificationCategory],
    ) -> Result<u64, StoreError>;

    async fn get_preference(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPreference>, StoreError>;

    async fn list_preferences(
        &self,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreference>, StoreError>;

    async fn upsert_preference(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<NotificationPreference, StoreError>;
}

/// The push delivery log.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    async fn insert_pending_delivery(
        &self,
        record: &NewDeliveryRecord,
    ) -> Result<NotificationDeliveryRecord, StoreError>;

    /// Apply `update` if the record's status is one of `from`.
    async fn transition_delivery(
        &self,
        id: DbId,
        from: &[DeliveryStatus],
        update: &DeliveryUpdate,
    ) -> Result<Option<NotificationDeliveryRecord>, StoreError>;

    async fn get_delivery(&self, id: DbId)
        -> Result<Option<NotificationDeliveryRecord>, StoreError>;

    async fn list_deliveries(
        &self,
        query: &DeliveryQuery,
    ) -> Result<Vec<NotificationDeliveryRecord>, StoreError>;

    /// Move every `sent` record older than `cutoff` to `expired`.
    async fn expire_sent_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

/// Current provider assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn current_assignment(
        &self,
        request: &RequestRef,
    ) -> Result<Option<Assignment>, StoreError>;

    /// Conditional update on `version`. Returns `None` if another writer won.
    async fn compare_and_reassign(
        &self,
        request: &RequestRef,
        expected_version: i64,
        input: &Reassign,
    ) -> Result<Option<Assignment>, StoreError>;
}

/// Resolves well-known recipient groups.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Every active administrator.
    async fn administrator_ids(&self) -> Result<Vec<DbId>, StoreError>;
}
