//! PostgreSQL implementation of the store ports.

use async_trait::async_trait;
use tandem_core::cross_role::{CrossRoleEvent, EventQuery, NewCrossRoleEvent};
use tandem_core::error::CoreError;
use tandem_core::notification::{
    DeliveryQuery, DeliveryStatus, DeliveryUpdate, NewDeliveryRecord, NotificationCategory,
    NotificationDeliveryRecord, NotificationPreference,
};
use tandem_core::service::{RequestRef, RequestStatus};
use tandem_core::sync::{AckRole, Location, RoleSyncStatus, TransitionRequest};
use tandem_core::types::{DbId, Timestamp};
use tandem_db::models::assignment::{Assignment, Reassign};
use tandem_db::models::sync_status::SyncStatusRow;
use tandem_db::repositories::{
    AdministratorRepo, AssignmentRepo, CrossRoleEventRepo, DeliveryLogRepo,
    NotificationPreferenceRepo, SyncStatusRepo,
};
use tandem_db::DbPool;

use crate::error::StoreError;
use crate::store::{
    AssignmentStore, DeliveryLogStore, EventStore, PreferenceBackend, RecipientDirectory,
    SyncStatusStore,
};

/// Store adapter backed by a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn decode<T>(result: Result<T, CoreError>) -> Result<T, StoreError> {
    result.map_err(StoreError::Decode)
}

fn decode_sync(row: Option<SyncStatusRow>) -> Result<Option<RoleSyncStatus>, StoreError> {
    row.map(|r| decode(r.into_domain())).transpose()
}

#[async_trait]
impl SyncStatusStore for PgStore {
    async fn get_sync_status(
        &self,
        request: &RequestRef,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        decode_sync(SyncStatusRepo::find(&self.pool, request).await?)
    }

    async fn insert_sync_status(
        &self,
        status: &RoleSyncStatus,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        decode_sync(SyncStatusRepo::insert_if_absent(&self.pool, status).await?)
    }

    async fn advance_sync_status(
        &self,
        expected: RequestStatus,
        transition: &TransitionRequest,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        decode_sync(SyncStatusRepo::advance(&self.pool, expected, transition).await?)
    }

    async fn update_sync_location(
        &self,
        request: &RequestRef,
        location: &Location,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        decode_sync(SyncStatusRepo::update_location(&self.pool, request, location).await?)
    }

    async fn acknowledge_sync(
        &self,
        request: &RequestRef,
        role: AckRole,
        actor_id: Option<DbId>,
        at: Timestamp,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        decode_sync(SyncStatusRepo::acknowledge(&self.pool, request, role, actor_id, at).await?)
    }

    async fn record_sync_failure(
        &self,
        request: &RequestRef,
        error: &str,
    ) -> Result<Option<RoleSyncStatus>, StoreError> {
        decode_sync(SyncStatusRepo::record_failure(&self.pool, request, error).await?)
    }

    async fn list_sync_statuses(
        &self,
        participant: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RoleSyncStatus>, StoreError> {
        SyncStatusRepo::list(&self.pool, participant, limit, offset)
            .await?
            .into_iter()
            .map(|r| decode(r.into_domain()))
            .collect()
    }

    async fn archive_terminal_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Ok(SyncStatusRepo::archive_terminal_before(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn append_event(&self, event: &NewCrossRoleEvent) -> Result<CrossRoleEvent, StoreError> {
        decode(CrossRoleEventRepo::insert(&self.pool, event).await?.into_domain())
    }

    async fn recent_events(&self, query: &EventQuery) -> Result<Vec<CrossRoleEvent>, StoreError> {
        CrossRoleEventRepo::list_recent(&self.pool, query)
            .await?
            .into_iter()
            .map(|r| decode(r.into_domain()))
            .collect()
    }
}

#[async_trait]
impl PreferenceBackend for PgStore {
    async fn insert_missing_preferences(
        &self,
        recipient_id: DbId,
        categories: &[NotificationCategory],
    ) -> Result<u64, StoreError> {
        Ok(NotificationPreferenceRepo::insert_missing(&self.pool, recipient_id, categories).await?)
    }

    async fn get_preference(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPreference>, StoreError> {
        NotificationPreferenceRepo::get(&self.pool, recipient_id, category)
            .await?
            .map(|r| decode(r.into_domain()))
            .transpose()
    }

    async fn list_preferences(
        &self,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreference>, StoreError> {
        NotificationPreferenceRepo::list_for_recipient(&self.pool, recipient_id)
            .await?
            .into_iter()
            .map(|r| decode(r.into_domain()))
            .collect()
    }

    async fn upsert_preference(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<NotificationPreference, StoreError> {
        let row =
            NotificationPreferenceRepo::upsert(&self.pool, recipient_id, category, enabled).await?;
        decode(row.into_domain())
    }
}

#[async_trait]
impl DeliveryLogStore for PgStore {
    async fn insert_pending_delivery(
        &self,
        record: &NewDeliveryRecord,
    ) -> Result<NotificationDeliveryRecord, StoreError> {
        decode(DeliveryLogRepo::insert_pending(&self.pool, record).await?.into_domain())
    }

    async fn transition_delivery(
        &self,
        id: DbId,
        from: &[DeliveryStatus],
        update: &DeliveryUpdate,
    ) -> Result<Option<NotificationDeliveryRecord>, StoreError> {
        DeliveryLogRepo::transition(&self.pool, id, from, update)
            .await?
            .map(|r| decode(r.into_domain()))
            .transpose()
    }

    async fn get_delivery(
        &self,
        id: DbId,
    ) -> Result<Option<NotificationDeliveryRecord>, StoreError> {
        DeliveryLogRepo::find_by_id(&self.pool, id)
            .await?
            .map(|r| decode(r.into_domain()))
            .transpose()
    }

    async fn list_deliveries(
        &self,
        query: &DeliveryQuery,
    ) -> Result<Vec<NotificationDeliveryRecord>, StoreError> {
        DeliveryLogRepo::list(&self.pool, query)
            .await?
            .into_iter()
            .map(|r| decode(r.into_domain()))
            .collect()
    }

    async fn expire_sent_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Ok(DeliveryLogRepo::expire_sent_before(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn current_assignment(
        &self,
        request: &RequestRef,
    ) -> Result<Option<Assignment>, StoreError> {
        Ok(AssignmentRepo::find(&self.pool, request).await?)
    }

    async fn compare_and_reassign(
        &self,
        request: &RequestRef,
        expected_version: i64,
        input: &Reassign,
    ) -> Result<Option<Assignment>, StoreError> {
        Ok(AssignmentRepo::compare_and_reassign(&self.pool, request, expected_version, input).await?)
    }
}

#[async_trait]
impl RecipientDirectory for PgStore {
    async fn administrator_ids(&self) -> Result<Vec<DbId>, StoreError> {
        Ok(AdministratorRepo::list_active_ids(&self.pool).await?)
    }
}
