//! Repository for the `role_sync_status` table.

use sqlx::PgPool;
use tandem_core::service::{RequestRef, RequestStatus};
use tandem_core::sync::{AckRole, Location, RoleSyncStatus, TransitionRequest};
use tandem_core::types::{DbId, Timestamp};

use crate::models::sync_status::SyncStatusRow;

/// Column list for `role_sync_status` queries.
const COLUMNS: &str = "id, service_type, request_id, tracking_id, customer_id, provider_id, \
    current_status, previous_status, \
    customer_synced, customer_synced_at, customer_actor_id, \
    provider_synced, provider_synced_at, provider_actor_id, \
    admin_synced, admin_synced_at, admin_actor_id, \
    last_lat, last_lng, location_updated_at, \
    sync_attempts, last_sync_error, created_at, updated_at, archived_at";

/// Clears all three acknowledgment triples.
const RESET_ACKS: &str = "customer_synced = false, customer_synced_at = NULL, customer_actor_id = NULL, \
    provider_synced = false, provider_synced_at = NULL, provider_actor_id = NULL, \
    admin_synced = false, admin_synced_at = NULL, admin_actor_id = NULL";

/// Provides row-scoped reads and upserts for sync rows.
pub struct SyncStatusRepo;

impl SyncStatusRepo {
    /// Find the sync row for a request.
    pub async fn find(
        pool: &PgPool,
        request: &RequestRef,
    ) -> Result<Option<SyncStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM role_sync_status \
             WHERE service_type = $1 AND request_id = $2"
        );
        sqlx::query_as::<_, SyncStatusRow>(&query)
            .bind(request.service_type.as_str())
            .bind(request.request_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a freshly observed row.
    ///
    /// Returns `None` when another observer created the row first
    /// (`ON CONFLICT DO NOTHING`).
    pub async fn insert_if_absent(
        pool: &PgPool,
        status: &RoleSyncStatus,
    ) -> Result<Option<SyncStatusRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO role_sync_status \
                (service_type, request_id, tracking_id, customer_id, provider_id, \
                 current_status, previous_status, last_lat, last_lng, location_updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (service_type, request_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncStatusRow>(&query)
            .bind(status.request.service_type.as_str())
            .bind(status.request.request_id)
            .bind(&status.tracking_id)
            .bind(status.customer_id)
            .bind(status.provider_id)
            .bind(status.current_status.as_str())
            .bind(status.previous_status.map(RequestStatus::as_str))
            .bind(status.location.map(|l| l.lat))
            .bind(status.location.map(|l| l.lng))
            .bind(status.location.map(|l| l.updated_at))
            .fetch_optional(pool)
            .await
    }

    /// Advance `current_status` from `expected` to the transition's status.
    ///
    /// Compare-and-set on `current_status`: returns `None` if the row moved
    /// in the meantime. Resets all acknowledgments and merges participant,
    /// tracking, and location details.
    pub async fn advance(
        pool: &PgPool,
        expected: RequestStatus,
        transition: &TransitionRequest,
    ) -> Result<Option<SyncStatusRow>, sqlx::Error> {
        let query = format!(
            "UPDATE role_sync_status SET \
                previous_status = current_status, \
                current_status = $4, \
                {RESET_ACKS}, \
                tracking_id = COALESCE($5, tracking_id), \
                customer_id = COALESCE($6, customer_id), \
                provider_id = COALESCE($7, provider_id), \
                last_lat = COALESCE($8, last_lat), \
                last_lng = COALESCE($9, last_lng), \
                location_updated_at = COALESCE($10, location_updated_at), \
                updated_at = NOW() \
             WHERE service_type = $1 AND request_id = $2 AND current_status = $3 \
             RETURNING {COLUMNS}"
        );
        let location = transition.location;
        sqlx::query_as::<_, SyncStatusRow>(&query)
            .bind(transition.request.service_type.as_str())
            .bind(transition.request.request_id)
            .bind(expected.as_str())
            .bind(transition.new_status.as_str())
            .bind(&transition.tracking_id)
            .bind(transition.customer_id)
            .bind(transition.provider_id)
            .bind(location.map(|l| l.lat))
            .bind(location.map(|l| l.lng))
            .bind(location.map(|l| l.updated_at))
            .fetch_optional(pool)
            .await
    }

    /// Overwrite the last known location without changing status.
    pub async fn update_location(
        pool: &PgPool,
        request: &RequestRef,
        location: &Location,
    ) -> Result<Option<SyncStatusRow>, sqlx::Error> {
        let query = format!(
            "UPDATE role_sync_status SET \
                last_lat = $3, last_lng = $4, location_updated_at = $5, updated_at = NOW() \
             WHERE service_type = $1 AND request_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncStatusRow>(&query)
            .bind(request.service_type.as_str())
            .bind(request.request_id)
            .bind(location.lat)
            .bind(location.lng)
            .bind(location.updated_at)
            .fetch_optional(pool)
            .await
    }

    /// Set one role's acknowledgment if it is not already set.
    ///
    /// Returns the updated row when this call changed it, `None` when the
    /// role was already acknowledged or the row does not exist.
    pub async fn acknowledge(
        pool: &PgPool,
        request: &RequestRef,
        role: AckRole,
        actor_id: Option<DbId>,
        at: Timestamp,
    ) -> Result<Option<SyncStatusRow>, sqlx::Error> {
        let p = role.as_str();
        let query = format!(
            "UPDATE role_sync_status SET \
                {p}_synced = true, {p}_synced_at = $3, {p}_actor_id = $4, updated_at = NOW() \
             WHERE service_type = $1 AND request_id = $2 AND {p}_synced = false \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncStatusRow>(&query)
            .bind(request.service_type.as_str())
            .bind(request.request_id)
            .bind(at)
            .bind(actor_id)
            .fetch_optional(pool)
            .await
    }

    /// Increment `sync_attempts` and store the latest error.
    pub async fn record_failure(
        pool: &PgPool,
        request: &RequestRef,
        error: &str,
    ) -> Result<Option<SyncStatusRow>, sqlx::Error> {
        let query = format!(
            "UPDATE role_sync_status SET \
                sync_attempts = sync_attempts + 1, last_sync_error = $3, updated_at = NOW() \
             WHERE service_type = $1 AND request_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncStatusRow>(&query)
            .bind(request.service_type.as_str())
            .bind(request.request_id)
            .bind(error)
            .fetch_optional(pool)
            .await
    }

    /// List sync rows, newest activity first.
    ///
    /// When `participant` is set, only rows where that actor is the customer
    /// or the provider are returned.
    pub async fn list(
        pool: &PgPool,
        participant: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM role_sync_status \
             WHERE ($1::bigint IS NULL OR customer_id = $1 OR provider_id = $1) \
             ORDER BY updated_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, SyncStatusRow>(&query)
            .bind(participant)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Mark terminal rows untouched since `cutoff` as archived.
    ///
    /// Returns the number of rows archived.
    pub async fn archive_terminal_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE role_sync_status SET archived_at = NOW() \
             WHERE archived_at IS NULL \
               AND current_status IN ('completed', 'cancelled') \
               AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
