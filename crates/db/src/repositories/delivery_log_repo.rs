//! Repository for the `push_notification_logs` table.

use sqlx::PgPool;
use tandem_core::notification::{DeliveryQuery, DeliveryStatus, DeliveryUpdate, NewDeliveryRecord};
use tandem_core::types::{DbId, Timestamp};

use crate::models::notification::DeliveryRecordRow;

/// Column list for `push_notification_logs` queries.
const COLUMNS: &str = "id, recipient_id, notification_type, title, body, silent, request_id, \
    data, status, error_message, sent_at, delivered_at, latency_ms";

pub struct DeliveryLogRepo;

impl DeliveryLogRepo {
    /// Insert a record in `pending` state.
    pub async fn insert_pending(
        pool: &PgPool,
        record: &NewDeliveryRecord,
    ) -> Result<DeliveryRecordRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO push_notification_logs \
                (recipient_id, notification_type, title, body, silent, request_id, data, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryRecordRow>(&query)
            .bind(record.recipient_id)
            .bind(&record.notification_type)
            .bind(&record.title)
            .bind(&record.body)
            .bind(record.silent)
            .bind(record.request_id)
            .bind(&record.data)
            .fetch_one(pool)
            .await
    }

    /// Move a record to `update.to` if its current status is in `from`.
    ///
    /// Returns `None` when the record does not exist or is not in one of the
    /// allowed source states.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: &[DeliveryStatus],
        update: &DeliveryUpdate,
    ) -> Result<Option<DeliveryRecordRow>, sqlx::Error> {
        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let query = format!(
            "UPDATE push_notification_logs SET \
                status = $2, \
                error_message = COALESCE($3, error_message), \
                delivered_at = COALESCE($4, delivered_at), \
                latency_ms = COALESCE($5, latency_ms) \
             WHERE id = $1 AND status = ANY($6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryRecordRow>(&query)
            .bind(id)
            .bind(update.to.as_str())
            .bind(&update.error_message)
            .bind(update.delivered_at)
            .bind(update.latency_ms)
            .bind(&from)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<DeliveryRecordRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM push_notification_logs WHERE id = $1");
        sqlx::query_as::<_, DeliveryRecordRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List records newest-first with optional recipient and status filters.
    pub async fn list(
        pool: &PgPool,
        filter: &DeliveryQuery,
    ) -> Result<Vec<DeliveryRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM push_notification_logs \
             WHERE ($1::bigint IS NULL OR recipient_id = $1) \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY sent_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, DeliveryRecordRow>(&query)
            .bind(filter.recipient_id)
            .bind(filter.status.map(DeliveryStatus::as_str))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await
    }

    /// Expire every `sent` record whose `sent_at` is before `cutoff`.
    pub async fn expire_sent_before(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE push_notification_logs SET status = 'expired' \
             WHERE status = 'sent' AND sent_at < $1",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
