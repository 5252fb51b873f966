//! Repository for the append-only `cross_role_events` table.
//!
//! There is deliberately no update or delete method; the table also rejects
//! both at the trigger level.

use sqlx::PgPool;
use tandem_core::cross_role::{EventQuery, NewCrossRoleEvent};
use tandem_core::roles::Role;

use crate::models::cross_role_event::CrossRoleEventRow;

/// Column list for `cross_role_events` queries.
const COLUMNS: &str = "id, event_type, event_category, source_role, source_actor_id, \
    target_role, target_actor_id, service_type, request_id, tracking_id, \
    event_data, metadata, processed, created_at";

pub struct CrossRoleEventRepo;

impl CrossRoleEventRepo {
    /// Insert a new event, returning the stored row.
    pub async fn insert(
        pool: &PgPool,
        event: &NewCrossRoleEvent,
    ) -> Result<CrossRoleEventRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO cross_role_events \
                (event_type, event_category, source_role, source_actor_id, \
                 target_role, target_actor_id, service_type, request_id, tracking_id, \
                 event_data, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CrossRoleEventRow>(&query)
            .bind(&event.event_type)
            .bind(event.event_category.as_str())
            .bind(event.source_role.as_str())
            .bind(event.source_actor_id)
            .bind(event.target_role.map(Role::as_str))
            .bind(event.target_actor_id)
            .bind(event.request.map(|r| r.service_type.as_str()))
            .bind(event.request.map(|r| r.request_id))
            .bind(&event.tracking_id)
            .bind(&event.event_data)
            .bind(&event.metadata)
            .fetch_one(pool)
            .await
    }

    /// List events newest-first, applying every filter in `filter`.
    ///
    /// `filter` is expected to be clamped by the caller.
    pub async fn list_recent(
        pool: &PgPool,
        filter: &EventQuery,
    ) -> Result<Vec<CrossRoleEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cross_role_events \
             WHERE ($1::text IS NULL OR service_type = $1) \
               AND ($2::text IS NULL OR event_category = $2) \
               AND ($3::timestamptz IS NULL OR created_at < $3) \
               AND ($4::bigint IS NULL OR source_actor_id = $4 OR target_actor_id = $4) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $5 OFFSET $6"
        );
        sqlx::query_as::<_, CrossRoleEventRow>(&query)
            .bind(filter.service_type.map(|s| s.as_str()))
            .bind(filter.category.map(|c| c.as_str()))
            .bind(filter.before)
            .bind(filter.involving_actor)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await
    }
}
