//! Repository for the `request_assignments` table.

use sqlx::PgPool;
use tandem_core::service::RequestRef;

use crate::models::assignment::{Assignment, Reassign};

/// Column list for `request_assignments` queries.
const COLUMNS: &str =
    "service_type, request_id, assignee_id, version, reassigned_at, reason, notes";

pub struct AssignmentRepo;

impl AssignmentRepo {
    pub async fn find(
        pool: &PgPool,
        request: &RequestRef,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM request_assignments \
             WHERE service_type = $1 AND request_id = $2"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(request.service_type.as_str())
            .bind(request.request_id)
            .fetch_optional(pool)
            .await
    }

    /// Replace the assignee if the row is still at `expected_version`.
    ///
    /// Returns `None` when a concurrent writer bumped the version first.
    pub async fn compare_and_reassign(
        pool: &PgPool,
        request: &RequestRef,
        expected_version: i64,
        input: &Reassign,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        let query = format!(
            "UPDATE request_assignments SET \
                assignee_id = $4, \
                reason = $5, \
                notes = $6, \
                version = version + 1, \
                reassigned_at = NOW(), \
                updated_at = NOW() \
             WHERE service_type = $1 AND request_id = $2 AND version = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(request.service_type.as_str())
            .bind(request.request_id)
            .bind(expected_version)
            .bind(input.new_assignee_id)
            .bind(&input.reason)
            .bind(&input.notes)
            .fetch_optional(pool)
            .await
    }
}
