//! Repository for the `notification_preferences` table.

use sqlx::PgPool;
use tandem_core::notification::NotificationCategory;
use tandem_core::types::DbId;

use crate::models::notification::NotificationPreferenceRow;

/// Column list for `notification_preferences` queries.
const COLUMNS: &str = "id, recipient_id, category, enabled, created_at, updated_at";

/// Provides CRUD operations for per-category notification preferences.
pub struct NotificationPreferenceRepo;

impl NotificationPreferenceRepo {
    /// List all stored preferences for a recipient.
    pub async fn list_for_recipient(
        pool: &PgPool,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreferenceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_preferences \
             WHERE recipient_id = $1 \
             ORDER BY category"
        );
        sqlx::query_as::<_, NotificationPreferenceRow>(&query)
            .bind(recipient_id)
            .fetch_all(pool)
            .await
    }

    /// Get the preference for one category, if a row exists.
    pub async fn get(
        pool: &PgPool,
        recipient_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPreferenceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_preferences \
             WHERE recipient_id = $1 AND category = $2"
        );
        sqlx::query_as::<_, NotificationPreferenceRow>(&query)
            .bind(recipient_id)
            .bind(category.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Insert an enabled row for each category that has none yet.
    ///
    /// Uses `ON CONFLICT DO NOTHING`, so repeated calls never duplicate or
    /// overwrite existing rows. Returns the number of rows inserted.
    pub async fn insert_missing(
        pool: &PgPool,
        recipient_id: DbId,
        categories: &[NotificationCategory],
    ) -> Result<u64, sqlx::Error> {
        let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
        let result = sqlx::query(
            "INSERT INTO notification_preferences (recipient_id, category, enabled) \
             SELECT $1, category, true FROM UNNEST($2::text[]) AS category \
             ON CONFLICT (recipient_id, category) DO NOTHING",
        )
        .bind(recipient_id)
        .bind(&names)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert or update a single preference.
    ///
    /// Uses `INSERT ... ON CONFLICT (recipient_id, category) DO UPDATE` to
    /// upsert in a single round-trip.
    pub async fn upsert(
        pool: &PgPool,
        recipient_id: DbId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<NotificationPreferenceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_preferences (recipient_id, category, enabled) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (recipient_id, category) DO UPDATE SET \
                enabled = EXCLUDED.enabled, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationPreferenceRow>(&query)
            .bind(recipient_id)
            .bind(category.as_str())
            .bind(enabled)
            .fetch_one(pool)
            .await
    }
}
