//! Repository for the `administrators` table.

use sqlx::PgPool;
use tandem_core::types::DbId;

pub struct AdministratorRepo;

impl AdministratorRepo {
    /// Actor ids of every active administrator, in ascending order.
    pub async fn list_active_ids(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT actor_id FROM administrators WHERE is_active = true ORDER BY actor_id",
        )
        .fetch_all(pool)
        .await
    }
}
