//! `request_assignments` rows.

use serde::Serialize;
use sqlx::FromRow;
use tandem_core::types::{DbId, Timestamp};
use uuid::Uuid;

/// The current provider assignment for one request.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Assignment {
    pub service_type: String,
    pub request_id: Uuid,
    pub assignee_id: Option<DbId>,
    /// Incremented on every reassignment; the compare-and-set token.
    pub version: i64,
    pub reassigned_at: Option<Timestamp>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// DTO for a reassignment write.
#[derive(Debug, Clone)]
pub struct Reassign {
    pub new_assignee_id: DbId,
    pub reason: Option<String>,
    pub notes: Option<String>,
}
