//! `cross_role_events` rows.

use sqlx::FromRow;
use tandem_core::cross_role::{CrossRoleEvent, EventCategory};
use tandem_core::error::CoreError;
use tandem_core::roles::Role;
use tandem_core::service::{RequestRef, ServiceType};
use tandem_core::types::{DbId, Timestamp};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct CrossRoleEventRow {
    pub id: DbId,
    pub event_type: String,
    pub event_category: String,
    pub source_role: String,
    pub source_actor_id: Option<DbId>,
    pub target_role: Option<String>,
    pub target_actor_id: Option<DbId>,
    pub service_type: Option<String>,
    pub request_id: Option<Uuid>,
    pub tracking_id: Option<String>,
    pub event_data: serde_json::Value,
    pub metadata: serde_json::Value,
    pub processed: bool,
    pub created_at: Timestamp,
}

impl CrossRoleEventRow {
    pub fn into_domain(self) -> Result<CrossRoleEvent, CoreError> {
        let request = match (self.service_type.as_deref(), self.request_id) {
            (Some(service_type), Some(request_id)) => Some(RequestRef::new(
                ServiceType::from_name(service_type)?,
                request_id,
            )),
            _ => None,
        };

        Ok(CrossRoleEvent {
            id: self.id,
            event_type: self.event_type,
            event_category: EventCategory::from_name(&self.event_category)?,
            source_role: Role::from_name(&self.source_role)?,
            source_actor_id: self.source_actor_id,
            target_role: self.target_role.as_deref().map(Role::from_name).transpose()?,
            target_actor_id: self.target_actor_id,
            request,
            tracking_id: self.tracking_id,
            event_data: self.event_data,
            metadata: self.metadata,
            processed: self.processed,
            created_at: self.created_at,
        })
    }
}
