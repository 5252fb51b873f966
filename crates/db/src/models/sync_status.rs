//! `role_sync_status` rows.

use sqlx::FromRow;
use tandem_core::error::CoreError;
use tandem_core::service::{RequestRef, RequestStatus, ServiceType};
use tandem_core::sync::{AckState, Location, RoleAcks, RoleSyncStatus};
use tandem_core::types::{DbId, Timestamp};
use uuid::Uuid;

/// A row from the `role_sync_status` table, with acknowledgments stored as
/// flat `(synced, synced_at, actor_id)` column triples.
#[derive(Debug, Clone, FromRow)]
pub struct SyncStatusRow {
    pub id: DbId,
    pub service_type: String,
    pub request_id: Uuid,
    pub tracking_id: Option<String>,
    pub customer_id: Option<DbId>,
    pub provider_id: Option<DbId>,
    pub current_status: String,
    pub previous_status: Option<String>,
    pub customer_synced: bool,
    pub customer_synced_at: Option<Timestamp>,
    pub customer_actor_id: Option<DbId>,
    pub provider_synced: bool,
    pub provider_synced_at: Option<Timestamp>,
    pub provider_actor_id: Option<DbId>,
    pub admin_synced: bool,
    pub admin_synced_at: Option<Timestamp>,
    pub admin_actor_id: Option<DbId>,
    pub last_lat: Option<f64>,
    pub last_lng: Option<f64>,
    pub location_updated_at: Option<Timestamp>,
    pub sync_attempts: i32,
    pub last_sync_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub archived_at: Option<Timestamp>,
}

impl SyncStatusRow {
    pub fn into_domain(self) -> Result<RoleSyncStatus, CoreError> {
        let location = match (self.last_lat, self.last_lng, self.location_updated_at) {
            (Some(lat), Some(lng), Some(updated_at)) => Some(Location {
                lat,
                lng,
                updated_at,
            }),
            _ => None,
        };

        Ok(RoleSyncStatus {
            request: RequestRef::new(ServiceType::from_name(&self.service_type)?, self.request_id),
            tracking_id: self.tracking_id,
            customer_id: self.customer_id,
            provider_id: self.provider_id,
            current_status: RequestStatus::from_name(&self.current_status)?,
            previous_status: self
                .previous_status
                .as_deref()
                .map(RequestStatus::from_name)
                .transpose()?,
            acks: RoleAcks {
                customer: AckState::from_columns(
                    self.customer_synced,
                    self.customer_synced_at,
                    self.customer_actor_id,
                )?,
                provider: AckState::from_columns(
                    self.provider_synced,
                    self.provider_synced_at,
                    self.provider_actor_id,
                )?,
                admin: AckState::from_columns(
                    self.admin_synced,
                    self.admin_synced_at,
                    self.admin_actor_id,
                )?,
            },
            location,
            sync_attempts: u32::try_from(self.sync_attempts).map_err(|_| {
                CoreError::Internal(format!("negative sync_attempts {}", self.sync_attempts))
            })?,
            last_sync_error: self.last_sync_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            archived_at: self.archived_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row() -> SyncStatusRow {
        let now = Utc::now();
        SyncStatusRow {
            id: 1,
            service_type: "ride".into(),
            request_id: Uuid::new_v4(),
            tracking_id: Some("TRK-1".into()),
            customer_id: Some(10),
            provider_id: None,
            current_status: "matched".into(),
            previous_status: Some("pending".into()),
            customer_synced: true,
            customer_synced_at: Some(now),
            customer_actor_id: Some(10),
            provider_synced: false,
            provider_synced_at: None,
            provider_actor_id: None,
            admin_synced: false,
            admin_synced_at: None,
            admin_actor_id: None,
            last_lat: Some(1.5),
            last_lng: Some(2.5),
            location_updated_at: Some(now),
            sync_attempts: 2,
            last_sync_error: Some("timeout".into()),
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    #[test]
    fn converts_flat_ack_columns_to_tagged_state() {
        let status = row().into_domain().unwrap();
        assert!(status.acks.customer.is_acknowledged());
        assert!(!status.acks.provider.is_acknowledged());
        assert_eq!(status.previous_status, Some(RequestStatus::Pending));
        assert_eq!(status.location.map(|l| l.lat), Some(1.5));
        assert_eq!(status.sync_attempts, 2);
    }

    #[test]
    fn partial_location_is_dropped() {
        let mut r = row();
        r.last_lng = None;
        assert!(r.into_domain().unwrap().location.is_none());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut r = row();
        r.current_status = "lost".into();
        assert!(r.into_domain().is_err());
    }
}
