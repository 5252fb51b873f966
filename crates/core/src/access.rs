//! Row-level access rules.
//!
//! Non-privileged principals see only rows they own. Administrators (and
//! internal services) see every sync row, event, and preference. The
//! delivery log is administrator-only for every operation, including for the
//! recipient a record names.

use serde::{Deserialize, Serialize};

use crate::cross_role::CrossRoleEvent;
use crate::error::CoreError;
use crate::notification::{NotificationDeliveryRecord, NotificationPreference};
use crate::roles::Role;
use crate::sync::RoleSyncStatus;
use crate::types::DbId;

/// The identity an operation is performed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor_id: DbId,
    pub role: Role,
}

impl Principal {
    pub fn new(actor_id: DbId, role: Role) -> Self {
        Self { actor_id, role }
    }

    /// The identity used by background services.
    pub fn system() -> Self {
        Self {
            actor_id: 0,
            role: Role::System,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }
}

/// Who a row belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Readable and writable by these actors and by privileged principals.
    Owners(Vec<DbId>),
    /// Readable and writable only by privileged principals.
    AdminOnly,
}

/// Implemented by every row type the gate guards.
pub trait Scoped {
    fn scope(&self) -> AccessScope;
}

impl Scoped for RoleSyncStatus {
    fn scope(&self) -> AccessScope {
        AccessScope::Owners(self.participants())
    }
}

impl Scoped for CrossRoleEvent {
    fn scope(&self) -> AccessScope {
        AccessScope::Owners(self.involved_actors())
    }
}

impl Scoped for NotificationPreference {
    fn scope(&self) -> AccessScope {
        AccessScope::Owners(vec![self.recipient_id])
    }
}

impl Scoped for NotificationDeliveryRecord {
    fn scope(&self) -> AccessScope {
        AccessScope::AdminOnly
    }
}

/// Recipient-scoped resources addressed by id before any row exists
/// (e.g. preferences of a recipient that has none yet).
pub struct RecipientScope(pub DbId);

impl Scoped for RecipientScope {
    fn scope(&self) -> AccessScope {
        AccessScope::Owners(vec![self.0])
    }
}

/// The delivery log as a whole.
pub struct DeliveryLogScope;

impl Scoped for DeliveryLogScope {
    fn scope(&self) -> AccessScope {
        AccessScope::AdminOnly
    }
}

// ---------------------------------------------------------------------------
// AccessGate
// ---------------------------------------------------------------------------

/// Stateless access checks applied in front of every store-backed component.
pub struct AccessGate;

impl AccessGate {
    pub fn can_read(principal: &Principal, row: &impl Scoped) -> bool {
        Self::allowed(principal, row)
    }

    /// Read and write share the same rule today.
    pub fn can_write(principal: &Principal, row: &impl Scoped) -> bool {
        Self::allowed(principal, row)
    }

    pub fn ensure_read(principal: &Principal, row: &impl Scoped) -> Result<(), CoreError> {
        if Self::can_read(principal, row) {
            Ok(())
        } else {
            Err(Self::denied(principal, "read"))
        }
    }

    pub fn ensure_write(principal: &Principal, row: &impl Scoped) -> Result<(), CoreError> {
        if Self::can_write(principal, row) {
            Ok(())
        } else {
            Err(Self::denied(principal, "write"))
        }
    }

    /// Drop every row `principal` may not read.
    pub fn filter_readable<T: Scoped>(principal: &Principal, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .filter(|row| Self::can_read(principal, row))
            .collect()
    }

    fn allowed(principal: &Principal, row: &impl Scoped) -> bool {
        match row.scope() {
            AccessScope::AdminOnly => principal.is_privileged(),
            AccessScope::Owners(owners) => {
                principal.is_privileged() || owners.contains(&principal.actor_id)
            }
        }
    }

    fn denied(principal: &Principal, op: &str) -> CoreError {
        CoreError::Forbidden(format!(
            "{} {} may not {op} this resource",
            principal.role, principal.actor_id
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::DeliveryStatus;
    use crate::service::{RequestRef, RequestStatus, ServiceType};
    use chrono::Utc;
    use uuid::Uuid;

    fn sync_row(customer: DbId, provider: DbId) -> RoleSyncStatus {
        let mut row = RoleSyncStatus::first_observation(
            RequestRef::new(ServiceType::Delivery, Uuid::new_v4()),
            RequestStatus::Matched,
            Utc::now(),
        );
        row.customer_id = Some(customer);
        row.provider_id = Some(provider);
        row
    }

    fn delivery(recipient: DbId) -> NotificationDeliveryRecord {
        NotificationDeliveryRecord {
            id: 1,
            recipient_id: Some(recipient),
            notification_type: "job_update".into(),
            title: "t".into(),
            body: None,
            silent: false,
            request_id: None,
            data: serde_json::json!({}),
            status: DeliveryStatus::Sent,
            error_message: None,
            sent_at: Utc::now(),
            delivered_at: None,
            latency_ms: None,
        }
    }

    #[test]
    fn participants_read_their_own_sync_rows_only() {
        let row = sync_row(1, 2);
        assert!(AccessGate::can_read(&Principal::new(1, Role::Customer), &row));
        assert!(AccessGate::can_read(&Principal::new(2, Role::Provider), &row));
        assert!(!AccessGate::can_read(&Principal::new(3, Role::Customer), &row));
        assert!(AccessGate::can_write(&Principal::new(99, Role::Admin), &row));
    }

    #[test]
    fn delivery_log_is_admin_only_even_for_its_recipient() {
        let record = delivery(5);
        assert!(!AccessGate::can_read(&Principal::new(5, Role::Customer), &record));
        assert!(!AccessGate::can_write(&Principal::new(5, Role::Provider), &record));
        assert!(AccessGate::can_read(&Principal::new(1, Role::Admin), &record));
    }

    #[test]
    fn filter_drops_foreign_rows() {
        let rows = vec![sync_row(1, 2), sync_row(3, 4), sync_row(1, 4)];
        let visible = AccessGate::filter_readable(&Principal::new(1, Role::Customer), rows);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|r| r.customer_id == Some(1)));
    }

    #[test]
    fn ensure_write_reports_forbidden() {
        let err = AccessGate::ensure_write(&Principal::new(2, Role::Customer), &RecipientScope(1))
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}
