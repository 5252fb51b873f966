//! Per-request synchronization state ("sync rows").
//!
//! Each role's acknowledgment is a single tagged value, so a row can never
//! claim `synced = true` without a timestamp or carry a timestamp while
//! unsynced.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::roles::Role;
use crate::service::{RequestRef, RequestStatus};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Acknowledgment
// ---------------------------------------------------------------------------

/// The three roles that acknowledge a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckRole {
    Customer,
    Provider,
    Admin,
}

impl AckRole {
    pub const ALL: [AckRole; 3] = [Self::Customer, Self::Provider, Self::Admin];

    pub fn as_str(self) -> &'static str {
        self.role().as_str()
    }

    pub fn role(self) -> Role {
        match self {
            Self::Customer => Role::Customer,
            Self::Provider => Role::Provider,
            Self::Admin => Role::Admin,
        }
    }
}

impl TryFrom<Role> for AckRole {
    type Error = CoreError;

    fn try_from(role: Role) -> Result<Self, Self::Error> {
        match role {
            Role::Customer => Ok(Self::Customer),
            Role::Provider => Ok(Self::Provider),
            Role::Admin => Ok(Self::Admin),
            Role::System => Err(CoreError::Validation(
                "The system role does not acknowledge sync state".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AckState {
    #[default]
    NotAcknowledged,
    Acknowledged {
        at: Timestamp,
        actor_id: Option<DbId>,
    },
}

impl AckState {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }

    /// Rebuild from the flat `(synced, synced_at, actor_id)` storage triple.
    ///
    /// `synced = true` without a timestamp is rejected; a stray timestamp on
    /// an unsynced row is ignored.
    pub fn from_columns(
        synced: bool,
        synced_at: Option<Timestamp>,
        actor_id: Option<DbId>,
    ) -> Result<Self, CoreError> {
        match (synced, synced_at) {
            (true, Some(at)) => Ok(Self::Acknowledged { at, actor_id }),
            (true, None) => Err(CoreError::Internal(
                "sync row marked synced without synced_at".into(),
            )),
            (false, _) => Ok(Self::NotAcknowledged),
        }
    }
}

/// Acknowledgment state of all three roles for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleAcks {
    pub customer: AckState,
    pub provider: AckState,
    pub admin: AckState,
}

impl RoleAcks {
    pub fn get(&self, role: AckRole) -> &AckState {
        match role {
            AckRole::Customer => &self.customer,
            AckRole::Provider => &self.provider,
            AckRole::Admin => &self.admin,
        }
    }

    pub fn get_mut(&mut self, role: AckRole) -> &mut AckState {
        match role {
            AckRole::Customer => &mut self.customer,
            AckRole::Provider => &mut self.provider,
            AckRole::Admin => &mut self.admin,
        }
    }

    /// Mark `role` acknowledged. Returns `false` when it already was; the
    /// first acknowledgment's timestamp and actor are kept.
    pub fn acknowledge(&mut self, role: AckRole, actor_id: Option<DbId>, at: Timestamp) -> bool {
        let slot = self.get_mut(role);
        if slot.is_acknowledged() {
            return false;
        }
        *slot = AckState::Acknowledged { at, actor_id };
        true
    }

    pub fn all_acknowledged(&self) -> bool {
        AckRole::ALL.iter().all(|r| self.get(*r).is_acknowledged())
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub updated_at: Timestamp,
}

impl Location {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(CoreError::Validation(format!(
                "Location ({}, {}) is out of range",
                self.lat, self.lng
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TransitionRequest
// ---------------------------------------------------------------------------

/// An observed status change reported by the matching/pricing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub request: RequestRef,
    pub new_status: RequestStatus,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<DbId>,
    #[serde(default)]
    pub provider_id: Option<DbId>,
    #[serde(default)]
    pub location: Option<Location>,
    /// Actor that caused the change, when known (e.g. the accepting provider).
    #[serde(default)]
    pub actor_id: Option<DbId>,
    /// Opaque request data forwarded into the event (fare, earnings, ...).
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl TransitionRequest {
    pub fn new(request: RequestRef, new_status: RequestStatus) -> Self {
        Self {
            request,
            new_status,
            tracking_id: None,
            customer_id: None,
            provider_id: None,
            location: None,
            actor_id: None,
            data: None,
        }
    }

    pub fn with_participants(mut self, customer_id: Option<DbId>, provider_id: Option<DbId>) -> Self {
        self.customer_id = customer_id;
        self.provider_id = provider_id;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(location) = &self.location {
            location.validate()?;
        }
        if self.tracking_id.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(CoreError::Validation("tracking_id must not be blank".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RoleSyncStatus
// ---------------------------------------------------------------------------

/// One sync row per observed service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSyncStatus {
    pub request: RequestRef,
    pub tracking_id: Option<String>,
    pub customer_id: Option<DbId>,
    pub provider_id: Option<DbId>,
    pub current_status: RequestStatus,
    pub previous_status: Option<RequestStatus>,
    pub acks: RoleAcks,
    pub location: Option<Location>,
    pub sync_attempts: u32,
    pub last_sync_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub archived_at: Option<Timestamp>,
}

impl RoleSyncStatus {
    /// The row created by the first observed transition of a request.
    pub fn from_transition(transition: &TransitionRequest, now: Timestamp) -> Self {
        let mut row = Self::first_observation(transition.request, transition.new_status, now);
        row.tracking_id = transition.tracking_id.clone();
        row.customer_id = transition.customer_id;
        row.provider_id = transition.provider_id;
        row.location = transition.location;
        row
    }

    /// A fresh row for the first observation of `status`.
    ///
    /// `previous_status` is the forward predecessor of the observed status,
    /// since the row is only ever created by a transition into it.
    pub fn first_observation(request: RequestRef, status: RequestStatus, now: Timestamp) -> Self {
        Self {
            request,
            tracking_id: None,
            customer_id: None,
            provider_id: None,
            current_status: status,
            previous_status: status.predecessor(),
            acks: RoleAcks::default(),
            location: None,
            sync_attempts: 0,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    /// Shift `current_status` into `previous_status` and reset every role's
    /// acknowledgment for the new state.
    pub fn advance(&mut self, to: RequestStatus, now: Timestamp) {
        self.previous_status = Some(self.current_status);
        self.current_status = to;
        self.acks = RoleAcks::default();
        self.updated_at = now;
    }

    /// Advance to `transition.new_status`, filling in any participant,
    /// tracking, or location details it carries.
    pub fn apply_transition(&mut self, transition: &TransitionRequest, now: Timestamp) {
        self.advance(transition.new_status, now);
        self.merge_details(transition);
    }

    pub fn merge_details(&mut self, transition: &TransitionRequest) {
        if transition.tracking_id.is_some() {
            self.tracking_id = transition.tracking_id.clone();
        }
        self.customer_id = transition.customer_id.or(self.customer_id);
        self.provider_id = transition.provider_id.or(self.provider_id);
        if transition.location.is_some() {
            self.location = transition.location;
        }
    }

    /// Actor ids that own this row for access purposes.
    pub fn participants(&self) -> Vec<DbId> {
        self.customer_id.into_iter().chain(self.provider_id).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
