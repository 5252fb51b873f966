//! Cross-role events: the append-only audit and dashboard feed.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::roles::Role;
use crate::service::RequestRef;
use crate::types::{DbId, Timestamp};

/// Default page size for event listing.
pub const DEFAULT_EVENT_LIMIT: i64 = 50;

/// Maximum page size for event listing.
pub const MAX_EVENT_LIMIT: i64 = 200;

// ---------------------------------------------------------------------------
// EventCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Booking,
    StatusChange,
    Location,
    Payment,
    Rating,
    Cancellation,
    Notification,
    System,
}

impl EventCategory {
    pub const ALL: [EventCategory; 8] = [
        Self::Booking,
        Self::StatusChange,
        Self::Location,
        Self::Payment,
        Self::Rating,
        Self::Cancellation,
        Self::Notification,
        Self::System,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::StatusChange => "status_change",
            Self::Location => "location",
            Self::Payment => "payment",
            Self::Rating => "rating",
            Self::Cancellation => "cancellation",
            Self::Notification => "notification",
            Self::System => "system",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| CoreError::Validation(format!("Unknown event category '{name}'")))
    }
}

// ---------------------------------------------------------------------------
// CrossRoleEvent
// ---------------------------------------------------------------------------

/// A persisted, immutable cross-role event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRoleEvent {
    pub id: DbId,
    pub event_type: String,
    pub event_category: EventCategory,
    pub source_role: Role,
    pub source_actor_id: Option<DbId>,
    pub target_role: Option<Role>,
    pub target_actor_id: Option<DbId>,
    pub request: Option<RequestRef>,
    pub tracking_id: Option<String>,
    pub event_data: serde_json::Value,
    pub metadata: serde_json::Value,
    pub processed: bool,
    pub created_at: Timestamp,
}

impl CrossRoleEvent {
    /// Actor ids that may see this event without administrator rights.
    pub fn involved_actors(&self) -> Vec<DbId> {
        self.source_actor_id
            .into_iter()
            .chain(self.target_actor_id)
            .collect()
    }
}

/// An event about to be appended.
///
/// Constructed via [`NewCrossRoleEvent::new`] and enriched with the builder
/// methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCrossRoleEvent {
    pub event_type: String,
    pub event_category: EventCategory,
    pub source_role: Role,
    pub source_actor_id: Option<DbId>,
    pub target_role: Option<Role>,
    pub target_actor_id: Option<DbId>,
    pub request: Option<RequestRef>,
    pub tracking_id: Option<String>,
    pub event_data: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl NewCrossRoleEvent {
    pub fn new(event_type: impl Into<String>, category: EventCategory, source_role: Role) -> Self {
        Self {
            event_type: event_type.into(),
            event_category: category,
            source_role,
            source_actor_id: None,
            target_role: None,
            target_actor_id: None,
            request: None,
            tracking_id: None,
            event_data: serde_json::Value::Object(Default::default()),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_actor(mut self, actor_id: DbId) -> Self {
        self.source_actor_id = Some(actor_id);
        self
    }

    pub fn with_target(mut self, role: Role, actor_id: Option<DbId>) -> Self {
        self.target_role = Some(role);
        self.target_actor_id = actor_id;
        self
    }

    pub fn with_request(mut self, request: RequestRef, tracking_id: Option<String>) -> Self {
        self.request = Some(request);
        self.tracking_id = tracking_id;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Required-field presence check performed before every append.
    ///
    /// System-originated events may omit the source actor; every other
    /// source role must name one.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.event_type.trim().is_empty() {
            return Err(CoreError::Validation("event_type must not be empty".into()));
        }
        if self.source_role != Role::System && self.source_actor_id.is_none() {
            return Err(CoreError::Validation(format!(
                "source_actor_id is required for {} events",
                self.source_role
            )));
        }
        if self.target_actor_id.is_some() && self.target_role.is_none() {
            return Err(CoreError::Validation(
                "target_actor_id requires a target_role".into(),
            ));
        }
        Ok(())
    }

    /// Materialize into a stored event (used by stores that assign ids
    /// themselves).
    pub fn into_event(self, id: DbId, created_at: Timestamp) -> CrossRoleEvent {
        CrossRoleEvent {
            id,
            event_type: self.event_type,
            event_category: self.event_category,
            source_role: self.source_role,
            source_actor_id: self.source_actor_id,
            target_role: self.target_role,
            target_actor_id: self.target_actor_id,
            request: self.request,
            tracking_id: self.tracking_id,
            event_data: self.event_data,
            metadata: self.metadata,
            processed: false,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// EventQuery
// ---------------------------------------------------------------------------

/// Filters for listing recent events, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
    pub limit: i64,
    pub offset: i64,
    pub service_type: Option<crate::service::ServiceType>,
    pub category: Option<EventCategory>,
    /// Only events created strictly before this instant.
    pub before: Option<Timestamp>,
    /// Restrict to events whose source or target actor is this id.
    pub involving_actor: Option<DbId>,
}

impl EventQuery {
    pub fn recent(limit: i64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Clamp paging values into the accepted range.
    pub fn clamped(mut self) -> Self {
        self.limit = match self.limit {
            l if l <= 0 => DEFAULT_EVENT_LIMIT,
            l => l.min(MAX_EVENT_LIMIT),
        };
        self.offset = self.offset.max(0);
        self
    }

    /// Whether `event` satisfies every filter (paging aside).
    pub fn matches(&self, event: &CrossRoleEvent) -> bool {
        if let Some(service_type) = self.service_type {
            if event.request.map(|r| r.service_type) != Some(service_type) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.event_category != category {
                return false;
            }
        }
        if let Some(before) = self.before {
            if event.created_at >= before {
                return false;
            }
        }
        if let Some(actor) = self.involving_actor {
            if !event.involved_actors().contains(&actor) {
                return false;
            }
        }
        true
    }
}
