//! Service requests as observed by this core: type, identity, and the legal
//! status graph.
//!
//! The request itself is owned by the matching/pricing subsystem. Only the
//! transition rules live here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// ServiceType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Ride,
    Delivery,
    Shopping,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ride => "ride",
            Self::Delivery => "delivery",
            Self::Shopping => "shopping",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "ride" => Ok(Self::Ride),
            "delivery" => Ok(Self::Delivery),
            "shopping" => Ok(Self::Shopping),
            other => Err(CoreError::Validation(format!(
                "Unknown service type '{other}'. Must be one of: ride, delivery, shopping"
            ))),
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one service request across every table in this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestRef {
    pub service_type: ServiceType,
    pub request_id: Uuid,
}

impl RequestRef {
    pub fn new(service_type: ServiceType, request_id: Uuid) -> Self {
        Self {
            service_type,
            request_id,
        }
    }
}

impl std::fmt::Display for RequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service_type, self.request_id)
    }
}

// ---------------------------------------------------------------------------
// RequestStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a service request, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Matched,
    Arriving,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        Self::Pending,
        Self::Matched,
        Self::Arriving,
        Self::Arrived,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Arriving => "arriving",
            Self::Arrived => "arrived",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| CoreError::Validation(format!("Unknown request status '{name}'")))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The single forward successor, if any. `cancelled` is not a successor;
    /// it is reachable separately from every non-terminal state.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Matched),
            Self::Matched => Some(Self::Arriving),
            Self::Arriving => Some(Self::Arrived),
            Self::Arrived => Some(Self::InProgress),
            Self::InProgress => Some(Self::Completed),
            Self::Completed | Self::Cancelled => None,
        }
    }

    /// The forward predecessor. `None` for `pending` and `cancelled`.
    pub fn predecessor(self) -> Option<Self> {
        match self {
            Self::Pending | Self::Cancelled => None,
            Self::Matched => Some(Self::Pending),
            Self::Arriving => Some(Self::Matched),
            Self::Arrived => Some(Self::Arriving),
            Self::InProgress => Some(Self::Arrived),
            Self::Completed => Some(Self::InProgress),
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Cancelled || self.next() == Some(to)
    }

    /// The cross-role event type emitted when a request enters this status.
    pub fn event_type(self) -> &'static str {
        match self {
            Self::Pending => "job_requested",
            Self::Matched => "job_accepted",
            Self::Arriving => "provider_arriving",
            Self::Arrived => "provider_arrived",
            Self::InProgress => "job_started",
            Self::Completed => "job_completed",
            Self::Cancelled => "job_cancelled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a transition against the status graph.
pub fn validate_transition(from: RequestStatus, to: RequestStatus) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidStatusTransition { from, to })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn forward_chain_is_legal() {
        let mut status = RequestStatus::Pending;
        while let Some(next) = status.next() {
            assert!(status.can_transition_to(next), "{status} -> {next}");
            status = next;
        }
        assert_eq!(status, RequestStatus::Completed);
    }

    #[test]
    fn cancel_is_reachable_from_every_non_terminal_state() {
        for status in RequestStatus::ALL {
            assert_eq!(
                status.can_transition_to(RequestStatus::Cancelled),
                !status.is_terminal()
            );
        }
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert_matches!(
            validate_transition(RequestStatus::Arrived, RequestStatus::Matched),
            Err(CoreError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn skipping_intermediate_states_is_rejected() {
        assert!(!RequestStatus::Matched.can_transition_to(RequestStatus::InProgress));
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Completed));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for to in RequestStatus::ALL {
            assert!(!RequestStatus::Completed.can_transition_to(to));
            assert!(!RequestStatus::Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn predecessor_inverts_next() {
        for status in RequestStatus::ALL {
            if let Some(next) = status.next() {
                assert_eq!(next.predecessor(), Some(status));
            }
        }
    }

    #[test]
    fn status_names_parse() {
        assert_eq!(
            RequestStatus::from_name("in_progress").unwrap(),
            RequestStatus::InProgress
        );
        assert!(RequestStatus::from_name("teleported").is_err());
        assert_eq!(ServiceType::from_name("shopping").unwrap(), ServiceType::Shopping);
    }
}
