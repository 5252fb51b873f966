//! Notification categories, push payloads, and delivery records.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Payload type that marks a background-sync-only push.
pub const PAYLOAD_SILENT_SYNC: &str = "silent_sync";

/// Payload type used for administrator critical alerts.
pub const PAYLOAD_CRITICAL_ALERT: &str = "critical_alert";

/// Event types that always page administrators, regardless of preferences.
pub const CRITICAL_EVENT_TYPES: &[&str] = &["sos_triggered", "fraud_detected", "system_failure"];

pub fn is_critical_event(event_type: &str) -> bool {
    CRITICAL_EVENT_TYPES.contains(&event_type)
}

// ---------------------------------------------------------------------------
// NotificationCategory
// ---------------------------------------------------------------------------

/// Recipient-controllable notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    NewJob,
    JobUpdate,
    Earnings,
    Promotions,
    SystemAnnouncements,
}

impl NotificationCategory {
    /// The full category set created for every recipient.
    pub const ALL: [NotificationCategory; 5] = [
        Self::NewJob,
        Self::JobUpdate,
        Self::Earnings,
        Self::Promotions,
        Self::SystemAnnouncements,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewJob => "new_job",
            Self::JobUpdate => "job_update",
            Self::Earnings => "earnings",
            Self::Promotions => "promotions",
            Self::SystemAnnouncements => "system_announcements",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| {
                CoreError::Validation(format!("Unknown notification category '{name}'"))
            })
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored `(recipient, category)` preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub recipient_id: DbId,
    pub category: NotificationCategory,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// PushPayload
// ---------------------------------------------------------------------------

/// Wire payload handed to the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PushPayload {
    pub fn visible(
        kind: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            silent: None,
            title: Some(title.into()),
            body: Some(body.into()),
            data,
        }
    }

    pub fn silent_sync(data: serde_json::Value) -> Self {
        Self {
            kind: PAYLOAD_SILENT_SYNC.to_string(),
            silent: Some(true),
            title: None,
            body: None,
            data,
        }
    }

    /// Silent if either marker is present. Title/body never override this.
    pub fn is_silent(&self) -> bool {
        self.silent == Some(true) || self.kind == PAYLOAD_SILENT_SYNC
    }
}

/// A payload after classification. Transports receive exactly one of these,
/// so a silent payload has no path to the visible-alert surface.
#[derive(Debug, Clone, PartialEq)]
pub enum PushDelivery {
    Silent(PushPayload),
    Visible(PushPayload),
}

impl From<PushPayload> for PushDelivery {
    fn from(payload: PushPayload) -> Self {
        if payload.is_silent() {
            Self::Silent(payload)
        } else {
            Self::Visible(payload)
        }
    }
}

impl PushDelivery {
    pub fn payload(&self) -> &PushPayload {
        match self {
            Self::Silent(p) | Self::Visible(p) => p,
        }
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Silent(_))
    }
}

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Expired,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        Self::Pending,
        Self::Sent,
        Self::Delivered,
        Self::Failed,
        Self::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| CoreError::Validation(format!("Unknown delivery status '{name}'")))
    }

    /// `pending -> {sent, failed}`, `sent -> {delivered, expired}`.
    /// `failed` is terminal, like `delivered` and `expired`.
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Sent)
                | (Self::Pending, Self::Failed)
                | (Self::Sent, Self::Delivered)
                | (Self::Sent, Self::Expired)
        )
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Delivery records
// ---------------------------------------------------------------------------

/// A row of the push log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDeliveryRecord {
    pub id: DbId,
    pub recipient_id: Option<DbId>,
    pub notification_type: String,
    pub title: String,
    pub body: Option<String>,
    pub silent: bool,
    pub request_id: Option<uuid::Uuid>,
    pub data: serde_json::Value,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub sent_at: Timestamp,
    pub delivered_at: Option<Timestamp>,
    pub latency_ms: Option<i64>,
}

/// Fields for a new `pending` delivery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDeliveryRecord {
    pub recipient_id: Option<DbId>,
    pub notification_type: String,
    pub title: String,
    pub body: Option<String>,
    pub silent: bool,
    pub request_id: Option<uuid::Uuid>,
    pub data: serde_json::Value,
}

impl NewDeliveryRecord {
    pub fn for_payload(
        recipient_id: DbId,
        payload: &PushPayload,
        request_id: Option<uuid::Uuid>,
    ) -> Self {
        Self {
            recipient_id: Some(recipient_id),
            notification_type: payload.kind.clone(),
            title: payload.title.clone().unwrap_or_default(),
            body: payload.body.clone(),
            silent: payload.is_silent(),
            request_id,
            data: payload.data.clone(),
        }
    }
}

/// A status change applied to an existing delivery record.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub to: DeliveryStatus,
    pub error_message: Option<String>,
    pub delivered_at: Option<Timestamp>,
    pub latency_ms: Option<i64>,
}

/// Filters for the administrator delivery log view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryQuery {
    pub limit: i64,
    pub offset: i64,
    pub recipient_id: Option<DbId>,
    pub status: Option<DeliveryStatus>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_contains_five_distinct_categories() {
        let mut names: Vec<_> = NotificationCategory::ALL.iter().map(|c| c.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn silent_markers_dominate_visible_fields() {
        let mut payload = PushPayload::visible("job_update", "Title", "Body", json!({}));
        assert!(!payload.is_silent());

        payload.silent = Some(true);
        assert!(payload.is_silent());

        let mut typed = PushPayload::visible(PAYLOAD_SILENT_SYNC, "Title", "Body", json!({}));
        typed.silent = Some(false);
        assert!(typed.is_silent());
        assert!(PushDelivery::from(typed).is_silent());
    }

    #[test]
    fn payload_wire_shape_uses_type_key() {
        let payload = PushPayload::silent_sync(json!({"request_id": "r"}));
        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["type"], PAYLOAD_SILENT_SYNC);
        assert_eq!(wire["silent"], true);
        assert!(wire.get("title").is_none());
    }

    #[test]
    fn delivery_status_graph() {
        use DeliveryStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Failed));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Expired));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Delivered.can_transition_to(Expired));
    }

    #[test]
    fn failed_is_terminal() {
        for to in DeliveryStatus::ALL {
            assert!(!DeliveryStatus::Failed.can_transition_to(to), "failed -> {to}");
        }
    }

    #[test]
    fn critical_event_types_are_recognized() {
        assert!(is_critical_event("sos_triggered"));
        assert!(!is_critical_event("job_completed"));
    }
}
