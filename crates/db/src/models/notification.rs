//! `notification_preferences` and `push_notification_logs` rows.

use sqlx::FromRow;
use tandem_core::error::CoreError;
use tandem_core::notification::{
    DeliveryStatus, NotificationCategory, NotificationDeliveryRecord, NotificationPreference,
};
use tandem_core::types::{DbId, Timestamp};
use uuid::Uuid;

/// A row from the `notification_preferences` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationPreferenceRow {
    pub id: DbId,
    pub recipient_id: DbId,
    pub category: String,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NotificationPreferenceRow {
    pub fn into_domain(self) -> Result<NotificationPreference, CoreError> {
        Ok(NotificationPreference {
            recipient_id: self.recipient_id,
            category: NotificationCategory::from_name(&self.category)?,
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row from the `push_notification_logs` table.
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRecordRow {
    pub id: DbId,
    pub recipient_id: Option<DbId>,
    pub notification_type: String,
    pub title: String,
    pub body: Option<String>,
    pub silent: bool,
    pub request_id: Option<Uuid>,
    pub data: serde_json::Value,
    pub status: String,
    pub error_message: Option<String>,
    pub sent_at: Timestamp,
    pub delivered_at: Option<Timestamp>,
    pub latency_ms: Option<i64>,
}

impl DeliveryRecordRow {
    pub fn into_domain(self) -> Result<NotificationDeliveryRecord, CoreError> {
        Ok(NotificationDeliveryRecord {
            id: self.id,
            recipient_id: self.recipient_id,
            notification_type: self.notification_type,
            title: self.title,
            body: self.body,
            silent: self.silent,
            request_id: self.request_id,
            data: self.data,
            status: DeliveryStatus::from_name(&self.status)?,
            error_message: self.error_message,
            sent_at: self.sent_at,
            delivered_at: self.delivered_at,
            latency_ms: self.latency_ms,
        })
    }
}
