//! Per-recipient notification preferences.

use std::sync::Arc;

use chrono::Utc;
use tandem_core::access::{AccessGate, Principal, RecipientScope};
use tandem_core::notification::{NotificationCategory, NotificationPreference};
use tandem_core::types::DbId;

use crate::error::EngineError;
use crate::store::PreferenceBackend;

/// Reads and writes notification preferences.
///
/// Lookups are never cached, so a `set` is visible to the next `is_enabled`.
pub struct PreferenceStore {
    backend: Arc<dyn PreferenceBackend>,
}

impl PreferenceStore {
    pub fn new(backend: Arc<dyn PreferenceBackend>) -> Self {
        Self { backend }
    }

    /// Create one enabled row per category for `recipient_id`. Existing rows
    /// are left as they are, so calling this again changes nothing.
    pub async fn initialize(
        &self,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreference>, EngineError> {
        let inserted = self
            .backend
            .insert_missing_preferences(recipient_id, &NotificationCategory::ALL)
            .await?;
        if inserted > 0 {
            tracing::info!(recipient_id, inserted, "Notification preferences initialized");
        }
        Ok(self.backend.list_preferences(recipient_id).await?)
    }

    /// The stored flag, or `true` when the recipient has no row for
    /// `category`.
    pub async fn is_enabled(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
    ) -> Result<bool, EngineError> {
        let stored = self.backend.get_preference(recipient_id, category).await?;
        Ok(stored.is_none_or(|p| p.enabled))
    }

    pub async fn set(
        &self,
        recipient_id: DbId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<NotificationPreference, EngineError> {
        let preference = self
            .backend
            .upsert_preference(recipient_id, category, enabled)
            .await?;
        tracing::info!(
            recipient_id,
            category = category.as_str(),
            enabled,
            "Notification preference updated"
        );
        Ok(preference)
    }

    /// One entry per category in canonical order. Categories without a row
    /// are reported with their enabled default.
    pub async fn get_preferences(
        &self,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreference>, EngineError> {
        let stored = self.backend.list_preferences(recipient_id).await?;
        let now = Utc::now();
        Ok(NotificationCategory::ALL
            .into_iter()
            .map(|category| {
                stored
                    .iter()
                    .find(|p| p.category == category)
                    .cloned()
                    .unwrap_or(NotificationPreference {
                        recipient_id,
                        category,
                        enabled: true,
                        created_at: now,
                        updated_at: now,
                    })
            })
            .collect())
    }

    pub async fn initialize_as(
        &self,
        principal: &Principal,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreference>, EngineError> {
        AccessGate::ensure_write(principal, &RecipientScope(recipient_id))?;
        self.initialize(recipient_id).await
    }

    pub async fn get_preferences_as(
        &self,
        principal: &Principal,
        recipient_id: DbId,
    ) -> Result<Vec<NotificationPreference>, EngineError> {
        AccessGate::ensure_read(principal, &RecipientScope(recipient_id))?;
        self.get_preferences(recipient_id).await
    }

    pub async fn is_enabled_as(
        &self,
        principal: &Principal,
        recipient_id: DbId,
        category: NotificationCategory,
    ) -> Result<bool, EngineError> {
        AccessGate::ensure_read(principal, &RecipientScope(recipient_id))?;
        self.is_enabled(recipient_id, category).await
    }

    pub async fn set_as(
        &self,
        principal: &Principal,
        recipient_id: DbId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<NotificationPreference, EngineError> {
        AccessGate::ensure_write(principal, &RecipientScope(recipient_id))?;
        self.set(recipient_id, category, enabled).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
