//! The push delivery log.
//!
//! Every dispatch attempt writes one record. Records move
//! `pending -> {sent, failed}` when the transport call returns and
//! `sent -> {delivered, expired}` afterwards. The log is administrator-only.

use std::sync::Arc;

use chrono::Utc;
use tandem_core::access::{AccessGate, DeliveryLogScope, Principal};
use tandem_core::error::CoreError;
use tandem_core::notification::{
    DeliveryQuery, DeliveryStatus, DeliveryUpdate, NewDeliveryRecord, NotificationDeliveryRecord,
};
use tandem_core::types::{DbId, Timestamp};

use crate::error::EngineError;
use crate::store::{DeliveryLogStore, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

pub struct DeliveryLog {
    store: Arc<dyn DeliveryLogStore>,
}

impl DeliveryLog {
    pub fn new(store: Arc<dyn DeliveryLogStore>) -> Self {
        Self { store }
    }

    pub async fn insert_pending(
        &self,
        record: &NewDeliveryRecord,
    ) -> Result<NotificationDeliveryRecord, EngineError> {
        Ok(self.store.insert_pending_delivery(record).await?)
    }

    pub async fn mark_sent(
        &self,
        id: DbId,
        latency_ms: Option<i64>,
    ) -> Result<NotificationDeliveryRecord, EngineError> {
        self.transition(
            id,
            DeliveryUpdate {
                to: DeliveryStatus::Sent,
                error_message: None,
                delivered_at: None,
                latency_ms,
            },
        )
        .await
    }

    pub async fn mark_failed(
        &self,
        id: DbId,
        error: &str,
    ) -> Result<NotificationDeliveryRecord, EngineError> {
        self.transition(
            id,
            DeliveryUpdate {
                to: DeliveryStatus::Failed,
                error_message: Some(error.to_string()),
                delivered_at: None,
                latency_ms: None,
            },
        )
        .await
    }

    /// Record the transport's delivery acknowledgment. Latency is measured
    /// from `sent_at`.
    pub async fn mark_delivered(
        &self,
        id: DbId,
        delivered_at: Timestamp,
    ) -> Result<NotificationDeliveryRecord, EngineError> {
        let record = self.find(id).await?;
        let latency_ms = (delivered_at - record.sent_at).num_milliseconds().max(0);
        let updated = self
            .transition(
                id,
                DeliveryUpdate {
                    to: DeliveryStatus::Delivered,
                    error_message: None,
                    delivered_at: Some(delivered_at),
                    latency_ms: Some(latency_ms),
                },
            )
            .await?;
        tracing::debug!(delivery_id = id, latency_ms, "Push delivery acknowledged");
        Ok(updated)
    }

    /// Expire every `sent` record older than `cutoff`.
    pub async fn expire_stale(&self, cutoff: Timestamp) -> Result<u64, EngineError> {
        let expired = self.store.expire_sent_before(cutoff).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired unacknowledged push deliveries");
        }
        Ok(expired)
    }

    pub async fn get_as(
        &self,
        principal: &Principal,
        id: DbId,
    ) -> Result<NotificationDeliveryRecord, EngineError> {
        AccessGate::ensure_read(principal, &DeliveryLogScope)?;
        self.find(id).await
    }

    pub async fn list_as(
        &self,
        principal: &Principal,
        mut query: DeliveryQuery,
    ) -> Result<Vec<NotificationDeliveryRecord>, EngineError> {
        AccessGate::ensure_read(principal, &DeliveryLogScope)?;
        query.limit = tandem_db::clamp_limit(query.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
        query.offset = tandem_db::clamp_offset(query.offset);
        Ok(self.store.list_deliveries(&query).await?)
    }

    pub async fn mark_delivered_as(
        &self,
        principal: &Principal,
        id: DbId,
    ) -> Result<NotificationDeliveryRecord, EngineError> {
        AccessGate::ensure_write(principal, &DeliveryLogScope)?;
        self.mark_delivered(id, Utc::now()).await
    }

    async fn find(&self, id: DbId) -> Result<NotificationDeliveryRecord, EngineError> {
        self.store
            .get_delivery(id)
            .await?
            .ok_or_else(|| not_found(id).into())
    }

    async fn transition(
        &self,
        id: DbId,
        update: DeliveryUpdate,
    ) -> Result<NotificationDeliveryRecord, EngineError> {
        let from: Vec<DeliveryStatus> = DeliveryStatus::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(update.to))
            .collect();

        if let Some(record) = self.store.transition_delivery(id, &from, &update).await? {
            return Ok(record);
        }

        let current = self.find(id).await?;
        Err(CoreError::Validation(format!(
            "Delivery {id} cannot move from {} to {}",
            current.status, update.to
        ))
        .into())
    }
}

fn not_found(id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "delivery record",
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use serde_json::json;
    use tandem_core::notification::PushPayload;
    use tandem_core::roles::Role;

    fn log() -> DeliveryLog {
        DeliveryLog::new(Arc::new(MemoryStore::new()))
    }

    async fn pending(log: &DeliveryLog, recipient: DbId) -> NotificationDeliveryRecord {
        let payload = PushPayload::visible("job_update", "Driver arriving", "2 min", json!({}));
        log.insert_pending(&NewDeliveryRecord::for_payload(recipient, &payload, None))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sent_then_delivered_records_latency() {
        let log = log();
        let record = pending(&log, 5).await;
        assert_eq!(record.status, DeliveryStatus::Pending);

        log.mark_sent(record.id, Some(12)).await.unwrap();
        let delivered_at = record.sent_at + Duration::milliseconds(250);
        let delivered = log.mark_delivered(record.id, delivered_at).await.unwrap();

        assert_eq!(delivered.status, DeliveryStatus::Delivered);
        assert_eq!(delivered.delivered_at, Some(delivered_at));
        assert_eq!(delivered.latency_ms, Some(250));
    }

    #[tokio::test]
    async fn illegal_moves_are_invalid_input() {
        let log = log();
        let record = pending(&log, 5).await;

        assert_matches!(
            log.mark_delivered(record.id, Utc::now()).await,
            Err(EngineError::Core(CoreError::Validation(_)))
        );

        log.mark_failed(record.id, "gateway 503").await.unwrap();
        assert_matches!(
            log.mark_sent(record.id, None).await,
            Err(EngineError::Core(CoreError::Validation(_)))
        );
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        assert_matches!(
            log().mark_sent(404, None).await,
            Err(EngineError::Core(CoreError::NotFound { .. }))
        );
    }

    #[tokio::test]
    async fn expire_stale_moves_only_old_sent_records() {
        let log = log();
        let sent = pending(&log, 1).await;
        log.mark_sent(sent.id, None).await.unwrap();
        let still_pending = pending(&log, 2).await;

        let expired = log
            .expire_stale(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let admin = Principal::new(1, Role::Admin);
        assert_eq!(
            log.get_as(&admin, sent.id).await.unwrap().status,
            DeliveryStatus::Expired
        );
        assert_eq!(
            log.get_as(&admin, still_pending.id).await.unwrap().status,
            DeliveryStatus::Pending
        );
    }

    #[tokio::test]
    async fn recipients_cannot_read_their_own_records() {
        let log = log();
        let record = pending(&log, 5).await;
        let recipient = Principal::new(5, Role::Customer);

        assert_matches!(
            log.get_as(&recipient, record.id).await,
            Err(EngineError::Core(CoreError::Forbidden(_)))
        );
        assert_matches!(
            log.list_as(&recipient, DeliveryQuery::default()).await,
            Err(EngineError::Core(CoreError::Forbidden(_)))
        );
        assert_matches!(
            log.mark_delivered_as(&recipient, record.id).await,
            Err(EngineError::Core(CoreError::Forbidden(_)))
        );

        let admin = Principal::new(1, Role::Admin);
        assert_eq!(log.list_as(&admin, DeliveryQuery::default()).await.unwrap().len(), 1);
    }
}
