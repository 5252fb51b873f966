//! Wiring for the engine components.
//!
//! [`Engine`] builds every component over one shared store and exposes the
//! composite flows used by both the HTTP surface and the sync worker.

use std::sync::Arc;

use serde::Serialize;
use tandem_core::cross_role::{CrossRoleEvent, NewCrossRoleEvent};
use tandem_core::notification::NotificationDeliveryRecord;
use tandem_core::sync::{RoleSyncStatus, TransitionRequest};

use crate::config::EngineConfig;
use crate::delivery_log::DeliveryLog;
use crate::dispatcher::{NotificationDispatcher, Recipient};
use crate::error::EngineError;
use crate::event_log::CrossRoleEventLog;
use crate::preferences::PreferenceStore;
use crate::reassign::Reassignment;
use crate::retry::RetryPolicy;
use crate::store::{
    AssignmentStore, DeliveryLogStore, EventStore, PreferenceBackend, RecipientDirectory,
    SyncStatusStore,
};
use crate::tracker::SyncStatusTracker;
use crate::transport::{LogTransport, PushTransport, TransportError, WebhookTransport};

/// A store that backs every engine component.
pub trait EngineStore:
    SyncStatusStore
    + EventStore
    + PreferenceBackend
    + DeliveryLogStore
    + AssignmentStore
    + RecipientDirectory
    + 'static
{
}

impl<T> EngineStore for T where
    T: SyncStatusStore
        + EventStore
        + PreferenceBackend
        + DeliveryLogStore
        + AssignmentStore
        + RecipientDirectory
        + 'static
{
}

/// Result of processing one observed transition end to end.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub status: RoleSyncStatus,
    pub event: Option<CrossRoleEvent>,
    pub deliveries: Vec<NotificationDeliveryRecord>,
}

/// Result of publishing an externally sourced event.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub event: CrossRoleEvent,
    pub deliveries: Vec<NotificationDeliveryRecord>,
}

pub struct Engine {
    pub events: Arc<CrossRoleEventLog>,
    pub tracker: SyncStatusTracker,
    pub preferences: Arc<PreferenceStore>,
    pub deliveries: Arc<DeliveryLog>,
    pub dispatcher: NotificationDispatcher,
    pub reassignment: Reassignment,
}

impl Engine {
    pub fn new<S: EngineStore>(
        store: Arc<S>,
        transport: Arc<dyn PushTransport>,
        retry: RetryPolicy,
    ) -> Self {
        let events = Arc::new(CrossRoleEventLog::new(store.clone()));
        let preferences = Arc::new(PreferenceStore::new(store.clone()));
        let deliveries = Arc::new(DeliveryLog::new(store.clone()));

        Self {
            tracker: SyncStatusTracker::new(store.clone(), events.clone(), retry),
            dispatcher: NotificationDispatcher::new(
                preferences.clone(),
                deliveries.clone(),
                store.clone(),
                transport,
            ),
            reassignment: Reassignment::new(store, events.clone(), retry),
            events,
            preferences,
            deliveries,
        }
    }

    /// Build an engine using the transport and retry policy in `config`.
    pub fn from_config<S: EngineStore>(
        store: Arc<S>,
        config: &EngineConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self::new(store, transport_from_config(config)?, config.retry))
    }

    /// Observe a transition, log its event, and notify the participants.
    pub async fn process_transition(
        &self,
        transition: TransitionRequest,
    ) -> Result<TransitionOutcome, EngineError> {
        let observation = self.tracker.observe_and_record(transition).await?;
        let deliveries = match &observation.event {
            Some(event) => {
                let candidates = Recipient::participants_of(&observation.status);
                self.dispatcher.dispatch(event, &candidates).await
            }
            None => Vec::new(),
        };
        Ok(TransitionOutcome {
            status: observation.status,
            event: observation.event,
            deliveries,
        })
    }

    /// Append an event raised outside the status graph (payments, SOS,
    /// announcements) and dispatch it to `candidates`.
    pub async fn publish(
        &self,
        event: NewCrossRoleEvent,
        candidates: &[Recipient],
    ) -> Result<PublishOutcome, EngineError> {
        let event = self.events.append(event).await?;
        let deliveries = self.dispatcher.dispatch(&event, candidates).await;
        Ok(PublishOutcome { event, deliveries })
    }
}

/// The webhook transport when a gateway URL is configured, otherwise the
/// log-only transport.
pub fn transport_from_config(
    config: &EngineConfig,
) -> Result<Arc<dyn PushTransport>, TransportError> {
    match &config.push_gateway_url {
        Some(url) => {
            tracing::info!(url = %url, "Using webhook push transport");
            Ok(Arc::new(WebhookTransport::new(url.clone())?))
        }
        None => {
            tracing::info!("PUSH_GATEWAY_URL not set, pushes will only be logged");
            Ok(Arc::new(LogTransport))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;
    use tandem_core::cross_role::EventCategory;
    use tandem_core::notification::{DeliveryStatus, NotificationCategory};
    use tandem_core::roles::Role;
    use tandem_core::service::{RequestRef, RequestStatus, ServiceType};
    use uuid::Uuid;

    fn engine(store: &MemoryStore) -> Engine {
        Engine::new(
            Arc::new(store.clone()),
            Arc::new(LogTransport),
            RetryPolicy::no_retry(),
        )
    }

    #[tokio::test]
    async fn transition_notifies_customer() {
        let engine = engine(&MemoryStore::new());
        let request = RequestRef::new(ServiceType::Ride, Uuid::new_v4());
        let outcome = engine
            .process_transition(
                TransitionRequest::new(request, RequestStatus::Matched)
                    .with_participants(Some(10), Some(20)),
            )
            .await
            .unwrap();

        assert_eq!(outcome.event.unwrap().event_type, "job_accepted");
        assert_eq!(outcome.deliveries.len(), 1);
        assert_eq!(outcome.deliveries[0].recipient_id, Some(10));
        assert_eq!(outcome.deliveries[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn repeated_transition_sends_nothing() {
        let engine = engine(&MemoryStore::new());
        let request = RequestRef::new(ServiceType::Ride, Uuid::new_v4());
        let transition = TransitionRequest::new(request, RequestStatus::Matched)
            .with_participants(Some(10), Some(20));
        engine.process_transition(transition.clone()).await.unwrap();
        let again = engine.process_transition(transition).await.unwrap();
        assert!(again.event.is_none());
        assert!(again.deliveries.is_empty());
    }

    #[tokio::test]
    async fn published_sos_reaches_directory_admins_despite_preferences() {
        let store = MemoryStore::new();
        store.add_administrator(1).await;
        let engine = engine(&store);
        engine
            .preferences
            .set(1, NotificationCategory::SystemAnnouncements, false)
            .await
            .unwrap();

        let sos = NewCrossRoleEvent::new("sos_triggered", EventCategory::System, Role::Customer)
            .with_actor(10)
            .with_data(json!({"message": "Customer pressed SOS"}));
        let outcome = engine
            .publish(sos, &[Recipient::new(2, Role::Admin)])
            .await
            .unwrap();

        let mut recipients: Vec<_> = outcome
            .deliveries
            .iter()
            .filter_map(|d| d.recipient_id)
            .collect();
        recipients.sort();
        assert_eq!(recipients, vec![1, 2]);
        assert!(outcome
            .deliveries
            .iter()
            .all(|d| d.notification_type == "critical_alert"));
    }

    #[test]
    fn log_transport_without_gateway() {
        assert!(transport_from_config(&EngineConfig::default()).is_ok());
    }
}
