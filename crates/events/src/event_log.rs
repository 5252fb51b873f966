//! The cross-role event log.
//!
//! [`CrossRoleEventLog`] appends to the durable store and then broadcasts the
//! stored event to live subscribers. There is no update or delete path.
//! Readers either page through [`recent`](CrossRoleEventLog::recent) or hold
//! a [`Subscription`] for the live feed.

use std::sync::Arc;

use tandem_core::access::{AccessGate, Principal};
use tandem_core::cross_role::{CrossRoleEvent, EventQuery, NewCrossRoleEvent};
use tokio::sync::broadcast;

use crate::error::EngineError;
use crate::store::EventStore;

/// Default buffer capacity for the live feed.
const DEFAULT_LIVE_CAPACITY: usize = 256;

pub struct CrossRoleEventLog {
    store: Arc<dyn EventStore>,
    live: broadcast::Sender<CrossRoleEvent>,
}

impl CrossRoleEventLog {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::with_capacity(store, DEFAULT_LIVE_CAPACITY)
    }

    /// When the live buffer is full, the oldest unread events are dropped
    /// and slow subscribers skip ahead.
    pub fn with_capacity(store: Arc<dyn EventStore>, capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity);
        Self { store, live }
    }

    /// Validate required fields and append. Returns the stored event.
    pub async fn append(&self, event: NewCrossRoleEvent) -> Result<CrossRoleEvent, EngineError> {
        event.validate()?;
        let stored = self.store.append_event(&event).await?;
        tracing::debug!(
            event_id = stored.id,
            event_type = %stored.event_type,
            category = stored.event_category.as_str(),
            "Cross-role event appended"
        );
        // A send error only means there are no live subscribers.
        let _ = self.live.send(stored.clone());
        Ok(stored)
    }

    /// Newest-first page of events matching `query`.
    pub async fn recent(&self, query: EventQuery) -> Result<Vec<CrossRoleEvent>, EngineError> {
        Ok(self.store.recent_events(&query.clamped()).await?)
    }

    /// [`recent`](Self::recent) restricted to what `principal` may read.
    ///
    /// Non-privileged principals are scoped to events naming them, so paging
    /// stays dense instead of returning filtered-out holes.
    pub async fn recent_for(
        &self,
        principal: &Principal,
        mut query: EventQuery,
    ) -> Result<Vec<CrossRoleEvent>, EngineError> {
        if !principal.is_privileged() {
            query.involving_actor = Some(principal.actor_id);
        }
        let events = self.recent(query).await?;
        Ok(AccessGate::filter_readable(principal, events))
    }

    /// Subscribe to every event appended from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: Some(self.live.subscribe()),
            principal: None,
        }
    }

    /// Subscribe to events `principal` may read.
    pub fn subscribe_as(&self, principal: Principal) -> Subscription {
        Subscription {
            receiver: Some(self.live.subscribe()),
            principal: Some(principal),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// An owned handle on the live event feed.
///
/// Dropping the handle or calling [`close`](Self::close) unsubscribes.
pub struct Subscription {
    receiver: Option<broadcast::Receiver<CrossRoleEvent>>,
    principal: Option<Principal>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the subscription is
    /// closed or the log has been dropped.
    pub async fn recv(&mut self) -> Option<CrossRoleEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) => {
                    let readable = self
                        .principal
                        .as_ref()
                        .is_none_or(|p| AccessGate::can_read(p, &event));
                    if readable {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscription lagged, some events were skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.receiver = None;
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use tandem_core::cross_role::EventCategory;
    use tandem_core::roles::Role;
    use tandem_core::service::{RequestRef, ServiceType};
    use uuid::Uuid;

    fn log() -> CrossRoleEventLog {
        CrossRoleEventLog::new(Arc::new(MemoryStore::new()))
    }

    fn accepted(provider: i64, customer: i64) -> NewCrossRoleEvent {
        NewCrossRoleEvent::new("job_accepted", EventCategory::StatusChange, Role::Provider)
            .with_actor(provider)
            .with_target(Role::Customer, Some(customer))
            .with_request(RequestRef::new(ServiceType::Ride, Uuid::new_v4()), None)
    }

    #[tokio::test]
    async fn append_rejects_missing_required_fields() {
        let log = log();
        let missing_actor =
            NewCrossRoleEvent::new("job_accepted", EventCategory::StatusChange, Role::Provider);
        assert!(log.append(missing_actor).await.is_err());
        assert!(log.recent(EventQuery::recent(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_filtered() {
        let log = log();
        log.append(accepted(1, 2)).await.unwrap();
        log.append(
            NewCrossRoleEvent::new("payout_sent", EventCategory::Payment, Role::System)
                .with_target(Role::Provider, Some(1)),
        )
        .await
        .unwrap();
        log.append(accepted(3, 4)).await.unwrap();

        let all = log.recent(EventQuery::recent(10)).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));

        let payments = log
            .recent(EventQuery {
                category: Some(EventCategory::Payment),
                ..EventQuery::recent(10)
            })
            .await
            .unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].event_type, "payout_sent");
    }

    #[tokio::test]
    async fn non_admins_only_see_their_own_events() {
        let log = log();
        log.append(accepted(1, 2)).await.unwrap();
        log.append(accepted(3, 4)).await.unwrap();

        let customer = Principal::new(2, Role::Customer);
        let mine = log.recent_for(&customer, EventQuery::recent(10)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].target_actor_id, Some(2));

        let admin = Principal::new(99, Role::Admin);
        assert_eq!(log.recent_for(&admin, EventQuery::recent(10)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn subscription_receives_readable_events_until_closed() {
        let log = log();
        let mut all = log.subscribe();
        let mut scoped = log.subscribe_as(Principal::new(4, Role::Customer));

        log.append(accepted(1, 2)).await.unwrap();
        log.append(accepted(3, 4)).await.unwrap();

        assert_eq!(all.recv().await.unwrap().source_actor_id, Some(1));
        assert_eq!(scoped.recv().await.unwrap().source_actor_id, Some(3));

        all.close();
        assert!(all.is_closed());
        assert!(all.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscription_ends_when_log_is_dropped() {
        let log = log();
        let mut sub = log.subscribe();
        drop(log);
        assert!(sub.recv().await.is_none());
    }
}
