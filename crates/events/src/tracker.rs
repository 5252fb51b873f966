//! Per-request sync status tracking.
//!
//! [`SyncStatusTracker`] owns the lifecycle of sync rows: creating them on
//! the first observed transition, advancing them along the status graph,
//! recording per-role acknowledgments, and counting sync failures. Every
//! state change appends one cross-role event.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tandem_core::access::{AccessGate, Principal};
use tandem_core::cross_role::{CrossRoleEvent, EventCategory, NewCrossRoleEvent};
use tandem_core::error::CoreError;
use tandem_core::roles::Role;
use tandem_core::service::{validate_transition, RequestRef, RequestStatus};
use tandem_core::sync::{AckRole, RoleSyncStatus, TransitionRequest};
use tandem_core::types::{DbId, Timestamp};

use crate::error::EngineError;
use crate::event_log::CrossRoleEventLog;
use crate::retry::RetryPolicy;
use crate::store::{SyncStatusStore, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// Event type appended when only the location of a request changed.
pub const EVENT_LOCATION_UPDATED: &str = "location_updated";

/// Event type appended when a role acknowledges the current state.
pub const EVENT_SYNC_ACKNOWLEDGED: &str = "sync_acknowledged";

/// Event type appended when a sync attempt failed.
pub const EVENT_SYNC_FAILED: &str = "sync_failed";

/// The result of observing a transition.
#[derive(Debug, Clone)]
pub struct Observation {
    pub status: RoleSyncStatus,
    /// The event appended for this observation; `None` if nothing changed
    /// (or the append failed, which is logged).
    pub event: Option<CrossRoleEvent>,
}

/// What a single observation attempt did to the row.
enum Outcome {
    Created(RoleSyncStatus),
    Advanced(RoleSyncStatus),
    Relocated(RoleSyncStatus),
    Unchanged(RoleSyncStatus),
}

pub struct SyncStatusTracker {
    store: Arc<dyn SyncStatusStore>,
    events: Arc<CrossRoleEventLog>,
    retry: RetryPolicy,
}

impl SyncStatusTracker {
    pub fn new(
        store: Arc<dyn SyncStatusStore>,
        events: Arc<CrossRoleEventLog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            events,
            retry,
        }
    }

    /// Record an observed status change and return the updated row.
    pub async fn observe_transition(
        &self,
        transition: TransitionRequest,
    ) -> Result<RoleSyncStatus, EngineError> {
        Ok(self.observe_and_record(transition).await?.status)
    }

    /// Like [`observe_transition`](Self::observe_transition), also returning
    /// the appended event so callers can dispatch notifications for it.
    ///
    /// Illegal moves fail with `InvalidStatusTransition`; the caller may
    /// re-read the row and retry. Re-observing the current status is a no-op.
    pub async fn observe_and_record(
        &self,
        transition: TransitionRequest,
    ) -> Result<Observation, EngineError> {
        transition.validate()?;
        let request = transition.request;
        let transition = &transition;

        let outcome = self
            .retry
            .execute("observe_transition", move || self.try_observe(transition))
            .await
            .inspect_err(|e| match e {
                EngineError::Core(CoreError::InvalidStatusTransition { from, to }) => {
                    tracing::warn!(
                        request = %request,
                        from = %from,
                        to = %to,
                        "Rejected illegal status transition"
                    );
                }
                other => {
                    tracing::error!(request = %request, error = %other, "Failed to observe transition");
                }
            })?;

        let (status, event) = match outcome {
            Outcome::Created(row) | Outcome::Advanced(row) => {
                let event = status_event(&row, transition);
                (row, Some(event))
            }
            Outcome::Relocated(row) => {
                let event = location_event(&row, transition);
                (row, Some(event))
            }
            Outcome::Unchanged(row) => (row, None),
        };

        let event = match event {
            Some(event) => self.append_best_effort(event).await,
            None => None,
        };

        if let Some(event) = &event {
            tracing::info!(
                request = %request,
                status = %status.current_status,
                event_type = %event.event_type,
                "Sync status updated"
            );
        }

        Ok(Observation { status, event })
    }

    /// Mark `role` as having seen the current state.
    ///
    /// Returns `true` if this call changed the row; re-acknowledging is a
    /// successful no-op.
    pub async fn acknowledge(
        &self,
        request: &RequestRef,
        role: AckRole,
        actor_id: DbId,
    ) -> Result<bool, EngineError> {
        let now = Utc::now();
        let changed = self
            .retry
            .execute("acknowledge", move || {
                self.store
                    .acknowledge_sync(request, role, Some(actor_id), now)
            })
            .await?;

        let Some(row) = changed else {
            // Either already acknowledged or no such row.
            if self.store.get_sync_status(request).await?.is_none() {
                return Err(not_found(request).into());
            }
            return Ok(false);
        };

        let event = NewCrossRoleEvent::new(
            EVENT_SYNC_ACKNOWLEDGED,
            EventCategory::Notification,
            role.role(),
        )
        .with_actor(actor_id)
        .with_request(row.request, row.tracking_id.clone())
        .with_data(json!({
            "role": role.as_str(),
            "status": row.current_status,
            "all_acknowledged": row.acks.all_acknowledged(),
        }));
        self.append_best_effort(event).await;

        Ok(true)
    }

    /// Acknowledge the current state as `principal`'s own role.
    pub async fn acknowledge_as(
        &self,
        principal: &Principal,
        request: &RequestRef,
    ) -> Result<bool, EngineError> {
        let role = AckRole::try_from(principal.role)?;
        let row = self.get_for(principal, request).await?;
        AccessGate::ensure_write(principal, &row)?;
        self.acknowledge(request, role, principal.actor_id).await
    }

    /// Count a failed sync attempt and keep its error message.
    pub async fn record_sync_failure(
        &self,
        request: &RequestRef,
        error: &str,
    ) -> Result<RoleSyncStatus, EngineError> {
        let row = self
            .retry
            .execute("record_sync_failure", move || {
                self.store.record_sync_failure(request, error)
            })
            .await?
            .ok_or_else(|| not_found(request))?;

        tracing::warn!(
            request = %request,
            sync_attempts = row.sync_attempts,
            error,
            "Sync failure recorded"
        );

        let event = NewCrossRoleEvent::new(EVENT_SYNC_FAILED, EventCategory::Notification, Role::System)
            .with_request(row.request, row.tracking_id.clone())
            .with_data(json!({
                "error": error,
                "sync_attempts": row.sync_attempts,
            }));
        self.append_best_effort(event).await;

        Ok(row)
    }

    /// The sync row for `request`, if `principal` may read it.
    pub async fn get_for(
        &self,
        principal: &Principal,
        request: &RequestRef,
    ) -> Result<RoleSyncStatus, EngineError> {
        let row = self
            .store
            .get_sync_status(request)
            .await?
            .ok_or_else(|| not_found(request))?;
        AccessGate::ensure_read(principal, &row)?;
        Ok(row)
    }

    /// Sync rows visible to `principal`, most recently updated first.
    pub async fn list_for(
        &self,
        principal: &Principal,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RoleSyncStatus>, EngineError> {
        let participant = (!principal.is_privileged()).then_some(principal.actor_id);
        let limit = tandem_db::clamp_limit(limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
        let rows = self
            .store
            .list_sync_statuses(participant, limit, tandem_db::clamp_offset(offset))
            .await?;
        Ok(AccessGate::filter_readable(principal, rows))
    }

    /// Archive terminal rows untouched since `cutoff`.
    pub async fn archive_terminal(&self, cutoff: Timestamp) -> Result<u64, EngineError> {
        Ok(self.store.archive_terminal_before(cutoff).await?)
    }

    async fn try_observe(&self, transition: &TransitionRequest) -> Result<Outcome, EngineError> {
        let request = &transition.request;
        let current = match self.store.get_sync_status(request).await? {
            Some(row) => row,
            None => {
                let row = RoleSyncStatus::from_transition(transition, Utc::now());
                if let Some(created) = self.store.insert_sync_status(&row).await? {
                    return Ok(Outcome::Created(created));
                }
                // Another observer created the row first.
                self.store
                    .get_sync_status(request)
                    .await?
                    .ok_or_else(|| not_found(request))?
            }
        };

        if current.current_status == transition.new_status {
            return match &transition.location {
                Some(location) if current.location.as_ref() != Some(location) => {
                    let row = self
                        .store
                        .update_sync_location(request, location)
                        .await?
                        .ok_or_else(|| not_found(request))?;
                    Ok(Outcome::Relocated(row))
                }
                _ => Ok(Outcome::Unchanged(current)),
            };
        }

        validate_transition(current.current_status, transition.new_status)?;
        if let Some(row) = self
            .store
            .advance_sync_status(current.current_status, transition)
            .await?
        {
            return Ok(Outcome::Advanced(row));
        }

        // Lost a race with a concurrent transition: re-read once.
        let latest = self
            .store
            .get_sync_status(request)
            .await?
            .ok_or_else(|| not_found(request))?;
        if latest.current_status == transition.new_status {
            return Ok(Outcome::Unchanged(latest));
        }
        validate_transition(latest.current_status, transition.new_status)?;
        self.store
            .advance_sync_status(latest.current_status, transition)
            .await?
            .map(Outcome::Advanced)
            .ok_or_else(|| {
                CoreError::Conflict(format!("Sync row for {request} changed concurrently")).into()
            })
    }

    /// Append an event whose state change has already been committed.
    ///
    /// A failure here is logged and swallowed: the row is authoritative and
    /// re-running the state change would not append the event again.
    async fn append_best_effort(&self, event: NewCrossRoleEvent) -> Option<CrossRoleEvent> {
        let event_type = event.event_type.clone();
        let event = &event;
        match self
            .retry
            .execute("append_event", move || self.events.append(event.clone()))
            .await
        {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::error!(event_type = %event_type, error = %e, "Failed to append cross-role event");
                None
            }
        }
    }
}

fn not_found(request: &RequestRef) -> CoreError {
    CoreError::NotFound {
        entity: "sync status",
        id: request.to_string(),
    }
}

/// The role that caused a transition, inferred from the reporting actor.
fn source_of(row: &RoleSyncStatus, actor_id: Option<DbId>) -> Role {
    match actor_id {
        Some(id) if row.provider_id == Some(id) => Role::Provider,
        Some(id) if row.customer_id == Some(id) => Role::Customer,
        _ => Role::System,
    }
}

/// Common request payload for events about `row`.
fn request_data(row: &RoleSyncStatus, transition: &TransitionRequest) -> Value {
    let mut data = json!({
        "service_type": row.request.service_type,
        "request_id": row.request.request_id,
        "tracking_id": row.tracking_id,
        "customer_id": row.customer_id,
        "provider_id": row.provider_id,
        "current_status": row.current_status,
        "previous_status": row.previous_status,
    });
    if let Some(location) = &row.location {
        data["location"] = json!(location);
    }
    if let (Some(Value::Object(extra)), Value::Object(target)) = (&transition.data, &mut data) {
        for (key, value) in extra {
            target.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    data
}

fn status_event(row: &RoleSyncStatus, transition: &TransitionRequest) -> NewCrossRoleEvent {
    let source = source_of(row, transition.actor_id);
    let status = row.current_status;
    let (target_role, target_actor) = match status {
        RequestStatus::Pending => (Role::Provider, row.provider_id),
        RequestStatus::Completed | RequestStatus::Cancelled if source == Role::Customer => {
            (Role::Provider, row.provider_id)
        }
        _ => (Role::Customer, row.customer_id),
    };

    let mut event = NewCrossRoleEvent::new(status.event_type(), EventCategory::StatusChange, source)
        .with_target(target_role, target_actor)
        .with_request(row.request, row.tracking_id.clone())
        .with_data(request_data(row, transition));
    if let Some(actor_id) = transition.actor_id {
        event = event.with_actor(actor_id);
    }
    event
}

fn location_event(row: &RoleSyncStatus, transition: &TransitionRequest) -> NewCrossRoleEvent {
    let source = source_of(row, transition.actor_id);
    let mut event = NewCrossRoleEvent::new(EVENT_LOCATION_UPDATED, EventCategory::Location, source)
        .with_target(Role::Customer, row.customer_id)
        .with_request(row.request, row.tracking_id.clone())
        .with_data(request_data(row, transition));
    if let Some(actor_id) = transition.actor_id {
        event = event.with_actor(actor_id);
    }
    event
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use assert_matches::assert_matches;
    use tandem_core::cross_role::EventQuery;
    use tandem_core::service::ServiceType;
    use tandem_core::sync::Location;
    use uuid::Uuid;

    struct Harness {
        tracker: SyncStatusTracker,
        events: Arc<CrossRoleEventLog>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(CrossRoleEventLog::new(store.clone()));
        let tracker = SyncStatusTracker::new(store, events.clone(), RetryPolicy::no_retry());
        Harness { tracker, events }
    }

    fn ride() -> RequestRef {
        RequestRef::new(ServiceType::Ride, Uuid::new_v4())
    }

    fn matched(request: RequestRef) -> TransitionRequest {
        TransitionRequest::new(request, RequestStatus::Matched)
            .with_participants(Some(10), Some(20))
    }

    async fn event_count(h: &Harness) -> usize {
        h.events.recent(EventQuery::recent(100)).await.unwrap().len()
    }

    #[tokio::test]
    async fn first_observation_creates_row_and_event() {
        let h = harness();
        let req = ride();
        let obs = h.tracker.observe_and_record(matched(req)).await.unwrap();

        assert_eq!(obs.status.current_status, RequestStatus::Matched);
        assert_eq!(obs.status.previous_status, Some(RequestStatus::Pending));
        let event = obs.event.unwrap();
        assert_eq!(event.event_type, "job_accepted");
        assert_eq!(event.event_category, EventCategory::StatusChange);
        assert_eq!(event.target_actor_id, Some(10));
    }

    #[tokio::test]
    async fn repeated_status_is_a_no_op() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();
        let obs = h.tracker.observe_and_record(matched(req)).await.unwrap();
        assert!(obs.event.is_none());
        assert_eq!(event_count(&h).await, 1);
    }

    #[tokio::test]
    async fn same_status_with_new_location_logs_location_event() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();

        let location = Location {
            lat: 52.5,
            lng: 13.4,
            updated_at: Utc::now(),
        };
        let obs = h
            .tracker
            .observe_and_record(matched(req).with_location(location))
            .await
            .unwrap();
        assert_eq!(obs.status.location, Some(location));
        assert_eq!(obs.event.unwrap().event_category, EventCategory::Location);
        assert_eq!(obs.status.current_status, RequestStatus::Matched);
    }

    #[tokio::test]
    async fn backward_and_skipping_moves_are_rejected() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();

        let skip = TransitionRequest::new(req, RequestStatus::InProgress);
        assert_matches!(
            h.tracker.observe_transition(skip).await,
            Err(EngineError::Core(CoreError::InvalidStatusTransition { .. }))
        );

        let back = TransitionRequest::new(req, RequestStatus::Pending);
        assert_matches!(
            h.tracker.observe_transition(back).await,
            Err(EngineError::Core(CoreError::InvalidStatusTransition { .. }))
        );

        let row = h.tracker.get_for(&Principal::system(), &req).await.unwrap();
        assert_eq!(row.current_status, RequestStatus::Matched);
    }

    #[tokio::test]
    async fn cancel_is_reachable_until_terminal() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();
        let cancelled = h
            .tracker
            .observe_transition(TransitionRequest::new(req, RequestStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(cancelled.previous_status, Some(RequestStatus::Matched));

        assert!(h
            .tracker
            .observe_transition(TransitionRequest::new(req, RequestStatus::Arriving))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn acknowledgment_is_idempotent_and_reset_by_transition() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();

        assert!(h.tracker.acknowledge(&req, AckRole::Customer, 10).await.unwrap());
        assert!(!h.tracker.acknowledge(&req, AckRole::Customer, 10).await.unwrap());
        // One transition event plus one acknowledgment event.
        assert_eq!(event_count(&h).await, 2);

        let advanced = h
            .tracker
            .observe_transition(TransitionRequest::new(req, RequestStatus::Arriving))
            .await
            .unwrap();
        assert!(!advanced.acks.customer.is_acknowledged());
    }

    #[tokio::test]
    async fn concurrent_acknowledgments_converge() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();

        let (a, b) = tokio::join!(
            h.tracker.acknowledge(&req, AckRole::Provider, 20),
            h.tracker.acknowledge(&req, AckRole::Provider, 20),
        );
        let changed = [a.unwrap(), b.unwrap()];
        assert_eq!(changed.iter().filter(|c| **c).count(), 1);

        let row = h.tracker.get_for(&Principal::system(), &req).await.unwrap();
        assert!(row.acks.provider.is_acknowledged());
    }

    #[tokio::test]
    async fn acknowledging_unknown_request_is_not_found() {
        let h = harness();
        assert_matches!(
            h.tracker.acknowledge(&ride(), AckRole::Admin, 1).await,
            Err(EngineError::Core(CoreError::NotFound { .. }))
        );
    }

    #[tokio::test]
    async fn sync_failures_are_counted() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();
        h.tracker.record_sync_failure(&req, "push timeout").await.unwrap();
        let row = h.tracker.record_sync_failure(&req, "gateway 503").await.unwrap();
        assert_eq!(row.sync_attempts, 2);
        assert_eq!(row.last_sync_error.as_deref(), Some("gateway 503"));
    }

    #[tokio::test]
    async fn archive_only_touches_terminal_rows() {
        let h = harness();
        let (live, done) = (ride(), ride());
        h.tracker.observe_transition(matched(live)).await.unwrap();
        h.tracker.observe_transition(matched(done)).await.unwrap();
        h.tracker
            .observe_transition(TransitionRequest::new(done, RequestStatus::Cancelled))
            .await
            .unwrap();

        let cutoff = chrono::Utc::now() + chrono::Duration::days(1);
        assert_eq!(h.tracker.archive_terminal(cutoff).await.unwrap(), 1);
        assert_eq!(h.tracker.archive_terminal(cutoff).await.unwrap(), 0);

        let system = Principal::system();
        assert!(h.tracker.get_for(&system, &done).await.unwrap().archived_at.is_some());
        assert!(h.tracker.get_for(&system, &live).await.unwrap().archived_at.is_none());
    }

    #[tokio::test]
    async fn participants_see_only_their_rows() {
        let h = harness();
        h.tracker.observe_transition(matched(ride())).await.unwrap();
        h.tracker
            .observe_transition(
                TransitionRequest::new(ride(), RequestStatus::Matched)
                    .with_participants(Some(11), Some(21)),
            )
            .await
            .unwrap();

        let customer = Principal::new(10, Role::Customer);
        let rows = h.tracker.list_for(&customer, 50, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].customer_id, Some(10));

        let admin = Principal::new(1, Role::Admin);
        assert_eq!(h.tracker.list_for(&admin, 50, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn acknowledge_as_rejects_strangers() {
        let h = harness();
        let req = ride();
        h.tracker.observe_transition(matched(req)).await.unwrap();

        let stranger = Principal::new(77, Role::Customer);
        assert_matches!(
            h.tracker.acknowledge_as(&stranger, &req).await,
            Err(EngineError::Core(CoreError::Forbidden(_)))
        );
        let provider = Principal::new(20, Role::Provider);
        assert!(h.tracker.acknowledge_as(&provider, &req).await.unwrap());
    }
}
