//! Notification fan-out for cross-role events.
//!
//! [`NotificationDispatcher::dispatch`] turns one event into per-recipient
//! pushes using a fixed routing table, drops recipients who disabled the
//! event's category, and records every attempt in the delivery log.
//! Critical events page administrators regardless of preferences.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tandem_core::cross_role::{CrossRoleEvent, EventCategory};
use tandem_core::notification::{
    is_critical_event, NewDeliveryRecord, NotificationCategory, NotificationDeliveryRecord,
    PushDelivery, PushPayload, PAYLOAD_CRITICAL_ALERT, PAYLOAD_SILENT_SYNC,
};
use tandem_core::roles::Role;
use tandem_core::sync::RoleSyncStatus;
use tandem_core::types::DbId;

use crate::delivery_log::DeliveryLog;
use crate::preferences::PreferenceStore;
use crate::store::RecipientDirectory;
use crate::transport::{self, PushTransport};

/// A potential recipient of an event's notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub actor_id: DbId,
    pub role: Role,
}

impl Recipient {
    pub fn new(actor_id: DbId, role: Role) -> Self {
        Self { actor_id, role }
    }

    /// The customer and provider currently named on a sync row.
    pub fn participants_of(row: &RoleSyncStatus) -> Vec<Recipient> {
        let customer = row.customer_id.map(|id| Self::new(id, Role::Customer));
        let provider = row.provider_id.map(|id| Self::new(id, Role::Provider));
        customer.into_iter().chain(provider).collect()
    }
}

/// One push the routing table decided to send.
#[derive(Debug, Clone, PartialEq)]
struct PlannedPush {
    recipient_id: DbId,
    /// `None` bypasses preference filtering.
    category: Option<NotificationCategory>,
    payload: PushPayload,
}

pub struct NotificationDispatcher {
    preferences: Arc<PreferenceStore>,
    deliveries: Arc<DeliveryLog>,
    directory: Arc<dyn RecipientDirectory>,
    transport: Arc<dyn PushTransport>,
}

impl NotificationDispatcher {
    pub fn new(
        preferences: Arc<PreferenceStore>,
        deliveries: Arc<DeliveryLog>,
        directory: Arc<dyn RecipientDirectory>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            preferences,
            deliveries,
            directory,
            transport,
        }
    }

    /// Push `event` to the routed subset of `candidates`.
    ///
    /// Returns one delivery record per attempted push. Recipients filtered
    /// out by preference get no record and no transport call. A failure for
    /// one recipient never stops delivery to the others.
    pub async fn dispatch(
        &self,
        event: &CrossRoleEvent,
        candidates: &[Recipient],
    ) -> Vec<NotificationDeliveryRecord> {
        let plan = if is_critical_event(&event.event_type) {
            let administrators = self.administrators(candidates).await;
            critical_plan(event, &administrators)
        } else {
            plan(event, candidates)
        };

        if plan.is_empty() {
            tracing::debug!(event_id = event.id, event_type = %event.event_type, "No notifications routed");
            return Vec::new();
        }

        let request_id = event.request.map(|r| r.request_id);
        let attempts = plan
            .into_iter()
            .map(|push| self.deliver_one(event, push, request_id));
        join_all(attempts).await.into_iter().flatten().collect()
    }

    /// Administrators among `candidates` plus every active administrator in
    /// the directory. A directory failure falls back to the candidates.
    async fn administrators(&self, candidates: &[Recipient]) -> Vec<DbId> {
        let mut ids: BTreeSet<DbId> = candidates
            .iter()
            .filter(|r| r.role == Role::Admin)
            .map(|r| r.actor_id)
            .collect();
        match self.directory.administrator_ids().await {
            Ok(directory) => ids.extend(directory),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load administrators for critical alert");
            }
        }
        ids.into_iter().collect()
    }

    async fn deliver_one(
        &self,
        event: &CrossRoleEvent,
        push: PlannedPush,
        request_id: Option<uuid::Uuid>,
    ) -> Option<NotificationDeliveryRecord> {
        let recipient_id = push.recipient_id;
        let mut lookup_error = None;

        if let Some(category) = push.category {
            match self.preferences.is_enabled(recipient_id, category).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        recipient_id,
                        category = category.as_str(),
                        event_type = %event.event_type,
                        "Notification disabled by preference"
                    );
                    return None;
                }
                Err(e) => lookup_error = Some(format!("Preference lookup failed: {e}")),
            }
        }

        let record = NewDeliveryRecord::for_payload(recipient_id, &push.payload, request_id);
        let pending = match self.deliveries.insert_pending(&record).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(recipient_id, error = %e, "Failed to record push attempt");
                return None;
            }
        };

        if let Some(message) = lookup_error {
            tracing::warn!(recipient_id, error = %message, "Push not sent");
            return Some(self.finish_failed(pending, &message).await);
        }

        let delivery = PushDelivery::from(push.payload);
        let started = Instant::now();
        let sent = transport::deliver(self.transport.as_ref(), recipient_id, &delivery).await;
        let latency_ms = started.elapsed().as_millis() as i64;

        match sent {
            Ok(()) => {
                tracing::info!(
                    recipient_id,
                    delivery_id = pending.id,
                    kind = %delivery.payload().kind,
                    silent = delivery.is_silent(),
                    latency_ms,
                    "Push sent"
                );
                match self.deliveries.mark_sent(pending.id, Some(latency_ms)).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::error!(delivery_id = pending.id, error = %e, "Failed to mark push sent");
                        Some(pending)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    recipient_id,
                    delivery_id = pending.id,
                    kind = %delivery.payload().kind,
                    error = %e,
                    "Push failed"
                );
                Some(self.finish_failed(pending, &e.to_string()).await)
            }
        }
    }

    async fn finish_failed(
        &self,
        pending: NotificationDeliveryRecord,
        message: &str,
    ) -> NotificationDeliveryRecord {
        match self.deliveries.mark_failed(pending.id, message).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(delivery_id = pending.id, error = %e, "Failed to mark push failed");
                pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

fn critical_plan(event: &CrossRoleEvent, administrators: &[DbId]) -> Vec<PlannedPush> {
    let message = data_str(event, "message")
        .unwrap_or("Immediate attention required")
        .to_string();
    let payload = PushPayload::visible(
        PAYLOAD_CRITICAL_ALERT,
        format!("Critical alert: {}", event.event_type),
        message,
        base_data(event),
    );
    administrators
        .iter()
        .map(|id| PlannedPush {
            recipient_id: *id,
            category: None,
            payload: payload.clone(),
        })
        .collect()
}

/// Route a non-critical event to `candidates`.
fn plan(event: &CrossRoleEvent, candidates: &[Recipient]) -> Vec<PlannedPush> {
    let service = event
        .request
        .map(|r| r.service_type.as_str())
        .unwrap_or("service");
    let data = base_data(event);

    let visible = |roles: &[Role], category, title: String, body: String, data: Value| {
        let payload = PushPayload::visible(event.event_type.clone(), title, body, data);
        to_roles(candidates, roles, Some(category), &payload)
    };

    match event.event_type.as_str() {
        "job_requested" | "new_job" => visible(
            &[Role::Provider],
            NotificationCategory::NewJob,
            "New job request".into(),
            format!("A new {service} request is available"),
            data,
        ),
        "job_accepted" => visible(
            &[Role::Customer],
            NotificationCategory::JobUpdate,
            "Request accepted".into(),
            format!("A provider accepted your {service} request"),
            data,
        ),
        "provider_arriving" => visible(
            &[Role::Customer],
            NotificationCategory::JobUpdate,
            "Provider on the way".into(),
            "Your provider is heading to you".into(),
            data,
        ),
        "provider_arrived" => visible(
            &[Role::Customer],
            NotificationCategory::JobUpdate,
            "Provider arrived".into(),
            "Your provider has arrived".into(),
            data,
        ),
        "job_started" => visible(
            &[Role::Customer],
            NotificationCategory::JobUpdate,
            "Job started".into(),
            format!("Your {service} is in progress"),
            data,
        ),
        "job_completed" => {
            let mut pushes = visible(
                &[Role::Customer],
                NotificationCategory::JobUpdate,
                "Job completed".into(),
                format!("Your {service} is complete"),
                with_field(&data, event, "fare"),
            );
            pushes.extend(visible(
                &[Role::Provider],
                NotificationCategory::Earnings,
                "Earnings added".into(),
                format!("You completed a {service} job"),
                with_field(&data, event, "earnings"),
            ));
            pushes
        }
        "job_cancelled" => visible(
            &[Role::Customer, Role::Provider],
            NotificationCategory::JobUpdate,
            "Job cancelled".into(),
            format!("The {service} request was cancelled"),
            data,
        ),
        "payment_received" | "payout_sent" => visible(
            &[Role::Provider],
            NotificationCategory::Earnings,
            "Payment received".into(),
            "A payment was credited to your account".into(),
            data,
        ),
        "promotion" => visible(
            &[Role::Customer],
            NotificationCategory::Promotions,
            data_str(event, "title").unwrap_or("Special offer").into(),
            data_str(event, "body").unwrap_or("A new promotion is available").into(),
            data,
        ),
        "system_announcement" => visible(
            &[Role::Customer, Role::Provider, Role::Admin, Role::System],
            NotificationCategory::SystemAnnouncements,
            data_str(event, "title").unwrap_or("Announcement").into(),
            data_str(event, "body").unwrap_or_default().into(),
            data,
        ),
        _ if is_silent_route(event) => {
            let payload = PushPayload::silent_sync(data);
            candidates
                .iter()
                .filter(|r| Some(r.actor_id) != event.source_actor_id)
                .map(|r| r.actor_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|recipient_id| PlannedPush {
                    recipient_id,
                    category: Some(NotificationCategory::JobUpdate),
                    payload: payload.clone(),
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

fn is_silent_route(event: &CrossRoleEvent) -> bool {
    event.event_type == PAYLOAD_SILENT_SYNC
        || matches!(
            event.event_category,
            EventCategory::StatusChange | EventCategory::Location
        )
}

/// One push per distinct candidate holding one of `roles`.
fn to_roles(
    candidates: &[Recipient],
    roles: &[Role],
    category: Option<NotificationCategory>,
    payload: &PushPayload,
) -> Vec<PlannedPush> {
    candidates
        .iter()
        .filter(|r| roles.contains(&r.role))
        .map(|r| r.actor_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|recipient_id| PlannedPush {
            recipient_id,
            category,
            payload: payload.clone(),
        })
        .collect()
}

/// Data shared by every push about `event`.
fn base_data(event: &CrossRoleEvent) -> Value {
    let mut data = Map::new();
    data.insert("event_id".into(), json!(event.id));
    data.insert("event_type".into(), json!(event.event_type));
    if let Some(request) = event.request {
        data.insert("service_type".into(), json!(request.service_type));
        data.insert("request_id".into(), json!(request.request_id));
    }
    if let Some(tracking_id) = &event.tracking_id {
        data.insert("tracking_id".into(), json!(tracking_id));
    }
    for key in ["current_status", "previous_status"] {
        if let Some(value) = event.event_data.get(key) {
            data.insert(key.into(), value.clone());
        }
    }
    Value::Object(data)
}

fn with_field(base: &Value, event: &CrossRoleEvent, key: &str) -> Value {
    let mut data = base.clone();
    if let (Some(value), Value::Object(map)) = (event.event_data.get(key), &mut data) {
        map.insert(key.to_string(), value.clone());
    }
    data
}

fn data_str<'a>(event: &'a CrossRoleEvent, key: &str) -> Option<&'a str> {
    event.event_data.get(key).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
