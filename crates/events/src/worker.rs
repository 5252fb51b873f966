//! The inbound sync worker.
//!
//! Collaborators report observations by sending [`IntakeMessage`]s through
//! an [`IntakeSender`]. [`SyncWorker::run`] consumes them strictly in order,
//! so two transitions of the same request are never processed concurrently,
//! and periodically runs the delivery expiry and sync archive sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tandem_core::classify::Classify;
use tandem_core::cross_role::NewCrossRoleEvent;
use tandem_core::service::RequestRef;
use tandem_core::sync::{AckRole, TransitionRequest};
use tandem_core::types::{DbId, Timestamp};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::dispatcher::Recipient;
use crate::engine::Engine;
use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Intake channel
// ---------------------------------------------------------------------------

/// One inbound observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakeMessage {
    Transition(TransitionRequest),
    Acknowledge {
        request: RequestRef,
        role: AckRole,
        actor_id: DbId,
    },
    SyncFailure {
        request: RequestRef,
        error: String,
    },
    DeliveryReceipt {
        delivery_id: DbId,
        delivered_at: Timestamp,
    },
    Publish {
        event: NewCrossRoleEvent,
        candidates: Vec<Recipient>,
    },
}

impl IntakeMessage {
    fn kind(&self) -> &'static str {
        match self {
            Self::Transition(_) => "transition",
            Self::Acknowledge { .. } => "acknowledge",
            Self::SyncFailure { .. } => "sync_failure",
            Self::DeliveryReceipt { .. } => "delivery_receipt",
            Self::Publish { .. } => "publish",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Sync worker intake is closed")]
pub struct IntakeClosed(pub IntakeMessage);

/// Cloneable producer side of the intake queue.
#[derive(Debug, Clone)]
pub struct IntakeSender {
    tx: mpsc::Sender<IntakeMessage>,
}

impl IntakeSender {
    /// Enqueue `message`, waiting while the queue is full.
    pub async fn send(&self, message: IntakeMessage) -> Result<(), IntakeClosed> {
        self.tx
            .send(message)
            .await
            .map_err(|mpsc::error::SendError(message)| IntakeClosed(message))
    }
}

/// Consumer side of the intake queue, owned by the worker.
#[derive(Debug)]
pub struct IntakeReceiver {
    rx: mpsc::Receiver<IntakeMessage>,
}

impl IntakeReceiver {
    pub async fn recv(&mut self) -> Option<IntakeMessage> {
        self.rx.recv().await
    }
}

/// A bounded intake queue. Senders wait when it is full.
pub fn intake_channel(capacity: usize) -> (IntakeSender, IntakeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IntakeSender { tx }, IntakeReceiver { rx })
}

/// Forward newline-delimited JSON [`IntakeMessage`]s from `reader` into the
/// intake queue until end of input or until the worker side has closed.
///
/// Blank lines are skipped; malformed lines are logged and skipped. Returns
/// the number of messages forwarded.
pub async fn forward_lines<R>(reader: R, intake: IntakeSender) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: IntakeMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(line_no, error = %e, "Skipping malformed intake line");
                continue;
            }
        };
        if intake.send(message).await.is_err() {
            tracing::info!("Intake closed, no longer reading input");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}

// ---------------------------------------------------------------------------
// SyncWorker
// ---------------------------------------------------------------------------

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_deliveries: u64,
    pub archived_rows: u64,
}

pub struct SyncWorker {
    engine: Arc<Engine>,
    sweep_interval: Duration,
    delivery_expiry: Duration,
    sync_retention: Duration,
}

impl SyncWorker {
    pub fn new(engine: Arc<Engine>, config: &EngineConfig) -> Self {
        Self {
            engine,
            sweep_interval: config.sweep_interval,
            delivery_expiry: config.delivery_expiry,
            sync_retention: config.sync_retention,
        }
    }

    /// Run until `cancel` fires or every sender has been dropped.
    ///
    /// A message that fails is logged and the loop moves on to the next one.
    pub async fn run(&self, mut intake: IntakeReceiver, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "Sync worker started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sync worker cancelled");
                    break;
                }
                message = intake.recv() => {
                    let Some(message) = message else {
                        tracing::info!("Intake closed, sync worker shutting down");
                        break;
                    };
                    self.handle(message).await;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Sweep failed");
                    }
                }
            }
        }
    }

    /// Process one intake message.
    pub async fn handle(&self, message: IntakeMessage) {
        let kind = message.kind();
        let result = match message {
            IntakeMessage::Transition(transition) => self.handle_transition(transition).await,
            IntakeMessage::Acknowledge {
                request,
                role,
                actor_id,
            } => self
                .engine
                .tracker
                .acknowledge(&request, role, actor_id)
                .await
                .map(|_| ()),
            IntakeMessage::SyncFailure { request, error } => self
                .engine
                .tracker
                .record_sync_failure(&request, &error)
                .await
                .map(|_| ()),
            IntakeMessage::DeliveryReceipt {
                delivery_id,
                delivered_at,
            } => self
                .engine
                .deliveries
                .mark_delivered(delivery_id, delivered_at)
                .await
                .map(|_| ()),
            IntakeMessage::Publish { event, candidates } => self
                .engine
                .publish(event, &candidates)
                .await
                .map(|_| ()),
        };

        if let Err(e) = result {
            tracing::warn!(kind, error_kind = %e.error_kind(), error = %e, "Intake message failed");
        }
    }

    /// Expire unacknowledged pushes and archive settled sync rows.
    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let now = Utc::now();
        let expired_deliveries = self
            .engine
            .deliveries
            .expire_stale(now - to_chrono(self.delivery_expiry))
            .await?;
        let archived_rows = self
            .engine
            .tracker
            .archive_terminal(now - to_chrono(self.sync_retention))
            .await?;
        if archived_rows > 0 {
            tracing::info!(archived_rows, "Archived settled sync rows");
        }
        Ok(SweepReport {
            expired_deliveries,
            archived_rows,
        })
    }

    async fn handle_transition(&self, transition: TransitionRequest) -> Result<(), EngineError> {
        let request = transition.request;
        match self.engine.process_transition(transition).await {
            Ok(outcome) => {
                tracing::debug!(
                    request = %request,
                    status = %outcome.status.current_status,
                    deliveries = outcome.deliveries.len(),
                    "Transition processed"
                );
                Ok(())
            }
            Err(e) => {
                // Transient failures that outlived the retry budget are
                // counted against the row so operators can see them.
                if e.error_kind().is_retryable() {
                    if let Err(record_err) = self
                        .engine
                        .tracker
                        .record_sync_failure(&request, &e.to_string())
                        .await
                    {
                        tracing::error!(
                            request = %request,
                            error = %record_err,
                            "Failed to record sync failure"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::retry::RetryPolicy;
    use crate::transport::LogTransport;
    use tandem_core::access::Principal;
    use tandem_core::notification::DeliveryStatus;
    use tandem_core::service::{RequestStatus, ServiceType};
    use uuid::Uuid;

    fn worker() -> (SyncWorker, Arc<Engine>) {
        let engine = Arc::new(Engine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LogTransport),
            RetryPolicy::no_retry(),
        ));
        (SyncWorker::new(engine.clone(), &EngineConfig::default()), engine)
    }

    #[tokio::test]
    async fn processes_messages_in_order_until_senders_drop() {
        let (worker, engine) = worker();
        let (tx, rx) = intake_channel(8);
        let request = RequestRef::new(ServiceType::Ride, Uuid::new_v4());

        for status in [RequestStatus::Matched, RequestStatus::Arriving, RequestStatus::Arrived] {
            tx.send(IntakeMessage::Transition(
                TransitionRequest::new(request, status).with_participants(Some(10), Some(20)),
            ))
            .await
            .unwrap();
        }
        tx.send(IntakeMessage::Acknowledge {
            request,
            role: AckRole::Customer,
            actor_id: 10,
        })
        .await
        .unwrap();
        drop(tx);

        worker.run(rx, CancellationToken::new()).await;

        let row = engine
            .tracker
            .get_for(&Principal::system(), &request)
            .await
            .unwrap();
        assert_eq!(row.current_status, RequestStatus::Arrived);
        assert_eq!(row.previous_status, Some(RequestStatus::Arriving));
        assert!(row.acks.customer.is_acknowledged());
    }

    #[tokio::test]
    async fn failed_message_does_not_stop_the_loop() {
        let (worker, engine) = worker();
        let (tx, rx) = intake_channel(8);
        let request = RequestRef::new(ServiceType::Delivery, Uuid::new_v4());

        // Unknown delivery, then a valid transition.
        tx.send(IntakeMessage::DeliveryReceipt {
            delivery_id: 99,
            delivered_at: Utc::now(),
        })
        .await
        .unwrap();
        tx.send(IntakeMessage::Transition(TransitionRequest::new(
            request,
            RequestStatus::Pending,
        )))
        .await
        .unwrap();
        drop(tx);

        worker.run(rx, CancellationToken::new()).await;
        assert!(engine
            .tracker
            .get_for(&Principal::system(), &request)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn forwards_json_lines_and_skips_garbage() {
        let (worker, engine) = worker();
        let (tx, rx) = intake_channel(8);
        let request = RequestRef::new(ServiceType::Shopping, Uuid::new_v4());

        let transition = serde_json::to_string(&IntakeMessage::Transition(
            TransitionRequest::new(request, RequestStatus::Matched)
                .with_participants(Some(10), Some(20)),
        ))
        .unwrap();
        let input = format!("{transition}\n\nnot json\n{{\"kind\":\"unknown\"}}\n");

        let forwarded = forward_lines(input.as_bytes(), tx).await.unwrap();
        assert_eq!(forwarded, 1);

        worker.run(rx, CancellationToken::new()).await;
        let row = engine
            .tracker
            .get_for(&Principal::system(), &request)
            .await
            .unwrap();
        assert_eq!(row.current_status, RequestStatus::Matched);
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_worker() {
        let (worker, _) = worker();
        let (_tx, rx) = intake_channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        worker.run(rx, cancel).await;
    }

    #[tokio::test]
    async fn delivery_receipt_marks_record_delivered() {
        let (worker, engine) = worker();
        let request = RequestRef::new(ServiceType::Ride, Uuid::new_v4());
        let outcome = engine
            .process_transition(
                TransitionRequest::new(request, RequestStatus::Matched)
                    .with_participants(Some(10), Some(20)),
            )
            .await
            .unwrap();
        let delivery = &outcome.deliveries[0];

        worker
            .handle(IntakeMessage::DeliveryReceipt {
                delivery_id: delivery.id,
                delivered_at: Utc::now(),
            })
            .await;

        let record = engine
            .deliveries
            .get_as(&Principal::system(), delivery.id)
            .await
            .unwrap();
        assert_eq!(record.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn sweep_with_fresh_data_changes_nothing() {
        let (worker, engine) = worker();
        engine
            .process_transition(
                TransitionRequest::new(
                    RequestRef::new(ServiceType::Ride, Uuid::new_v4()),
                    RequestStatus::Matched,
                )
                .with_participants(Some(10), Some(20)),
            )
            .await
            .unwrap();
        assert_eq!(worker.sweep().await.unwrap(), SweepReport::default());
    }
}
