//! Tandem cross-role synchronization and notification engine.
//!
//! This crate provides the stateful building blocks on top of
//! `tandem_core`:
//!
//! - [`SyncStatusTracker`]: per-request status and per-role acknowledgments.
//! - [`CrossRoleEventLog`]: the append-only event log with a live
//!   [`Subscription`] feed.
//! - [`PreferenceStore`] and [`NotificationDispatcher`]: preference-filtered
//!   push fan-out with a strict silent/visible split.
//! - [`DeliveryLog`]: the administrator-only push log.
//! - [`Reassignment`]: compare-and-set job reassignment.
//! - [`RetryPolicy`]: classification-driven backoff.
//! - [`SyncWorker`]: the inbound queue consumer and periodic sweeps.
//!
//! Components reach storage only through the ports in [`store`], backed by
//! [`PgStore`] in production and [`MemoryStore`] in tests.

pub mod config;
pub mod delivery_log;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod memory;
pub mod pg;
pub mod preferences;
pub mod reassign;
pub mod retry;
pub mod store;
pub mod tracker;
pub mod transport;
pub mod worker;

pub use config::{ConfigError, EngineConfig};
pub use delivery_log::DeliveryLog;
pub use dispatcher::{NotificationDispatcher, Recipient};
pub use engine::{Engine, EngineStore, PublishOutcome, TransitionOutcome};
pub use error::{EngineError, StoreError};
pub use event_log::{CrossRoleEventLog, Subscription};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use preferences::PreferenceStore;
pub use reassign::{ReassignOutcome, ReassignRequest, Reassignment};
pub use retry::RetryPolicy;
pub use tracker::{Observation, SyncStatusTracker};
pub use transport::{LogTransport, PushTransport, TransportError, WebhookTransport};
pub use worker::{
    forward_lines, intake_channel, IntakeMessage, IntakeReceiver, IntakeSender, SyncWorker,
};
