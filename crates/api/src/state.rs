use std::sync::Arc;

use tandem_db::DbPool;
use tandem_events::Engine;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cloned per-request by Axum; all inner fields are `Arc`-wrapped or cheap
/// to clone.
#[derive(Clone)]
pub struct AppState {
    /// The synchronization engine (tracker, event log, preferences, dispatcher).
    pub engine: Arc<Engine>,
    /// Server configuration (immutable after startup).
    pub config: Arc<ServerConfig>,
    /// Database pool, when the engine is backed by PostgreSQL. Only used by
    /// the health check.
    pub pool: Option<DbPool>,
}
