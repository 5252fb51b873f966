//! Tandem API server library.
//!
//! Exposes the HTTP surface over the synchronization engine: transition and
//! acknowledgment intake, sync row views, administrative reassignment,
//! notification preferences, the cross-role event feed and the delivery log.
//!
//! Re-exports modules so integration tests and the binary share the exact
//! same router and state types.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod query;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
