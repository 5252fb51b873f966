//! Row models.
//!
//! Each struct mirrors one table's column list and converts into the
//! corresponding `tandem_core` domain type via `into_domain`, which rejects
//! values the schema's CHECK constraints should already have excluded.

pub mod assignment;
pub mod cross_role_event;
pub mod notification;
pub mod sync_status;
