//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod administrator_repo;
pub mod assignment_repo;
pub mod cross_role_event_repo;
pub mod delivery_log_repo;
pub mod notification_preference_repo;
pub mod sync_status_repo;

pub use administrator_repo::AdministratorRepo;
pub use assignment_repo::AssignmentRepo;
pub use cross_role_event_repo::CrossRoleEventRepo;
pub use delivery_log_repo::DeliveryLogRepo;
pub use notification_preference_repo::NotificationPreferenceRepo;
pub use sync_status_repo::SyncStatusRepo;
