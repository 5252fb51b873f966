//! Actor roles that observe a service request.
//!
//! The string forms must match the `source_role` / `target_role` values
//! stored in `cross_role_events` and the `x-actor-role` gateway header.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_PROVIDER: &str = "provider";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SYSTEM: &str = "system";

/// Who is acting on, or being notified about, a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Provider,
    Admin,
    /// Internal services (the sync worker, schedulers).
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => ROLE_CUSTOMER,
            Self::Provider => ROLE_PROVIDER,
            Self::Admin => ROLE_ADMIN,
            Self::System => ROLE_SYSTEM,
        }
    }

    /// Parse from the stored / transmitted role name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            ROLE_CUSTOMER => Ok(Self::Customer),
            ROLE_PROVIDER => Ok(Self::Provider),
            ROLE_ADMIN => Ok(Self::Admin),
            ROLE_SYSTEM => Ok(Self::System),
            other => Err(CoreError::Validation(format!("Unknown role '{other}'"))),
        }
    }

    /// Administrators and internal services bypass row ownership checks.
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Admin | Self::System)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for role in [Role::Customer, Role::Provider, Role::Admin, Role::System] {
            assert_eq!(Role::from_name(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(Role::from_name("driver").is_err());
    }

    #[test]
    fn only_admin_and_system_are_privileged() {
        assert!(Role::Admin.is_privileged());
        assert!(Role::System.is_privileged());
        assert!(!Role::Customer.is_privileged());
        assert!(!Role::Provider.is_privileged());
    }
}
