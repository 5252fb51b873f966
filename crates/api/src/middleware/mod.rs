//! Principal extraction and authorization extractors.
//!
//! - [`principal::ActorPrincipal`] -- The caller identity asserted by the gateway.
//! - [`principal::RequireAdmin`] -- Requires the `admin` role.

pub mod principal;
