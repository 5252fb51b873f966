//! Tandem core domain.
//!
//! Pure types and rules shared by the storage layer, the synchronization
//! engine, and the HTTP surface. Nothing in this crate performs I/O.

pub mod access;
pub mod admin_error;
pub mod classify;
pub mod cross_role;
pub mod error;
pub mod notification;
pub mod roles;
pub mod service;
pub mod sync;
pub mod types;
