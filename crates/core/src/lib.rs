//! `agencyportal-core` — identifiers and the shared error model.
//!
//! This crate carries no infrastructure concerns; every other crate in the
//! workspace depends on it.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ResourceId, TenantId, UserId};
