//! Steward Core - shared types, error taxonomy, locked persistence, and the audit log

pub mod audit;
pub mod error;
pub mod fsio;
pub mod hash;
pub mod types;

pub use audit::{AuditEvent, AuditLog, AuditView};
pub use error::{Error, Result};
pub use types::*;
