//! # eKYC Common Library
//!
//! Shared code for the eKYC verification services including:
//! - Database schema and models
//! - Audit trail (append-only compliance log)
//! - Configuration loading
//! - Common error types

pub mod audit;
pub mod config;
pub mod db;
pub mod error;

pub use audit::{AuditEventType, AuditSeverity, AuditTrail};
pub use error::{Error, Result};
