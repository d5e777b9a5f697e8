//! Shared error type for the eKYC foundation crate
//!
//! Covers the three fault classes this crate itself produces: schema and
//! pool failures from sqlx, filesystem faults while creating the
//! database location, and configuration that cannot be loaded or fails
//! validation. Service-level errors (token, ordering, collaborator) live
//! with the verification service, which maps them to HTTP itself.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Schema creation, pragma setup or query failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem fault while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}
