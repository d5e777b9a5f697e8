//! HTTP API handlers for ekyc-verify

pub mod admin;
pub mod health;
pub mod users;
pub mod verification;

pub use admin::{list_audit_log, list_users, system_stats};
pub use health::health_check;
pub use users::{issue_verification_link, register_user};
pub use verification::{
    finalize_verification, session_status, start_verification, upload_document,
    upload_fingerprint, upload_liveness, upload_selfie,
};
