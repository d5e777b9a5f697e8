//! ekyc-verify library - Verification session orchestration service
//!
//! Drives the remote identity-verification pipeline: link issuance,
//! token-gated step submission (document, selfie, liveness, fingerprint),
//! dual-source field reconciliation, rule validation, and atomic
//! finalization with account creation.

use axum::Router;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod providers;
pub mod reconcile;
pub mod session;
pub mod token;
pub mod validation;

use session::VerificationEngine;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: VerificationEngine,
    /// Directory where uploaded artifacts are written before processing
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(engine: VerificationEngine, upload_dir: PathBuf) -> Self {
        Self { engine, upload_dir }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/health", get(api::health_check))
        .route("/api/users", post(api::register_user))
        .route("/api/users/:user_id/verification-link", post(api::issue_verification_link))
        .route("/api/verification/start", post(api::start_verification))
        .route("/api/verification/document", post(api::upload_document))
        .route("/api/verification/selfie", post(api::upload_selfie))
        .route("/api/verification/liveness", post(api::upload_liveness))
        .route("/api/verification/fingerprint", post(api::upload_fingerprint))
        .route("/api/verification/finalize", post(api::finalize_verification))
        .route("/api/verification/status/:session_id", get(api::session_status))
        .route("/api/admin/users", get(api::list_users))
        .route("/api/admin/audit-log", get(api::list_audit_log))
        .route("/api/admin/stats", get(api::system_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
