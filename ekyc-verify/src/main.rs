//! ekyc-verify - Verification session orchestration service
//!
//! HTTP service driving remote identity verification: tokenized links,
//! step-gated uploads, dual-source document reconciliation, and atomic
//! finalization with account creation.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use ekyc_common::audit::AuditTrail;
use ekyc_common::config::Settings;
use ekyc_common::db::init_database;
use ekyc_verify::providers::stub::{FixedFaceMatcher, FixedLivenessChecker, StaticExtractor};
use ekyc_verify::providers::AesGcmCipher;
use ekyc_verify::session::{SessionStore, VerificationEngine};
use ekyc_verify::token::TokenService;
use ekyc_verify::validation::DocumentValidator;
use ekyc_verify::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting eKYC Verification Service (ekyc-verify) v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    settings.validate()?;
    info!("Database path: {}", settings.database_path.display());
    info!("Upload directory: {}", settings.upload_dir.display());

    let pool = init_database(&settings.database_path).await?;
    info!("✓ Database schema ready");

    let store = SessionStore::new(pool.clone());
    let audit = AuditTrail::new(pool);
    let tokens = TokenService::new(&settings.token_secret, settings.token_ttl_minutes);
    let validator = DocumentValidator::new(settings.min_age, settings.name_match_threshold);
    let cipher = Arc::new(AesGcmCipher::new(&settings.token_secret));

    // Built-in recognition stand-ins; swap for vendor-backed
    // implementations at this seam
    warn!("Recognition providers are built-in stand-ins; not for production use");
    let engine = VerificationEngine::new(
        store,
        audit,
        tokens,
        validator,
        Arc::new(StaticExtractor::empty()),
        Arc::new(StaticExtractor::empty()),
        Arc::new(FixedFaceMatcher::new(0.9, 0.6)),
        Arc::new(FixedLivenessChecker::new(0.9, true)),
        cipher,
        std::time::Duration::from_secs(settings.collaborator_timeout_secs),
    );

    let state = AppState::new(engine, settings.upload_dir.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("ekyc-verify listening on http://{}", settings.bind_address);
    info!("Health check: http://{}/health", settings.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
