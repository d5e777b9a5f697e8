//! Shared test scaffolding: in-memory database, stub collaborators, and
//! multipart body construction.
#![allow(dead_code)]

use std::sync::Arc;

use ekyc_common::audit::AuditTrail;
use ekyc_common::db::init_memory_database;
use ekyc_verify::providers::stub::{FixedFaceMatcher, FixedLivenessChecker, StaticExtractor};
use ekyc_verify::providers::{DocumentExtractor, FaceMatcher, FieldCipher, LivenessChecker, PlainCipher};
use ekyc_verify::reconcile::DocumentFields;
use ekyc_verify::session::{SessionStore, VerificationEngine};
use ekyc_verify::token::TokenService;
use ekyc_verify::validation::DocumentValidator;
use ekyc_verify::AppState;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "test-secret";

/// A reconciled-record field set that passes every validation check for
/// a user registered as "Ali Khan"
pub fn complete_fields() -> DocumentFields {
    DocumentFields {
        document_number: Some("12345-1234567-1".to_string()),
        full_name: Some("Ali Khan".to_string()),
        guardian_name: Some("Akbar Khan".to_string()),
        date_of_birth: Some("01.01.1990".to_string()),
        gender: Some("M".to_string()),
        address: Some("House 1, Street 2, Islamabad".to_string()),
        issue_date: Some("01.01.2020".to_string()),
        expiry_date: Some("01.01.2099".to_string()),
    }
}

/// Engine wired to an in-memory database and the given collaborators
pub async fn engine_with(
    primary: Arc<dyn DocumentExtractor>,
    secondary: Arc<dyn DocumentExtractor>,
    face: Arc<dyn FaceMatcher>,
    liveness: Arc<dyn LivenessChecker>,
) -> VerificationEngine {
    engine_with_timeout(primary, secondary, face, liveness, std::time::Duration::from_secs(30))
        .await
}

/// Engine with an explicit collaborator deadline (for hang tests)
pub async fn engine_with_timeout(
    primary: Arc<dyn DocumentExtractor>,
    secondary: Arc<dyn DocumentExtractor>,
    face: Arc<dyn FaceMatcher>,
    liveness: Arc<dyn LivenessChecker>,
    collaborator_timeout: std::time::Duration,
) -> VerificationEngine {
    let pool = init_memory_database().await.expect("in-memory database");
    VerificationEngine::new(
        SessionStore::new(pool.clone()),
        AuditTrail::new(pool),
        TokenService::new(TEST_SECRET, 30),
        DocumentValidator::new(18, 0.8),
        primary,
        secondary,
        face,
        liveness,
        Arc::new(PlainCipher) as Arc<dyn FieldCipher>,
        collaborator_timeout,
    )
}

/// Engine where every collaborator succeeds with complete data
pub async fn happy_engine() -> VerificationEngine {
    engine_with(
        Arc::new(StaticExtractor::new(complete_fields())),
        Arc::new(StaticExtractor::new(complete_fields())),
        Arc::new(FixedFaceMatcher::new(0.92, 0.6)),
        Arc::new(FixedLivenessChecker::new(0.95, true)),
    )
    .await
}

/// Router plus the temp dir backing its upload directory; keep the
/// `TempDir` alive for the test's duration
pub fn app_for(engine: VerificationEngine) -> (axum::Router, TempDir) {
    let dir = TempDir::new().expect("temp upload dir");
    let state = AppState::new(engine, dir.path().to_path_buf());
    (ekyc_verify::build_router(state), dir)
}

pub const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Build a multipart/form-data body; parts are (field, filename, bytes),
/// filename `None` for plain text fields
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(fname) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, fname
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
