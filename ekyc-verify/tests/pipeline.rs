//! End-to-end pipeline tests against the orchestration engine
//!
//! Exercises the full verification flow and its failure modes directly
//! at the engine boundary; HTTP-level behavior is covered separately.

mod helpers;

use std::path::Path;
use std::sync::Arc;

use ekyc_common::db::models::SessionStatus;
use ekyc_verify::error::VerifyError;
use ekyc_verify::providers::stub::{
    FailingExtractor, FixedFaceMatcher, FixedLivenessChecker, HangingExtractor, StaticExtractor,
};
use ekyc_verify::reconcile::DocumentFields;
use ekyc_verify::session::VerificationEngine;

use helpers::{complete_fields, engine_with, engine_with_timeout, happy_engine};

async fn onboarded(engine: &VerificationEngine) -> (i64, String) {
    let user_id = engine
        .register_user("Ali Khan", "ali@example.com", "0300-1234567")
        .await
        .unwrap();
    let link = engine.issue_link(user_id).await.unwrap();
    (user_id, link.token)
}

#[tokio::test]
async fn test_full_happy_path_creates_account() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;

    let start = engine.start_session(&token).await.unwrap();
    assert_eq!(start.status, SessionStatus::InProgress);

    let doc = engine
        .record_document_upload(&token, Path::new("front.jpg"), Path::new("back.jpg"))
        .await
        .unwrap();
    assert!(doc.ocr_completed, "errors: {:?}", doc.validation_errors);

    let face = engine
        .record_face_match(&token, Path::new("selfie.jpg"), Path::new("front.jpg"))
        .await
        .unwrap();
    assert!(face.is_match);

    let live = engine
        .record_liveness(&token, Path::new("clip.mp4"))
        .await
        .unwrap();
    assert!(live.is_live);

    let done = engine.finalize(&token).await.unwrap();
    assert!(done.account_number.starts_with("PKR"));

    let status = engine.get_status(&start.session_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_sources_reconciled_field_by_field() {
    // Primary reads the number and a short name; secondary returns an
    // empty number, a longer name, and the dates. Merged output takes the
    // number from primary (empty counts as absent) and the longer name
    // from secondary.
    let primary = DocumentFields {
        document_number: Some("12345-1234567-1".to_string()),
        full_name: Some("Ali Khan".to_string()),
        ..Default::default()
    };
    let secondary = DocumentFields {
        document_number: Some("".to_string()),
        full_name: Some("Ali  Khan".to_string()),
        date_of_birth: Some("01.01.1990".to_string()),
        expiry_date: Some("01.01.2099".to_string()),
        ..Default::default()
    };
    let engine = engine_with(
        Arc::new(StaticExtractor::new(primary)),
        Arc::new(StaticExtractor::new(secondary)),
        Arc::new(FixedFaceMatcher::new(0.9, 0.6)),
        Arc::new(FixedLivenessChecker::new(0.9, true)),
    )
    .await;
    let (_, token) = onboarded(&engine).await;
    engine.start_session(&token).await.unwrap();

    let doc = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap();
    assert!(doc.ocr_completed);
    let merged = doc.extracted.unwrap();
    assert_eq!(merged.document_number.as_deref(), Some("12345-1234567-1"));
    assert_eq!(merged.full_name.as_deref(), Some("Ali  Khan"));
}

#[tokio::test]
async fn test_invalid_document_leaves_step_retriable() {
    // Both sources miss the date of birth: structured feedback, no ocr
    // flag, and a later good upload succeeds
    let mut incomplete = complete_fields();
    incomplete.date_of_birth = None;
    let engine = engine_with(
        Arc::new(StaticExtractor::new(incomplete.clone())),
        Arc::new(StaticExtractor::new(incomplete)),
        Arc::new(FixedFaceMatcher::new(0.9, 0.6)),
        Arc::new(FixedLivenessChecker::new(0.9, true)),
    )
    .await;
    let (_, token) = onboarded(&engine).await;
    let start = engine.start_session(&token).await.unwrap();

    let doc = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap();
    assert!(!doc.ocr_completed);
    assert!(doc
        .validation_errors
        .iter()
        .any(|e| e == "Required field 'date_of_birth' is missing"));

    let status = engine.get_status(&start.session_id).await.unwrap();
    assert!(status.cnic_uploaded);
    assert!(!status.ocr_completed);
    assert_eq!(status.status, SessionStatus::InProgress);
}

#[tokio::test]
async fn test_nothing_readable_reports_critical_feedback() {
    let engine = engine_with(
        Arc::new(StaticExtractor::empty()),
        Arc::new(StaticExtractor::empty()),
        Arc::new(FixedFaceMatcher::new(0.9, 0.6)),
        Arc::new(FixedLivenessChecker::new(0.9, true)),
    )
    .await;
    let (_, token) = onboarded(&engine).await;
    let start = engine.start_session(&token).await.unwrap();

    let doc = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap();
    assert!(doc.message.contains("Critical data missing"));
    assert!(doc.extracted.is_none());

    // The attempt still counts as an upload
    let status = engine.get_status(&start.session_id).await.unwrap();
    assert!(status.cnic_uploaded);
    assert!(!status.ocr_completed);
}

#[tokio::test]
async fn test_extractor_fault_is_retriable_and_leaves_state_alone() {
    let engine = engine_with(
        Arc::new(FailingExtractor),
        Arc::new(StaticExtractor::new(complete_fields())),
        Arc::new(FixedFaceMatcher::new(0.9, 0.6)),
        Arc::new(FixedLivenessChecker::new(0.9, true)),
    )
    .await;
    let (_, token) = onboarded(&engine).await;
    let start = engine.start_session(&token).await.unwrap();

    let err = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Collaborator(_)));

    // No flags raised and the session is still live
    let status = engine.get_status(&start.session_id).await.unwrap();
    assert!(!status.cnic_uploaded);
    assert_eq!(status.status, SessionStatus::InProgress);
}

#[tokio::test]
async fn test_hung_extractor_hits_deadline_with_warning_audit() {
    // A collaborator that never responds must not hang the step: the
    // bounded await elapses, the step fails retriable, flags stay down,
    // and a warning-level failure event lands in the audit log
    let engine = engine_with_timeout(
        Arc::new(HangingExtractor),
        Arc::new(StaticExtractor::new(complete_fields())),
        Arc::new(FixedFaceMatcher::new(0.9, 0.6)),
        Arc::new(FixedLivenessChecker::new(0.9, true)),
        std::time::Duration::from_millis(50),
    )
    .await;
    let (_, token) = onboarded(&engine).await;
    let start = engine.start_session(&token).await.unwrap();

    let err = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Collaborator(_)));

    let status = engine.get_status(&start.session_id).await.unwrap();
    assert!(!status.cnic_uploaded);
    assert!(!status.ocr_completed);
    assert_eq!(status.status, SessionStatus::InProgress);

    let (count, severity): (i64, String) = sqlx::query_as(
        "SELECT COUNT(*), MAX(severity) FROM audit_log WHERE event_type = 'verification_failed'",
    )
    .fetch_one(engine.store().pool())
    .await
    .unwrap();
    assert_eq!(count, 1);
    assert_eq!(severity, "warning");
}

#[tokio::test]
async fn test_biometric_steps_gated_on_document_validation() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;
    engine.start_session(&token).await.unwrap();

    let err = engine
        .record_face_match(&token, Path::new("s.jpg"), Path::new("r.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::OrderingViolation(_)));

    let err = engine
        .record_liveness(&token, Path::new("c.mp4"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::OrderingViolation(_)));
}

#[tokio::test]
async fn test_step_before_start_rejected() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;

    let err = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::OrderingViolation(_)));
}

#[tokio::test]
async fn test_start_is_idempotent_while_in_progress() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;

    let first = engine.start_session(&token).await.unwrap();
    let second = engine.start_session(&token).await.unwrap();
    assert_eq!(first.status, second.status);
    assert_eq!(first.session_id, second.session_id);
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let engine = happy_engine().await;
    let err = engine.start_session("not-a-token").await.unwrap_err();
    assert!(matches!(err, VerifyError::InvalidToken(_)));
}

#[tokio::test]
async fn test_session_deadline_enforced_independently_of_token() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;
    let pool = engine.store().pool();

    // Pull the session id back out and force its deadline into the past;
    // the token itself is still cryptographically valid
    let (session_id,): (String,) =
        sqlx::query_as("SELECT session_id FROM verification_sessions")
            .fetch_one(pool)
            .await
            .unwrap();
    sqlx::query(
        "UPDATE verification_sessions SET expires_at = datetime('now', '-1 hour') \
         WHERE session_id = ?",
    )
    .bind(&session_id)
    .execute(pool)
    .await
    .unwrap();

    let err = engine.start_session(&token).await.unwrap_err();
    assert!(matches!(err, VerifyError::SessionExpired));

    let status = engine.get_status(&session_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Expired);
}

#[tokio::test]
async fn test_finalize_with_missing_steps_rejected() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;
    engine.start_session(&token).await.unwrap();
    engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap();

    let err = engine.finalize(&token).await.unwrap_err();
    match err {
        VerifyError::OrderingViolation(msg) => {
            assert!(msg.contains("selfie_uploaded"));
            assert!(msg.contains("liveness_completed"));
        }
        other => panic!("expected OrderingViolation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completed_session_refuses_further_steps() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;
    engine.start_session(&token).await.unwrap();
    engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap();
    engine
        .record_face_match(&token, Path::new("s.jpg"), Path::new("r.jpg"))
        .await
        .unwrap();
    engine
        .record_liveness(&token, Path::new("c.mp4"))
        .await
        .unwrap();
    engine.finalize(&token).await.unwrap();

    let err = engine.finalize(&token).await.unwrap_err();
    assert!(matches!(err, VerifyError::TerminalState(_)));

    let err = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::TerminalState(_)));
}

#[tokio::test]
async fn test_failed_session_resumes_on_next_step() {
    let engine = happy_engine().await;
    let (_, token) = onboarded(&engine).await;
    let start = engine.start_session(&token).await.unwrap();

    engine.store().mark_failed(&start.session_id).await.unwrap();
    let status = engine.get_status(&start.session_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Failed);

    // A valid-token step resumes the session rather than rejecting it
    let doc = engine
        .record_document_upload(&token, Path::new("f.jpg"), Path::new("b.jpg"))
        .await
        .unwrap();
    assert!(doc.ocr_completed);

    let status = engine.get_status(&start.session_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::InProgress);
}

#[tokio::test]
async fn test_fresh_link_mints_fresh_session() {
    let engine = happy_engine().await;
    let user_id = engine
        .register_user("Ali Khan", "ali@example.com", "0300")
        .await
        .unwrap();

    let a = engine.issue_link(user_id).await.unwrap();
    let b = engine.issue_link(user_id).await.unwrap();
    assert_ne!(a.session_id, b.session_id);
    assert_ne!(a.token, b.token);
}
