//! Append-only audit trail
//!
//! Every state-changing operation in the verification pipeline records at
//! least one audit event before the operation is considered complete.
//! Writes are best-effort: the trail must never be the cause of a
//! user-visible failure, so a sink error falls back to a structured
//! tracing record and is swallowed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

/// Closed vocabulary of audit event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UserRegistered,
    VerificationLinkGenerated,
    VerificationStarted,
    DocumentUploaded,
    DocumentExtractionCompleted,
    SelfieUploaded,
    FaceMatchCompleted,
    LivenessCheckCompleted,
    FingerprintCaptured,
    VerificationCompleted,
    VerificationFailed,
    AccountCreated,
    DataValidationFailed,
    SecurityViolation,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::UserRegistered => "user_registered",
            AuditEventType::VerificationLinkGenerated => "verification_link_generated",
            AuditEventType::VerificationStarted => "verification_started",
            AuditEventType::DocumentUploaded => "document_uploaded",
            AuditEventType::DocumentExtractionCompleted => "document_extraction_completed",
            AuditEventType::SelfieUploaded => "selfie_uploaded",
            AuditEventType::FaceMatchCompleted => "face_match_completed",
            AuditEventType::LivenessCheckCompleted => "liveness_check_completed",
            AuditEventType::FingerprintCaptured => "fingerprint_captured",
            AuditEventType::VerificationCompleted => "verification_completed",
            AuditEventType::VerificationFailed => "verification_failed",
            AuditEventType::AccountCreated => "account_created",
            AuditEventType::DataValidationFailed => "data_validation_failed",
            AuditEventType::SecurityViolation => "security_violation",
        }
    }
}

/// Severity follows outcome: successful steps info, failed checks
/// warning, security-relevant anomalies error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

impl AuditSeverity {
    fn as_str(self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Error => "error",
        }
    }
}

/// Audit trail writer bound to the durable sink
#[derive(Clone)]
pub struct AuditTrail {
    pool: SqlitePool,
}

impl AuditTrail {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one audit event
    ///
    /// Timestamped at write time, not at the triggering action's start.
    /// Never returns an error: on sink failure the event goes to the
    /// tracing log at the matching level and the caller proceeds.
    pub async fn record(
        &self,
        event_type: AuditEventType,
        user_id: Option<i64>,
        session_id: Option<&str>,
        payload: Option<Value>,
        severity: AuditSeverity,
    ) {
        let timestamp = Utc::now().to_rfc3339();
        let payload_json = payload
            .as_ref()
            .map(|p| p.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO audit_log (event_type, user_id, session_id, severity, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_type.as_str())
        .bind(user_id)
        .bind(session_id)
        .bind(severity.as_str())
        .bind(&payload_json)
        .bind(&timestamp)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            // Secondary sink: the event still reaches the process log
            match severity {
                AuditSeverity::Info => info!(
                    event = event_type.as_str(),
                    user_id, session_id, ?payload,
                    "audit sink unavailable ({}), event logged here only", e
                ),
                AuditSeverity::Warning => warn!(
                    event = event_type.as_str(),
                    user_id, session_id, ?payload,
                    "audit sink unavailable ({}), event logged here only", e
                ),
                AuditSeverity::Error => error!(
                    event = event_type.as_str(),
                    user_id, session_id, ?payload,
                    "audit sink unavailable ({}), event logged here only", e
                ),
            }
        }
    }

    pub async fn user_registered(&self, user_id: i64, email: &str, phone: &str) {
        self.record(
            AuditEventType::UserRegistered,
            Some(user_id),
            None,
            Some(serde_json::json!({ "email": email, "phone": phone })),
            AuditSeverity::Info,
        )
        .await;
    }

    pub async fn link_generated(&self, user_id: i64, session_id: &str) {
        self.record(
            AuditEventType::VerificationLinkGenerated,
            Some(user_id),
            Some(session_id),
            None,
            AuditSeverity::Info,
        )
        .await;
    }

    pub async fn verification_started(&self, user_id: i64, session_id: &str) {
        self.record(
            AuditEventType::VerificationStarted,
            Some(user_id),
            Some(session_id),
            None,
            AuditSeverity::Info,
        )
        .await;
    }

    pub async fn document_uploaded(&self, user_id: i64, session_id: &str) {
        self.record(
            AuditEventType::DocumentUploaded,
            Some(user_id),
            Some(session_id),
            None,
            AuditSeverity::Info,
        )
        .await;
    }

    pub async fn extraction_completed(
        &self,
        user_id: i64,
        session_id: &str,
        valid: bool,
        document_number: Option<&str>,
    ) {
        self.record(
            AuditEventType::DocumentExtractionCompleted,
            Some(user_id),
            Some(session_id),
            Some(serde_json::json!({ "valid": valid, "document_number": document_number })),
            if valid { AuditSeverity::Info } else { AuditSeverity::Warning },
        )
        .await;
    }

    pub async fn face_match(&self, user_id: i64, session_id: &str, score: f64, is_match: bool) {
        self.record(
            AuditEventType::FaceMatchCompleted,
            Some(user_id),
            Some(session_id),
            Some(serde_json::json!({ "score": score, "is_match": is_match })),
            if is_match { AuditSeverity::Info } else { AuditSeverity::Warning },
        )
        .await;
    }

    pub async fn liveness_check(&self, user_id: i64, session_id: &str, score: f64, is_live: bool) {
        self.record(
            AuditEventType::LivenessCheckCompleted,
            Some(user_id),
            Some(session_id),
            Some(serde_json::json!({ "score": score, "is_live": is_live })),
            if is_live { AuditSeverity::Info } else { AuditSeverity::Warning },
        )
        .await;
    }

    pub async fn fingerprint_captured(&self, user_id: i64, session_id: &str) {
        self.record(
            AuditEventType::FingerprintCaptured,
            Some(user_id),
            Some(session_id),
            None,
            AuditSeverity::Info,
        )
        .await;
    }

    pub async fn verification_completed(&self, user_id: i64, session_id: &str) {
        self.record(
            AuditEventType::VerificationCompleted,
            Some(user_id),
            Some(session_id),
            None,
            AuditSeverity::Info,
        )
        .await;
    }

    pub async fn verification_failed(&self, user_id: i64, session_id: &str, reason: &str) {
        self.record(
            AuditEventType::VerificationFailed,
            Some(user_id),
            Some(session_id),
            Some(serde_json::json!({ "reason": reason })),
            AuditSeverity::Warning,
        )
        .await;
    }

    pub async fn account_created(&self, user_id: i64, account_number: &str) {
        self.record(
            AuditEventType::AccountCreated,
            Some(user_id),
            None,
            Some(serde_json::json!({ "account_number": account_number })),
            AuditSeverity::Info,
        )
        .await;
    }

    pub async fn security_violation(&self, description: &str, user_id: Option<i64>) {
        self.record(
            AuditEventType::SecurityViolation,
            user_id,
            None,
            Some(serde_json::json!({ "description": description })),
            AuditSeverity::Error,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;

    #[tokio::test]
    async fn test_record_appends_row() {
        let pool = init_memory_database().await.unwrap();
        let trail = AuditTrail::new(pool.clone());

        trail
            .record(
                AuditEventType::VerificationStarted,
                Some(7),
                Some("s1"),
                Some(serde_json::json!({ "k": "v" })),
                AuditSeverity::Info,
            )
            .await;

        let (event_type, severity, session_id): (String, String, String) = sqlx::query_as(
            "SELECT event_type, severity, session_id FROM audit_log",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(event_type, "verification_started");
        assert_eq!(severity, "info");
        assert_eq!(session_id, "s1");
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        // A pool with no schema: the insert fails, record must not panic
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let trail = AuditTrail::new(pool);

        trail
            .record(AuditEventType::SecurityViolation, None, None, None, AuditSeverity::Error)
            .await;
        // Reaching this point is the assertion
    }

    #[tokio::test]
    async fn test_severity_follows_outcome() {
        let pool = init_memory_database().await.unwrap();
        let trail = AuditTrail::new(pool.clone());

        trail.face_match(1, "s1", 0.4, false).await;
        trail.face_match(1, "s1", 0.9, true).await;

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT severity FROM audit_log ORDER BY id")
                .fetch_all(&pool)
                .await
                .unwrap();

        assert_eq!(rows[0].0, "warning");
        assert_eq!(rows[1].0, "info");
    }
}
