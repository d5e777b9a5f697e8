//! Database models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Verification session lifecycle status
///
/// Transitions are monotonic along pending -> in_progress -> terminal.
/// `Completed` and `Expired` are hard-terminal. `Failed` marks an
/// unhandled fault at the orchestration boundary and is recoverable: a
/// later step arriving with a valid token resumes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl SessionStatus {
    /// States from which no further transition is permitted
    pub fn is_hard_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub created_at: NaiveDateTime,
}

/// One verification attempt
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VerificationSession {
    pub session_id: String,
    pub user_id: i64,
    /// The issued bearer token, stored for traceability only; every
    /// request re-validates the presented token cryptographically
    pub token: String,
    pub status: SessionStatus,
    pub cnic_uploaded: bool,
    pub ocr_completed: bool,
    pub selfie_uploaded: bool,
    pub face_match_completed: bool,
    pub liveness_completed: bool,
    pub fingerprint_captured: bool,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// Reconciled identity document record, at most one per user
///
/// Field columns hold cipher output; the merge is destructive and the
/// record carries no per-field provenance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityDocument {
    pub user_id: i64,
    pub document_number: Option<String>,
    pub full_name: Option<String>,
    pub guardian_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
    pub is_valid: bool,
    pub validation_errors: Option<String>,
    pub front_image_path: Option<String>,
    pub back_image_path: Option<String>,
}

/// Biometric capture state, upserted incrementally across steps
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BiometricRecord {
    pub user_id: i64,
    pub selfie_path: Option<String>,
    pub face_match_score: Option<f64>,
    pub face_match_result: bool,
    pub liveness_score: Option<f64>,
    pub liveness_result: bool,
    pub liveness_video_path: Option<String>,
    pub fingerprint_path: Option<String>,
    pub fingerprint_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub user_id: i64,
    pub account_number: String,
    pub account_type: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_terminal_states() {
        assert!(SessionStatus::Completed.is_hard_terminal());
        assert!(SessionStatus::Expired.is_hard_terminal());
        assert!(!SessionStatus::Failed.is_hard_terminal());
        assert!(!SessionStatus::Pending.is_hard_terminal());
        assert!(!SessionStatus::InProgress.is_hard_terminal());
    }

    #[test]
    fn test_status_serde_wire_format() {
        let s = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(s, "\"in_progress\"");
    }
}
