//! Session persistence
//!
//! Concurrency correctness lives here: every read-then-write of a
//! session and its associated records within one step runs inside a
//! single sqlx transaction, and step-flag updates are compare-and-set
//! style (`MAX(flag, ?)`) so a flag only ever transitions false -> true.
//! Recognition collaborator calls are awaited by the engine before any
//! transaction opens; no lock is held across external I/O.

use chrono::NaiveDateTime;
use ekyc_common::db::models::{SessionStatus, User, VerificationSession};
use sqlx::SqlitePool;

use crate::error::{VerifyError, VerifyResult};
use crate::reconcile::DocumentFields;

/// Outcome of the atomic finalize check-and-transition
#[derive(Debug, PartialEq, Eq)]
pub enum FinalizeDecision {
    /// All five required flags were set; the session is now COMPLETED
    Completed,
    /// One or more required steps missing; nothing was mutated
    Incomplete(Vec<&'static str>),
    /// The session was already COMPLETED; nothing was mutated
    AlreadyCompleted,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- users ----

    pub async fn create_user(
        &self,
        full_name: &str,
        email: &str,
        phone: &str,
    ) -> VerifyResult<i64> {
        let result = sqlx::query("INSERT INTO users (full_name, email, phone) VALUES (?, ?, ?)")
            .bind(full_name)
            .bind(email)
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn fetch_user(&self, user_id: i64) -> VerifyResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn fetch_document(
        &self,
        user_id: i64,
    ) -> VerifyResult<Option<ekyc_common::db::models::IdentityDocument>> {
        let doc = sqlx::query_as("SELECT * FROM identity_documents WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    // ---- sessions ----

    pub async fn create_session(
        &self,
        session_id: &str,
        user_id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> VerifyResult<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_sessions (session_id, user_id, token, status, expires_at)
            VALUES (?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch_session(
        &self,
        session_id: &str,
    ) -> VerifyResult<Option<VerificationSession>> {
        let session = sqlx::query_as::<_, VerificationSession>(
            "SELECT * FROM verification_sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// PENDING or FAILED -> IN_PROGRESS; guarded against terminal states
    ///
    /// Returns true when this call performed the transition (so the
    /// caller audits the start exactly once).
    pub async fn mark_in_progress(&self, session_id: &str) -> VerifyResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE verification_sessions
            SET status = 'in_progress'
            WHERE session_id = ? AND status IN ('pending', 'failed')
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deadline passed: IN_PROGRESS/PENDING/FAILED -> EXPIRED
    pub async fn mark_expired(&self, session_id: &str) -> VerifyResult<()> {
        sqlx::query(
            r#"
            UPDATE verification_sessions
            SET status = 'expired'
            WHERE session_id = ? AND status NOT IN ('completed', 'expired')
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Unhandled fault at the orchestration boundary: soft FAILED marker.
    /// Step flags are untouched; COMPLETED/EXPIRED never regress.
    pub async fn mark_failed(&self, session_id: &str) -> VerifyResult<()> {
        sqlx::query(
            r#"
            UPDATE verification_sessions
            SET status = 'failed'
            WHERE session_id = ? AND status NOT IN ('completed', 'expired')
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- step results ----

    /// Persist the reconciled document record and the document-step flags
    /// in one transaction
    ///
    /// `cnic_uploaded` is set unconditionally; `ocr_completed` only rises
    /// to true when validation passed (`MAX` keeps an earlier true).
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_document_result(
        &self,
        user_id: i64,
        session_id: &str,
        record: &DocumentFields,
        is_valid: bool,
        validation_errors: &str,
        front_path: &str,
        back_path: &str,
    ) -> VerifyResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO identity_documents (
                user_id, document_number, full_name, guardian_name, date_of_birth,
                gender, address, issue_date, expiry_date,
                is_valid, validation_errors, front_image_path, back_image_path, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(user_id) DO UPDATE SET
                document_number = excluded.document_number,
                full_name = excluded.full_name,
                guardian_name = excluded.guardian_name,
                date_of_birth = excluded.date_of_birth,
                gender = excluded.gender,
                address = excluded.address,
                issue_date = excluded.issue_date,
                expiry_date = excluded.expiry_date,
                is_valid = excluded.is_valid,
                validation_errors = excluded.validation_errors,
                front_image_path = excluded.front_image_path,
                back_image_path = excluded.back_image_path,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(user_id)
        .bind(&record.document_number)
        .bind(&record.full_name)
        .bind(&record.guardian_name)
        .bind(&record.date_of_birth)
        .bind(&record.gender)
        .bind(&record.address)
        .bind(&record.issue_date)
        .bind(&record.expiry_date)
        .bind(is_valid)
        .bind(validation_errors)
        .bind(front_path)
        .bind(back_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE verification_sessions
            SET cnic_uploaded = 1,
                ocr_completed = MAX(ocr_completed, ?)
            WHERE session_id = ?
            "#,
        )
        .bind(is_valid)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Document-step flag update for the attempt where nothing could be
    /// persisted to the document record (critical fields unreadable)
    pub async fn mark_document_attempt(&self, session_id: &str) -> VerifyResult<()> {
        sqlx::query(
            "UPDATE verification_sessions SET cnic_uploaded = 1 WHERE session_id = ?",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the selfie reference with its match score and verdict,
    /// coupled to the step flags, in one transaction
    pub async fn apply_face_match(
        &self,
        user_id: i64,
        session_id: &str,
        selfie_path: &str,
        score: f64,
        is_match: bool,
    ) -> VerifyResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO biometric_records (
                user_id, selfie_path, face_match_score, face_match_result, updated_at
            )
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(user_id) DO UPDATE SET
                selfie_path = excluded.selfie_path,
                face_match_score = excluded.face_match_score,
                face_match_result = excluded.face_match_result,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(user_id)
        .bind(selfie_path)
        .bind(score)
        .bind(is_match)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE verification_sessions
            SET selfie_uploaded = 1,
                face_match_completed = MAX(face_match_completed, ?)
            WHERE session_id = ?
            "#,
        )
        .bind(is_match)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Persist the liveness result coupled to its step flag
    pub async fn apply_liveness(
        &self,
        user_id: i64,
        session_id: &str,
        video_path: &str,
        score: f64,
        is_live: bool,
    ) -> VerifyResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO biometric_records (
                user_id, liveness_score, liveness_result, liveness_video_path, updated_at
            )
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(user_id) DO UPDATE SET
                liveness_score = excluded.liveness_score,
                liveness_result = excluded.liveness_result,
                liveness_video_path = excluded.liveness_video_path,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(user_id)
        .bind(score)
        .bind(is_live)
        .bind(video_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE verification_sessions
            SET liveness_completed = MAX(liveness_completed, ?)
            WHERE session_id = ?
            "#,
        )
        .bind(is_live)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Persist the fingerprint artifact reference coupled to its flag
    pub async fn apply_fingerprint(
        &self,
        user_id: i64,
        session_id: &str,
        artifact_path: &str,
    ) -> VerifyResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO biometric_records (
                user_id, fingerprint_path, fingerprint_verified, updated_at
            )
            VALUES (?, ?, 1, CURRENT_TIMESTAMP)
            ON CONFLICT(user_id) DO UPDATE SET
                fingerprint_path = excluded.fingerprint_path,
                fingerprint_verified = excluded.fingerprint_verified,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(user_id)
        .bind(artifact_path)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE verification_sessions SET fingerprint_captured = 1 WHERE session_id = ?",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Atomic finalize: re-check the flags and the terminal guard inside
    /// the transaction, then transition and create the account
    pub async fn finalize(
        &self,
        session_id: &str,
        user_id: i64,
        account_number: &str,
    ) -> VerifyResult<FinalizeDecision> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, VerificationSession>(
            "SELECT * FROM verification_sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| VerifyError::NotFound(format!("Session {} not found", session_id)))?;

        // Explicit terminal-state guard: no double account creation
        if session.status == SessionStatus::Completed {
            return Ok(FinalizeDecision::AlreadyCompleted);
        }

        let mut missing = Vec::new();
        if !session.cnic_uploaded {
            missing.push("cnic_uploaded");
        }
        if !session.ocr_completed {
            missing.push("ocr_completed");
        }
        if !session.selfie_uploaded {
            missing.push("selfie_uploaded");
        }
        if !session.face_match_completed {
            missing.push("face_match_completed");
        }
        if !session.liveness_completed {
            missing.push("liveness_completed");
        }
        if !missing.is_empty() {
            return Ok(FinalizeDecision::Incomplete(missing));
        }

        // Two finalize calls can both pass the status check before either
        // commits; the UNIQUE(user_id) constraint on accounts breaks the
        // tie and the loser reports the session as already completed.
        let insert = sqlx::query(
            r#"
            INSERT INTO accounts (user_id, account_number, account_type, status)
            VALUES (?, ?, 'savings', 'active')
            "#,
        )
        .bind(user_id)
        .bind(account_number)
        .execute(&mut *tx)
        .await;
        match insert {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Ok(FinalizeDecision::AlreadyCompleted);
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query(
            r#"
            UPDATE verification_sessions
            SET status = 'completed', completed_at = ?
            WHERE session_id = ?
            "#,
        )
        .bind(chrono::Utc::now().naive_utc())
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(FinalizeDecision::Completed)
    }
}
