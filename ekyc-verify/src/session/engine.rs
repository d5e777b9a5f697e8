//! Verification orchestration engine
//!
//! Owns the step-gating state machine and drives the
//! token -> upload -> reconcile -> validate -> finalize pipeline. All
//! collaborators are injected; the engine holds no global state and no
//! long-lived per-session actor exists. Each operation is request-scoped:
//! it validates the presented token, double-checks the session's own
//! deadline, awaits recognition I/O outside any transaction, then applies
//! flags and data in one short transaction, and records an audit event
//! before the operation is considered complete.

use chrono::{NaiveDateTime, Utc};
use std::future::Future;
use std::time::Duration;
use ekyc_common::audit::AuditTrail;
use ekyc_common::db::models::{SessionStatus, VerificationSession};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{VerifyError, VerifyResult};
use crate::providers::{DocumentExtractor, FaceMatcher, FieldCipher, LivenessChecker};
use crate::reconcile::{merge, DocumentFields};
use crate::session::store::{FinalizeDecision, SessionStore};
use crate::token::{TokenClaims, TokenError, TokenService};
use crate::validation::DocumentValidator;

/// A freshly issued verification link
#[derive(Debug, Clone, Serialize)]
pub struct IssuedLink {
    pub session_id: String,
    pub token: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub session_id: String,
    pub user_id: i64,
    pub status: SessionStatus,
}

/// Document-step result; a validation failure is structured feedback,
/// not an error
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStepOutcome {
    pub message: String,
    /// Present only when validation passed
    pub extracted: Option<DocumentFields>,
    pub validation_errors: Vec<String>,
    pub ocr_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceStepOutcome {
    pub is_match: bool,
    pub score: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessStepOutcome {
    pub is_live: bool,
    pub score: f64,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeOutcome {
    pub account_number: String,
}

/// Read-only session view exposed by `get_status`
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusView {
    pub session_id: String,
    pub status: SessionStatus,
    pub cnic_uploaded: bool,
    pub ocr_completed: bool,
    pub selfie_uploaded: bool,
    pub face_match_completed: bool,
    pub liveness_completed: bool,
    pub fingerprint_captured: bool,
}

impl From<&VerificationSession> for SessionStatusView {
    fn from(s: &VerificationSession) -> Self {
        Self {
            session_id: s.session_id.clone(),
            status: s.status,
            cnic_uploaded: s.cnic_uploaded,
            ocr_completed: s.ocr_completed,
            selfie_uploaded: s.selfie_uploaded,
            face_match_completed: s.face_match_completed,
            liveness_completed: s.liveness_completed,
            fingerprint_captured: s.fingerprint_captured,
        }
    }
}

/// The orchestration core, one instance per process
#[derive(Clone)]
pub struct VerificationEngine {
    store: SessionStore,
    audit: AuditTrail,
    tokens: TokenService,
    validator: DocumentValidator,
    primary_extractor: Arc<dyn DocumentExtractor>,
    secondary_extractor: Arc<dyn DocumentExtractor>,
    face_matcher: Arc<dyn FaceMatcher>,
    liveness_checker: Arc<dyn LivenessChecker>,
    cipher: Arc<dyn FieldCipher>,
    /// Deadline for one recognition collaborator call; a call that
    /// exceeds it fails closed with flags untouched
    collaborator_timeout: Duration,
}

impl VerificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SessionStore,
        audit: AuditTrail,
        tokens: TokenService,
        validator: DocumentValidator,
        primary_extractor: Arc<dyn DocumentExtractor>,
        secondary_extractor: Arc<dyn DocumentExtractor>,
        face_matcher: Arc<dyn FaceMatcher>,
        liveness_checker: Arc<dyn LivenessChecker>,
        cipher: Arc<dyn FieldCipher>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            store,
            audit,
            tokens,
            validator,
            primary_extractor,
            secondary_extractor,
            face_matcher,
            liveness_checker,
            cipher,
            collaborator_timeout,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // ---- onboarding ----

    /// Register a new user; the audit row is part of the operation
    pub async fn register_user(
        &self,
        full_name: &str,
        email: &str,
        phone: &str,
    ) -> VerifyResult<i64> {
        if full_name.trim().is_empty() {
            return Err(VerifyError::InvalidInput("Full name is required".to_string()));
        }
        let user_id = self.store.create_user(full_name, email, phone).await?;
        self.audit.user_registered(user_id, email, phone).await;
        Ok(user_id)
    }

    // ---- link issuance ----

    /// Create a new session and its capability token
    ///
    /// Re-issuing for an existing user always mints a fresh session id;
    /// prior sessions are never reused or extended.
    pub async fn issue_link(&self, user_id: i64) -> VerifyResult<IssuedLink> {
        self.store
            .fetch_user(user_id)
            .await?
            .ok_or_else(|| VerifyError::NotFound(format!("User {} not found", user_id)))?;

        let session_id = Uuid::new_v4().to_string();
        let token = self
            .tokens
            .issue(user_id, &session_id)
            .map_err(|e| VerifyError::Internal(format!("Token issuance failed: {}", e)))?;
        let expires_at =
            (Utc::now() + chrono::Duration::minutes(self.tokens.ttl_minutes())).naive_utc();

        self.store
            .create_session(&session_id, user_id, &token, expires_at)
            .await?;
        self.audit.link_generated(user_id, &session_id).await;

        Ok(IssuedLink {
            session_id,
            token,
            expires_at,
        })
    }

    // ---- token + session gate ----

    /// Validate the presented token and load its session
    ///
    /// Token expiry and session expiry are deliberately independent
    /// checks: a token can lapse while its session is still live, and a
    /// session can be invalidated while its token is still within
    /// window.
    pub(crate) async fn authorize(
        &self,
        token: &str,
    ) -> VerifyResult<(TokenClaims, VerificationSession)> {
        let claims = match self.tokens.validate(token) {
            Ok(claims) => claims,
            Err(TokenError::WrongPurpose) => {
                self.audit
                    .security_violation("token presented with wrong purpose", None)
                    .await;
                return Err(VerifyError::InvalidToken(
                    "Token purpose is not 'verification'".to_string(),
                ));
            }
            Err(e) => {
                self.audit
                    .security_violation(&format!("token rejected: {}", e), None)
                    .await;
                return Err(VerifyError::InvalidToken(e.to_string()));
            }
        };

        let session = self
            .store
            .fetch_session(&claims.session_id)
            .await?
            .ok_or_else(|| VerifyError::NotFound("Session not found".to_string()))?;

        // Mutations only ever come from the owning session's own token
        if session.user_id != claims.user_id {
            self.audit
                .security_violation("cross-session access attempt", Some(claims.user_id))
                .await;
            return Err(VerifyError::InvalidToken(
                "Token does not belong to this session".to_string(),
            ));
        }

        if session.status == SessionStatus::Expired {
            return Err(VerifyError::SessionExpired);
        }

        // Deadline check against the persisted expires_at
        if session.status != SessionStatus::Completed
            && Utc::now().naive_utc() > session.expires_at
        {
            self.store.mark_expired(&session.session_id).await?;
            return Err(VerifyError::SessionExpired);
        }

        Ok((claims, session))
    }

    /// Gate for step operations: the session must have been started.
    /// A FAILED session resumes to IN_PROGRESS here (soft marker).
    async fn ensure_step_ready(&self, session: &VerificationSession) -> VerifyResult<()> {
        match session.status {
            SessionStatus::InProgress => Ok(()),
            SessionStatus::Failed => {
                self.store.mark_in_progress(&session.session_id).await?;
                Ok(())
            }
            SessionStatus::Pending => Err(VerifyError::OrderingViolation(
                "Session has not been started".to_string(),
            )),
            SessionStatus::Completed => Err(VerifyError::TerminalState(
                "Verification already completed".to_string(),
            )),
            SessionStatus::Expired => Err(VerifyError::SessionExpired),
        }
    }

    /// Soft-FAIL policy for unhandled faults during a step: mark the
    /// session FAILED (recoverable), audit, and pass the error through.
    /// Collaborator faults do not reach here; they leave status alone.
    async fn fail_session(&self, claims: &TokenClaims, err: VerifyError) -> VerifyError {
        if let Err(e) = self.store.mark_failed(&claims.session_id).await {
            warn!("could not mark session {} failed: {}", claims.session_id, e);
        }
        self.audit
            .verification_failed(claims.user_id, &claims.session_id, &err.to_string())
            .await;
        err
    }

    // ---- operations ----

    /// PENDING -> IN_PROGRESS exactly once; re-submission while already
    /// IN_PROGRESS is a no-op success (page reloads are normal)
    pub async fn start_session(&self, token: &str) -> VerifyResult<StartOutcome> {
        let (claims, session) = self.authorize(token).await?;

        match session.status {
            SessionStatus::Pending | SessionStatus::Failed => {
                let transitioned = self.store.mark_in_progress(&session.session_id).await?;
                if transitioned && session.status == SessionStatus::Pending {
                    self.audit
                        .verification_started(claims.user_id, &session.session_id)
                        .await;
                }
            }
            SessionStatus::InProgress => {}
            SessionStatus::Completed => {
                return Err(VerifyError::TerminalState(
                    "Verification already completed".to_string(),
                ))
            }
            SessionStatus::Expired => return Err(VerifyError::SessionExpired),
        }

        Ok(StartOutcome {
            session_id: session.session_id,
            user_id: claims.user_id,
            status: SessionStatus::InProgress,
        })
    }

    /// Document step: dual extraction, reconcile, validate, persist
    ///
    /// `cnic_uploaded` rises on any successful upload+extraction attempt;
    /// `ocr_completed` rises only when validation passed. A validation
    /// failure is returned as structured feedback and the step may be
    /// retried.
    pub async fn record_document_upload(
        &self,
        token: &str,
        front: &Path,
        back: &Path,
    ) -> VerifyResult<DocumentStepOutcome> {
        let (claims, session) = self.authorize(token).await?;
        self.ensure_step_ready(&session).await?;

        self.audit
            .document_uploaded(claims.user_id, &session.session_id)
            .await;

        // Both recognition calls are awaited before any transaction opens
        let primary = self
            .call_collaborator(
                &claims,
                "document extraction",
                self.primary_extractor.extract(front, back),
            )
            .await?;
        let secondary = self
            .call_collaborator(
                &claims,
                "document extraction",
                self.secondary_extractor.extract(front, back),
            )
            .await?;

        let merged = merge(&primary, &secondary);

        // Critical fields unreadable: nothing to persist, structured
        // feedback to the caller, step retriable
        let number_missing = merged
            .document_number
            .as_deref()
            .map_or(true, |v| v.trim().is_empty());
        let name_missing = merged
            .full_name
            .as_deref()
            .map_or(true, |v| v.trim().is_empty());
        if number_missing && name_missing {
            self.store.mark_document_attempt(&session.session_id).await?;
            self.audit
                .extraction_completed(claims.user_id, &session.session_id, false, None)
                .await;
            return Ok(DocumentStepOutcome {
                message: "Critical data missing (name or document number not readable). \
                          Please retake with better lighting."
                    .to_string(),
                extracted: None,
                validation_errors: vec![
                    "Could not extract name or document number from the images".to_string(),
                ],
                ocr_completed: false,
            });
        }

        let declared_name = self
            .store
            .fetch_user(claims.user_id)
            .await?
            .map(|u| u.full_name);
        let report = self
            .validator
            .validate(&merged, declared_name.as_deref());

        if !report.is_valid {
            self.audit
                .record(
                    ekyc_common::audit::AuditEventType::DataValidationFailed,
                    Some(claims.user_id),
                    Some(&session.session_id),
                    Some(serde_json::json!({ "errors": report.errors })),
                    ekyc_common::audit::AuditSeverity::Warning,
                )
                .await;
        }

        // Sensitive fields pass through the cipher boundary before
        // persistence
        let stored = self
            .encrypt_fields(&merged)
            .map_err(|e| VerifyError::Internal(format!("Field encryption failed: {}", e)))?;
        let errors_json = serde_json::to_string(&report.errors)
            .unwrap_or_else(|_| "[]".to_string());

        let apply = self
            .store
            .apply_document_result(
                claims.user_id,
                &session.session_id,
                &stored,
                report.is_valid,
                &errors_json,
                &front.to_string_lossy(),
                &back.to_string_lossy(),
            )
            .await;
        if let Err(e) = apply {
            return Err(self.fail_session(&claims, e).await);
        }

        self.audit
            .extraction_completed(
                claims.user_id,
                &session.session_id,
                report.is_valid,
                merged.document_number.as_deref(),
            )
            .await;

        Ok(DocumentStepOutcome {
            message: if report.is_valid {
                "Document uploaded and processed successfully".to_string()
            } else {
                "Document processed with validation errors".to_string()
            },
            extracted: report.is_valid.then_some(merged),
            validation_errors: report.errors,
            ocr_completed: report.is_valid,
        })
    }

    /// Face-match step; requires the document step's `ocr_completed`
    pub async fn record_face_match(
        &self,
        token: &str,
        selfie: &Path,
        reference: &Path,
    ) -> VerifyResult<FaceStepOutcome> {
        let (claims, session) = self.authorize(token).await?;
        self.ensure_step_ready(&session).await?;
        self.require_document_validated(&session)?;

        let outcome = self
            .call_collaborator(&claims, "face match", self.face_matcher.compare(selfie, reference))
            .await?;
        let score = outcome.score.clamp(0.0, 1.0);

        let apply = self
            .store
            .apply_face_match(
                claims.user_id,
                &session.session_id,
                &selfie.to_string_lossy(),
                score,
                outcome.is_match,
            )
            .await;
        if let Err(e) = apply {
            return Err(self.fail_session(&claims, e).await);
        }

        self.audit
            .face_match(claims.user_id, &session.session_id, score, outcome.is_match)
            .await;

        Ok(FaceStepOutcome {
            is_match: outcome.is_match,
            score,
            message: if outcome.is_match {
                "Face matched successfully".to_string()
            } else {
                format!(
                    "Face match failed: {}",
                    outcome.error.unwrap_or_else(|| "below threshold".to_string())
                )
            },
        })
    }

    /// Liveness step; requires `ocr_completed`, independent of face-match
    /// order
    pub async fn record_liveness(
        &self,
        token: &str,
        video: &Path,
    ) -> VerifyResult<LivenessStepOutcome> {
        let (claims, session) = self.authorize(token).await?;
        self.ensure_step_ready(&session).await?;
        self.require_document_validated(&session)?;

        let outcome = self
            .call_collaborator(&claims, "liveness check", self.liveness_checker.check(video))
            .await?;
        let score = outcome.score.clamp(0.0, 1.0);

        let apply = self
            .store
            .apply_liveness(
                claims.user_id,
                &session.session_id,
                &video.to_string_lossy(),
                score,
                outcome.is_live,
            )
            .await;
        if let Err(e) = apply {
            return Err(self.fail_session(&claims, e).await);
        }

        self.audit
            .liveness_check(claims.user_id, &session.session_id, score, outcome.is_live)
            .await;

        Ok(LivenessStepOutcome {
            is_live: outcome.is_live,
            score,
            details: outcome.details,
        })
    }

    /// Fingerprint capture, a placeholder capability: stores the artifact
    /// reference and raises its flag; finalize does not require it
    pub async fn record_fingerprint(
        &self,
        token: &str,
        artifact: &Path,
    ) -> VerifyResult<SessionStatusView> {
        let (claims, session) = self.authorize(token).await?;
        self.ensure_step_ready(&session).await?;

        let apply = self
            .store
            .apply_fingerprint(claims.user_id, &session.session_id, &artifact.to_string_lossy())
            .await;
        if let Err(e) = apply {
            return Err(self.fail_session(&claims, e).await);
        }

        self.audit
            .fingerprint_captured(claims.user_id, &session.session_id)
            .await;

        let session = self
            .store
            .fetch_session(&session.session_id)
            .await?
            .ok_or_else(|| VerifyError::NotFound("Session not found".to_string()))?;
        Ok(SessionStatusView::from(&session))
    }

    /// Finalize: atomic all-flags check, terminal guard, account creation
    pub async fn finalize(&self, token: &str) -> VerifyResult<FinalizeOutcome> {
        let (claims, session) = self.authorize(token).await?;

        let account_number = generate_account_number(claims.user_id);
        let decision = match self
            .store
            .finalize(&session.session_id, claims.user_id, &account_number)
            .await
        {
            Ok(decision) => decision,
            Err(e @ VerifyError::Database(_)) => {
                return Err(self.fail_session(&claims, e).await)
            }
            Err(e) => return Err(e),
        };

        match decision {
            FinalizeDecision::Completed => {
                self.audit
                    .account_created(claims.user_id, &account_number)
                    .await;
                self.audit
                    .verification_completed(claims.user_id, &session.session_id)
                    .await;
                Ok(FinalizeOutcome { account_number })
            }
            FinalizeDecision::AlreadyCompleted => Err(VerifyError::TerminalState(
                "Verification already completed".to_string(),
            )),
            FinalizeDecision::Incomplete(missing) => Err(VerifyError::OrderingViolation(
                format!("Not all verification steps completed (missing: {})", missing.join(", ")),
            )),
        }
    }

    /// Read-only status view; no token required, no mutation
    pub async fn get_status(&self, session_id: &str) -> VerifyResult<SessionStatusView> {
        let session = self
            .store
            .fetch_session(session_id)
            .await?
            .ok_or_else(|| VerifyError::NotFound("Session not found".to_string()))?;
        Ok(SessionStatusView::from(&session))
    }

    // ---- helpers ----

    /// The one hard ordering dependency between steps: biometric steps
    /// cannot run against a document that has not been validated
    fn require_document_validated(&self, session: &VerificationSession) -> VerifyResult<()> {
        if !session.ocr_completed {
            return Err(VerifyError::OrderingViolation(
                "Document must be uploaded and validated first".to_string(),
            ));
        }
        Ok(())
    }

    /// Run one recognition call under the configured deadline
    ///
    /// A hung collaborator must not hang the request: the await is
    /// bounded, and elapsing the deadline is handled exactly like any
    /// other collaborator fault (flags untouched, warning audit,
    /// retriable).
    async fn call_collaborator<T, F>(
        &self,
        claims: &TokenClaims,
        what: &str,
        fut: F,
    ) -> VerifyResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.collaborator_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.collaborator_fault(claims, what, e).await),
            Err(_) => {
                let e = anyhow::anyhow!(
                    "no response within {}s",
                    self.collaborator_timeout.as_secs()
                );
                Err(self.collaborator_fault(claims, what, e).await)
            }
        }
    }

    /// Collaborator fault policy: flags untouched, warning-level audit,
    /// step retriable; session status is left alone
    async fn collaborator_fault(
        &self,
        claims: &TokenClaims,
        what: &str,
        err: anyhow::Error,
    ) -> VerifyError {
        self.audit
            .verification_failed(
                claims.user_id,
                &claims.session_id,
                &format!("{} collaborator fault: {}", what, err),
            )
            .await;
        VerifyError::Collaborator(format!("{} failed: {}", what, err))
    }

    fn encrypt_fields(&self, fields: &DocumentFields) -> anyhow::Result<DocumentFields> {
        let enc = |v: &Option<String>| -> anyhow::Result<Option<String>> {
            v.as_deref().map(|s| self.cipher.encrypt(s)).transpose()
        };
        Ok(DocumentFields {
            document_number: enc(&fields.document_number)?,
            full_name: enc(&fields.full_name)?,
            guardian_name: enc(&fields.guardian_name)?,
            date_of_birth: enc(&fields.date_of_birth)?,
            gender: enc(&fields.gender)?,
            address: enc(&fields.address)?,
            issue_date: enc(&fields.issue_date)?,
            expiry_date: enc(&fields.expiry_date)?,
        })
    }
}

/// Account numbers: fixed prefix, zero-padded owner id, random suffix
fn generate_account_number(user_id: i64) -> String {
    let suffix = Uuid::new_v4().as_u128() % 1_000_000;
    format!("PKR{:010}{:06}", user_id, suffix)
}
