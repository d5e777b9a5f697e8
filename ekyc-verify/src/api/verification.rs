//! Verification step endpoints
//!
//! Upload endpoints take multipart form data carrying the bearer token
//! alongside the artifact; artifacts are written to the upload directory
//! as `<session_id>_<artifact>.<ext>` before the engine processes them.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{VerifyError, VerifyResult};
use crate::session::{
    DocumentStepOutcome, FaceStepOutcome, FinalizeOutcome, LivenessStepOutcome, SessionStatusView,
    StartOutcome,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

/// POST /api/verification/start
pub async fn start_verification(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> VerifyResult<Json<StartOutcome>> {
    let outcome = state.engine.start_session(&req.token).await?;
    Ok(Json(outcome))
}

/// POST /api/verification/document
///
/// Multipart fields: `token`, `front` (image), `back` (image).
pub async fn upload_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> VerifyResult<Json<DocumentStepOutcome>> {
    let form = UploadForm::read(multipart).await?;
    let token = form.token()?;
    let (_, session) = state.engine.authorize(token).await?;

    let front = save_artifact(&state, &session.session_id, &form, "front", "cnic_front", "jpg")
        .await?;
    let back =
        save_artifact(&state, &session.session_id, &form, "back", "cnic_back", "jpg").await?;

    let outcome = state
        .engine
        .record_document_upload(token, &front, &back)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/verification/selfie
///
/// Multipart fields: `token`, `selfie` (image). The reference image is
/// the previously stored document front.
pub async fn upload_selfie(
    State(state): State<AppState>,
    multipart: Multipart,
) -> VerifyResult<Json<FaceStepOutcome>> {
    let form = UploadForm::read(multipart).await?;
    let token = form.token()?;
    let (claims, session) = state.engine.authorize(token).await?;

    let reference = state
        .engine
        .store()
        .fetch_document(claims.user_id)
        .await?
        .and_then(|d| d.front_image_path)
        .ok_or_else(|| {
            VerifyError::OrderingViolation(
                "Document must be uploaded and validated first".to_string(),
            )
        })?;

    let selfie =
        save_artifact(&state, &session.session_id, &form, "selfie", "selfie", "jpg").await?;

    let outcome = state
        .engine
        .record_face_match(token, &selfie, &PathBuf::from(reference))
        .await?;
    Ok(Json(outcome))
}

/// POST /api/verification/liveness
///
/// Multipart fields: `token`, `video`.
pub async fn upload_liveness(
    State(state): State<AppState>,
    multipart: Multipart,
) -> VerifyResult<Json<LivenessStepOutcome>> {
    let form = UploadForm::read(multipart).await?;
    let token = form.token()?;
    let (_, session) = state.engine.authorize(token).await?;

    let video =
        save_artifact(&state, &session.session_id, &form, "video", "liveness", "mp4").await?;

    let outcome = state.engine.record_liveness(token, &video).await?;
    Ok(Json(outcome))
}

/// POST /api/verification/fingerprint
///
/// Multipart fields: `token`, `fingerprint`.
pub async fn upload_fingerprint(
    State(state): State<AppState>,
    multipart: Multipart,
) -> VerifyResult<Json<SessionStatusView>> {
    let form = UploadForm::read(multipart).await?;
    let token = form.token()?;
    let (_, session) = state.engine.authorize(token).await?;

    let artifact =
        save_artifact(&state, &session.session_id, &form, "fingerprint", "fingerprint", "bin")
            .await?;

    let view = state.engine.record_fingerprint(token, &artifact).await?;
    Ok(Json(view))
}

/// POST /api/verification/finalize
pub async fn finalize_verification(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> VerifyResult<Json<FinalizeResponse>> {
    let outcome = state.engine.finalize(&req.token).await?;
    Ok(Json(FinalizeResponse {
        success: true,
        outcome,
    }))
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: FinalizeOutcome,
}

/// GET /api/verification/status/:session_id
///
/// Read-only; requires no token and never mutates the session.
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> VerifyResult<Json<SessionStatusView>> {
    let view = state.engine.get_status(&session_id).await?;
    Ok(Json(view))
}

// ---- multipart plumbing ----

struct UploadForm {
    token: Option<String>,
    /// field name -> (client filename, bytes)
    files: HashMap<String, (String, Vec<u8>)>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> VerifyResult<Self> {
        let mut token = None;
        let mut files = HashMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| VerifyError::InvalidInput(format!("Malformed multipart body: {}", e)))?
        {
            let name = match field.name() {
                Some(n) => n.to_string(),
                None => continue,
            };
            if name == "token" {
                token = Some(field.text().await.map_err(|e| {
                    VerifyError::InvalidInput(format!("Unreadable token field: {}", e))
                })?);
            } else {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    VerifyError::InvalidInput(format!("Unreadable field '{}': {}", name, e))
                })?;
                files.insert(name, (filename, bytes.to_vec()));
            }
        }

        Ok(Self { token, files })
    }

    fn token(&self) -> VerifyResult<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| VerifyError::InvalidInput("Missing 'token' field".to_string()))
    }
}

/// Write one uploaded artifact to disk as `<session_id>_<artifact>.<ext>`
async fn save_artifact(
    state: &AppState,
    session_id: &str,
    form: &UploadForm,
    field: &str,
    artifact: &str,
    default_ext: &str,
) -> VerifyResult<PathBuf> {
    let (filename, bytes) = form
        .files
        .get(field)
        .ok_or_else(|| VerifyError::InvalidInput(format!("Missing '{}' upload", field)))?;
    if bytes.is_empty() {
        return Err(VerifyError::InvalidInput(format!("Empty '{}' upload", field)));
    }

    // Extension from the client filename, restricted to something safe
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(default_ext)
        .to_ascii_lowercase();

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| VerifyError::Internal(format!("Cannot create upload dir: {}", e)))?;

    let path = state
        .upload_dir
        .join(format!("{}_{}.{}", session_id, artifact, ext));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| VerifyError::Internal(format!("Cannot store upload: {}", e)))?;

    Ok(path)
}
