//! External collaborator capability contracts
//!
//! The orchestration engine consumes recognition services and the field
//! cipher through these traits only; concrete implementations are wired
//! in at process bootstrap, never as module-level singletons. Recognition
//! calls are long-running I/O and are always awaited outside any held
//! database transaction.

use crate::reconcile::DocumentFields;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

mod cipher;
pub mod stub;

pub use cipher::{AesGcmCipher, PlainCipher};

/// Field-level text extraction from a captured document
///
/// "Nothing recognized" is a normal outcome (all fields empty), never an
/// error; the error path is reserved for I/O and infrastructure faults.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, front: &Path, back: &Path) -> anyhow::Result<DocumentFields>;
}

/// Result of one face comparison call
///
/// Score and boolean verdict come from the same call and are persisted
/// together, atomically.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub is_match: bool,
    /// Similarity in [0, 1]
    pub score: f64,
    /// Provider-supplied explanation on a negative verdict
    pub error: Option<String>,
}

#[async_trait]
pub trait FaceMatcher: Send + Sync {
    async fn compare(&self, selfie: &Path, reference: &Path) -> anyhow::Result<MatchOutcome>;
}

/// Result of one liveness analysis call
#[derive(Debug, Clone)]
pub struct LivenessOutcome {
    pub is_live: bool,
    /// Confidence in [0, 1]
    pub score: f64,
    /// Provider-specific detail map, passed through to the caller
    pub details: Value,
}

#[async_trait]
pub trait LivenessChecker: Send + Sync {
    async fn check(&self, video: &Path) -> anyhow::Result<LivenessOutcome>;
}

/// At-rest protection boundary for sensitive fields
///
/// The engine routes every persisted sensitive field through this
/// interface and is agnostic to whether the deployment stores plaintext
/// or ciphertext behind it.
pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> anyhow::Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Option<String>;
}
