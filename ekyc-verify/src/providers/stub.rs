//! Built-in collaborator implementations for development and tests
//!
//! Real deployments wire vendor-backed extractors and matchers in at
//! bootstrap; these stand-ins keep the pipeline runnable without any
//! recognition backend.

use super::{DocumentExtractor, FaceMatcher, LivenessChecker, LivenessOutcome, MatchOutcome};
use crate::reconcile::DocumentFields;
use async_trait::async_trait;
use std::path::Path;

/// Returns the same configured field set for every document
pub struct StaticExtractor {
    fields: DocumentFields,
}

impl StaticExtractor {
    pub fn new(fields: DocumentFields) -> Self {
        Self { fields }
    }

    /// An extractor that recognizes nothing; every field comes back empty
    pub fn empty() -> Self {
        Self {
            fields: DocumentFields::default(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for StaticExtractor {
    async fn extract(&self, _front: &Path, _back: &Path) -> anyhow::Result<DocumentFields> {
        Ok(self.fields.clone())
    }
}

/// Always returns the configured score; the verdict follows the threshold
pub struct FixedFaceMatcher {
    score: f64,
    threshold: f64,
}

impl FixedFaceMatcher {
    pub fn new(score: f64, threshold: f64) -> Self {
        Self { score, threshold }
    }
}

#[async_trait]
impl FaceMatcher for FixedFaceMatcher {
    async fn compare(&self, _selfie: &Path, _reference: &Path) -> anyhow::Result<MatchOutcome> {
        let is_match = self.score >= self.threshold;
        Ok(MatchOutcome {
            is_match,
            score: self.score,
            error: (!is_match).then(|| "similarity below threshold".to_string()),
        })
    }
}

/// Always returns the configured liveness verdict
pub struct FixedLivenessChecker {
    score: f64,
    is_live: bool,
}

impl FixedLivenessChecker {
    pub fn new(score: f64, is_live: bool) -> Self {
        Self { score, is_live }
    }
}

#[async_trait]
impl LivenessChecker for FixedLivenessChecker {
    async fn check(&self, _video: &Path) -> anyhow::Result<LivenessOutcome> {
        Ok(LivenessOutcome {
            is_live: self.is_live,
            score: self.score,
            details: serde_json::json!({ "provider": "builtin", "frames_analyzed": 0 }),
        })
    }
}

/// Fails every call; exercises the collaborator-fault path
pub struct FailingExtractor;

#[async_trait]
impl DocumentExtractor for FailingExtractor {
    async fn extract(&self, _front: &Path, _back: &Path) -> anyhow::Result<DocumentFields> {
        Err(anyhow::anyhow!("recognition backend unreachable"))
    }
}

/// Never responds; exercises the collaborator-deadline path
pub struct HangingExtractor;

#[async_trait]
impl DocumentExtractor for HangingExtractor {
    async fn extract(&self, _front: &Path, _back: &Path) -> anyhow::Result<DocumentFields> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(DocumentFields::default())
    }
}
