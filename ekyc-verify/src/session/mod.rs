//! Verification session state machine
//!
//! `store` owns all persistence for sessions and their associated
//! records; `engine` owns the orchestration logic driving the
//! token -> upload -> reconcile -> validate -> finalize pipeline.

pub mod engine;
pub mod store;

pub use engine::{
    DocumentStepOutcome, FaceStepOutcome, FinalizeOutcome, IssuedLink, LivenessStepOutcome,
    SessionStatusView, StartOutcome, VerificationEngine,
};
pub use store::SessionStore;
