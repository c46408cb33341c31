//! Claim Intake and Triage Domain
//!
//! Accident claims arrive with angle-tagged photos. Each submission is
//! scored for damage, fraud and vehicle identity, and then routed.
//!
//! # Pipeline
//!
//! ```text
//! ImageIngestor -> { DamageScorer | FraudScorer | VehicleVerifier } -> ClaimTriage
//! ```
//!
//! # Claim Status
//!
//! ```text
//! pending -> approved | review            (triage)
//! any     -> verified | review            (verification finalization)
//! any     -> pending | approved | rejected | review   (admin override)
//! ```

pub mod adapters;
pub mod claim;
pub mod damage;
pub mod error;
pub mod exif;
pub mod fraud;
pub mod ingest;
pub mod ports;
pub mod scoring;
pub mod service;
pub mod signals;
pub mod snapshot;
pub mod triage;
pub mod verification;

pub use claim::{Actor, Angle, Claim, ClaimImage, ClaimStatus, ImageAnalysis, NewClaim, StatusAuditEntry};
pub use damage::{DamageAssessment, DamageScorer, DamageType, HeuristicDamageScorer, Severity};
pub use error::ClaimError;
pub use fraud::{
    DetectionSession, FraudAssessment, FraudIssue, FraudScorer, HeuristicFraudScorer, RiskLevel,
    SessionGuard, SessionScope,
};
pub use ingest::{ImageIngestor, ImageUpload, IngestPolicy, RejectedImage};
pub use ports::{ClaimQuery, ClaimStats, ClaimStore, ImageBlobStore, SimilarityOracle};
pub use service::{ClaimIntakeService, ClaimLocks, ClaimWriteGuard, IntakeSettings};
pub use snapshot::AnalysisSnapshot;
pub use triage::{ClaimTriage, DecisionRule, TransitionTrigger, TriageDecision, TriageStrategy};
pub use verification::{VehicleVerifier, VerificationResult, VerificationSubmission};
