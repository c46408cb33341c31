//! Analysis snapshots
//!
//! Every triage run and every verification finalization appends one
//! revision. Earlier revisions are never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claim::ClaimStatus;
use crate::damage::DamageAssessment;
use crate::fraud::FraudAssessment;
use crate::triage::{TransitionTrigger, TriageDecision};
use crate::verification::{VerificationResult, VerificationSubmission};

/// Everything that fed one routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    /// Starts at 1 and increases by one per revision
    pub revision: u32,
    pub trigger: TransitionTrigger,
    /// Claim status before this revision was applied
    pub prior_status: ClaimStatus,
    pub damage_analysis: DamageAssessment,
    pub fraud_analysis: FraudAssessment,
    pub car_verification: Option<VerificationResult>,
    pub verification_submission: Option<VerificationSubmission>,
    pub decision: TriageDecision,
    pub recorded_at: DateTime<Utc>,
}
