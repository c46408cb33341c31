//! Claim triage
//!
//! Combines the damage, fraud and vehicle signals into a routing decision.
//! The pipeline only ever routes to `approved` or `review`; rejection is an
//! administrator decision.
//!
//! # Gated (default)
//!
//! First matching rule wins:
//!
//! 1. fraud score above 0.7 → review
//! 2. verification attempted and not all verified → review
//! 3. damage confidence above 0.8 → approved
//! 4. otherwise → review
//!
//! # Blended
//!
//! Fraud and vehicle dissimilarity are averaged into one risk figure, which
//! replaces rules 1 and 2. Approval additionally needs a fully verified
//! vehicle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::UserId;

use crate::claim::{Claim, ClaimStatus};
use crate::damage::DamageAssessment;
use crate::error::ClaimError;
use crate::fraud::FraudAssessment;
use crate::snapshot::AnalysisSnapshot;
use crate::verification::{VerificationResult, VerificationSubmission};

/// Fraud or combined risk above which a claim goes to review
pub const FRAUD_REVIEW_THRESHOLD: f64 = 0.7;

/// Damage confidence above which a claim may be approved
pub const APPROVAL_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Signal precedence used to route claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageStrategy {
    #[default]
    Gated,
    Blended,
}

impl FromStr for TriageStrategy {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gated" => Ok(TriageStrategy::Gated),
            "blended" => Ok(TriageStrategy::Blended),
            other => Err(ClaimError::Validation(format!(
                "unknown triage strategy '{}'",
                other
            ))),
        }
    }
}

/// The rule that settled a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    FraudScore,
    VehicleMismatch,
    DamageConfidence,
    InsufficientConfidence,
    VerificationSubmission,
}

impl DecisionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionRule::FraudScore => "fraud_score",
            DecisionRule::VehicleMismatch => "vehicle_mismatch",
            DecisionRule::DamageConfidence => "damage_confidence",
            DecisionRule::InsufficientConfidence => "insufficient_confidence",
            DecisionRule::VerificationSubmission => "verification_submission",
        }
    }
}

impl fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a new analysis revision or status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Submission,
    VerificationFinalized,
    AdminOverride,
}

impl TransitionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionTrigger::Submission => "submission",
            TransitionTrigger::VerificationFinalized => "verification_finalized",
            TransitionTrigger::AdminOverride => "admin_override",
        }
    }
}

impl fmt::Display for TransitionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub status: ClaimStatus,
    pub rule: DecisionRule,
    pub strategy: TriageStrategy,
    /// Blended risk figure; `None` under the gated strategy
    pub combined_score: Option<f64>,
}

impl TriageStrategy {
    /// Decides a status from the three signals
    ///
    /// `vehicle` is `None` when no verification was attempted.
    pub fn decide(
        &self,
        damage: &DamageAssessment,
        fraud: &FraudAssessment,
        vehicle: Option<&VerificationResult>,
    ) -> TriageDecision {
        let vehicle_ok = vehicle.map(|v| v.all_verified);

        let (status, rule, combined_score) = match self {
            TriageStrategy::Gated => {
                let (status, rule) = if fraud.fraud_score > FRAUD_REVIEW_THRESHOLD {
                    (ClaimStatus::Review, DecisionRule::FraudScore)
                } else if vehicle_ok == Some(false) {
                    (ClaimStatus::Review, DecisionRule::VehicleMismatch)
                } else if damage.confidence > APPROVAL_CONFIDENCE_THRESHOLD {
                    (ClaimStatus::Approved, DecisionRule::DamageConfidence)
                } else {
                    (ClaimStatus::Review, DecisionRule::InsufficientConfidence)
                };
                (status, rule, None)
            }
            TriageStrategy::Blended => {
                let combined = match vehicle {
                    Some(v) => f64::min((fraud.fraud_score + (1.0 - v.vehicle_similarity())) / 2.0, 1.0),
                    None => fraud.fraud_score,
                };
                let (status, rule) = if combined > FRAUD_REVIEW_THRESHOLD {
                    (ClaimStatus::Review, DecisionRule::FraudScore)
                } else if damage.confidence > APPROVAL_CONFIDENCE_THRESHOLD && vehicle_ok == Some(true) {
                    (ClaimStatus::Approved, DecisionRule::DamageConfidence)
                } else {
                    (ClaimStatus::Review, DecisionRule::InsufficientConfidence)
                };
                (status, rule, Some(combined))
            }
        };

        TriageDecision {
            status,
            rule,
            strategy: *self,
            combined_score,
        }
    }
}

/// Applies triage outcomes to a claim
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimTriage {
    strategy: TriageStrategy,
}

impl ClaimTriage {
    pub fn new(strategy: TriageStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> TriageStrategy {
        self.strategy
    }

    /// Scores and routes a claim
    ///
    /// Sets the claim scores, appends an analysis snapshot, updates the
    /// status and appends an audit entry.
    pub fn apply(
        &self,
        claim: &mut Claim,
        damage: DamageAssessment,
        fraud: FraudAssessment,
        vehicle: Option<VerificationResult>,
        trigger: TransitionTrigger,
    ) -> TriageDecision {
        let decision = self.strategy.decide(&damage, &fraud, vehicle.as_ref());

        claim.damage_score = damage.damage_score;
        claim.cost_estimate = damage.cost_estimate;
        claim.fraud_score = fraud.fraud_score;

        let snapshot = AnalysisSnapshot {
            revision: claim.next_revision(),
            trigger,
            prior_status: claim.status,
            damage_analysis: damage,
            fraud_analysis: fraud,
            car_verification: vehicle,
            verification_submission: None,
            decision: decision.clone(),
            recorded_at: chrono::Utc::now(),
        };
        claim.analysis_history.push(snapshot);
        claim.record_status(decision.status, trigger, Some(decision.rule), None, None);

        tracing::info!(
            claim_id = %claim.id,
            status = %decision.status,
            rule = %decision.rule,
            trigger = %trigger,
            strategy = ?decision.strategy,
            "Claim triaged"
        );

        decision
    }

    /// Records the outcome of verification finalization
    ///
    /// Appends a snapshot revision that carries the latest damage and fraud
    /// analyses forward, and moves the claim to `verified` when the
    /// submission is approved or to `review` otherwise.
    pub fn apply_submission(
        &self,
        claim: &mut Claim,
        vehicle: VerificationResult,
        submission: VerificationSubmission,
        actor: Option<UserId>,
    ) -> TriageDecision {
        use crate::verification::SubmissionRecommendation;

        let status = match submission.recommendation {
            SubmissionRecommendation::Approved => ClaimStatus::Verified,
            SubmissionRecommendation::ReviewRequired => ClaimStatus::Review,
        };
        let decision = TriageDecision {
            status,
            rule: DecisionRule::VerificationSubmission,
            strategy: self.strategy,
            combined_score: None,
        };

        let (damage, fraud) = match claim.analysis_snapshot() {
            Some(latest) => (latest.damage_analysis.clone(), latest.fraud_analysis.clone()),
            None => (
                DamageAssessment::empty(claim.cost_estimate.currency()),
                FraudAssessment::empty(),
            ),
        };

        let snapshot = AnalysisSnapshot {
            revision: claim.next_revision(),
            trigger: TransitionTrigger::VerificationFinalized,
            prior_status: claim.status,
            damage_analysis: damage,
            fraud_analysis: fraud,
            car_verification: Some(vehicle),
            verification_submission: Some(submission),
            decision: decision.clone(),
            recorded_at: chrono::Utc::now(),
        };
        claim.analysis_history.push(snapshot);
        claim.record_status(
            status,
            TransitionTrigger::VerificationFinalized,
            Some(DecisionRule::VerificationSubmission),
            actor,
            None,
        );

        tracing::info!(claim_id = %claim.id, status = %status, "Vehicle verification finalized");

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::VerificationRecommendation;
    use core_kernel::Currency;
    use std::collections::BTreeMap;

    fn damage(confidence: f64) -> DamageAssessment {
        let mut d = DamageAssessment::empty(Currency::USD);
        d.confidence = confidence;
        d.damage_score = 0.4;
        d
    }

    fn fraud(score: f64) -> FraudAssessment {
        let mut f = FraudAssessment::empty();
        f.fraud_score = score;
        f
    }

    fn vehicle(all_verified: bool, overall: f64) -> VerificationResult {
        VerificationResult {
            angles: BTreeMap::new(),
            verified_angles: if all_verified { 4 } else { 2 },
            total_angles: 4,
            overall_score: overall,
            all_verified,
            completion_percentage: if all_verified { 100.0 } else { 50.0 },
            recommendation: if all_verified {
                VerificationRecommendation::Approved
            } else {
                VerificationRecommendation::NeedsMoreImages
            },
            cross_check: None,
        }
    }

    #[test]
    fn test_gated_fraud_beats_confidence() {
        let d = TriageStrategy::Gated.decide(&damage(0.95), &fraud(0.75), None);
        assert_eq!(d.status, ClaimStatus::Review);
        assert_eq!(d.rule, DecisionRule::FraudScore);
    }

    #[test]
    fn test_gated_vehicle_mismatch_beats_confidence() {
        let v = vehicle(false, 0.5);
        let d = TriageStrategy::Gated.decide(&damage(0.95), &fraud(0.1), Some(&v));
        assert_eq!(d.rule, DecisionRule::VehicleMismatch);
        assert_eq!(d.status, ClaimStatus::Review);
    }

    #[test]
    fn test_gated_approves_confident_damage_without_verification() {
        let d = TriageStrategy::Gated.decide(&damage(0.85), &fraud(0.2), None);
        assert_eq!(d.status, ClaimStatus::Approved);
        assert_eq!(d.rule, DecisionRule::DamageConfidence);
    }

    #[test]
    fn test_gated_low_confidence_goes_to_review() {
        let d = TriageStrategy::Gated.decide(&damage(0.8), &fraud(0.2), None);
        assert_eq!(d.rule, DecisionRule::InsufficientConfidence);
    }

    #[test]
    fn test_blended_without_verification_uses_fraud_alone() {
        let d = TriageStrategy::Blended.decide(&damage(0.95), &fraud(0.4), None);
        assert_eq!(d.combined_score, Some(0.4));
        // Approval needs a verified vehicle
        assert_eq!(d.status, ClaimStatus::Review);
    }

    #[test]
    fn test_blended_combines_fraud_and_dissimilarity() {
        let v = vehicle(true, 0.9);
        let d = TriageStrategy::Blended.decide(&damage(0.95), &fraud(0.2), Some(&v));
        assert!((d.combined_score.unwrap() - 0.15).abs() < 1e-9);
        assert_eq!(d.status, ClaimStatus::Approved);

        let v = vehicle(false, 0.0);
        let d = TriageStrategy::Blended.decide(&damage(0.95), &fraud(0.6), Some(&v));
        assert_eq!(d.rule, DecisionRule::FraudScore);
    }

    #[test]
    fn test_strategy_never_rejects() {
        for strategy in [TriageStrategy::Gated, TriageStrategy::Blended] {
            for f in [0.0, 0.5, 0.71, 1.0] {
                for c in [0.0, 0.81, 1.0] {
                    let d = strategy.decide(&damage(c), &fraud(f), None);
                    assert_ne!(d.status, ClaimStatus::Rejected);
                }
            }
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("BLENDED".parse::<TriageStrategy>().unwrap(), TriageStrategy::Blended);
        assert!("weighted".parse::<TriageStrategy>().is_err());
    }
}
