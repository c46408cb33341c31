//! Claim aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use core_kernel::{AuditEntryId, ClaimId, Currency, ImageId, Money, UserId};

use crate::damage::ImageDamage;
use crate::error::ClaimError;
use crate::fraud::ImageFraud;
use crate::snapshot::AnalysisSnapshot;
use crate::triage::{DecisionRule, TransitionTrigger};
use crate::verification::ImageVerification;

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    /// Submitted, not yet triaged
    Pending,
    /// Approved for settlement
    Approved,
    /// Rejected by an administrator
    Rejected,
    /// Needs a human reviewer
    Review,
    /// Vehicle identity confirmed by the verification flow
    Verified,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 5] = [
        ClaimStatus::Pending,
        ClaimStatus::Approved,
        ClaimStatus::Rejected,
        ClaimStatus::Review,
        ClaimStatus::Verified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Review => "review",
            ClaimStatus::Verified => "verified",
        }
    }

    /// Whether an administrator may set this status by hand
    ///
    /// `verified` is only reachable through verification finalization.
    pub fn is_admin_assignable(&self) -> bool {
        !matches!(self, ClaimStatus::Verified)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ClaimStatus::Pending),
            "approved" => Ok(ClaimStatus::Approved),
            "rejected" => Ok(ClaimStatus::Rejected),
            "review" => Ok(ClaimStatus::Review),
            "verified" => Ok(ClaimStatus::Verified),
            other => Err(ClaimError::InvalidStatusTransition(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

/// Camera angle of a claim photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Angle {
    Front,
    Back,
    Left,
    Right,
    Unknown,
}

impl Angle {
    /// The angles vehicle verification needs
    pub const REQUIRED: [Angle; 4] = [Angle::Front, Angle::Back, Angle::Left, Angle::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Angle::Front => "front",
            Angle::Back => "back",
            Angle::Left => "left",
            Angle::Right => "right",
            Angle::Unknown => "unknown",
        }
    }

    pub fn is_required(&self) -> bool {
        !matches!(self, Angle::Unknown)
    }

    /// Parses one of the four required angles
    pub fn parse_required(s: &str) -> Result<Self, ClaimError> {
        match s.parse::<Angle>()? {
            Angle::Unknown => Err(ClaimError::InvalidAngle(s.to_string())),
            angle => Ok(angle),
        }
    }

    /// Guesses the angle from a filename such as `front_bumper.jpg`
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        let stem = lower.rsplit(['/', '\\']).next().unwrap_or(&lower);
        Angle::REQUIRED
            .into_iter()
            .find(|angle| {
                stem.strip_prefix(angle.as_str())
                    .map(|rest| rest.is_empty() || rest.starts_with(['_', '-', '.', ' ']))
                    .unwrap_or(false)
            })
            .unwrap_or(Angle::Unknown)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Angle {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Angle::Front),
            "back" => Ok(Angle::Back),
            "left" => Ok(Angle::Left),
            "right" => Ok(Angle::Right),
            "unknown" | "" => Ok(Angle::Unknown),
            _ => Err(ClaimError::InvalidAngle(s.to_string())),
        }
    }
}

/// Per-image analysis stored alongside the image record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub damage: Option<ImageDamage>,
    pub fraud: Option<ImageFraud>,
    pub verification: Option<ImageVerification>,
}

/// A photo attached to a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimImage {
    pub id: ImageId,
    pub claim_id: ClaimId,
    /// Blob store key; never changes after ingest
    pub storage_path: String,
    /// Lower-case hex SHA-256 of the stored bytes
    pub content_hash: String,
    pub angle: Angle,
    pub original_filename: String,
    pub byte_size: u64,
    pub ai_analysis: ImageAnalysis,
    pub uploaded_at: DateTime<Utc>,
}

/// Who performed an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self { user_id, is_admin: true }
    }
}

/// One status change in a claim's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusAuditEntry {
    pub id: AuditEntryId,
    pub claim_id: ClaimId,
    pub from_status: ClaimStatus,
    pub to_status: ClaimStatus,
    pub trigger: TransitionTrigger,
    /// Triage rule that produced the status, if any
    pub rule: Option<DecisionRule>,
    /// `None` when the change was made by the triage pipeline itself
    pub actor: Option<UserId>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Claim details supplied at submission
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub owner_id: UserId,
    pub policy_number: String,
    pub accident_date: NaiveDate,
    pub location: String,
    pub description: String,
}

/// An accident claim with its photos and decision history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub owner_id: UserId,
    pub policy_number: String,
    pub accident_date: NaiveDate,
    pub location: String,
    pub description: String,
    pub status: ClaimStatus,
    pub damage_score: f64,
    pub cost_estimate: Money,
    pub fraud_score: f64,
    pub images: Vec<ClaimImage>,
    /// Append-only; the last entry is the current snapshot
    pub analysis_history: Vec<AnalysisSnapshot>,
    /// Append-only status changes
    pub audit_trail: Vec<StatusAuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Creates a pending claim with zero scores
    pub fn new(details: NewClaim, currency: Currency) -> Result<Self, ClaimError> {
        let policy_number = details.policy_number.trim().to_string();
        if policy_number.is_empty() {
            return Err(ClaimError::Validation("policy_number is required".to_string()));
        }
        if details.accident_date > Utc::now().date_naive() {
            return Err(ClaimError::Validation(
                "accident_date cannot be in the future".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: ClaimId::new_v7(),
            owner_id: details.owner_id,
            policy_number,
            accident_date: details.accident_date,
            location: details.location.trim().to_string(),
            description: details.description.trim().to_string(),
            status: ClaimStatus::Pending,
            damage_score: 0.0,
            cost_estimate: Money::zero(currency),
            fraud_score: 0.0,
            images: Vec::new(),
            analysis_history: Vec::new(),
            audit_trail: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// The most recent analysis snapshot
    pub fn analysis_snapshot(&self) -> Option<&AnalysisSnapshot> {
        self.analysis_history.last()
    }

    /// Revision number the next snapshot will carry
    pub fn next_revision(&self) -> u32 {
        self.analysis_history.last().map(|s| s.revision + 1).unwrap_or(1)
    }

    /// Owner or administrator only
    pub fn ensure_access(&self, actor: &Actor) -> Result<(), ClaimError> {
        if actor.is_admin || actor.user_id == self.owner_id {
            Ok(())
        } else {
            Err(ClaimError::AccessDenied(format!(
                "user {} may not access claim {}",
                actor.user_id, self.id
            )))
        }
    }

    /// Attaches an ingested image
    pub fn add_image(&mut self, image: ClaimImage) {
        self.images.push(image);
        self.updated_at = Utc::now();
    }

    /// Latest image per angle, ignoring untagged images
    pub fn latest_images_by_angle(&self) -> BTreeMap<Angle, &ClaimImage> {
        let mut latest: BTreeMap<Angle, &ClaimImage> = BTreeMap::new();
        for image in self.images.iter().filter(|i| i.angle.is_required()) {
            match latest.get(&image.angle) {
                Some(existing) if existing.uploaded_at > image.uploaded_at => {}
                _ => {
                    latest.insert(image.angle, image);
                }
            }
        }
        latest
    }

    /// Sets the status and appends an audit entry
    pub fn record_status(
        &mut self,
        to_status: ClaimStatus,
        trigger: TransitionTrigger,
        rule: Option<DecisionRule>,
        actor: Option<UserId>,
        note: Option<String>,
    ) -> &StatusAuditEntry {
        let now = Utc::now();
        let from_status = self.status;

        self.status = to_status;
        self.updated_at = now;
        self.audit_trail.push(StatusAuditEntry {
            id: AuditEntryId::new_v7(),
            claim_id: self.id,
            from_status,
            to_status,
            trigger,
            rule,
            actor,
            note,
            recorded_at: now,
        });
        &self.audit_trail[self.audit_trail.len() - 1]
    }

    /// Administrator status override
    pub fn override_status(
        &mut self,
        to_status: ClaimStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<(), ClaimError> {
        if !actor.is_admin {
            return Err(ClaimError::AccessDenied(
                "only administrators may override claim status".to_string(),
            ));
        }
        if !to_status.is_admin_assignable() {
            return Err(ClaimError::InvalidStatusTransition(format!(
                "status '{}' can only be reached through verification",
                to_status
            )));
        }

        self.record_status(
            to_status,
            TransitionTrigger::AdminOverride,
            None,
            Some(actor.user_id),
            note,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(owner: UserId) -> Claim {
        Claim::new(
            NewClaim {
                owner_id: owner,
                policy_number: " POL-1 ".to_string(),
                accident_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                location: "Main St".to_string(),
                description: "Rear-ended".to_string(),
            },
            Currency::USD,
        )
        .unwrap()
    }

    #[test]
    fn test_new_claim_is_pending_with_zero_scores() {
        let c = claim(UserId::new());
        assert_eq!(c.status, ClaimStatus::Pending);
        assert_eq!(c.policy_number, "POL-1");
        assert_eq!(c.damage_score, 0.0);
        assert!(c.cost_estimate.is_zero());
        assert!(c.analysis_snapshot().is_none());
        assert_eq!(c.next_revision(), 1);
    }

    #[test]
    fn test_status_parsing_rejects_unknown_text() {
        assert_eq!("Review".parse::<ClaimStatus>().unwrap(), ClaimStatus::Review);
        assert!(matches!(
            "closed".parse::<ClaimStatus>(),
            Err(ClaimError::InvalidStatusTransition(_))
        ));
    }

    #[test]
    fn test_angle_from_filename() {
        assert_eq!(Angle::from_filename("front_bumper.jpg"), Angle::Front);
        assert_eq!(Angle::from_filename("uploads/LEFT.png"), Angle::Left);
        assert_eq!(Angle::from_filename("frontal.png"), Angle::Unknown);
        assert_eq!(Angle::from_filename("IMG_0001.jpg"), Angle::Unknown);
    }

    #[test]
    fn test_parse_required_rejects_unknown() {
        assert!(matches!(Angle::parse_required("unknown"), Err(ClaimError::InvalidAngle(_))));
        assert!(matches!(Angle::parse_required("top"), Err(ClaimError::InvalidAngle(_))));
        assert_eq!(Angle::parse_required("BACK").unwrap(), Angle::Back);
    }

    #[test]
    fn test_access_is_owner_or_admin() {
        let owner = UserId::new();
        let c = claim(owner);
        assert!(c.ensure_access(&Actor::user(owner)).is_ok());
        assert!(c.ensure_access(&Actor::admin(UserId::new())).is_ok());
        assert!(matches!(
            c.ensure_access(&Actor::user(UserId::new())),
            Err(ClaimError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_override_requires_admin_and_assignable_status() {
        let owner = UserId::new();
        let mut c = claim(owner);
        let admin = Actor::admin(UserId::new());

        assert!(c.override_status(ClaimStatus::Approved, &Actor::user(owner), None).is_err());
        assert!(matches!(
            c.override_status(ClaimStatus::Verified, &admin, None),
            Err(ClaimError::InvalidStatusTransition(_))
        ));

        c.override_status(ClaimStatus::Rejected, &admin, Some("policy lapsed".into())).unwrap();
        assert_eq!(c.status, ClaimStatus::Rejected);
        let entry = c.audit_trail.last().unwrap();
        assert_eq!(entry.trigger, TransitionTrigger::AdminOverride);
        assert_eq!(entry.actor, Some(admin.user_id));
    }
}
