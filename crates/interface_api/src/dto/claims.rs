//! Claims DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_claims::claim::{Angle, Claim, ClaimImage, ClaimStatus, ImageAnalysis};
use domain_claims::ingest::RejectedImage;
use domain_claims::service::ClaimSubmission;
use domain_claims::triage::TriageDecision;

/// Page size when the caller gives none
pub const DEFAULT_LIMIT: u32 = 50;

#[derive(Debug, Deserialize, Validate)]
pub struct ListClaimsQuery {
    pub status: Option<String>,
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub angle: Angle,
    pub original_filename: String,
    pub content_hash: String,
    pub byte_size: u64,
    pub ai_analysis: ImageAnalysis,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&ClaimImage> for ImageResponse {
    fn from(image: &ClaimImage) -> Self {
        Self {
            id: *image.id.as_uuid(),
            angle: image.angle,
            original_filename: image.original_filename.clone(),
            content_hash: image.content_hash.clone(),
            byte_size: image.byte_size,
            ai_analysis: image.ai_analysis.clone(),
            uploaded_at: image.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub policy_number: String,
    pub accident_date: NaiveDate,
    pub location: String,
    pub description: String,
    pub status: ClaimStatus,
    pub damage_score: f64,
    pub fraud_score: f64,
    pub cost_estimate: Decimal,
    pub currency: String,
    pub images: Vec<ImageResponse>,
    /// Revision of the latest analysis snapshot, 0 when none exists
    pub analysis_revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Claim> for ClaimResponse {
    fn from(claim: &Claim) -> Self {
        Self {
            id: *claim.id.as_uuid(),
            owner_id: *claim.owner_id.as_uuid(),
            policy_number: claim.policy_number.clone(),
            accident_date: claim.accident_date,
            location: claim.location.clone(),
            description: claim.description.clone(),
            status: claim.status,
            damage_score: claim.damage_score,
            fraud_score: claim.fraud_score,
            cost_estimate: claim.cost_estimate.amount(),
            currency: claim.cost_estimate.currency().code().to_string(),
            images: claim.images.iter().map(ImageResponse::from).collect(),
            analysis_revision: claim.analysis_snapshot().map_or(0, |s| s.revision),
            created_at: claim.created_at,
            updated_at: claim.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateClaimResponse {
    pub claim: ClaimResponse,
    pub decision: TriageDecision,
    pub rejected_images: Vec<RejectedImage>,
}

impl From<ClaimSubmission> for CreateClaimResponse {
    fn from(submission: ClaimSubmission) -> Self {
        Self {
            claim: ClaimResponse::from(&submission.claim),
            decision: submission.decision,
            rejected_images: submission.rejected,
        }
    }
}
