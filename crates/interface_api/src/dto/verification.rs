//! Vehicle verification DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_claims::claim::ClaimStatus;
use domain_claims::service::{AngleUpload, VerificationOutcome};
use domain_claims::verification::{ImageVerification, VerificationResult, VerificationSubmission};

use super::claims::ImageResponse;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub angle: String,
}

#[derive(Debug, Serialize)]
pub struct AngleUploadResponse {
    pub message: String,
    pub image: ImageResponse,
    pub verification: ImageVerification,
}

impl From<AngleUpload> for AngleUploadResponse {
    fn from(upload: AngleUpload) -> Self {
        Self {
            message: format!("Image uploaded and checked for {} angle", upload.image.angle),
            image: ImageResponse::from(&upload.image),
            verification: upload.verification,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerificationStatusResponse {
    pub claim_id: Uuid,
    pub threshold: f64,
    #[serde(flatten)]
    pub result: VerificationResult,
}

#[derive(Debug, Serialize)]
pub struct SubmitVerificationResponse {
    pub claim_id: Uuid,
    pub status: ClaimStatus,
    pub submission: VerificationSubmission,
    pub verification: VerificationResult,
}

impl From<VerificationOutcome> for SubmitVerificationResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            claim_id: *outcome.claim_id.as_uuid(),
            status: outcome.status,
            submission: outcome.submission,
            verification: outcome.verification,
        }
    }
}
