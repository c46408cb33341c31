//! Vehicle verification handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use core_kernel::ClaimId;
use domain_claims::claim::{Actor, Angle};
use domain_claims::ingest::ImageUpload;

use crate::dto::verification::*;
use crate::{error::ApiError, AppState};

/// Multipart field carrying the photo
const FILE_FIELD: &str = "file";

/// Uploads and checks one photo for a required angle
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(claim_id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AngleUploadResponse>), ApiError> {
    let angle: Angle = query.angle.parse()?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?.to_vec();
            upload = Some(ImageUpload { bytes, angle, filename });
            break;
        }
    }
    let upload = upload
        .ok_or_else(|| ApiError::BadRequest(format!("missing '{}' part", FILE_FIELD)))?;

    let result = state
        .service
        .upload_angle_image(&actor, ClaimId::from_uuid(claim_id), angle, upload)
        .await?;
    Ok((StatusCode::CREATED, Json(result.into())))
}

/// Current verification progress across the required angles
pub async fn verification_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(claim_id): Path<Uuid>,
) -> Result<Json<VerificationStatusResponse>, ApiError> {
    let result = state
        .service
        .verification_status(&actor, ClaimId::from_uuid(claim_id))
        .await?;
    Ok(Json(VerificationStatusResponse {
        claim_id,
        threshold: state.service.verifier().threshold(),
        result,
    }))
}

/// Finalizes verification and re-triages the claim
pub async fn submit_verification(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(claim_id): Path<Uuid>,
) -> Result<Json<SubmitVerificationResponse>, ApiError> {
    let outcome = state
        .service
        .submit_verification(&actor, ClaimId::from_uuid(claim_id))
        .await?;
    Ok(Json(outcome.into()))
}
