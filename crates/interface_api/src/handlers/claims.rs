//! Claims handlers

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use core_kernel::ClaimId;
use domain_claims::claim::{Actor, Angle, ClaimStatus, NewClaim};
use domain_claims::ingest::ImageUpload;
use domain_claims::service::{ClaimDeletion, ClaimScores};

use crate::config::MAX_IMAGES_PER_REQUEST;
use crate::dto::claims::*;
use crate::{error::ApiError, AppState};

/// Multipart field carrying claim photos
const IMAGES_FIELD: &str = "images";

/// Creates a claim from a multipart form and runs triage
pub async fn create_claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreateClaimResponse>), ApiError> {
    let (details, uploads) = read_claim_form(&actor, multipart).await?;
    let submission = state.service.create_claim(&actor, details, uploads).await?;

    info!(
        claim_id = %submission.claim.id,
        status = %submission.claim.status,
        rejected = submission.rejected.len(),
        "Claim submitted via API"
    );
    Ok((StatusCode::CREATED, Json(submission.into())))
}

/// Lists claims; administrators see every claim
pub async fn list_claims(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListClaimsQuery>,
) -> Result<Json<Vec<ClaimResponse>>, ApiError> {
    query.validate()?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ClaimStatus>)
        .transpose()?;

    let claims = state
        .service
        .list_claims(
            &actor,
            status,
            query.limit.unwrap_or(DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(claims.iter().map(ClaimResponse::from).collect()))
}

/// Gets a claim by ID
pub async fn get_claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let claim = state.service.get_claim(&actor, ClaimId::from_uuid(id)).await?;
    Ok(Json(ClaimResponse::from(&claim)))
}

/// Scores with the per-image breakdown and latest snapshot
pub async fn get_scores(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClaimScores>, ApiError> {
    let scores = state.service.get_scores(&actor, ClaimId::from_uuid(id)).await?;
    Ok(Json(scores))
}

/// Deletes a claim with its images
pub async fn delete_claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClaimDeletion>, ApiError> {
    let deletion = state.service.delete_claim(&actor, ClaimId::from_uuid(id)).await?;
    Ok(Json(deletion))
}

/// Administrator status override
pub async fn update_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    request.validate()?;
    let status: ClaimStatus = request.status.parse()?;

    let claim = state
        .service
        .update_status(&actor, ClaimId::from_uuid(id), status, request.note)
        .await?;
    Ok(Json(ClaimResponse::from(&claim)))
}

/// Splits a claim form into claim details and photo uploads
///
/// Photos are the `images` parts in order. A text field `angle_<n>` tags the
/// n-th photo; untagged photos take their angle from the filename prefix.
async fn read_claim_form(
    actor: &Actor,
    mut multipart: Multipart,
) -> Result<(NewClaim, Vec<ImageUpload>), ApiError> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut images: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == IMAGES_FIELD {
            if images.len() == MAX_IMAGES_PER_REQUEST {
                return Err(ApiError::BadRequest(format!(
                    "at most {} images per claim submission",
                    MAX_IMAGES_PER_REQUEST
                )));
            }
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            images.push((filename, bytes.to_vec()));
        } else {
            let value = field.text().await?;
            fields.insert(name, value);
        }
    }

    let mut required = |key: &str| {
        fields
            .remove(key)
            .ok_or_else(|| ApiError::BadRequest(format!("missing form field '{}'", key)))
    };
    let policy_number = required("policy_number")?;
    let accident_date = required("accident_date")?;
    let location = required("location")?;
    let description = required("description")?;

    let accident_date = NaiveDate::parse_from_str(accident_date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("accident_date must be YYYY-MM-DD".to_string()))?;

    let uploads = images
        .into_iter()
        .enumerate()
        .map(|(i, (filename, bytes))| {
            let angle = match fields.get(&format!("angle_{}", i)) {
                Some(tag) => tag.parse::<Angle>()?,
                None => Angle::from_filename(&filename),
            };
            Ok(ImageUpload { bytes, angle, filename })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let details = NewClaim {
        owner_id: actor.user_id,
        policy_number,
        accident_date,
        location,
        description,
    };
    Ok((details, uploads))
}
