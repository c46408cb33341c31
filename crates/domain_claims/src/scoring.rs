//! Scorer input

use std::sync::Arc;

use core_kernel::ImageId;

use crate::claim::{Angle, ClaimImage};

/// One image handed to the damage and fraud scorers
///
/// Results are attributed by `image_id`, never by position in the batch.
#[derive(Debug, Clone)]
pub struct ScoringImage {
    pub image_id: ImageId,
    pub angle: Angle,
    pub content_hash: String,
    pub bytes: Arc<[u8]>,
}

impl ScoringImage {
    pub fn new(image: &ClaimImage, bytes: Arc<[u8]>) -> Self {
        Self {
            image_id: image.id,
            angle: image.angle,
            content_hash: image.content_hash.clone(),
            bytes,
        }
    }
}
