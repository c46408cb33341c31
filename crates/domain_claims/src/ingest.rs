//! Image ingest
//!
//! Validates uploaded photos, fingerprints them and writes them to the blob
//! store. Scoring happens elsewhere.

use chrono::Utc;
use image::{GenericImageView, ImageFormat};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use core_kernel::{ClaimId, ImageId};

use crate::claim::{Angle, ClaimImage, ImageAnalysis};
use crate::error::ClaimError;
use crate::ports::ImageBlobStore;
use crate::scoring::ScoringImage;
use crate::signals::content_hash;

/// File extensions accepted for upload
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Default minimum width and height in pixels
pub const DEFAULT_MIN_DIMENSION: u32 = 50;

/// Default upload size limit (10 MiB)
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// A photo as received from the client
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub angle: Angle,
    pub filename: String,
}

/// Limits applied during ingest
#[derive(Debug, Clone, Copy)]
pub struct IngestPolicy {
    pub min_dimension: u32,
    pub max_bytes: usize,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            min_dimension: DEFAULT_MIN_DIMENSION,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// A validated image ready to be stored
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub record: ClaimImage,
    pub bytes: Arc<[u8]>,
}

impl PreparedImage {
    pub fn scoring_input(&self) -> ScoringImage {
        ScoringImage::new(&self.record, self.bytes.clone())
    }
}

/// An upload that failed validation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RejectedImage {
    pub filename: String,
    pub reason: String,
}

/// Result of preparing a batch
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub accepted: Vec<PreparedImage>,
    pub rejected: Vec<RejectedImage>,
}

/// Validates and stores claim photos
#[derive(Debug)]
pub struct ImageIngestor {
    policy: IngestPolicy,
    sequence: AtomicU64,
}

impl ImageIngestor {
    pub fn new(policy: IngestPolicy) -> Self {
        Self {
            policy,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> IngestPolicy {
        self.policy
    }

    /// Validates a batch; invalid uploads are reported, the rest continue
    pub fn prepare(&self, claim_id: ClaimId, uploads: Vec<ImageUpload>) -> PreparedBatch {
        let mut batch = PreparedBatch::default();
        for upload in uploads {
            let filename = upload.filename.clone();
            match self.prepare_one(claim_id, upload) {
                Ok(image) => batch.accepted.push(image),
                Err(err) => {
                    tracing::warn!(claim_id = %claim_id, filename = %filename, error = %err, "Rejected image upload");
                    let reason = match err {
                        ClaimError::InvalidImage { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    batch.rejected.push(RejectedImage { filename, reason });
                }
            }
        }
        batch
    }

    /// Validates one upload
    ///
    /// Checks the extension (or sniffs the format when there is none),
    /// decodes the image, enforces the size and dimension limits, hashes the
    /// bytes and assigns a collision-free storage path.
    pub fn prepare_one(
        &self,
        claim_id: ClaimId,
        upload: ImageUpload,
    ) -> Result<PreparedImage, ClaimError> {
        let filename = if upload.filename.trim().is_empty() {
            "upload".to_string()
        } else {
            upload.filename.trim().to_string()
        };
        let invalid = |reason: String| ClaimError::invalid_image(filename.clone(), reason);

        if upload.bytes.is_empty() {
            return Err(invalid("file is empty".to_string()));
        }
        if upload.bytes.len() > self.policy.max_bytes {
            return Err(invalid(format!(
                "file is {} bytes, limit is {}",
                upload.bytes.len(),
                self.policy.max_bytes
            )));
        }

        let extension = match Path::new(&filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
                    return Err(invalid(format!(
                        "extension '{}' not allowed, expected one of {}",
                        ext,
                        ALLOWED_EXTENSIONS.join(", ")
                    )));
                }
                ext
            }
            None => sniff_extension(&upload.bytes)
                .ok_or_else(|| invalid("unrecognised image format".to_string()))?
                .to_string(),
        };

        let decoded = image::load_from_memory(&upload.bytes)
            .map_err(|e| invalid(format!("cannot decode image: {}", e)))?;
        let (width, height) = decoded.dimensions();
        if width < self.policy.min_dimension || height < self.policy.min_dimension {
            return Err(invalid(format!(
                "image is {}x{}, minimum is {}x{}",
                width, height, self.policy.min_dimension, self.policy.min_dimension
            )));
        }

        let now = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let suffix = Uuid::new_v4().simple().to_string();
        let storage_path = format!(
            "{}/{}_{}_{}_{}.{}",
            claim_id.as_uuid(),
            upload.angle,
            now.format("%Y%m%d%H%M%S"),
            seq,
            &suffix[..8],
            extension
        );

        let record = ClaimImage {
            id: ImageId::new_v7(),
            claim_id,
            storage_path,
            content_hash: content_hash(&upload.bytes),
            angle: upload.angle,
            original_filename: filename,
            byte_size: upload.bytes.len() as u64,
            ai_analysis: ImageAnalysis::default(),
            uploaded_at: now,
        };

        Ok(PreparedImage {
            record,
            bytes: Arc::from(upload.bytes),
        })
    }

    /// Writes prepared images to the blob store
    ///
    /// # Returns
    ///
    /// A guard that removes every written blob unless committed
    pub async fn store(
        &self,
        store: Arc<dyn ImageBlobStore>,
        images: &[PreparedImage],
    ) -> Result<UploadGuard, ClaimError> {
        let mut guard = UploadGuard::new(store.clone());
        for image in images {
            store
                .put(&image.record.storage_path, &image.bytes)
                .await
                .map_err(|e| {
                    ClaimError::storage(format!(
                        "failed to store {}: {}",
                        image.record.storage_path, e
                    ))
                })?;
            guard.track(image.record.storage_path.clone());
        }
        Ok(guard)
    }
}

impl Default for ImageIngestor {
    fn default() -> Self {
        Self::new(IngestPolicy::default())
    }
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Gif => Some("gif"),
        _ => None,
    }
}

/// Removes written blobs unless the surrounding operation commits
///
/// Dropping the guard without calling [`UploadGuard::commit`] (an error, or
/// the request future being cancelled) schedules deletion of every blob it
/// tracks.
pub struct UploadGuard {
    store: Arc<dyn ImageBlobStore>,
    paths: Vec<String>,
    committed: bool,
}

impl UploadGuard {
    pub fn new(store: Arc<dyn ImageBlobStore>) -> Self {
        Self {
            store,
            paths: Vec::new(),
            committed: false,
        }
    }

    pub fn track(&mut self, path: String) {
        self.paths.push(path);
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Keeps the blobs
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl std::fmt::Debug for UploadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadGuard")
            .field("paths", &self.paths)
            .field("committed", &self.committed)
            .finish()
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if self.committed || self.paths.is_empty() {
            return;
        }

        let paths = std::mem::take(&mut self.paths);
        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for path in paths {
                        if let Err(err) = store.delete(&path).await {
                            tracing::warn!(path = %path, error = %err, "Failed to remove uncommitted upload");
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!(count = paths.len(), "No runtime available to remove uncommitted uploads");
            }
        }
    }
}
