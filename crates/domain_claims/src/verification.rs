//! Vehicle identity verification
//!
//! Two separate checks answer two separate questions:
//!
//! - **Per image** ([`VehicleVerifier::verify_image`]): does this photo look
//!   like the insured vehicle? The result is stored on the image as
//!   `verified`.
//! - **Across angles** ([`VehicleVerifier::cross_check`]): do the front,
//!   back, left and right photos all show the same car? The result is
//!   `same_car`.
//!
//! Both go through the [`SimilarityOracle`] port. When the oracle is not
//! configured, fails or times out, the verifier falls back to a deterministic
//! simulation seeded by the content hashes and tags the result
//! [`VerificationMode::Simulated`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use core_kernel::{ImageId, PortError};

use crate::claim::{Angle, ClaimImage};
use crate::error::ClaimError;
use crate::ports::SimilarityOracle;
use crate::signals::{seeded_range, seeded_unit};

/// Default similarity threshold
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Default time allowed for one oracle exchange
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a verification score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    Oracle,
    Simulated,
}

/// Single-image check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageVerification {
    pub image_id: ImageId,
    pub angle: Angle,
    pub score: f64,
    pub verified: bool,
    pub threshold: f64,
    pub mode: VerificationMode,
    pub checked_at: DateTime<Utc>,
}

/// Similarity between two angles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSimilarity {
    /// Label such as `front vs back`
    pub pair: String,
    pub similarity: f64,
}

/// Raw oracle answer for a pairwise comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleComparison {
    pub similarities: Vec<PairSimilarity>,
    pub average_similarity: f64,
    pub same_car: bool,
}

/// Pairwise same-vehicle check across angles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheck {
    pub pairs: Vec<PairSimilarity>,
    pub average_similarity: f64,
    pub same_car: bool,
    pub threshold: f64,
    pub mode: VerificationMode,
}

/// Status of one required angle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleStatus {
    pub uploaded: bool,
    pub verified: bool,
    pub score: f64,
    pub image_id: Option<ImageId>,
    pub mode: Option<VerificationMode>,
}

impl AngleStatus {
    fn missing() -> Self {
        Self {
            uploaded: false,
            verified: false,
            score: 0.0,
            image_id: None,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationRecommendation {
    Approved,
    NeedsMoreImages,
}

/// Verification progress for a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub angles: BTreeMap<Angle, AngleStatus>,
    pub verified_angles: usize,
    pub total_angles: usize,
    pub overall_score: f64,
    pub all_verified: bool,
    pub completion_percentage: f64,
    pub recommendation: VerificationRecommendation,
    pub cross_check: Option<CrossCheck>,
}

impl VerificationResult {
    /// Similarity figure used by blended triage
    ///
    /// The cross-check average when one was run, otherwise the per-angle
    /// overall score.
    pub fn vehicle_similarity(&self) -> f64 {
        self.cross_check
            .as_ref()
            .map(|c| c.average_similarity)
            .unwrap_or(self.overall_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionRecommendation {
    Approved,
    ReviewRequired,
}

/// Outcome of finalizing verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub submitted_at: DateTime<Utc>,
    pub total_images: usize,
    pub verified_images: usize,
    pub average_score: f64,
    pub all_verified: bool,
    pub recommendation: SubmissionRecommendation,
    pub individual_results: Vec<ImageVerification>,
}

/// Runs single-image and cross-angle checks against a similarity oracle
#[derive(Clone)]
pub struct VehicleVerifier {
    oracle: Option<Arc<dyn SimilarityOracle>>,
    threshold: f64,
    timeout: Duration,
    /// Held for a whole clear/submit/compare/clear exchange
    session: Arc<Mutex<()>>,
}

impl std::fmt::Debug for VehicleVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleVerifier")
            .field("oracle", &self.oracle.is_some())
            .field("threshold", &self.threshold)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl VehicleVerifier {
    /// Creates a verifier
    ///
    /// # Arguments
    ///
    /// * `oracle` - Similarity service; `None` means every check is simulated
    /// * `threshold` - Minimum score for an image or pair to count as a match
    /// * `timeout` - Budget for one oracle exchange
    pub fn new(
        oracle: Option<Arc<dyn SimilarityOracle>>,
        threshold: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            threshold,
            timeout,
            session: Arc::new(Mutex::new(())),
        }
    }

    /// A verifier with no oracle
    pub fn simulated(threshold: f64) -> Self {
        Self::new(None, threshold, DEFAULT_TIMEOUT)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn oracle(&self) -> Option<&Arc<dyn SimilarityOracle>> {
        self.oracle.as_ref()
    }

    /// Checks one image against the oracle
    ///
    /// Never fails: oracle errors and timeouts produce a simulated result.
    pub async fn verify_image(&self, image: &ClaimImage, bytes: &[u8]) -> ImageVerification {
        let (score, mode) = match self.call_score_image(image.angle, bytes).await {
            Ok(score) => (score.clamp(0.0, 1.0), VerificationMode::Oracle),
            Err(err) => {
                if self.oracle.is_some() {
                    tracing::warn!(
                        image_id = %image.id,
                        angle = %image.angle,
                        error = %err,
                        "Similarity oracle failed, using simulated score"
                    );
                }
                (
                    simulated_image_score(&image.content_hash),
                    VerificationMode::Simulated,
                )
            }
        };

        ImageVerification {
            image_id: image.id,
            angle: image.angle,
            score,
            verified: score >= self.threshold,
            threshold: self.threshold,
            mode,
            checked_at: Utc::now(),
        }
    }

    async fn call_score_image(&self, angle: Angle, bytes: &[u8]) -> Result<f64, PortError> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| PortError::ServiceUnavailable {
                service: "similarity-oracle".to_string(),
            })?;
        tokio::time::timeout(self.timeout, oracle.score_image(angle, bytes, self.threshold))
            .await
            .map_err(|_| PortError::Timeout {
                operation: "score_image".to_string(),
                duration_ms: self.timeout.as_millis() as u64,
            })?
    }

    /// Compares the latest photo of each angle with every other
    ///
    /// Returns `None` with fewer than two angles. Each pair matches when its
    /// similarity is strictly above the threshold.
    pub async fn cross_check(
        &self,
        images: &BTreeMap<Angle, (ClaimImage, Arc<[u8]>)>,
    ) -> Option<CrossCheck> {
        if images.len() < 2 {
            return None;
        }

        match self.call_compare(images).await {
            Ok(comparison) => Some(CrossCheck {
                same_car: !comparison.similarities.is_empty()
                    && comparison
                        .similarities
                        .iter()
                        .all(|p| p.similarity > self.threshold),
                average_similarity: comparison.average_similarity.clamp(0.0, 1.0),
                pairs: comparison.similarities,
                threshold: self.threshold,
                mode: VerificationMode::Oracle,
            }),
            Err(err) => {
                if self.oracle.is_some() {
                    tracing::warn!(error = %err, "Similarity oracle comparison failed, using simulated similarities");
                }
                Some(self.simulated_cross_check(images))
            }
        }
    }

    async fn call_compare(
        &self,
        images: &BTreeMap<Angle, (ClaimImage, Arc<[u8]>)>,
    ) -> Result<OracleComparison, PortError> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| PortError::ServiceUnavailable {
                service: "similarity-oracle".to_string(),
            })?;

        let exchange = async {
            let _session = self.session.lock().await;
            oracle.clear().await?;
            for (angle, (_, bytes)) in images {
                oracle.submit(*angle, bytes).await?;
            }
            let comparison = oracle.compare(self.threshold).await;
            // The oracle keeps one global slot per angle
            if let Err(err) = oracle.clear().await {
                tracing::debug!(error = %err, "Failed to clear similarity oracle slots");
            }
            comparison
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| PortError::Timeout {
                operation: "compare".to_string(),
                duration_ms: self.timeout.as_millis() as u64,
            })?
    }

    fn simulated_cross_check(
        &self,
        images: &BTreeMap<Angle, (ClaimImage, Arc<[u8]>)>,
    ) -> CrossCheck {
        let entries: Vec<(&Angle, &ClaimImage)> =
            images.iter().map(|(angle, (image, _))| (angle, image)).collect();

        let mut pairs = Vec::new();
        for i in 0..entries.len() {
            for j in i + 1..entries.len() {
                let (a_angle, a) = entries[i];
                let (b_angle, b) = entries[j];
                pairs.push(PairSimilarity {
                    pair: format!("{} vs {}", a_angle, b_angle),
                    similarity: simulated_pair_similarity(&a.content_hash, &b.content_hash),
                });
            }
        }

        let average_similarity =
            pairs.iter().map(|p| p.similarity).sum::<f64>() / pairs.len() as f64;
        CrossCheck {
            same_car: pairs.iter().all(|p| p.similarity > self.threshold),
            average_similarity,
            pairs,
            threshold: self.threshold,
            mode: VerificationMode::Simulated,
        }
    }

    /// Builds the verification status view
    ///
    /// Uses the latest image per required angle and its stored single-image
    /// result. `all_verified` needs all four angles plus a cross-check that
    /// reports the same car.
    pub fn status(
        &self,
        latest: &BTreeMap<Angle, &ClaimImage>,
        cross_check: Option<CrossCheck>,
    ) -> VerificationResult {
        let mut angles = BTreeMap::new();
        for angle in Angle::REQUIRED {
            let status = match latest.get(&angle) {
                Some(image) => {
                    let check = image.ai_analysis.verification.as_ref();
                    AngleStatus {
                        uploaded: true,
                        verified: check.map(|c| c.verified).unwrap_or(false),
                        score: check.map(|c| c.score).unwrap_or(0.0),
                        image_id: Some(image.id),
                        mode: check.map(|c| c.mode),
                    }
                }
                None => AngleStatus::missing(),
            };
            angles.insert(angle, status);
        }

        let total_angles = Angle::REQUIRED.len();
        let verified_angles = angles.values().filter(|s| s.verified).count();
        let all_uploaded = angles.values().all(|s| s.uploaded);
        let all_verified = all_uploaded
            && cross_check.as_ref().map(|c| c.same_car).unwrap_or(false);

        VerificationResult {
            overall_score: angles.values().map(|s| s.score).sum::<f64>() / total_angles as f64,
            completion_percentage: verified_angles as f64 / total_angles as f64 * 100.0,
            recommendation: if all_verified {
                VerificationRecommendation::Approved
            } else {
                VerificationRecommendation::NeedsMoreImages
            },
            angles,
            verified_angles,
            total_angles,
            all_verified,
            cross_check,
        }
    }

    /// Final verification decision over every image on the claim
    pub fn finalize(&self, images: &[ClaimImage]) -> Result<VerificationSubmission, ClaimError> {
        if images.is_empty() {
            return Err(ClaimError::NoImages(
                "upload at least one image before submitting verification".to_string(),
            ));
        }

        let individual_results: Vec<ImageVerification> = images
            .iter()
            .filter_map(|image| image.ai_analysis.verification.clone())
            .collect();

        let verified_images = individual_results.iter().filter(|r| r.verified).count();
        let average_score = if individual_results.is_empty() {
            0.0
        } else {
            individual_results.iter().map(|r| r.score).sum::<f64>()
                / individual_results.len() as f64
        };
        let all_verified =
            !individual_results.is_empty() && verified_images == individual_results.len();
        let approved = all_verified && average_score >= self.threshold;

        Ok(VerificationSubmission {
            submitted_at: Utc::now(),
            total_images: images.len(),
            verified_images,
            average_score,
            all_verified,
            recommendation: if approved {
                SubmissionRecommendation::Approved
            } else {
                SubmissionRecommendation::ReviewRequired
            },
            individual_results,
        })
    }
}

/// Reproducible single-image score in `[0.6, 1.0]`
pub fn simulated_image_score(content_hash: &str) -> f64 {
    seeded_range(content_hash, "verify.image", 0.6, 1.0)
}

/// Reproducible pair similarity; identical photos score 1.0
pub fn simulated_pair_similarity(hash_a: &str, hash_b: &str) -> f64 {
    if hash_a == hash_b {
        return 1.0;
    }
    let (lo, hi) = if hash_a < hash_b { (hash_a, hash_b) } else { (hash_b, hash_a) };
    0.7 + 0.3 * seeded_unit(lo, &format!("verify.pair.{}", hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ImageAnalysis;
    use core_kernel::ClaimId;

    fn image(angle: Angle, score: Option<f64>, threshold: f64) -> ClaimImage {
        let id = ImageId::new_v7();
        ClaimImage {
            id,
            claim_id: ClaimId::new(),
            storage_path: format!("x/{}.png", angle),
            content_hash: format!("hash-{}", angle),
            angle,
            original_filename: format!("{}.png", angle),
            byte_size: 10,
            ai_analysis: ImageAnalysis {
                verification: score.map(|s| ImageVerification {
                    image_id: id,
                    angle,
                    score: s,
                    verified: s >= threshold,
                    threshold,
                    mode: VerificationMode::Oracle,
                    checked_at: Utc::now(),
                }),
                ..Default::default()
            },
            uploaded_at: Utc::now(),
        }
    }

    fn same_car() -> CrossCheck {
        CrossCheck {
            pairs: vec![],
            average_similarity: 0.9,
            same_car: true,
            threshold: 0.85,
            mode: VerificationMode::Oracle,
        }
    }

    #[test]
    fn test_status_all_four_verified() {
        let verifier = VehicleVerifier::simulated(0.85);
        let images: Vec<ClaimImage> =
            Angle::REQUIRED.iter().map(|a| image(*a, Some(0.9), 0.85)).collect();
        let latest: BTreeMap<Angle, &ClaimImage> = images.iter().map(|i| (i.angle, i)).collect();

        let result = verifier.status(&latest, Some(same_car()));
        assert!(result.all_verified);
        assert_eq!(result.verified_angles, 4);
        assert_eq!(result.completion_percentage, 100.0);
        assert!((result.overall_score - 0.9).abs() < 1e-9);
        assert_eq!(result.recommendation, VerificationRecommendation::Approved);
    }

    #[test]
    fn test_status_two_of_four() {
        let verifier = VehicleVerifier::simulated(0.85);
        let images = vec![image(Angle::Front, Some(0.9), 0.85), image(Angle::Back, Some(0.9), 0.85)];
        let latest: BTreeMap<Angle, &ClaimImage> = images.iter().map(|i| (i.angle, i)).collect();

        let result = verifier.status(&latest, Some(same_car()));
        assert!(!result.all_verified);
        assert_eq!(result.completion_percentage, 50.0);
        assert_eq!(result.recommendation, VerificationRecommendation::NeedsMoreImages);
        let left = &result.angles[&Angle::Left];
        assert!(!left.uploaded && !left.verified && left.score == 0.0);
    }

    #[test]
    fn test_status_without_cross_check_is_not_all_verified() {
        let verifier = VehicleVerifier::simulated(0.85);
        let images: Vec<ClaimImage> =
            Angle::REQUIRED.iter().map(|a| image(*a, Some(0.95), 0.85)).collect();
        let latest: BTreeMap<Angle, &ClaimImage> = images.iter().map(|i| (i.angle, i)).collect();

        let result = verifier.status(&latest, None);
        assert_eq!(result.verified_angles, 4);
        assert!(!result.all_verified);
    }

    #[test]
    fn test_finalize_requires_images() {
        let verifier = VehicleVerifier::simulated(0.85);
        assert!(matches!(verifier.finalize(&[]), Err(ClaimError::NoImages(_))));
    }

    #[test]
    fn test_finalize_averages_only_checked_images() {
        let verifier = VehicleVerifier::simulated(0.85);
        let images = vec![
            image(Angle::Front, Some(0.9), 0.85),
            image(Angle::Back, Some(0.88), 0.85),
            image(Angle::Unknown, None, 0.85),
        ];
        let submission = verifier.finalize(&images).unwrap();
        assert_eq!(submission.total_images, 3);
        assert_eq!(submission.individual_results.len(), 2);
        assert!((submission.average_score - 0.89).abs() < 1e-9);
        assert_eq!(submission.recommendation, SubmissionRecommendation::Approved);
    }

    #[test]
    fn test_finalize_with_one_failed_image_requires_review() {
        let verifier = VehicleVerifier::simulated(0.85);
        let images = vec![image(Angle::Front, Some(0.99), 0.85), image(Angle::Back, Some(0.5), 0.85)];
        let submission = verifier.finalize(&images).unwrap();
        assert!(!submission.all_verified);
        assert_eq!(submission.recommendation, SubmissionRecommendation::ReviewRequired);
    }

    #[test]
    fn test_simulated_scores_are_reproducible() {
        assert_eq!(simulated_image_score("abc"), simulated_image_score("abc"));
        assert_eq!(
            simulated_pair_similarity("a", "b"),
            simulated_pair_similarity("b", "a")
        );
        assert_eq!(simulated_pair_similarity("a", "a"), 1.0);
    }
}
