//! Fraud detection
//!
//! Each image is run through six indicators. Duplicate detection works
//! against a [`DetectionSession`] that outlives a single claim, so the same
//! photo submitted on a later claim is caught too.
//!
//! | indicator     | fires when     | adds          |
//! |---------------|----------------|---------------|
//! | duplicate     | hash seen      | 0.4           |
//! | metadata      | > 0.5          | 0.3 × score   |
//! | manipulation  | > 0.6          | 0.2           |
//! | lighting      | > 0.7          | 0.15          |
//! | quality       | > 0.6          | 0.1           |
//! | physics       | > 0.7          | 0.2           |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use core_kernel::ImageId;

use crate::claim::Angle;
use crate::exif::{metadata_score, MetadataCheck};
use crate::scoring::ScoringImage;
use crate::signals::{seeded_range, ImageSignals};

/// Fraud risk category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Maps a fraud score to a risk level
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            RiskLevel::Low
        } else if score < 0.6 {
            RiskLevel::Medium
        } else if score < 0.8 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "unknown",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraud indicator tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudIssue {
    DuplicateImage,
    SuspiciousMetadata,
    PossibleManipulation,
    InconsistentLighting,
    QualityInconsistency,
    ImpossibleDamagePattern,
}

impl FraudIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudIssue::DuplicateImage => "duplicate_image",
            FraudIssue::SuspiciousMetadata => "suspicious_metadata",
            FraudIssue::PossibleManipulation => "possible_manipulation",
            FraudIssue::InconsistentLighting => "inconsistent_lighting",
            FraudIssue::QualityInconsistency => "quality_inconsistency",
            FraudIssue::ImpossibleDamagePattern => "impossible_damage_pattern",
        }
    }

    /// Human-readable explanation
    pub fn explanation(&self) -> &'static str {
        match self {
            FraudIssue::DuplicateImage => {
                "This image appears to be identical to a previously submitted image"
            }
            FraudIssue::SuspiciousMetadata => "Image metadata shows signs of tampering or editing",
            FraudIssue::PossibleManipulation => "Digital manipulation artifacts detected in the image",
            FraudIssue::InconsistentLighting => "Lighting patterns suggest possible photo composition",
            FraudIssue::QualityInconsistency => "Image quality varies across different regions",
            FraudIssue::ImpossibleDamagePattern => "Damage pattern appears to violate physical laws",
        }
    }
}

impl fmt::Display for FraudIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a detection session lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// One session for the whole process; duplicates are caught across claims
    #[default]
    Process,
    /// A fresh session per claim; only duplicates within a claim are caught
    PerClaim,
}

/// Set of content hashes already seen by the fraud scorer
///
/// Sessions made with [`DetectionSession::attempt`] share the parent's seen
/// set and remember the hashes they added, so a submission that fails can
/// take its hashes back out.
#[derive(Debug, Default)]
pub struct DetectionSession {
    seen: Arc<Mutex<HashSet<String>>>,
    journal: Mutex<Journal>,
}

#[derive(Debug, Default)]
struct Journal {
    added: Vec<String>,
    /// Set once the attempt is committed or rolled back; later lookups
    /// no longer record
    closed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session for one submission over the same seen set
    pub fn attempt(&self) -> Self {
        Self {
            seen: self.seen.clone(),
            journal: Mutex::new(Journal::default()),
        }
    }

    /// Records the hash and reports whether it had been seen before
    ///
    /// The lookup and insert happen under one lock, so two concurrent
    /// submissions of the same bytes cannot both pass as originals.
    pub fn check_and_record(&self, content_hash: &str) -> bool {
        let mut journal = lock(&self.journal);
        let mut seen = lock(&self.seen);
        if journal.closed {
            return seen.contains(content_hash);
        }
        let fresh = seen.insert(content_hash.to_string());
        if fresh {
            journal.added.push(content_hash.to_string());
        }
        !fresh
    }

    /// Keeps the hashes this session added
    pub fn commit(&self) {
        let mut journal = lock(&self.journal);
        journal.closed = true;
        journal.added.clear();
    }

    /// Removes the hashes this session added; returns how many
    pub fn rollback(&self) -> usize {
        let mut journal = lock(&self.journal);
        journal.closed = true;
        let added = std::mem::take(&mut journal.added);
        let mut seen = lock(&self.seen);
        for hash in &added {
            seen.remove(hash);
        }
        added.len()
    }

    pub fn contains(&self, content_hash: &str) -> bool {
        lock(&self.seen).contains(content_hash)
    }

    pub fn len(&self) -> usize {
        lock(&self.seen).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rolls back a submission's [`DetectionSession`] unless committed
///
/// Held across the scoring and persistence of one claim; dropping it early
/// (an error return or a cancelled future) forgets the recorded hashes.
#[derive(Debug)]
pub struct SessionGuard {
    session: Option<Arc<DetectionSession>>,
}

impl SessionGuard {
    pub fn new(session: Arc<DetectionSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&self) -> Option<&Arc<DetectionSession>> {
        self.session.as_ref()
    }

    pub fn commit(mut self) {
        if let Some(session) = self.session.take() {
            session.commit();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let removed = session.rollback();
            if removed > 0 {
                tracing::debug!(removed, "Forgot image hashes of an unfinished submission");
            }
        }
    }
}

/// Raw indicator values for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorScores {
    pub metadata: f64,
    pub manipulation: f64,
    pub lighting: f64,
    pub quality: f64,
    pub physics: f64,
}

/// Fraud result for a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFraud {
    pub image_id: ImageId,
    pub angle: Angle,
    pub fraud_score: f64,
    pub is_duplicate: bool,
    pub issues: Vec<FraudIssue>,
    pub metadata: MetadataCheck,
    pub indicators: IndicatorScores,
}

/// Claim-level fraud assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub fraud_score: f64,
    pub risk_level: RiskLevel,
    pub is_suspicious: bool,
    pub detected_issues: Vec<FraudIssue>,
    pub duplicate_count: usize,
    pub metadata_issues: Vec<FraudIssue>,
    pub images_analyzed: usize,
    pub images_skipped: usize,
    pub recommendations: Vec<String>,
    pub per_image: Vec<ImageFraud>,
    pub assessed_at: DateTime<Utc>,
}

impl FraudAssessment {
    /// Assessment of an empty image set
    pub fn empty() -> Self {
        Self {
            fraud_score: 0.0,
            risk_level: RiskLevel::Unknown,
            is_suspicious: false,
            detected_issues: Vec::new(),
            duplicate_count: 0,
            metadata_issues: Vec::new(),
            images_analyzed: 0,
            images_skipped: 0,
            recommendations: vec![crate::damage::NO_IMAGES_NOTE.to_string()],
            per_image: Vec::new(),
            assessed_at: Utc::now(),
        }
    }
}

/// Pluggable fraud scorer
pub trait FraudScorer: Send + Sync {
    fn assess(&self, images: &[ScoringImage], session: &DetectionSession) -> FraudAssessment;
}

/// Heuristic scorer combining duplicate, metadata and pixel indicators
#[derive(Debug, Clone, Default)]
pub struct HeuristicFraudScorer;

impl HeuristicFraudScorer {
    pub fn new() -> Self {
        Self
    }

    fn score_image(
        &self,
        image: &ScoringImage,
        signals: &ImageSignals,
        session: &DetectionSession,
        now: DateTime<Utc>,
    ) -> ImageFraud {
        let hash = image.content_hash.as_str();
        let mut score = 0.0;
        let mut issues = Vec::new();

        let is_duplicate = session.check_and_record(hash);
        if is_duplicate {
            score += 0.4;
            issues.push(FraudIssue::DuplicateImage);
        }

        let metadata = metadata_score(&image.bytes, now);
        if metadata.score > 0.5 {
            score += metadata.score * 0.3;
        }

        let manipulation = f64::min(
            f64::min(signals.gradient_variance / 10_000.0, 0.8)
                + seeded_range(hash, "fraud.manipulation", 0.0, 0.3),
            1.0,
        );
        if manipulation > 0.6 {
            score += 0.2;
            issues.push(FraudIssue::PossibleManipulation);
        }

        let lighting = f64::min(
            f64::min(signals.lighting_variance / 1000.0, 0.8)
                + seeded_range(hash, "fraud.lighting", 0.0, 0.2),
            1.0,
        );
        if lighting > 0.7 {
            score += 0.15;
            issues.push(FraudIssue::InconsistentLighting);
        }

        let quality = f64::min(
            if signals.sharpness < 100.0 {
                0.7 + seeded_range(hash, "fraud.quality", 0.0, 0.3)
            } else {
                seeded_range(hash, "fraud.quality", 0.0, 0.4)
            },
            1.0,
        );
        if quality > 0.6 {
            score += 0.1;
            issues.push(FraudIssue::QualityInconsistency);
        }

        let aspect = signals.aspect_ratio();
        let physics = f64::min(
            if !(0.5..=3.0).contains(&aspect) {
                0.6 + seeded_range(hash, "fraud.physics", 0.0, 0.4)
            } else {
                seeded_range(hash, "fraud.physics", 0.0, 0.5)
            },
            1.0,
        );
        if physics > 0.7 {
            score += 0.2;
            issues.push(FraudIssue::ImpossibleDamagePattern);
        }

        ImageFraud {
            image_id: image.image_id,
            angle: image.angle,
            fraud_score: f64::min(score, 1.0),
            is_duplicate,
            issues,
            indicators: IndicatorScores {
                metadata: metadata.score,
                manipulation,
                lighting,
                quality,
                physics,
            },
            metadata,
        }
    }
}

impl FraudScorer for HeuristicFraudScorer {
    fn assess(&self, images: &[ScoringImage], session: &DetectionSession) -> FraudAssessment {
        if images.is_empty() {
            return FraudAssessment::empty();
        }

        let now = Utc::now();
        let mut per_image = Vec::with_capacity(images.len());
        let mut skipped = 0;
        for image in images {
            match ImageSignals::from_bytes(&image.bytes) {
                Ok(signals) => per_image.push(self.score_image(image, &signals, session, now)),
                Err(err) => {
                    tracing::warn!(image_id = %image.image_id, error = %err, "Skipping undecodable image in fraud assessment");
                    skipped += 1;
                }
            }
        }

        if per_image.is_empty() {
            let mut empty = FraudAssessment::empty();
            empty.images_skipped = skipped;
            return empty;
        }

        let duplicate_count = per_image.iter().filter(|f| f.is_duplicate).count();
        let mut fraud_score =
            per_image.iter().map(|f| f.fraud_score).sum::<f64>() / per_image.len() as f64;
        if duplicate_count > 1 {
            fraud_score = f64::min(fraud_score + 0.3, 1.0);
        }
        let fraud_score = fraud_score.clamp(0.0, 1.0);

        let mut detected_issues = Vec::new();
        for issue in per_image.iter().flat_map(|f| f.issues.iter()) {
            if !detected_issues.contains(issue) {
                detected_issues.push(*issue);
            }
        }
        let metadata_issues: Vec<FraudIssue> = per_image
            .iter()
            .filter(|f| f.metadata.score > 0.5)
            .map(|_| FraudIssue::SuspiciousMetadata)
            .collect();

        FraudAssessment {
            fraud_score,
            risk_level: RiskLevel::from_score(fraud_score),
            is_suspicious: fraud_score > 0.6,
            recommendations: recommendations(fraud_score, &detected_issues),
            detected_issues,
            duplicate_count,
            metadata_issues,
            images_analyzed: per_image.len(),
            images_skipped: skipped,
            per_image,
            assessed_at: now,
        }
    }
}

/// Handling recommendations for a fraud score and issue set
pub fn recommendations(fraud_score: f64, issues: &[FraudIssue]) -> Vec<String> {
    let mut out = vec![if fraud_score < 0.3 {
        "Images appear authentic - proceed with standard processing"
    } else if fraud_score < 0.6 {
        "Minor concerns detected - additional verification recommended"
    } else if fraud_score < 0.8 {
        "Significant fraud indicators - manual review required"
    } else {
        "High fraud probability - detailed investigation necessary"
    }];

    let specific = [
        (FraudIssue::DuplicateImage, "Duplicate images detected - verify claim authenticity"),
        (FraudIssue::PossibleManipulation, "Image manipulation suspected - request original photos"),
        (
            FraudIssue::InconsistentLighting,
            "Lighting inconsistencies found - verify photo location and timing",
        ),
        (
            FraudIssue::ImpossibleDamagePattern,
            "Damage patterns may violate physics - expert assessment needed",
        ),
    ];
    for (issue, text) in specific {
        if issues.contains(&issue) {
            out.push(text);
        }
    }

    out.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_breakpoints_are_upper_exclusive() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.2999), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Critical);
    }

    #[test]
    fn test_session_flags_every_later_sighting() {
        let session = DetectionSession::new();
        assert!(!session.check_and_record("abc"));
        assert!(session.check_and_record("abc"));
        assert!(session.check_and_record("abc"));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_rolled_back_attempt_forgets_only_its_own_hashes() {
        let process = DetectionSession::new();
        let earlier = process.attempt();
        assert!(!earlier.check_and_record("kept"));
        earlier.commit();

        let failed = process.attempt();
        assert!(failed.check_and_record("kept"));
        assert!(!failed.check_and_record("new"));
        assert_eq!(failed.rollback(), 1);

        assert!(process.contains("kept"));
        assert!(!process.contains("new"));
        // A closed attempt only looks up
        assert!(!failed.check_and_record("late"));
        assert!(!process.contains("late"));
    }

    #[test]
    fn test_dropped_guard_rolls_back_and_committed_guard_keeps() {
        let process = DetectionSession::new();

        let attempt = Arc::new(process.attempt());
        let guard = SessionGuard::new(attempt.clone());
        attempt.check_and_record("dropped");
        drop(guard);
        assert!(process.is_empty());

        let attempt = Arc::new(process.attempt());
        let guard = SessionGuard::new(attempt.clone());
        attempt.check_and_record("committed");
        guard.commit();
        assert!(process.contains("committed"));
        assert_eq!(process.len(), 1);
    }

    #[test]
    fn test_empty_set_has_unknown_risk() {
        let assessment = HeuristicFraudScorer::new().assess(&[], &DetectionSession::new());
        assert_eq!(assessment.fraud_score, 0.0);
        assert_eq!(assessment.risk_level, RiskLevel::Unknown);
        assert!(!assessment.is_suspicious);
    }

    #[test]
    fn test_recommendations_by_score_and_issue() {
        let recs = recommendations(0.65, &[FraudIssue::DuplicateImage]);
        assert_eq!(
            recs,
            vec![
                "Significant fraud indicators - manual review required".to_string(),
                "Duplicate images detected - verify claim authenticity".to_string(),
            ]
        );
        assert_eq!(
            recommendations(0.1, &[])[0],
            "Images appear authentic - proceed with standard processing"
        );
    }
}
