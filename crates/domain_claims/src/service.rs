//! Claim intake service
//!
//! Orchestrates the submission pipeline and the operations around it:
//!
//! ```text
//! ingest -> store blobs -> { damage | fraud | vehicle } -> triage -> persist
//! ```
//!
//! Writes to one claim (triage, overrides, uploads, finalization, deletes)
//! are serialized through [`ClaimLocks`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;

use core_kernel::{ClaimId, Currency, HealthCheckResult, ImageId, Money};

use crate::claim::{Actor, Angle, Claim, ClaimImage, ClaimStatus, ImageAnalysis, NewClaim};
use crate::damage::{DamageAssessment, DamageScorer, HeuristicDamageScorer};
use crate::error::ClaimError;
use crate::fraud::{
    DetectionSession, FraudAssessment, FraudScorer, HeuristicFraudScorer, SessionGuard, SessionScope,
};
use crate::ingest::{ImageIngestor, ImageUpload, IngestPolicy, PreparedImage, RejectedImage};
use crate::ports::{ClaimQuery, ClaimStats, ClaimStore, ImageBlobStore};
use crate::scoring::ScoringImage;
use crate::snapshot::AnalysisSnapshot;
use crate::triage::{ClaimTriage, TransitionTrigger, TriageDecision, TriageStrategy};
use crate::verification::{
    CrossCheck, ImageVerification, VehicleVerifier, VerificationResult, VerificationSubmission,
};

/// Per-claim write locks
///
/// An entry lives only while some caller holds or waits for its lock.
#[derive(Debug, Default)]
pub struct ClaimLocks {
    locks: DashMap<ClaimId, Arc<Mutex<()>>>,
}

/// Exclusive write access to one claim; released on drop
#[derive(Debug)]
pub struct ClaimWriteGuard<'a> {
    locks: &'a ClaimLocks,
    claim_id: ClaimId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ClaimWriteGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map's reference is the only one left when nobody is waiting
        self.locks
            .locks
            .remove_if(&self.claim_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl ClaimLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive write access to a claim
    pub async fn acquire(&self, claim_id: ClaimId) -> ClaimWriteGuard<'_> {
        let lock = self.locks.entry(claim_id).or_default().clone();
        let guard = lock.lock_owned().await;
        ClaimWriteGuard {
            locks: self,
            claim_id,
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Deployment-level settings for the intake pipeline
#[derive(Debug, Clone, Copy)]
pub struct IntakeSettings {
    pub currency: Currency,
    pub triage_strategy: TriageStrategy,
    pub session_scope: SessionScope,
    pub ingest: IngestPolicy,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            currency: Currency::USD,
            triage_strategy: TriageStrategy::default(),
            session_scope: SessionScope::default(),
            ingest: IngestPolicy::default(),
        }
    }
}

/// Result of a claim submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSubmission {
    pub claim: Claim,
    pub decision: TriageDecision,
    /// Uploads that failed validation; the claim was created without them
    pub rejected: Vec<RejectedImage>,
}

/// Scores of a claim with the per-image breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimScores {
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    pub damage_score: f64,
    pub fraud_score: f64,
    pub cost_estimate: Money,
    pub analysis: Option<AnalysisSnapshot>,
    pub images: Vec<ImageScores>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageScores {
    pub image_id: ImageId,
    pub angle: Angle,
    pub analysis: ImageAnalysis,
}

/// Outcome of deleting a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDeletion {
    pub claim_id: ClaimId,
    pub images_removed: usize,
    /// Blobs that could not be removed; the claim is deleted regardless
    pub files_not_removed: Vec<String>,
}

/// Outcome of a per-angle upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AngleUpload {
    pub image: ClaimImage,
    pub verification: ImageVerification,
}

/// Outcome of verification finalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    pub submission: VerificationSubmission,
    pub verification: VerificationResult,
}

/// Claim intake and triage service
pub struct ClaimIntakeService {
    store: Arc<dyn ClaimStore>,
    blobs: Arc<dyn ImageBlobStore>,
    ingestor: ImageIngestor,
    damage_scorer: Arc<dyn DamageScorer>,
    fraud_scorer: Arc<dyn FraudScorer>,
    session: Arc<DetectionSession>,
    session_scope: SessionScope,
    verifier: VehicleVerifier,
    triage: ClaimTriage,
    currency: Currency,
    locks: ClaimLocks,
}

impl std::fmt::Debug for ClaimIntakeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimIntakeService")
            .field("verifier", &self.verifier)
            .field("triage", &self.triage)
            .field("session_scope", &self.session_scope)
            .field("currency", &self.currency)
            .finish()
    }
}

impl ClaimIntakeService {
    /// Creates a service with the heuristic scorers
    ///
    /// # Arguments
    ///
    /// * `store` - Claim persistence
    /// * `blobs` - Image byte storage
    /// * `verifier` - Vehicle identity verifier
    /// * `settings` - Currency, triage strategy, session scope and ingest limits
    pub fn new(
        store: Arc<dyn ClaimStore>,
        blobs: Arc<dyn ImageBlobStore>,
        verifier: VehicleVerifier,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            ingestor: ImageIngestor::new(settings.ingest),
            damage_scorer: Arc::new(HeuristicDamageScorer::new(settings.currency)),
            fraud_scorer: Arc::new(HeuristicFraudScorer::new()),
            session: Arc::new(DetectionSession::new()),
            session_scope: settings.session_scope,
            verifier,
            triage: ClaimTriage::new(settings.triage_strategy),
            currency: settings.currency,
            locks: ClaimLocks::new(),
        }
    }

    /// Replaces the damage scorer
    pub fn with_damage_scorer(mut self, scorer: Arc<dyn DamageScorer>) -> Self {
        self.damage_scorer = scorer;
        self
    }

    /// Replaces the fraud scorer
    pub fn with_fraud_scorer(mut self, scorer: Arc<dyn FraudScorer>) -> Self {
        self.fraud_scorer = scorer;
        self
    }

    pub fn verifier(&self) -> &VehicleVerifier {
        &self.verifier
    }

    pub fn triage_strategy(&self) -> TriageStrategy {
        self.triage.strategy()
    }

    /// Submits a new claim with its photos
    ///
    /// Invalid photos are reported in `rejected` and the claim is created
    /// without them. Damage, fraud and vehicle checks run concurrently and
    /// the triage decision is persisted with the claim.
    ///
    /// # Errors
    ///
    /// `Validation` for bad claim details, `StorageFailure` when blobs or
    /// the claim record cannot be written. On failure or cancellation the
    /// written blobs are removed and the photos are not remembered for
    /// duplicate detection.
    pub async fn create_claim(
        &self,
        actor: &Actor,
        details: NewClaim,
        uploads: Vec<ImageUpload>,
    ) -> Result<ClaimSubmission, ClaimError> {
        let mut claim = Claim::new(
            NewClaim {
                owner_id: actor.user_id,
                ..details
            },
            self.currency,
        )?;

        let batch = self.ingestor.prepare(claim.id, uploads);
        let guard = self.ingestor.store(self.blobs.clone(), &batch.accepted).await?;

        let scoring: Vec<ScoringImage> = batch.accepted.iter().map(PreparedImage::scoring_input).collect();
        let session = Arc::new(match self.session_scope {
            SessionScope::Process => self.session.attempt(),
            SessionScope::PerClaim => DetectionSession::new(),
        });
        let recorded = SessionGuard::new(session.clone());

        let (damage, fraud, (verifications, cross_check)) = tokio::join!(
            self.run_damage(scoring.clone()),
            self.run_fraud(scoring, session),
            self.run_vehicle(&batch.accepted),
        );

        for prepared in batch.accepted {
            let mut record = prepared.record;
            record.ai_analysis = ImageAnalysis {
                damage: damage.per_image.iter().find(|d| d.image_id == record.id).cloned(),
                fraud: fraud.per_image.iter().find(|f| f.image_id == record.id).cloned(),
                verification: verifications.iter().find(|v| v.image_id == record.id).cloned(),
            };
            claim.add_image(record);
        }

        let vehicle = if verifications.is_empty() {
            None
        } else {
            Some(self.verifier.status(&claim.latest_images_by_angle(), cross_check))
        };
        let decision = self
            .triage
            .apply(&mut claim, damage, fraud, vehicle, TransitionTrigger::Submission);

        self.store.insert_claim(&claim).await?;
        guard.commit();
        recorded.commit();

        tracing::info!(
            claim_id = %claim.id,
            owner_id = %claim.owner_id,
            images = claim.images.len(),
            rejected = batch.rejected.len(),
            status = %claim.status,
            "Claim submitted"
        );

        Ok(ClaimSubmission {
            claim,
            decision,
            rejected: batch.rejected,
        })
    }

    async fn run_damage(&self, images: Vec<ScoringImage>) -> DamageAssessment {
        let scorer = self.damage_scorer.clone();
        match tokio::task::spawn_blocking(move || scorer.assess(&images)).await {
            Ok(assessment) => assessment,
            Err(err) => {
                tracing::error!(error = %err, "Damage scorer failed");
                DamageAssessment::empty(self.currency)
            }
        }
    }

    async fn run_fraud(&self, images: Vec<ScoringImage>, session: Arc<DetectionSession>) -> FraudAssessment {
        let scorer = self.fraud_scorer.clone();
        match tokio::task::spawn_blocking(move || scorer.assess(&images, &session)).await {
            Ok(assessment) => assessment,
            Err(err) => {
                tracing::error!(error = %err, "Fraud scorer failed");
                FraudAssessment::empty()
            }
        }
    }

    /// Single-image checks for angle-tagged photos plus a cross-check of the
    /// latest photo per angle
    ///
    /// The single-image checks run concurrently, so a slow oracle costs one
    /// timeout for the batch rather than one per photo.
    async fn run_vehicle(&self, images: &[PreparedImage]) -> (Vec<ImageVerification>, Option<CrossCheck>) {
        let tagged: Vec<&PreparedImage> = images.iter().filter(|i| i.record.angle.is_required()).collect();
        if tagged.is_empty() {
            return (Vec::new(), None);
        }

        let mut checks = JoinSet::new();
        let mut latest: BTreeMap<Angle, (ClaimImage, Arc<[u8]>)> = BTreeMap::new();
        for (index, image) in tagged.iter().enumerate() {
            let verifier = self.verifier.clone();
            let record = image.record.clone();
            let bytes = image.bytes.clone();
            checks.spawn(async move { (index, verifier.verify_image(&record, &bytes).await) });
            latest.insert(image.record.angle, (image.record.clone(), image.bytes.clone()));
        }

        let mut slots: Vec<Option<ImageVerification>> = vec![None; tagged.len()];
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((index, verification)) => slots[index] = Some(verification),
                Err(err) => tracing::error!(error = %err, "Image verification task failed"),
            }
        }
        let verifications = slots.into_iter().flatten().collect();

        let cross_check = self.verifier.cross_check(&latest).await;
        (verifications, cross_check)
    }

    /// Fetches a claim visible to the actor
    pub async fn get_claim(&self, actor: &Actor, claim_id: ClaimId) -> Result<Claim, ClaimError> {
        let claim = self.store.get_claim(claim_id).await?;
        claim.ensure_access(actor)?;
        Ok(claim)
    }

    /// Takes the claim's write lock and reloads it under the lock
    ///
    /// Missing claims and foreign claims fail before a lock entry is made.
    async fn lock_claim(
        &self,
        actor: &Actor,
        claim_id: ClaimId,
    ) -> Result<(ClaimWriteGuard<'_>, Claim), ClaimError> {
        self.get_claim(actor, claim_id).await?;
        let lock = self.locks.acquire(claim_id).await;
        let claim = self.get_claim(actor, claim_id).await?;
        Ok((lock, claim))
    }

    /// Scores and per-image breakdown of a claim
    pub async fn get_scores(&self, actor: &Actor, claim_id: ClaimId) -> Result<ClaimScores, ClaimError> {
        let claim = self.get_claim(actor, claim_id).await?;
        let analysis = claim.analysis_snapshot().cloned();
        Ok(ClaimScores {
            claim_id: claim.id,
            status: claim.status,
            damage_score: claim.damage_score,
            fraud_score: claim.fraud_score,
            cost_estimate: claim.cost_estimate,
            analysis,
            images: claim
                .images
                .into_iter()
                .map(|image| ImageScores {
                    image_id: image.id,
                    angle: image.angle,
                    analysis: image.ai_analysis,
                })
                .collect(),
        })
    }

    /// Lists claims, newest first
    ///
    /// Administrators see every claim, other users only their own.
    pub async fn list_claims(
        &self,
        actor: &Actor,
        status: Option<ClaimStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Claim>, ClaimError> {
        let query = if actor.is_admin {
            ClaimQuery::default()
        } else {
            ClaimQuery::by_owner(actor.user_id)
        };
        let claims = self
            .store
            .find_claims(query.with_status(status).paginate(limit, offset))
            .await?;
        Ok(claims)
    }

    /// Administrator status override
    pub async fn update_status(
        &self,
        actor: &Actor,
        claim_id: ClaimId,
        status: ClaimStatus,
        note: Option<String>,
    ) -> Result<Claim, ClaimError> {
        let (_lock, mut claim) = self.lock_claim(actor, claim_id).await?;
        let from = claim.status;
        claim.override_status(status, actor, note)?;
        self.store.save_claim(&claim).await?;

        tracing::info!(
            claim_id = %claim_id,
            from = %from,
            to = %status,
            actor = %actor.user_id,
            "Claim status overridden"
        );
        Ok(claim)
    }

    /// Deletes a claim, its image records and, best effort, its files
    pub async fn delete_claim(&self, actor: &Actor, claim_id: ClaimId) -> Result<ClaimDeletion, ClaimError> {
        let (_lock, _) = self.lock_claim(actor, claim_id).await?;
        let images = self.store.delete_claim(claim_id).await?;

        let mut files_not_removed = Vec::new();
        for image in &images {
            if let Err(err) = self.blobs.delete(&image.storage_path).await {
                tracing::warn!(
                    claim_id = %claim_id,
                    path = %image.storage_path,
                    error = %err,
                    "Failed to remove claim image file"
                );
                files_not_removed.push(image.storage_path.clone());
            }
        }

        tracing::info!(claim_id = %claim_id, images = images.len(), "Claim deleted");
        Ok(ClaimDeletion {
            claim_id,
            images_removed: images.len(),
            files_not_removed,
        })
    }

    /// Adds a photo for one angle and runs the single-image check
    ///
    /// The claim status is left unchanged; finalization decides it.
    pub async fn upload_angle_image(
        &self,
        actor: &Actor,
        claim_id: ClaimId,
        angle: Angle,
        upload: ImageUpload,
    ) -> Result<AngleUpload, ClaimError> {
        if !angle.is_required() {
            return Err(ClaimError::InvalidAngle(angle.to_string()));
        }

        let (_lock, mut claim) = self.lock_claim(actor, claim_id).await?;

        let prepared = self.ingestor.prepare_one(claim_id, ImageUpload { angle, ..upload })?;
        let guard = self
            .ingestor
            .store(self.blobs.clone(), std::slice::from_ref(&prepared))
            .await?;

        let verification = self.verifier.verify_image(&prepared.record, &prepared.bytes).await;
        let mut image = prepared.record;
        image.ai_analysis.verification = Some(verification.clone());
        claim.add_image(image.clone());

        self.store.save_claim(&claim).await?;
        guard.commit();

        tracing::info!(
            claim_id = %claim_id,
            angle = %angle,
            score = verification.score,
            verified = verification.verified,
            mode = ?verification.mode,
            "Verification image uploaded"
        );
        Ok(AngleUpload { image, verification })
    }

    /// Current verification state of a claim
    pub async fn verification_status(
        &self,
        actor: &Actor,
        claim_id: ClaimId,
    ) -> Result<VerificationResult, ClaimError> {
        let claim = self.get_claim(actor, claim_id).await?;
        Ok(self.compute_verification(&claim).await)
    }

    async fn compute_verification(&self, claim: &Claim) -> VerificationResult {
        let latest = claim.latest_images_by_angle();

        let mut with_bytes = BTreeMap::new();
        for (angle, image) in &latest {
            match self.blobs.get(&image.storage_path).await {
                Ok(bytes) => {
                    with_bytes.insert(*angle, ((*image).clone(), Arc::<[u8]>::from(bytes)));
                }
                Err(err) => {
                    tracing::warn!(
                        claim_id = %claim.id,
                        path = %image.storage_path,
                        error = %err,
                        "Image file unavailable for cross-check"
                    );
                }
            }
        }

        let cross_check = self.verifier.cross_check(&with_bytes).await;
        self.verifier.status(&latest, cross_check)
    }

    /// Finalizes vehicle verification and routes the claim
    ///
    /// Moves the claim to `verified` when every checked photo passed and
    /// the average clears the threshold, otherwise to `review`.
    pub async fn submit_verification(
        &self,
        actor: &Actor,
        claim_id: ClaimId,
    ) -> Result<VerificationOutcome, ClaimError> {
        let (_lock, mut claim) = self.lock_claim(actor, claim_id).await?;

        let submission = self.verifier.finalize(&claim.images).map_err(|err| match err {
            ClaimError::NoImages(_) => ClaimError::NoImages(claim_id.to_string()),
            other => other,
        })?;
        let verification = self.compute_verification(&claim).await;
        let decision = self.triage.apply_submission(
            &mut claim,
            verification.clone(),
            submission.clone(),
            Some(actor.user_id),
        );

        self.store.save_claim(&claim).await?;

        Ok(VerificationOutcome {
            claim_id,
            status: decision.status,
            submission,
            verification,
        })
    }

    /// Dashboard statistics; administrators only
    pub async fn stats(&self, actor: &Actor) -> Result<ClaimStats, ClaimError> {
        if !actor.is_admin {
            return Err(ClaimError::AccessDenied(
                "statistics are available to administrators only".to_string(),
            ));
        }
        Ok(self.store.stats().await?)
    }

    /// Health of the claim store and, when configured, the similarity oracle
    pub async fn health(&self) -> Vec<HealthCheckResult> {
        let mut results = vec![self.store.health_check().await];
        if let Some(oracle) = self.verifier.oracle() {
            results.push(oracle.health_check().await);
        }
        results
    }
}
