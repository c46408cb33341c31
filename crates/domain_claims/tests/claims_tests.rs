//! Integration tests for domain_claims

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use core_kernel::{ClaimId, Currency, UserId};

use domain_claims::claim::{Actor, Angle, ClaimStatus, NewClaim};
use domain_claims::damage::Severity;
use domain_claims::error::ClaimError;
use domain_claims::fraud::{FraudIssue, RiskLevel, SessionScope};
use domain_claims::ingest::ImageUpload;
use domain_claims::ports::mock::{InMemoryBlobStore, InMemoryClaimStore, ScriptedOracle};
use domain_claims::service::{ClaimIntakeService, IntakeSettings};
use domain_claims::triage::{DecisionRule, TransitionTrigger, TriageStrategy};
use domain_claims::verification::{
    SubmissionRecommendation, VehicleVerifier, VerificationMode, VerificationRecommendation,
};

// ============================================================================
// Fixtures
// ============================================================================

fn png(seed: u8, width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 7 + y * 13) as u8).wrapping_mul(seed | 1);
        Rgb([v, v.wrapping_add(seed), 255 - v])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn upload(seed: u8, angle: Angle) -> ImageUpload {
    ImageUpload {
        bytes: png(seed, 96, 72),
        angle,
        filename: format!("{}_{}.png", angle, seed),
    }
}

fn details(owner: UserId) -> NewClaim {
    NewClaim {
        owner_id: owner,
        policy_number: "POL-2024-0001".to_string(),
        accident_date: Utc::now().date_naive() - Days::new(3),
        location: "Market Street".to_string(),
        description: "Side impact at junction".to_string(),
    }
}

struct Harness {
    service: ClaimIntakeService,
    store: InMemoryClaimStore,
    blobs: InMemoryBlobStore,
}

fn harness_with(verifier: VehicleVerifier, settings: IntakeSettings) -> Harness {
    let store = InMemoryClaimStore::new();
    let blobs = InMemoryBlobStore::new();
    let service = ClaimIntakeService::new(
        Arc::new(store.clone()),
        Arc::new(blobs.clone()),
        verifier,
        settings,
    );
    Harness { service, store, blobs }
}

fn harness() -> Harness {
    harness_with(VehicleVerifier::simulated(0.85), IntakeSettings::default())
}

fn scripted(image_score: f64, pair_similarity: f64) -> VehicleVerifier {
    VehicleVerifier::new(
        Some(Arc::new(ScriptedOracle::new(image_score, pair_similarity))),
        0.85,
        Duration::from_secs(2),
    )
}

// ============================================================================
// Submission
// ============================================================================

mod submission_tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_images_creates_claim_with_zero_scores() {
        let h = harness();
        let owner = Actor::user(UserId::new());

        let result = h.service.create_claim(&owner, details(owner.user_id), vec![]).await.unwrap();

        let claim = &result.claim;
        assert_eq!(claim.damage_score, 0.0);
        assert_eq!(claim.fraud_score, 0.0);
        assert!(claim.cost_estimate.is_zero());

        let snapshot = claim.analysis_snapshot().unwrap();
        assert_eq!(snapshot.damage_analysis.severity, Severity::None);
        assert_eq!(snapshot.damage_analysis.confidence, 0.0);
        assert_eq!(snapshot.fraud_analysis.risk_level, RiskLevel::Unknown);
        assert!(snapshot.car_verification.is_none());
        assert_eq!(claim.status, ClaimStatus::Review);
        assert_eq!(result.decision.rule, DecisionRule::InsufficientConfidence);
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_images_do_not_block_claim() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let uploads = vec![
            ImageUpload {
                bytes: b"not an image".to_vec(),
                angle: Angle::Front,
                filename: "front.jpg".to_string(),
            },
            ImageUpload {
                bytes: png(3, 20, 20),
                angle: Angle::Back,
                filename: "back.png".to_string(),
            },
            ImageUpload {
                bytes: png(4, 80, 80),
                angle: Angle::Left,
                filename: "left.bmp".to_string(),
            },
        ];

        let result = h.service.create_claim(&owner, details(owner.user_id), uploads).await.unwrap();

        assert_eq!(result.rejected.len(), 3);
        assert!(result.claim.images.is_empty());
        assert!(h.blobs.is_empty().await);
        assert_eq!(result.claim.audit_trail.len(), 1);
    }

    #[tokio::test]
    async fn test_submission_records_snapshot_and_audit() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let uploads = vec![upload(1, Angle::Front), upload(2, Angle::Back)];

        let result = h.service.create_claim(&owner, details(owner.user_id), uploads).await.unwrap();
        let claim = &result.claim;

        assert_eq!(claim.images.len(), 2);
        assert_eq!(h.blobs.len().await, 2);
        for image in &claim.images {
            assert!(h.blobs.contains(&image.storage_path).await);
            assert!(image.ai_analysis.damage.is_some());
            assert!(image.ai_analysis.fraud.is_some());
            assert_eq!(
                image.ai_analysis.verification.as_ref().map(|v| v.image_id),
                Some(image.id)
            );
        }

        let snapshot = claim.analysis_snapshot().unwrap();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.trigger, TransitionTrigger::Submission);
        assert_eq!(snapshot.prior_status, ClaimStatus::Pending);
        assert_eq!(snapshot.damage_analysis.images_analyzed, 2);
        assert!(snapshot.car_verification.is_some());

        let audit = &claim.audit_trail[0];
        assert_eq!(audit.from_status, ClaimStatus::Pending);
        assert_eq!(audit.to_status, claim.status);
        assert_eq!(audit.trigger, TransitionTrigger::Submission);
        assert!(audit.actor.is_none());
    }

    #[tokio::test]
    async fn test_pipeline_never_rejects() {
        let h = harness_with(
            VehicleVerifier::simulated(0.85),
            IntakeSettings {
                triage_strategy: TriageStrategy::Blended,
                ..Default::default()
            },
        );
        let owner = Actor::user(UserId::new());
        for seed in 0..4u8 {
            let result = h
                .service
                .create_claim(&owner, details(owner.user_id), vec![upload(seed, Angle::Front)])
                .await
                .unwrap();
            assert_ne!(result.claim.status, ClaimStatus::Rejected);
            assert!(result.decision.combined_score.is_some());
        }
    }

    #[tokio::test]
    async fn test_storage_failure_removes_written_blobs() {
        let h = harness();
        h.blobs.fail_puts_after(1).await;
        let owner = Actor::user(UserId::new());
        let uploads = vec![upload(1, Angle::Front), upload(2, Angle::Back)];

        let err = h
            .service
            .create_claim(&owner, details(owner.user_id), uploads)
            .await
            .unwrap_err();

        assert!(matches!(err, ClaimError::StorageFailure(_)));
        assert!(h.store.is_empty().await);
        // Cleanup runs on a spawned task
        for _ in 0..20 {
            if h.blobs.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(h.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_future_accident_date_is_rejected() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let mut new_claim = details(owner.user_id);
        new_claim.accident_date = Utc::now().date_naive() + Days::new(2);

        let err = h.service.create_claim(&owner, new_claim, vec![]).await.unwrap_err();
        assert!(matches!(err, ClaimError::Validation(_)));
    }
}

// ============================================================================
// Duplicate Detection
// ============================================================================

mod duplicate_tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicates_flagged_on_every_resubmission() {
        let h = harness();
        let owner = Actor::user(UserId::new());

        let first = h
            .service
            .create_claim(&owner, details(owner.user_id), vec![upload(9, Angle::Front)])
            .await
            .unwrap();
        let fraud = &first.claim.analysis_snapshot().unwrap().fraud_analysis;
        assert_eq!(fraud.duplicate_count, 0);

        for _ in 0..2 {
            let again = h
                .service
                .create_claim(&owner, details(owner.user_id), vec![upload(9, Angle::Front)])
                .await
                .unwrap();
            let fraud = &again.claim.analysis_snapshot().unwrap().fraud_analysis;
            assert_eq!(fraud.duplicate_count, 1);
            assert!(fraud.detected_issues.contains(&FraudIssue::DuplicateImage));
        }
    }

    async fn wait_for_blob_cleanup(blobs: &InMemoryBlobStore) {
        for _ in 0..50 {
            if blobs.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_failed_insert_removes_blobs_and_forgets_photos() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let photos = || vec![upload(9, Angle::Front), upload(8, Angle::Back)];
        h.store.fail_next_inserts(1);

        let err = h
            .service
            .create_claim(&owner, details(owner.user_id), photos())
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::StorageFailure(_)));
        assert!(h.store.is_empty().await);
        wait_for_blob_cleanup(&h.blobs).await;
        assert!(h.blobs.is_empty().await);

        let retried = h
            .service
            .create_claim(&owner, details(owner.user_id), photos())
            .await
            .unwrap();
        let fraud = &retried.claim.analysis_snapshot().unwrap().fraud_analysis;
        assert_eq!(fraud.duplicate_count, 0);
        assert!(!fraud.detected_issues.contains(&FraudIssue::DuplicateImage));

        // The stored claim's photos are remembered
        let again = h
            .service
            .create_claim(&owner, details(owner.user_id), photos())
            .await
            .unwrap();
        assert_eq!(again.claim.analysis_snapshot().unwrap().fraud_analysis.duplicate_count, 2);
    }

    #[tokio::test]
    async fn test_cancelled_submission_forgets_photos() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        h.store.delay_inserts(Some(Duration::from_secs(5))).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(300),
            h.service
                .create_claim(&owner, details(owner.user_id), vec![upload(9, Angle::Front)]),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(h.store.is_empty().await);
        wait_for_blob_cleanup(&h.blobs).await;
        assert!(h.blobs.is_empty().await);

        h.store.delay_inserts(None).await;
        let retried = h
            .service
            .create_claim(&owner, details(owner.user_id), vec![upload(9, Angle::Front)])
            .await
            .unwrap();
        let fraud = &retried.claim.analysis_snapshot().unwrap().fraud_analysis;
        assert_eq!(fraud.duplicate_count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_of_one_photo_flag_exactly_one() {
        let h = harness();
        let owner = Actor::user(UserId::new());

        let (a, b) = tokio::join!(
            h.service
                .create_claim(&owner, details(owner.user_id), vec![upload(9, Angle::Front)]),
            h.service
                .create_claim(&owner, details(owner.user_id), vec![upload(9, Angle::Front)]),
        );

        let flagged: Vec<bool> = [a.unwrap(), b.unwrap()]
            .iter()
            .map(|s| {
                s.claim
                    .analysis_snapshot()
                    .unwrap()
                    .fraud_analysis
                    .detected_issues
                    .contains(&FraudIssue::DuplicateImage)
            })
            .collect();
        assert_eq!(flagged.iter().filter(|f| **f).count(), 1);
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_per_claim_scope_ignores_other_claims() {
        let h = harness_with(
            VehicleVerifier::simulated(0.85),
            IntakeSettings {
                session_scope: SessionScope::PerClaim,
                ..Default::default()
            },
        );
        let owner = Actor::user(UserId::new());

        for _ in 0..2 {
            let result = h
                .service
                .create_claim(&owner, details(owner.user_id), vec![upload(9, Angle::Front)])
                .await
                .unwrap();
            let fraud = &result.claim.analysis_snapshot().unwrap().fraud_analysis;
            assert_eq!(fraud.duplicate_count, 0);
        }
    }
}

// ============================================================================
// Vehicle Verification
// ============================================================================

mod verification_tests {
    use super::*;

    async fn claim_for(h: &Harness, owner: &Actor) -> ClaimId {
        h.service
            .create_claim(owner, details(owner.user_id), vec![])
            .await
            .unwrap()
            .claim
            .id
    }

    #[tokio::test]
    async fn test_four_verified_angles_approve() {
        let h = harness_with(scripted(0.9, 0.9), IntakeSettings::default());
        let owner = Actor::user(UserId::new());
        let claim_id = claim_for(&h, &owner).await;

        for (seed, angle) in Angle::REQUIRED.into_iter().enumerate() {
            let uploaded = h
                .service
                .upload_angle_image(&owner, claim_id, angle, upload(seed as u8 + 10, angle))
                .await
                .unwrap();
            assert!(uploaded.verification.verified);
            assert_eq!(uploaded.verification.mode, VerificationMode::Oracle);
        }

        let status = h.service.verification_status(&owner, claim_id).await.unwrap();
        assert!(status.all_verified);
        assert_eq!(status.verified_angles, 4);
        assert_eq!(status.completion_percentage, 100.0);
        assert_eq!(status.recommendation, VerificationRecommendation::Approved);
        assert!(status.cross_check.as_ref().unwrap().same_car);
        assert_eq!(status.cross_check.as_ref().unwrap().pairs.len(), 6);

        let outcome = h.service.submit_verification(&owner, claim_id).await.unwrap();
        assert_eq!(outcome.submission.recommendation, SubmissionRecommendation::Approved);
        assert_eq!(outcome.status, ClaimStatus::Verified);

        let claim = h.service.get_claim(&owner, claim_id).await.unwrap();
        assert_eq!(claim.status, ClaimStatus::Verified);
        let snapshot = claim.analysis_snapshot().unwrap();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.trigger, TransitionTrigger::VerificationFinalized);
        assert!(snapshot.verification_submission.is_some());
        assert_eq!(claim.audit_trail.last().unwrap().actor, Some(owner.user_id));
    }

    #[tokio::test]
    async fn test_two_of_four_angles_is_half_complete() {
        let h = harness_with(scripted(0.9, 0.9), IntakeSettings::default());
        let owner = Actor::user(UserId::new());
        let claim_id = claim_for(&h, &owner).await;

        for angle in [Angle::Front, Angle::Left] {
            h.service
                .upload_angle_image(&owner, claim_id, angle, upload(20, angle))
                .await
                .unwrap();
        }

        let status = h.service.verification_status(&owner, claim_id).await.unwrap();
        assert_eq!(status.completion_percentage, 50.0);
        assert!(!status.all_verified);
        assert_eq!(status.recommendation, VerificationRecommendation::NeedsMoreImages);
        for missing in [Angle::Back, Angle::Right] {
            let angle = &status.angles[&missing];
            assert!(!angle.uploaded);
            assert!(!angle.verified);
            assert_eq!(angle.score, 0.0);
        }
    }

    #[tokio::test]
    async fn test_low_scores_route_to_review() {
        let h = harness_with(scripted(0.5, 0.5), IntakeSettings::default());
        let owner = Actor::user(UserId::new());
        let claim_id = claim_for(&h, &owner).await;

        h.service
            .upload_angle_image(&owner, claim_id, Angle::Front, upload(30, Angle::Front))
            .await
            .unwrap();

        let outcome = h.service.submit_verification(&owner, claim_id).await.unwrap();
        assert_eq!(outcome.submission.recommendation, SubmissionRecommendation::ReviewRequired);
        assert_eq!(outcome.status, ClaimStatus::Review);
    }

    #[tokio::test]
    async fn test_slow_oracle_checks_photos_concurrently() {
        let oracle = Arc::new(ScriptedOracle::new(0.9, 0.9).with_latency(Duration::from_millis(400)));
        let verifier = VehicleVerifier::new(Some(oracle.clone()), 0.85, Duration::from_secs(2));
        let h = harness_with(verifier, IntakeSettings::default());
        let owner = Actor::user(UserId::new());
        let uploads = Angle::REQUIRED
            .into_iter()
            .enumerate()
            .map(|(seed, angle)| upload(seed as u8 + 60, angle))
            .collect();

        let started = std::time::Instant::now();
        let result = h
            .service
            .create_claim(&owner, details(owner.user_id), uploads)
            .await
            .unwrap();

        // Four sequential checks would take at least 1.6s
        assert!(started.elapsed() < Duration::from_millis(1200));
        assert_eq!(result.claim.images.len(), 4);
        for image in &result.claim.images {
            let verification = image.ai_analysis.verification.as_ref().unwrap();
            assert_eq!(verification.mode, VerificationMode::Oracle);
            assert_eq!(verification.angle, image.angle);
        }
    }

    #[tokio::test]
    async fn test_unavailable_oracle_falls_back_to_simulation() {
        let oracle = Arc::new(ScriptedOracle::unavailable());
        let verifier = VehicleVerifier::new(Some(oracle.clone()), 0.85, Duration::from_secs(1));
        let h = harness_with(verifier, IntakeSettings::default());
        let owner = Actor::user(UserId::new());
        let claim_id = claim_for(&h, &owner).await;

        let first = h
            .service
            .upload_angle_image(&owner, claim_id, Angle::Back, upload(40, Angle::Back))
            .await
            .unwrap();
        assert_eq!(first.verification.mode, VerificationMode::Simulated);
        assert!((0.6..=1.0).contains(&first.verification.score));
        assert!(oracle.calls() > 0);

        let health = h.service.health().await;
        assert_eq!(health.len(), 2);
    }

    #[tokio::test]
    async fn test_upload_does_not_change_status() {
        let h = harness_with(scripted(0.9, 0.9), IntakeSettings::default());
        let owner = Actor::user(UserId::new());
        let claim_id = claim_for(&h, &owner).await;
        let before = h.service.get_claim(&owner, claim_id).await.unwrap();

        h.service
            .upload_angle_image(&owner, claim_id, Angle::Right, upload(50, Angle::Right))
            .await
            .unwrap();

        let after = h.service.get_claim(&owner, claim_id).await.unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.audit_trail.len(), before.audit_trail.len());
        assert_eq!(after.images.len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_without_images_fails() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let claim_id = claim_for(&h, &owner).await;

        let err = h.service.submit_verification(&owner, claim_id).await.unwrap_err();
        assert!(matches!(err, ClaimError::NoImages(_)));
    }

    #[tokio::test]
    async fn test_untagged_angle_is_refused() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let claim_id = claim_for(&h, &owner).await;

        let err = h
            .service
            .upload_angle_image(&owner, claim_id, Angle::Unknown, upload(1, Angle::Unknown))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::InvalidAngle(_)));
    }
}

// ============================================================================
// Access, Overrides and Deletion
// ============================================================================

mod access_tests {
    use super::*;

    #[tokio::test]
    async fn test_non_owner_is_denied() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let stranger = Actor::user(UserId::new());
        let claim_id = h
            .service
            .create_claim(&owner, details(owner.user_id), vec![])
            .await
            .unwrap()
            .claim
            .id;

        assert!(matches!(
            h.service.get_claim(&stranger, claim_id).await,
            Err(ClaimError::AccessDenied(_))
        ));
        assert!(matches!(
            h.service
                .update_status(&stranger, claim_id, ClaimStatus::Approved, None)
                .await,
            Err(ClaimError::AccessDenied(_))
        ));
        assert!(matches!(
            h.service.delete_claim(&stranger, claim_id).await,
            Err(ClaimError::AccessDenied(_))
        ));
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_admin_override_is_audited() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let admin = Actor::admin(UserId::new());
        let claim_id = h
            .service
            .create_claim(&owner, details(owner.user_id), vec![])
            .await
            .unwrap()
            .claim
            .id;

        assert!(matches!(
            h.service
                .update_status(&owner, claim_id, ClaimStatus::Approved, None)
                .await,
            Err(ClaimError::AccessDenied(_))
        ));
        assert!(matches!(
            h.service
                .update_status(&admin, claim_id, ClaimStatus::Verified, None)
                .await,
            Err(ClaimError::InvalidStatusTransition(_))
        ));

        let claim = h
            .service
            .update_status(&admin, claim_id, ClaimStatus::Rejected, Some("Staged photos".to_string()))
            .await
            .unwrap();
        assert_eq!(claim.status, ClaimStatus::Rejected);
        let entry = claim.audit_trail.last().unwrap();
        assert_eq!(entry.trigger, TransitionTrigger::AdminOverride);
        assert_eq!(entry.actor, Some(admin.user_id));
        assert_eq!(entry.note.as_deref(), Some("Staged photos"));
        assert_eq!(claim.analysis_history.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_tolerates_file_removal_failure() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let claim_id = h
            .service
            .create_claim(&owner, details(owner.user_id), vec![upload(5, Angle::Front)])
            .await
            .unwrap()
            .claim
            .id;
        h.blobs.fail_deletes(true);

        let deletion = h.service.delete_claim(&owner, claim_id).await.unwrap();
        assert_eq!(deletion.images_removed, 1);
        assert_eq!(deletion.files_not_removed.len(), 1);
        assert!(matches!(
            h.service.get_claim(&owner, claim_id).await,
            Err(ClaimError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_listing_and_stats() {
        let h = harness();
        let alice = Actor::user(UserId::new());
        let bob = Actor::user(UserId::new());
        let admin = Actor::admin(UserId::new());

        for actor in [&alice, &alice, &bob] {
            h.service.create_claim(actor, details(actor.user_id), vec![]).await.unwrap();
        }

        let mine = h.service.list_claims(&alice, None, 50, 0).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].created_at >= mine[1].created_at);

        let all = h.service.list_claims(&admin, None, 50, 0).await.unwrap();
        assert_eq!(all.len(), 3);

        let approved = h
            .service
            .list_claims(&admin, Some(ClaimStatus::Approved), 50, 0)
            .await
            .unwrap();
        assert!(approved.is_empty());

        assert!(matches!(h.service.stats(&alice).await, Err(ClaimError::AccessDenied(_))));
        let stats = h.service.stats(&admin).await.unwrap();
        assert_eq!(stats.total_claims, 3);
        assert_eq!(stats.review, 3);
    }

    #[tokio::test]
    async fn test_scores_view_attributes_images() {
        let h = harness();
        let owner = Actor::user(UserId::new());
        let claim = h
            .service
            .create_claim(
                &owner,
                details(owner.user_id),
                vec![upload(61, Angle::Front), upload(62, Angle::Unknown)],
            )
            .await
            .unwrap()
            .claim;

        let scores = h.service.get_scores(&owner, claim.id).await.unwrap();
        assert_eq!(scores.images.len(), 2);
        for image in &scores.images {
            assert_eq!(image.analysis.damage.as_ref().unwrap().image_id, image.image_id);
            assert_eq!(image.analysis.fraud.as_ref().unwrap().image_id, image.image_id);
        }
        assert_eq!(scores.cost_estimate.currency(), Currency::USD);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use domain_claims::damage::{DamageScorer, HeuristicDamageScorer};
    use domain_claims::fraud::{DetectionSession, FraudScorer, HeuristicFraudScorer};
    use domain_claims::scoring::ScoringImage;
    use proptest::prelude::*;

    fn scoring_inputs(seeds: &[(u8, u32, u32)]) -> Vec<ScoringImage> {
        seeds
            .iter()
            .map(|&(seed, w, h)| {
                let bytes = png(seed, w, h);
                ScoringImage {
                    image_id: core_kernel::ImageId::new(),
                    angle: Angle::Unknown,
                    content_hash: domain_claims::signals::content_hash(&bytes),
                    bytes: Arc::from(bytes),
                }
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn scores_stay_in_bounds(seeds in prop::collection::vec((any::<u8>(), 50u32..160, 50u32..160), 0..4)) {
            let images = scoring_inputs(&seeds);

            let damage = HeuristicDamageScorer::new(Currency::USD).assess(&images);
            prop_assert!((0.0..=1.0).contains(&damage.damage_score));
            prop_assert!((0.0..=1.0).contains(&damage.confidence));
            prop_assert!(!damage.cost_estimate.is_negative());
            prop_assert_eq!(damage.per_image.len(), images.len());

            let fraud = HeuristicFraudScorer::new().assess(&images, &DetectionSession::new());
            prop_assert!((0.0..=1.0).contains(&fraud.fraud_score));
            for image in &fraud.per_image {
                prop_assert!((0.0..=1.0).contains(&image.fraud_score));
            }
        }
    }

    #[test]
    fn test_damage_scoring_is_deterministic() {
        let images = scoring_inputs(&[(17, 120, 90)]);
        let scorer = HeuristicDamageScorer::new(Currency::USD);
        let a = scorer.assess(&images);
        let b = scorer.assess(&images);
        assert_eq!(a.damage_score, b.damage_score);
        assert_eq!(a.detected_damages, b.detected_damages);
        assert_eq!(a.cost_estimate, b.cost_estimate);
    }
}
