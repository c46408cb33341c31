//! PostgreSQL claim store tests
//!
//! These start a PostgreSQL container and are ignored by default. Run with
//! `cargo test -p infra_db -- --ignored` on a host with Docker.

use std::sync::Arc;
use std::time::Duration;

use core_kernel::{AdapterHealth, ClaimId, HealthCheckable, UserId};
use domain_claims::claim::{Actor, Angle, ClaimStatus};
use domain_claims::ports::mock::{InMemoryBlobStore, ScriptedOracle};
use domain_claims::ports::{ClaimQuery, ClaimStore};
use domain_claims::service::{ClaimIntakeService, IntakeSettings};
use domain_claims::triage::TransitionTrigger;
use domain_claims::verification::{VehicleVerifier, DEFAULT_THRESHOLD};
use infra_db::PostgresClaimStore;
use test_utils::{
    assert_history_consistent, create_isolated_test_database, get_shared_test_database,
    ImageFixtures, NewClaimBuilder,
};

fn service(store: PostgresClaimStore, image_score: f64) -> ClaimIntakeService {
    let verifier = VehicleVerifier::new(
        Some(Arc::new(ScriptedOracle::new(image_score, image_score))),
        DEFAULT_THRESHOLD,
        Duration::from_secs(2),
    );
    ClaimIntakeService::new(
        Arc::new(store),
        Arc::new(InMemoryBlobStore::new()),
        verifier,
        IntakeSettings::default(),
    )
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_created_claim_reads_back_with_children() {
    let db = get_shared_test_database().await;
    let store = db.store();
    let service = service(store.clone(), 0.95);
    let owner = Actor::user(UserId::new());

    let submitted = service
        .create_claim(
            &owner,
            NewClaimBuilder::new(owner.user_id).build(),
            ImageFixtures::all_angles(11),
        )
        .await
        .unwrap()
        .claim;

    let loaded = store.get_claim(submitted.id).await.unwrap();
    assert_eq!(loaded.status, submitted.status);
    assert_eq!(loaded.owner_id, owner.user_id);
    assert_eq!(loaded.cost_estimate, submitted.cost_estimate);
    assert!((loaded.damage_score - submitted.damage_score).abs() < 1e-9);
    assert_eq!(loaded.images.len(), 4);
    assert_eq!(loaded.analysis_history.len(), 1);
    assert_eq!(loaded.audit_trail.len(), submitted.audit_trail.len());

    let mut expected: Vec<_> = submitted.images.iter().map(|i| &i.content_hash).collect();
    let mut actual: Vec<_> = loaded.images.iter().map(|i| &i.content_hash).collect();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);

    let stored = &loaded.images[0];
    let original = submitted.images.iter().find(|i| i.id == stored.id).unwrap();
    assert_eq!(stored.ai_analysis.damage.is_some(), original.ai_analysis.damage.is_some());
    assert_eq!(stored.ai_analysis.verification.is_some(), original.ai_analysis.verification.is_some());
    let (loaded_decision, submitted_decision) = (
        &loaded.analysis_history[0].decision,
        &submitted.analysis_history[0].decision,
    );
    assert_eq!(loaded_decision.status, submitted_decision.status);
    assert_eq!(loaded_decision.rule, submitted_decision.rule);
    assert_history_consistent(&loaded);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_save_appends_snapshot_and_audit_entry() {
    let db = get_shared_test_database().await;
    let store = db.store();
    let service = service(store.clone(), 0.95);
    let owner = Actor::user(UserId::new());

    let claim = service
        .create_claim(
            &owner,
            NewClaimBuilder::new(owner.user_id).build(),
            ImageFixtures::all_angles(21),
        )
        .await
        .unwrap()
        .claim;

    let outcome = service.submit_verification(&owner, claim.id).await.unwrap();
    assert_eq!(outcome.status, ClaimStatus::Verified);

    let loaded = store.get_claim(claim.id).await.unwrap();
    assert_eq!(loaded.status, ClaimStatus::Verified);
    assert_eq!(loaded.analysis_history.len(), 2);
    assert_eq!(loaded.analysis_history[1].revision, 2);
    assert_eq!(
        loaded.analysis_history[1].trigger,
        TransitionTrigger::VerificationFinalized
    );
    assert_history_consistent(&loaded);

    // Saving again must not duplicate history rows
    store.save_claim(&loaded).await.unwrap();
    let reloaded = store.get_claim(claim.id).await.unwrap();
    assert_eq!(reloaded.audit_trail.len(), loaded.audit_trail.len());
    assert_eq!(reloaded.analysis_history.len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_find_filters_by_owner_and_status() {
    let db = get_shared_test_database().await;
    let store = db.store();
    let service = service(store.clone(), 0.95);
    let owner = Actor::user(UserId::new());
    let admin = Actor::admin(UserId::new());

    let mut ids = Vec::new();
    for _ in 0..3 {
        let claim = service
            .create_claim(&owner, NewClaimBuilder::new(owner.user_id).build(), vec![])
            .await
            .unwrap()
            .claim;
        ids.push(claim.id);
    }
    service
        .update_status(&admin, ids[0], ClaimStatus::Approved, Some("manual".into()))
        .await
        .unwrap();

    let all = store.find_claims(ClaimQuery::by_owner(owner.user_id)).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let approved = store
        .find_claims(ClaimQuery::by_owner(owner.user_id).with_status(Some(ClaimStatus::Approved)))
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, ids[0]);

    let page = store
        .find_claims(ClaimQuery::by_owner(owner.user_id).paginate(2, 2))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_returns_images_and_cascades() {
    let db = get_shared_test_database().await;
    let store = db.store();
    let service = service(store.clone(), 0.95);
    let owner = Actor::user(UserId::new());

    let claim = service
        .create_claim(
            &owner,
            NewClaimBuilder::new(owner.user_id).build(),
            ImageFixtures::all_angles(31),
        )
        .await
        .unwrap()
        .claim;

    let removed = store.delete_claim(claim.id).await.unwrap();
    assert_eq!(removed.len(), 4);
    assert!(store.get_claim(claim.id).await.unwrap_err().is_not_found());

    for table in ["claim_status_history", "claim_images", "claim_analysis_snapshots"] {
        assert_eq!(db.child_rows(table, claim.id).await.unwrap(), 0, "{} not cascaded", table);
    }

    assert!(store.delete_claim(claim.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_save_of_unknown_claim_is_not_found() {
    let db = get_shared_test_database().await;
    let store = db.store();

    let claim = NewClaimBuilder::new(UserId::new()).build_claim();
    assert!(store.save_claim(&claim).await.unwrap_err().is_not_found());
    assert!(store.get_claim(ClaimId::new()).await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stats_over_isolated_database() {
    let db = create_isolated_test_database().await.unwrap();
    let store = db.store();
    let service = service(store.clone(), 0.95);
    let owner = Actor::user(UserId::new());

    for seed in [40u8, 50] {
        service
            .create_claim(
                &owner,
                NewClaimBuilder::new(owner.user_id).build(),
                vec![ImageFixtures::upload(seed, Angle::Front)],
            )
            .await
            .unwrap();
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_claims, 2);
    assert_eq!(
        stats.pending + stats.approved + stats.rejected + stats.review + stats.verified,
        2
    );

    db.clear_data().await.unwrap();
    assert_eq!(store.stats().await.unwrap().total_claims, 0);

    let health = store.health_check().await;
    assert_eq!(health.status, AdapterHealth::Healthy);
}
