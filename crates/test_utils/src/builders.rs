//! Test Data Builders
//!
//! Builders with sensible defaults so tests only spell out the fields they
//! care about.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use fake::faker::address::en::StreetName;
use fake::faker::lorem::en::Sentence;
use fake::Fake;

use core_kernel::{Currency, UserId};
use domain_claims::claim::{Angle, Claim, NewClaim};
use domain_claims::fraud::SessionScope;
use domain_claims::ingest::ImageUpload;
use domain_claims::ports::mock::{InMemoryBlobStore, InMemoryClaimStore, ScriptedOracle};
use domain_claims::ports::SimilarityOracle;
use domain_claims::service::{ClaimIntakeService, IntakeSettings};
use domain_claims::triage::TriageStrategy;
use domain_claims::verification::{VehicleVerifier, DEFAULT_THRESHOLD};

use crate::fixtures::{ClaimFixtures, ImageFixtures};

/// Builder for claim details
pub struct NewClaimBuilder {
    owner_id: UserId,
    policy_number: String,
    accident_date: NaiveDate,
    location: String,
    description: String,
}

impl NewClaimBuilder {
    /// Defaults with a fake street and description
    pub fn new(owner_id: UserId) -> Self {
        Self {
            owner_id,
            policy_number: ClaimFixtures::policy_number().to_string(),
            accident_date: ClaimFixtures::accident_date(),
            location: StreetName().fake(),
            description: Sentence(3..8).fake(),
        }
    }

    pub fn with_policy_number(mut self, number: impl Into<String>) -> Self {
        self.policy_number = number.into();
        self
    }

    pub fn with_accident_date(mut self, date: NaiveDate) -> Self {
        self.accident_date = date;
        self
    }

    pub fn build(self) -> NewClaim {
        NewClaim {
            owner_id: self.owner_id,
            policy_number: self.policy_number,
            accident_date: self.accident_date,
            location: self.location,
            description: self.description,
        }
    }

    /// A pending claim with no images
    pub fn build_claim(self) -> Claim {
        Claim::new(self.build(), Currency::USD).expect("valid claim details")
    }
}

/// Builder for image uploads
pub struct ImageUploadBuilder {
    bytes: Vec<u8>,
    angle: Angle,
    filename: Option<String>,
}

impl ImageUploadBuilder {
    pub fn new(seed: u8) -> Self {
        Self {
            bytes: ImageFixtures::png(seed, 96, 72),
            angle: Angle::Unknown,
            filename: None,
        }
    }

    pub fn angle(mut self, angle: Angle) -> Self {
        self.angle = angle;
        self
    }

    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn build(self) -> ImageUpload {
        let filename = self
            .filename
            .unwrap_or_else(|| format!("{}.png", self.angle));
        ImageUpload {
            bytes: self.bytes,
            angle: self.angle,
            filename,
        }
    }
}

/// An intake service wired to in-memory adapters
pub struct TestService {
    pub service: Arc<ClaimIntakeService>,
    pub store: InMemoryClaimStore,
    pub blobs: InMemoryBlobStore,
}

/// Builder for [`TestService`]
pub struct TestServiceBuilder {
    oracle: Option<Arc<dyn SimilarityOracle>>,
    threshold: f64,
    settings: IntakeSettings,
}

impl Default for TestServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServiceBuilder {
    /// Simulated verification, gated triage, process-wide duplicate detection
    pub fn new() -> Self {
        Self {
            oracle: None,
            threshold: DEFAULT_THRESHOLD,
            settings: IntakeSettings::default(),
        }
    }

    /// Uses an oracle that answers every check with fixed scores
    pub fn scripted_oracle(mut self, image_score: f64, pair_similarity: f64) -> Self {
        self.oracle = Some(Arc::new(ScriptedOracle::new(image_score, pair_similarity)));
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn SimilarityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn strategy(mut self, strategy: TriageStrategy) -> Self {
        self.settings.triage_strategy = strategy;
        self
    }

    pub fn session_scope(mut self, scope: SessionScope) -> Self {
        self.settings.session_scope = scope;
        self
    }

    pub fn build(self) -> TestService {
        let store = InMemoryClaimStore::new();
        let blobs = InMemoryBlobStore::new();
        let verifier = VehicleVerifier::new(self.oracle, self.threshold, Duration::from_secs(2));
        let service = ClaimIntakeService::new(
            Arc::new(store.clone()),
            Arc::new(blobs.clone()),
            verifier,
            self.settings,
        );
        TestService {
            service: Arc::new(service),
            store,
            blobs,
        }
    }
}
