//! Claims Domain Ports
//!
//! Port interfaces the intake service depends on:
//!
//! - [`ClaimStore`]: claim records with their images, snapshots and audit
//!   trail (PostgreSQL in `infra_db`, in-memory for tests)
//! - [`ImageBlobStore`]: raw image bytes (local filesystem in `infra_db`)
//! - [`SimilarityOracle`]: the vehicle similarity service
//!   ([`crate::adapters::HttpSimilarityOracle`])
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = ClaimIntakeService::new(
//!     Arc::new(PostgresClaimStore::new(pool)),
//!     Arc::new(LocalBlobStore::new(upload_dir)),
//!     verifier,
//!     settings,
//! );
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{ClaimId, DomainPort, HealthCheckable, PortError, UserId};

use crate::claim::{Angle, Claim, ClaimImage, ClaimStatus};
use crate::verification::OracleComparison;

/// Query parameters for listing claims
#[derive(Debug, Clone, Default)]
pub struct ClaimQuery {
    /// Only claims owned by this user
    pub owner_id: Option<UserId>,
    /// Only claims in this status
    pub status: Option<ClaimStatus>,
    /// Limit results
    pub limit: Option<u32>,
    /// Offset for pagination
    pub offset: Option<u32>,
}

impl ClaimQuery {
    /// Creates a query for one owner's claims
    pub fn by_owner(owner_id: UserId) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Default::default()
        }
    }

    /// Restricts the query to one status
    pub fn with_status(mut self, status: Option<ClaimStatus>) -> Self {
        self.status = status;
        self
    }

    /// Adds pagination to the query
    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Whether a claim satisfies the filters
    pub fn matches(&self, claim: &Claim) -> bool {
        self.owner_id.map_or(true, |o| claim.owner_id == o)
            && self.status.map_or(true, |s| claim.status == s)
    }
}

/// Aggregate figures for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimStats {
    pub total_claims: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub review: u64,
    pub verified: u64,
    /// Claims with a fraud score above 0.7
    pub high_risk_claims: u64,
    pub total_cost_estimate: Decimal,
}

/// Fraud score above which a claim counts as high risk in statistics
pub const HIGH_RISK_FRAUD_SCORE: f64 = 0.7;

/// Persistence port for claims
///
/// A claim is written as a whole: its row, its images, any new analysis
/// snapshots and any new audit entries go in together or not at all.
#[async_trait]
pub trait ClaimStore: DomainPort + HealthCheckable {
    /// Inserts a new claim with everything it owns
    async fn insert_claim(&self, claim: &Claim) -> Result<(), PortError>;

    /// Retrieves a claim by ID
    ///
    /// # Returns
    ///
    /// The claim with images, snapshots and audit trail, or `PortError::NotFound`
    async fn get_claim(&self, id: ClaimId) -> Result<Claim, PortError>;

    /// Finds claims matching the query, newest first
    async fn find_claims(&self, query: ClaimQuery) -> Result<Vec<Claim>, PortError>;

    /// Persists changes to an existing claim
    ///
    /// Updates the claim row and image analyses, inserts images not yet
    /// stored, and appends snapshots and audit entries not yet stored.
    async fn save_claim(&self, claim: &Claim) -> Result<(), PortError>;

    /// Deletes a claim and its images
    ///
    /// # Returns
    ///
    /// The image records that were removed, so their blobs can be cleaned up
    async fn delete_claim(&self, id: ClaimId) -> Result<Vec<ClaimImage>, PortError>;

    /// Computes dashboard statistics over all claims
    async fn stats(&self) -> Result<ClaimStats, PortError>;
}

/// Storage port for raw image bytes
#[async_trait]
pub trait ImageBlobStore: DomainPort {
    /// Writes bytes under the given key
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PortError>;

    /// Reads the bytes stored under the given key
    async fn get(&self, path: &str) -> Result<Vec<u8>, PortError>;

    /// Removes the bytes stored under the given key
    async fn delete(&self, path: &str) -> Result<(), PortError>;
}

/// Port for the vehicle similarity service
///
/// The service keeps one slot per angle shared by all callers, so a
/// clear/submit/compare sequence must not interleave with another.
#[async_trait]
pub trait SimilarityOracle: DomainPort + HealthCheckable {
    /// Places an image in the slot for its angle
    async fn submit(&self, angle: Angle, bytes: &[u8]) -> Result<(), PortError>;

    /// Compares every filled slot pairwise
    async fn compare(&self, threshold: f64) -> Result<OracleComparison, PortError>;

    /// Empties every slot
    async fn clear(&self) -> Result<(), PortError>;

    /// Scores one image against the reference vehicle
    async fn score_image(&self, angle: Angle, bytes: &[u8], threshold: f64)
        -> Result<f64, PortError>;
}

/// In-memory adapters for testing
///
/// Enabled in unit tests and with the `mock` feature.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use core_kernel::HealthCheckResult;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    use crate::verification::PairSimilarity;

    fn healthy(adapter_id: &str) -> HealthCheckResult {
        HealthCheckResult::healthy(adapter_id, 0).with_message("Mock adapter always healthy")
    }

    /// In-memory claim store with switchable insert failures
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryClaimStore {
        claims: Arc<RwLock<HashMap<ClaimId, Claim>>>,
        /// Inserts still to be refused
        failing_inserts: Arc<AtomicUsize>,
        insert_delay: Arc<RwLock<Option<Duration>>>,
    }

    impl InMemoryClaimStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `n` inserts fail
        pub fn fail_next_inserts(&self, n: usize) {
            self.failing_inserts.store(n, Ordering::SeqCst);
        }

        /// Makes every insert wait before writing; `None` restores
        pub async fn delay_inserts(&self, delay: Option<Duration>) {
            *self.insert_delay.write().await = delay;
        }

        /// Number of stored claims
        pub async fn len(&self) -> usize {
            self.claims.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.claims.read().await.is_empty()
        }
    }

    impl DomainPort for InMemoryClaimStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryClaimStore {
        async fn health_check(&self) -> HealthCheckResult {
            healthy("in-memory-claim-store")
        }
    }

    #[async_trait]
    impl ClaimStore for InMemoryClaimStore {
        async fn insert_claim(&self, claim: &Claim) -> Result<(), PortError> {
            if let Some(delay) = *self.insert_delay.read().await {
                tokio::time::sleep(delay).await;
            }
            let refuse = self
                .failing_inserts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refuse {
                return Err(PortError::internal("insert refused"));
            }
            let mut claims = self.claims.write().await;
            if claims.contains_key(&claim.id) {
                return Err(PortError::Conflict {
                    message: format!("claim {} already exists", claim.id),
                });
            }
            claims.insert(claim.id, claim.clone());
            Ok(())
        }

        async fn get_claim(&self, id: ClaimId) -> Result<Claim, PortError> {
            self.claims
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Claim", id))
        }

        async fn find_claims(&self, query: ClaimQuery) -> Result<Vec<Claim>, PortError> {
            let claims = self.claims.read().await;
            let mut found: Vec<Claim> = claims.values().filter(|c| query.matches(c)).cloned().collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

            let offset = query.offset.unwrap_or(0) as usize;
            let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
            Ok(found.into_iter().skip(offset).take(limit).collect())
        }

        async fn save_claim(&self, claim: &Claim) -> Result<(), PortError> {
            let mut claims = self.claims.write().await;
            match claims.get_mut(&claim.id) {
                Some(existing) => {
                    *existing = claim.clone();
                    Ok(())
                }
                None => Err(PortError::not_found("Claim", claim.id)),
            }
        }

        async fn delete_claim(&self, id: ClaimId) -> Result<Vec<ClaimImage>, PortError> {
            self.claims
                .write()
                .await
                .remove(&id)
                .map(|c| c.images)
                .ok_or_else(|| PortError::not_found("Claim", id))
        }

        async fn stats(&self) -> Result<ClaimStats, PortError> {
            let claims = self.claims.read().await;
            let mut stats = ClaimStats::default();
            for claim in claims.values() {
                stats.total_claims += 1;
                match claim.status {
                    ClaimStatus::Pending => stats.pending += 1,
                    ClaimStatus::Approved => stats.approved += 1,
                    ClaimStatus::Rejected => stats.rejected += 1,
                    ClaimStatus::Review => stats.review += 1,
                    ClaimStatus::Verified => stats.verified += 1,
                }
                if claim.fraud_score > HIGH_RISK_FRAUD_SCORE {
                    stats.high_risk_claims += 1;
                }
                stats.total_cost_estimate += claim.cost_estimate.amount();
            }
            Ok(stats)
        }
    }

    /// In-memory blob store with switchable failures
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryBlobStore {
        blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
        fail_deletes: Arc<AtomicBool>,
        /// Number of successful puts allowed before puts start failing
        put_budget: Arc<RwLock<Option<usize>>>,
        puts: Arc<AtomicUsize>,
    }

    impl InMemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every delete fail
        pub fn fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }

        /// Makes puts fail after `n` successful ones
        pub async fn fail_puts_after(&self, n: usize) {
            *self.put_budget.write().await = Some(n);
        }

        pub async fn contains(&self, path: &str) -> bool {
            self.blobs.read().await.contains_key(path)
        }

        pub async fn len(&self) -> usize {
            self.blobs.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.blobs.read().await.is_empty()
        }
    }

    impl DomainPort for InMemoryBlobStore {}

    #[async_trait]
    impl ImageBlobStore for InMemoryBlobStore {
        async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), PortError> {
            if let Some(budget) = *self.put_budget.read().await {
                if self.puts.load(Ordering::SeqCst) >= budget {
                    return Err(PortError::internal("blob store full"));
                }
            }
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.blobs.write().await.insert(path.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn get(&self, path: &str) -> Result<Vec<u8>, PortError> {
            self.blobs
                .read()
                .await
                .get(path)
                .cloned()
                .ok_or_else(|| PortError::not_found("Blob", path))
        }

        async fn delete(&self, path: &str) -> Result<(), PortError> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(PortError::internal("delete refused"));
            }
            self.blobs.write().await.remove(path);
            Ok(())
        }
    }

    /// Oracle that returns fixed answers
    #[derive(Debug, Clone)]
    pub struct ScriptedOracle {
        image_score: f64,
        pair_similarity: f64,
        failing: Arc<AtomicBool>,
        slots: Arc<RwLock<Vec<Angle>>>,
        calls: Arc<AtomicUsize>,
        latency: Option<Duration>,
    }

    impl ScriptedOracle {
        /// Every image scores `image_score`, every pair `pair_similarity`
        pub fn new(image_score: f64, pair_similarity: f64) -> Self {
            Self {
                image_score,
                pair_similarity,
                failing: Arc::new(AtomicBool::new(false)),
                slots: Arc::new(RwLock::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
                latency: None,
            }
        }

        /// Makes every image score take `latency`
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// An oracle whose every call fails
        pub fn unavailable() -> Self {
            let oracle = Self::new(0.0, 0.0);
            oracle.failing.store(true, Ordering::SeqCst);
            oracle
        }

        /// Total number of calls received
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn enter(&self) -> Result<(), PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(PortError::ServiceUnavailable {
                    service: "scripted-oracle".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl DomainPort for ScriptedOracle {}

    #[async_trait]
    impl HealthCheckable for ScriptedOracle {
        async fn health_check(&self) -> HealthCheckResult {
            if self.failing.load(Ordering::SeqCst) {
                HealthCheckResult::unhealthy("scripted-oracle", 0, "Scripted failure")
            } else {
                healthy("scripted-oracle")
            }
        }
    }

    #[async_trait]
    impl SimilarityOracle for ScriptedOracle {
        async fn submit(&self, angle: Angle, _bytes: &[u8]) -> Result<(), PortError> {
            self.enter()?;
            let mut slots = self.slots.write().await;
            if !slots.contains(&angle) {
                slots.push(angle);
            }
            Ok(())
        }

        async fn compare(&self, threshold: f64) -> Result<OracleComparison, PortError> {
            self.enter()?;
            let slots = self.slots.read().await;
            let mut similarities = Vec::new();
            for i in 0..slots.len() {
                for j in i + 1..slots.len() {
                    similarities.push(PairSimilarity {
                        pair: format!("{} vs {}", slots[i], slots[j]),
                        similarity: self.pair_similarity,
                    });
                }
            }
            Ok(OracleComparison {
                same_car: similarities.iter().all(|p| p.similarity > threshold),
                average_similarity: self.pair_similarity,
                similarities,
            })
        }

        async fn clear(&self) -> Result<(), PortError> {
            self.enter()?;
            self.slots.write().await.clear();
            Ok(())
        }

        async fn score_image(
            &self,
            _angle: Angle,
            _bytes: &[u8],
            _threshold: f64,
        ) -> Result<f64, PortError> {
            self.enter()?;
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            Ok(self.image_score)
        }
    }
}
