//! PostgreSQL Claim Store Adapter
//!
//! Implements the claims domain `ClaimStore` port on top of
//! [`ClaimsRepository`], translating between domain models and row types.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresClaimStore;
//! use domain_claims::ClaimStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn ClaimStore> = Arc::new(PostgresClaimStore::new(pool));
//! let claim = store.get_claim(claim_id).await?;
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    AuditEntryId, ClaimId, Currency, DomainPort, HealthCheckResult,
    HealthCheckable, ImageId, Money, PortError, UserId,
};
use domain_claims::claim::{Angle, Claim, ClaimImage, ClaimStatus, StatusAuditEntry};
use domain_claims::ports::{ClaimQuery, ClaimStats, ClaimStore, HIGH_RISK_FRAUD_SCORE};
use domain_claims::snapshot::AnalysisSnapshot;

use crate::error::DatabaseError;
use crate::repositories::claims::{
    ClaimImageRow, ClaimRecord, ClaimRow, ClaimStatus as DbClaimStatus, ClaimsRepository,
    SnapshotRow, StatusHistoryRow,
};

const ADAPTER_ID: &str = "postgres-claim-store";

/// Page size used when a query does not set a limit
const DEFAULT_PAGE_SIZE: i64 = 100;

/// PostgreSQL-backed implementation of the ClaimStore port
///
/// # Error Handling
///
/// Database errors are translated to `PortError` variants:
/// - `DatabaseError::NotFound` -> `PortError::NotFound`
/// - `DatabaseError::DuplicateEntry` -> `PortError::Conflict`
/// - Connection and pool errors -> transient `PortError`s
/// - Other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresClaimStore {
    repository: ClaimsRepository,
}

impl PostgresClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ClaimsRepository::new(pool),
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &ClaimsRepository {
        &self.repository
    }
}

impl DomainPort for PostgresClaimStore {}

#[async_trait]
impl HealthCheckable for PostgresClaimStore {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = crate::pool::ping(self.repository.pool()).await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => HealthCheckResult::healthy(ADAPTER_ID, latency_ms),
            Err(e) => HealthCheckResult::unhealthy(ADAPTER_ID, latency_ms, format!("Database error: {}", e)),
        }
    }
}

#[async_trait]
impl ClaimStore for PostgresClaimStore {
    #[instrument(skip(self, claim), fields(claim_id = %claim.id))]
    async fn insert_claim(&self, claim: &Claim) -> Result<(), PortError> {
        debug!("Inserting claim");
        let record = claim_to_record(claim)?;
        self.repository.insert(&record).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(claim_id = %id))]
    async fn get_claim(&self, id: ClaimId) -> Result<Claim, PortError> {
        let record = self.repository.get_by_id(*id.as_uuid()).await?;
        Ok(record_to_claim(record)?)
    }

    #[instrument(skip(self))]
    async fn find_claims(&self, query: ClaimQuery) -> Result<Vec<Claim>, PortError> {
        debug!(?query, "Finding claims");
        let records = self
            .repository
            .find(
                query.owner_id.map(|o| *o.as_uuid()),
                query.status.map(status_to_db),
                query.limit.map(i64::from).unwrap_or(DEFAULT_PAGE_SIZE),
                query.offset.map(i64::from).unwrap_or(0),
            )
            .await?;

        records
            .into_iter()
            .map(|r| record_to_claim(r).map_err(PortError::from))
            .collect()
    }

    #[instrument(skip(self, claim), fields(claim_id = %claim.id, status = %claim.status))]
    async fn save_claim(&self, claim: &Claim) -> Result<(), PortError> {
        let record = claim_to_record(claim)?;
        self.repository.update(&record).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(claim_id = %id))]
    async fn delete_claim(&self, id: ClaimId) -> Result<Vec<ClaimImage>, PortError> {
        let rows = self.repository.delete(*id.as_uuid()).await?;
        rows.into_iter()
            .map(|r| image_from_row(r).map_err(PortError::from))
            .collect()
    }

    async fn stats(&self) -> Result<ClaimStats, PortError> {
        let row = self.repository.stats(HIGH_RISK_FRAUD_SCORE).await?;
        Ok(ClaimStats {
            total_claims: row.total_claims as u64,
            pending: row.pending as u64,
            approved: row.approved as u64,
            rejected: row.rejected as u64,
            review: row.review as u64,
            verified: row.verified as u64,
            high_risk_claims: row.high_risk_claims as u64,
            total_cost_estimate: row.total_cost_estimate,
        })
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn status_to_db(status: ClaimStatus) -> DbClaimStatus {
    match status {
        ClaimStatus::Pending => DbClaimStatus::Pending,
        ClaimStatus::Approved => DbClaimStatus::Approved,
        ClaimStatus::Rejected => DbClaimStatus::Rejected,
        ClaimStatus::Review => DbClaimStatus::Review,
        ClaimStatus::Verified => DbClaimStatus::Verified,
    }
}

fn status_from_db(status: DbClaimStatus) -> ClaimStatus {
    match status {
        DbClaimStatus::Pending => ClaimStatus::Pending,
        DbClaimStatus::Approved => ClaimStatus::Approved,
        DbClaimStatus::Rejected => ClaimStatus::Rejected,
        DbClaimStatus::Review => ClaimStatus::Review,
        DbClaimStatus::Verified => ClaimStatus::Verified,
    }
}

/// Parses a unit enum stored under its serde name
fn enum_from_text<T: DeserializeOwned>(text: &str) -> Result<T, DatabaseError> {
    Ok(serde_json::from_value(serde_json::Value::String(text.to_string()))?)
}

fn claim_to_record(claim: &Claim) -> Result<ClaimRecord, DatabaseError> {
    let claim_id = *claim.id.as_uuid();

    let images = claim
        .images
        .iter()
        .map(|image| {
            Ok(ClaimImageRow {
                image_id: *image.id.as_uuid(),
                claim_id,
                storage_path: image.storage_path.clone(),
                content_hash: image.content_hash.clone(),
                angle: image.angle.as_str().to_string(),
                original_filename: image.original_filename.clone(),
                byte_size: i64::try_from(image.byte_size).map_err(|_| {
                    DatabaseError::serialization(format!("byte size {} out of range", image.byte_size))
                })?,
                ai_analysis: serde_json::to_value(&image.ai_analysis)?,
                uploaded_at: image.uploaded_at,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    let history = claim
        .audit_trail
        .iter()
        .map(|entry| {
            Ok(StatusHistoryRow {
                history_id: *entry.id.as_uuid(),
                claim_id,
                from_status: status_to_db(entry.from_status),
                to_status: status_to_db(entry.to_status),
                trigger: entry.trigger.as_str().to_string(),
                rule: entry.rule.map(|r| r.as_str().to_string()),
                actor_id: entry.actor.map(|a| *a.as_uuid()),
                note: entry.note.clone(),
                changed_at: entry.recorded_at,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    let snapshots = claim
        .analysis_history
        .iter()
        .map(|snapshot| {
            Ok(SnapshotRow {
                claim_id,
                revision: i32::try_from(snapshot.revision).map_err(|_| {
                    DatabaseError::serialization(format!("revision {} out of range", snapshot.revision))
                })?,
                trigger: snapshot.trigger.as_str().to_string(),
                snapshot: serde_json::to_value(snapshot)?,
                recorded_at: snapshot.recorded_at,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    Ok(ClaimRecord {
        claim: ClaimRow {
            claim_id,
            owner_id: *claim.owner_id.as_uuid(),
            policy_number: claim.policy_number.clone(),
            accident_date: claim.accident_date,
            location: claim.location.clone(),
            description: claim.description.clone(),
            status: status_to_db(claim.status),
            damage_score: claim.damage_score,
            fraud_score: claim.fraud_score,
            cost_estimate: claim.cost_estimate.amount(),
            currency: claim.cost_estimate.currency().code().to_string(),
            created_at: claim.created_at,
            updated_at: claim.updated_at,
        },
        images,
        history,
        snapshots,
    })
}

fn image_from_row(row: ClaimImageRow) -> Result<ClaimImage, DatabaseError> {
    Ok(ClaimImage {
        id: ImageId::from_uuid(row.image_id),
        claim_id: ClaimId::from_uuid(row.claim_id),
        angle: row
            .angle
            .parse::<Angle>()
            .map_err(|e| DatabaseError::serialization(e.to_string()))?,
        storage_path: row.storage_path,
        content_hash: row.content_hash.trim_end().to_string(),
        original_filename: row.original_filename,
        byte_size: u64::try_from(row.byte_size)
            .map_err(|_| DatabaseError::serialization(format!("negative byte size {}", row.byte_size)))?,
        ai_analysis: serde_json::from_value(row.ai_analysis)?,
        uploaded_at: row.uploaded_at,
    })
}

fn record_to_claim(record: ClaimRecord) -> Result<Claim, DatabaseError> {
    let row = record.claim;
    let currency: Currency = row
        .currency
        .trim()
        .parse()
        .map_err(|e: core_kernel::MoneyError| DatabaseError::serialization(e.to_string()))?;

    let images = record
        .images
        .into_iter()
        .map(image_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let audit_trail = record
        .history
        .into_iter()
        .map(|h| {
            Ok(StatusAuditEntry {
                id: AuditEntryId::from_uuid(h.history_id),
                claim_id: ClaimId::from_uuid(h.claim_id),
                from_status: status_from_db(h.from_status),
                to_status: status_from_db(h.to_status),
                trigger: enum_from_text(&h.trigger)?,
                rule: h.rule.as_deref().map(enum_from_text).transpose()?,
                actor: h.actor_id.map(UserId::from_uuid),
                note: h.note,
                recorded_at: h.changed_at,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    let analysis_history = record
        .snapshots
        .into_iter()
        .map(|s| serde_json::from_value::<AnalysisSnapshot>(s.snapshot).map_err(DatabaseError::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Claim {
        id: ClaimId::from_uuid(row.claim_id),
        owner_id: UserId::from_uuid(row.owner_id),
        policy_number: row.policy_number,
        accident_date: row.accident_date,
        location: row.location,
        description: row.description,
        status: status_from_db(row.status),
        damage_score: row.damage_score,
        cost_estimate: Money::new(row.cost_estimate, currency),
        fraud_score: row.fraud_score,
        images,
        analysis_history,
        audit_trail,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use domain_claims::claim::{Actor, NewClaim};
    use domain_claims::triage::{DecisionRule, TransitionTrigger};

    fn sample_claim() -> Claim {
        let owner = UserId::new();
        let mut claim = Claim::new(
            NewClaim {
                owner_id: owner,
                policy_number: "POL-7".to_string(),
                accident_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                location: "Dock Road".to_string(),
                description: "Reversed into bollard".to_string(),
            },
            Currency::EUR,
        )
        .unwrap();
        claim.record_status(
            ClaimStatus::Review,
            TransitionTrigger::Submission,
            Some(DecisionRule::InsufficientConfidence),
            None,
            None,
        );
        claim
            .override_status(ClaimStatus::Approved, &Actor::admin(UserId::new()), Some("ok".into()))
            .unwrap();
        claim
    }

    #[test]
    fn test_status_mapping_round_trips_every_variant() {
        for status in ClaimStatus::ALL {
            assert_eq!(status_from_db(status_to_db(status)), status);
        }
    }

    #[test]
    fn test_record_conversion_preserves_audit_trail() {
        let claim = sample_claim();
        let record = claim_to_record(&claim).unwrap();

        assert_eq!(record.claim.currency, "EUR");
        assert_eq!(record.history.len(), 2);
        assert_eq!(record.history[0].trigger, "submission");
        assert_eq!(record.history[0].rule.as_deref(), Some("insufficient_confidence"));

        let restored = record_to_claim(record).unwrap();
        assert_eq!(restored.audit_trail, claim.audit_trail);
        assert_eq!(restored.status, ClaimStatus::Approved);
        assert_eq!(restored.cost_estimate.currency(), Currency::EUR);
    }

    #[test]
    fn test_unknown_trigger_text_is_a_serialization_error() {
        let err = enum_from_text::<TransitionTrigger>("teleport").unwrap_err();
        assert!(matches!(err, DatabaseError::SerializationError(_)));
    }
}
