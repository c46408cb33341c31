//! Claims repository implementation
//!
//! Database access for claims and the records they own: images, status
//! history and analysis snapshots. A claim and its children are always
//! written in one transaction.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate compiles
//! without a live database.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Claim status as stored in the `claim_status` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "claim_status", rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
    Review,
    Verified,
}

/// Row of the `claims` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimRow {
    pub claim_id: Uuid,
    pub owner_id: Uuid,
    pub policy_number: String,
    pub accident_date: NaiveDate,
    pub location: String,
    pub description: String,
    pub status: ClaimStatus,
    pub damage_score: f64,
    pub fraud_score: f64,
    pub cost_estimate: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of the `claim_images` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimImageRow {
    pub image_id: Uuid,
    pub claim_id: Uuid,
    pub storage_path: String,
    pub content_hash: String,
    pub angle: String,
    pub original_filename: String,
    pub byte_size: i64,
    pub ai_analysis: serde_json::Value,
    pub uploaded_at: DateTime<Utc>,
}

/// Row of the `claim_status_history` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusHistoryRow {
    pub history_id: Uuid,
    pub claim_id: Uuid,
    pub from_status: ClaimStatus,
    pub to_status: ClaimStatus,
    pub trigger: String,
    pub rule: Option<String>,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Row of the `claim_analysis_snapshots` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub claim_id: Uuid,
    pub revision: i32,
    pub trigger: String,
    pub snapshot: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// A claim row with everything it owns
#[derive(Debug, Clone)]
pub struct ClaimRecord {
    pub claim: ClaimRow,
    pub images: Vec<ClaimImageRow>,
    pub history: Vec<StatusHistoryRow>,
    pub snapshots: Vec<SnapshotRow>,
}

/// Aggregate counts over all claims
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimStatsRow {
    pub total_claims: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub review: i64,
    pub verified: i64,
    pub high_risk_claims: i64,
    pub total_cost_estimate: Decimal,
}

const CLAIM_COLUMNS: &str = r#"
    claim_id, owner_id, policy_number, accident_date, location, description,
    status, damage_score, fraud_score, cost_estimate, currency,
    created_at, updated_at
"#;

/// Repository for claims data
#[derive(Debug, Clone)]
pub struct ClaimsRepository {
    pool: PgPool,
}

impl ClaimsRepository {
    /// Creates a new ClaimsRepository with the given connection pool
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Retrieves a claim with its images, history and snapshots
    ///
    /// # Returns
    ///
    /// The claim record or NotFound error
    pub async fn get_by_id(&self, claim_id: Uuid) -> Result<ClaimRecord, DatabaseError> {
        let claim = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {} FROM claims WHERE claim_id = $1",
            CLAIM_COLUMNS
        ))
        .bind(claim_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Claim", claim_id))?;

        self.load_children(claim).await
    }

    /// Finds claims, newest first
    ///
    /// # Arguments
    ///
    /// * `owner_id` - Only claims of this owner
    /// * `status` - Only claims in this status
    /// * `limit` / `offset` - Pagination
    pub async fn find(
        &self,
        owner_id: Option<Uuid>,
        status: Option<ClaimStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ClaimRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            r#"
            SELECT {}
            FROM claims
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::claim_status IS NULL OR status = $2)
            ORDER BY created_at DESC, claim_id DESC
            LIMIT $3 OFFSET $4
            "#,
            CLAIM_COLUMNS
        ))
        .bind(owner_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.load_children(row).await?);
        }
        Ok(records)
    }

    async fn load_children(&self, claim: ClaimRow) -> Result<ClaimRecord, DatabaseError> {
        let images = sqlx::query_as::<_, ClaimImageRow>(
            r#"
            SELECT image_id, claim_id, storage_path, content_hash, angle,
                   original_filename, byte_size, ai_analysis, uploaded_at
            FROM claim_images
            WHERE claim_id = $1
            ORDER BY uploaded_at, image_id
            "#,
        )
        .bind(claim.claim_id)
        .fetch_all(&self.pool)
        .await?;

        let history = sqlx::query_as::<_, StatusHistoryRow>(
            r#"
            SELECT history_id, claim_id, from_status, to_status, trigger, rule,
                   actor_id, note, changed_at
            FROM claim_status_history
            WHERE claim_id = $1
            ORDER BY changed_at, history_id
            "#,
        )
        .bind(claim.claim_id)
        .fetch_all(&self.pool)
        .await?;

        let snapshots = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT claim_id, revision, trigger, snapshot, recorded_at
            FROM claim_analysis_snapshots
            WHERE claim_id = $1
            ORDER BY revision
            "#,
        )
        .bind(claim.claim_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ClaimRecord {
            claim,
            images,
            history,
            snapshots,
        })
    }

    /// Inserts a new claim with its children
    pub async fn insert(&self, record: &ClaimRecord) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let c = &record.claim;

        sqlx::query(&format!(
            r#"
            INSERT INTO claims ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
            CLAIM_COLUMNS
        ))
        .bind(c.claim_id)
        .bind(c.owner_id)
        .bind(&c.policy_number)
        .bind(c.accident_date)
        .bind(&c.location)
        .bind(&c.description)
        .bind(c.status)
        .bind(c.damage_score)
        .bind(c.fraud_score)
        .bind(c.cost_estimate)
        .bind(&c.currency)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&mut *tx)
        .await?;

        write_children(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Updates a claim and appends children not yet stored
    ///
    /// Image analyses are replaced; history and snapshots are insert-only.
    pub async fn update(&self, record: &ClaimRecord) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let c = &record.claim;

        let updated = sqlx::query(
            r#"
            UPDATE claims
            SET status = $2, damage_score = $3, fraud_score = $4,
                cost_estimate = $5, location = $6, description = $7,
                updated_at = $8
            WHERE claim_id = $1
            "#,
        )
        .bind(c.claim_id)
        .bind(c.status)
        .bind(c.damage_score)
        .bind(c.fraud_score)
        .bind(c.cost_estimate)
        .bind(&c.location)
        .bind(&c.description)
        .bind(c.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Claim", c.claim_id));
        }

        write_children(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Deletes a claim; images, history and snapshots cascade
    ///
    /// # Returns
    ///
    /// The image rows that were removed
    pub async fn delete(&self, claim_id: Uuid) -> Result<Vec<ClaimImageRow>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let images = sqlx::query_as::<_, ClaimImageRow>(
            r#"
            SELECT image_id, claim_id, storage_path, content_hash, angle,
                   original_filename, byte_size, ai_analysis, uploaded_at
            FROM claim_images
            WHERE claim_id = $1
            "#,
        )
        .bind(claim_id)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM claims WHERE claim_id = $1")
            .bind(claim_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Claim", claim_id));
        }

        tx.commit().await?;
        Ok(images)
    }

    /// Dashboard counts in a single pass
    ///
    /// # Arguments
    ///
    /// * `high_risk_threshold` - Fraud score above which a claim is high risk
    pub async fn stats(&self, high_risk_threshold: f64) -> Result<ClaimStatsRow, DatabaseError> {
        let row = sqlx::query_as::<_, ClaimStatsRow>(
            r#"
            SELECT
                COUNT(*) AS total_claims,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                COUNT(*) FILTER (WHERE status = 'review') AS review,
                COUNT(*) FILTER (WHERE status = 'verified') AS verified,
                COUNT(*) FILTER (WHERE fraud_score > $1) AS high_risk_claims,
                COALESCE(SUM(cost_estimate), 0) AS total_cost_estimate
            FROM claims
            "#,
        )
        .bind(high_risk_threshold)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}

async fn write_children(
    tx: &mut Transaction<'_, Postgres>,
    record: &ClaimRecord,
) -> Result<(), DatabaseError> {
    for image in &record.images {
        sqlx::query(
            r#"
            INSERT INTO claim_images (
                image_id, claim_id, storage_path, content_hash, angle,
                original_filename, byte_size, ai_analysis, uploaded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (image_id) DO UPDATE SET ai_analysis = EXCLUDED.ai_analysis
            "#,
        )
        .bind(image.image_id)
        .bind(image.claim_id)
        .bind(&image.storage_path)
        .bind(&image.content_hash)
        .bind(&image.angle)
        .bind(&image.original_filename)
        .bind(image.byte_size)
        .bind(&image.ai_analysis)
        .bind(image.uploaded_at)
        .execute(&mut **tx)
        .await?;
    }

    for entry in &record.history {
        sqlx::query(
            r#"
            INSERT INTO claim_status_history (
                history_id, claim_id, from_status, to_status, trigger, rule,
                actor_id, note, changed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (history_id) DO NOTHING
            "#,
        )
        .bind(entry.history_id)
        .bind(entry.claim_id)
        .bind(entry.from_status)
        .bind(entry.to_status)
        .bind(&entry.trigger)
        .bind(&entry.rule)
        .bind(entry.actor_id)
        .bind(&entry.note)
        .bind(entry.changed_at)
        .execute(&mut **tx)
        .await?;
    }

    for snapshot in &record.snapshots {
        sqlx::query(
            r#"
            INSERT INTO claim_analysis_snapshots (
                claim_id, revision, trigger, snapshot, recorded_at
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (claim_id, revision) DO NOTHING
            "#,
        )
        .bind(snapshot.claim_id)
        .bind(snapshot.revision)
        .bind(&snapshot.trigger)
        .bind(&snapshot.snapshot)
        .bind(snapshot.recorded_at)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
