//! Database Test Utilities
//!
//! Starts a disposable PostgreSQL container and applies the claims schema
//! through the same migrations the server runs.

use std::sync::Arc;
use std::time::Duration;

use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::OnceCell;

use core_kernel::ClaimId;
use infra_db::{DatabaseConfig, DatabasePool, PostgresClaimStore};

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "claims_test";

/// Child tables first; every table keyed by `claim_id` except `claims`
const CLAIM_TABLES: [&str; 4] = [
    "claim_analysis_snapshots",
    "claim_status_history",
    "claim_images",
    "claims",
];

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connection string for the test role on a mapped port
pub fn test_database_url(host: &str, port: u16) -> String {
    format!(
        "postgres://{}:{}@{}:{}/{}",
        POSTGRES_USER, POSTGRES_PASSWORD, host, port, POSTGRES_DB
    )
}

/// A PostgreSQL container with the claims schema applied
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    url: String,
    pool: DatabasePool,
}

impl TestDatabase {
    /// Starts a container and runs the migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or a migration fails
    pub async fn new() -> Result<Self, BoxError> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;
        let url = test_database_url(&host, port);

        let pool = infra_db::create_pool(
            DatabaseConfig::new(url.clone())
                .pool_size(1, 5)
                .acquire_timeout(Duration::from_secs(30)),
        )
        .await?;
        infra_db::run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            url,
            pool,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// A claim store over this container's pool
    pub fn store(&self) -> PostgresClaimStore {
        PostgresClaimStore::new(self.pool.clone())
    }

    /// Number of rows a claim owns in one of the child tables
    pub async fn child_rows(&self, table: &str, claim_id: ClaimId) -> Result<i64, BoxError> {
        if !CLAIM_TABLES[..3].contains(&table) {
            return Err(format!("{} is not a claim child table", table).into());
        }
        let count = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE claim_id = $1",
            table
        ))
        .bind(claim_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Empties the claim tables and keeps the schema
    pub async fn clear_data(&self) -> Result<(), BoxError> {
        for table in CLAIM_TABLES {
            sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// One container shared by every test in the process
///
/// # Panics
///
/// Panics if the database fails to start
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// A fresh container for tests that count rows across the whole schema
pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::new().await
}
