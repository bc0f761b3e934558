//! Relational release image store.
//!
//! One `release_images` table holds the configured corpus. Architecture
//! lists are stored as JSON text and matched with `json_each`.

use std::time::Duration;

use imageset_catalog::{ReleaseImage, SupportLevel};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info};

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A stored architecture list could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL.
    pub database_url: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Connection acquire timeout.
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        Self {
            database_url,
            max_connections,
            ..Default::default()
        }
    }
}

const RELEASE_IMAGE_COLUMNS: &str = "url, openshift_version, version, cpu_architecture, \
     cpu_architectures, support_level, is_default";

const ARCH_FILTER: &str = "(cpu_architecture = ? OR EXISTS (\
     SELECT 1 FROM json_each(release_images.cpu_architectures) WHERE json_each.value = ?))";

/// A `release_images` row.
#[derive(Debug, Clone)]
struct ReleaseImageRow {
    url: String,
    openshift_version: String,
    version: String,
    cpu_architecture: String,
    cpu_architectures: String,
    support_level: Option<String>,
    is_default: bool,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for ReleaseImageRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            url: row.try_get("url")?,
            openshift_version: row.try_get("openshift_version")?,
            version: row.try_get("version")?,
            cpu_architecture: row.try_get("cpu_architecture")?,
            cpu_architectures: row.try_get("cpu_architectures")?,
            support_level: row.try_get("support_level")?,
            is_default: row.try_get("is_default")?,
        })
    }
}

impl ReleaseImageRow {
    fn into_release_image(self) -> Result<ReleaseImage, DbError> {
        Ok(ReleaseImage {
            openshift_version: self.openshift_version,
            version: self.version,
            url: self.url,
            cpu_architecture: self.cpu_architecture,
            cpu_architectures: serde_json::from_str(&self.cpu_architectures)?,
            support_level: self.support_level.as_deref().and_then(SupportLevel::parse),
            default: self.is_default,
        })
    }
}

fn into_release_images(rows: Vec<ReleaseImageRow>) -> Result<Vec<ReleaseImage>, DbError> {
    rows.into_iter().map(ReleaseImageRow::into_release_image).collect()
}

/// Release image table access.
#[derive(Clone)]
pub struct ReleaseImageStore {
    pool: SqlitePool,
}

impl ReleaseImageStore {
    /// Open a pool and create the schema if needed.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(max_connections = config.max_connections, "Connecting to database");

        // Connections are never recycled so an in-memory database survives.
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        let store = Self { pool };
        store.init_schema().await?;

        info!("Database connection pool established");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS release_images (
                url TEXT PRIMARY KEY NOT NULL,
                openshift_version TEXT NOT NULL,
                version TEXT NOT NULL,
                cpu_architecture TEXT NOT NULL,
                cpu_architectures TEXT NOT NULL DEFAULT '[]',
                support_level TEXT,
                is_default INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    /// Replace the whole table with `images` in one transaction.
    pub async fn replace_all(&self, images: &[ReleaseImage]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let deleted = sqlx::query("DELETE FROM release_images")
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?
            .rows_affected();
        debug!(deleted, "Cleared release images table");

        for image in images {
            sqlx::query(&format!(
                "INSERT INTO release_images ({RELEASE_IMAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&image.url)
            .bind(&image.openshift_version)
            .bind(&image.version)
            .bind(&image.cpu_architecture)
            .bind(serde_json::to_string(&image.cpu_architectures)?)
            .bind(image.support_level.map(|level| level.as_str()))
            .bind(image.default)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;
        }

        tx.commit().await.map_err(DbError::Query)?;
        info!(count = images.len(), "Seeded release images");
        Ok(())
    }

    /// Records for `arch` whose `version` is `version` or `version-multi`.
    pub async fn find_by_version(
        &self,
        arch: &str,
        version: &str,
    ) -> Result<Vec<ReleaseImage>, DbError> {
        self.find_for_arch("version", arch, version).await
    }

    /// Records for `arch` whose `openshift_version` is `key` or `key-multi`.
    pub async fn find_by_openshift_version(
        &self,
        arch: &str,
        key: &str,
    ) -> Result<Vec<ReleaseImage>, DbError> {
        self.find_for_arch("openshift_version", arch, key).await
    }

    async fn find_for_arch(
        &self,
        column: &'static str,
        arch: &str,
        value: &str,
    ) -> Result<Vec<ReleaseImage>, DbError> {
        let rows = sqlx::query_as::<_, ReleaseImageRow>(&format!(
            "SELECT {RELEASE_IMAGE_COLUMNS} FROM release_images \
             WHERE {ARCH_FILTER} AND {column} IN (?, ?) ORDER BY url"
        ))
        .bind(arch)
        .bind(arch)
        .bind(value)
        .bind(format!("{value}{}", imageset_catalog::version::MULTI_SUFFIX))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        into_release_images(rows)
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<ReleaseImage>, DbError> {
        let row = sqlx::query_as::<_, ReleaseImageRow>(&format!(
            "SELECT {RELEASE_IMAGE_COLUMNS} FROM release_images WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        row.map(ReleaseImageRow::into_release_image).transpose()
    }

    pub async fn list(&self) -> Result<Vec<ReleaseImage>, DbError> {
        let rows = sqlx::query_as::<_, ReleaseImageRow>(&format!(
            "SELECT {RELEASE_IMAGE_COLUMNS} FROM release_images ORDER BY url"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        into_release_images(rows)
    }
}
