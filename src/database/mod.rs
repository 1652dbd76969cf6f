/// Database module
///
/// This module implements the relational cache store: Postgres connection
/// pooling, the `cache_entries` table and the schema version bookkeeping
/// the cache migrations rely on.

mod postgres_client;
mod schema;

#[cfg(test)]
mod tests;

use crate::cache::{CacheStore, IndexSpec, StorageEstimate};
use crate::config::DatabaseConfig;
use crate::error::SearchResult;
use crate::types::CacheEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres_client::PostgresClient;
use std::sync::Arc;
use tracing::info;

pub use schema::CacheSchema;

/// Cache store backed by a Postgres table
pub struct PostgresStore {
    /// Postgres client for all database operations
    postgres_client: Arc<PostgresClient>,
    /// Byte budget reported to the quota check
    quota_bytes: Option<u64>,
}

impl PostgresStore {
    /// Connect, create the cache tables and verify the connection.
    /// Fails with `StorageUnavailable` when the database cannot be reached.
    pub async fn connect(database_config: DatabaseConfig, quota_bytes: Option<u64>) -> SearchResult<Self> {
        info!("Initializing Postgres cache store");

        let postgres_client = PostgresClient::new(database_config).await?;

        // Perform health check
        postgres_client.health_check().await?;

        info!("Postgres cache store initialized successfully");

        Ok(PostgresStore {
            postgres_client: Arc::new(postgres_client),
            quota_bytes,
        })
    }
}

#[async_trait]
impl CacheStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, id: &str) -> SearchResult<Option<CacheEntry>> {
        self.postgres_client.get_entry(id).await
    }

    async fn put(&self, entry: &CacheEntry) -> SearchResult<()> {
        self.postgres_client.upsert_entry(entry).await
    }

    async fn delete(&self, id: &str) -> SearchResult<bool> {
        self.postgres_client.delete_entry(id).await
    }

    async fn touch(&self, id: &str, written_at: DateTime<Utc>, accessed_at: DateTime<Utc>) -> SearchResult<bool> {
        self.postgres_client.touch_entry(id, &written_at, &accessed_at).await
    }

    async fn delete_if_unchanged(&self, id: &str, written_at: DateTime<Utc>) -> SearchResult<bool> {
        self.postgres_client.delete_unchanged_entry(id, &written_at).await
    }

    async fn iterate(&self) -> SearchResult<Vec<CacheEntry>> {
        self.postgres_client.all_entries().await
    }

    async fn count(&self) -> SearchResult<usize> {
        self.postgres_client.count_entries().await
    }

    async fn clear(&self) -> SearchResult<()> {
        self.postgres_client.clear_entries().await
    }

    async fn schema_version(&self) -> SearchResult<u32> {
        self.postgres_client.schema_version().await
    }

    async fn set_schema_version(&self, version: u32) -> SearchResult<()> {
        self.postgres_client.set_schema_version(version).await
    }

    async fn create_index(&self, spec: &IndexSpec) -> SearchResult<()> {
        self.postgres_client.create_index(spec).await
    }

    async fn storage_estimate(&self) -> SearchResult<Option<StorageEstimate>> {
        let Some(quota_bytes) = self.quota_bytes else {
            return Ok(None);
        };
        let used_bytes = self.postgres_client.table_size_bytes().await?;
        Ok(Some(StorageEstimate { used_bytes, quota_bytes }))
    }

    async fn health_check(&self) -> SearchResult<()> {
        self.postgres_client.health_check().await
    }
}
