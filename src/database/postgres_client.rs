use super::schema::CacheSchema;
use crate::cache::IndexSpec;
use crate::config::DatabaseConfig;
use crate::error::{SearchError, SearchResult};
use crate::types::{CacheEntry, NormalizedQuery};
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Object, Pool, Runtime};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

/// Upper bound on any single statement
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Postgres client wrapper with connection pooling
pub struct PostgresClient {
    /// Connection pool for Postgres
    pool: Pool,
    /// Configuration
    config: DatabaseConfig,
}

impl PostgresClient {
    /// Create a new Postgres client and make sure the cache tables exist
    pub async fn new(config: DatabaseConfig) -> SearchResult<Self> {
        info!("Initializing Postgres client with URL: {}", sanitize_url_for_logging(&config.url));

        let url = &config.url;
        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
            return Err(SearchError::StorageUnavailable("Invalid database URL format".to_string()));
        }

        let mut pg_config = Config::new();
        pg_config.url = Some(url.clone());
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections as usize));

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| SearchError::StorageUnavailable(format!("Failed to create connection pool: {}", e)))?;

        let client = PostgresClient { pool, config };

        let connect_timeout = Duration::from_secs(client.config.connection_timeout_secs);
        timeout(connect_timeout, client.initialize_schema())
            .await
            .map_err(|_| SearchError::StorageUnavailable(format!("Connection timed out after {:?}", connect_timeout)))?
            .map_err(|e| SearchError::StorageUnavailable(e.to_string()))?;

        info!("Postgres client connected successfully");
        Ok(client)
    }

    /// Create the cache tables if they do not exist
    pub async fn initialize_schema(&self) -> SearchResult<()> {
        let client = self.connection().await?;
        for sql in [CacheSchema::create_entries_table_sql(), CacheSchema::create_meta_table_sql()] {
            run(client.execute(sql, &[]), "create cache tables").await?;
        }
        debug!("Cache tables ready");
        Ok(())
    }

    pub async fn get_entry(&self, id: &str) -> SearchResult<Option<CacheEntry>> {
        let client = self.connection().await?;
        let rows = run(client.query(CacheSchema::select_entry_sql(), &[&id]), "get cache entry").await?;
        rows.first().map(row_to_entry).transpose()
    }

    pub async fn upsert_entry(&self, entry: &CacheEntry) -> SearchResult<()> {
        let client = self.connection().await?;
        let results = Value::Array(entry.results.clone());
        let metadata = serde_json::to_value(&entry.metadata)?;
        let ttl_ms = entry.ttl_ms as i64;
        let access_count = entry.access_count as i64;

        run(
            client.execute(
                CacheSchema::upsert_entry_sql(),
                &[
                    &entry.id,
                    &entry.query.as_str(),
                    &results,
                    &entry.timestamp,
                    &ttl_ms,
                    &entry.source.as_str(),
                    &entry.last_accessed,
                    &access_count,
                    &entry.priority.as_str(),
                    &metadata,
                ],
            ),
            "upsert cache entry",
        )
        .await?;
        Ok(())
    }

    pub async fn delete_entry(&self, id: &str) -> SearchResult<bool> {
        let client = self.connection().await?;
        let affected = run(client.execute(CacheSchema::delete_entry_sql(), &[&id]), "delete cache entry").await?;
        Ok(affected > 0)
    }

    pub async fn touch_entry(
        &self,
        id: &str,
        written_at: &DateTime<Utc>,
        accessed_at: &DateTime<Utc>,
    ) -> SearchResult<bool> {
        let client = self.connection().await?;
        let affected = run(
            client.execute(CacheSchema::touch_entry_sql(), &[&id, written_at, accessed_at]),
            "record cache access",
        )
        .await?;
        Ok(affected > 0)
    }

    pub async fn delete_unchanged_entry(&self, id: &str, written_at: &DateTime<Utc>) -> SearchResult<bool> {
        let client = self.connection().await?;
        let affected = run(
            client.execute(CacheSchema::delete_unchanged_entry_sql(), &[&id, written_at]),
            "delete cache entry",
        )
        .await?;
        Ok(affected > 0)
    }

    pub async fn all_entries(&self) -> SearchResult<Vec<CacheEntry>> {
        let client = self.connection().await?;
        let rows = run(client.query(CacheSchema::select_all_entries_sql(), &[]), "scan cache entries").await?;
        debug!("Loaded {} cache entries", rows.len());
        rows.iter().map(row_to_entry).collect()
    }

    pub async fn count_entries(&self) -> SearchResult<usize> {
        let client = self.connection().await?;
        let row = run(client.query_one(CacheSchema::count_entries_sql(), &[]), "count cache entries").await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as usize)
    }

    pub async fn clear_entries(&self) -> SearchResult<()> {
        let client = self.connection().await?;
        run(client.execute(CacheSchema::clear_entries_sql(), &[]), "clear cache entries").await?;
        Ok(())
    }

    pub async fn schema_version(&self) -> SearchResult<u32> {
        let client = self.connection().await?;
        let rows = run(client.query(CacheSchema::select_version_sql(), &[]), "read schema version").await?;
        Ok(rows
            .first()
            .map(|row| row.get::<_, i32>(0).max(0) as u32)
            .unwrap_or(0))
    }

    pub async fn set_schema_version(&self, version: u32) -> SearchResult<()> {
        let client = self.connection().await?;
        let version = version as i32;
        run(client.execute(CacheSchema::upsert_version_sql(), &[&version]), "write schema version").await?;
        Ok(())
    }

    pub async fn create_index(&self, spec: &IndexSpec) -> SearchResult<()> {
        let client = self.connection().await?;
        let sql = CacheSchema::create_index_sql(spec);
        run(client.execute(sql.as_str(), &[]), spec.name).await?;
        info!("Created index {}", spec.name);
        Ok(())
    }

    /// Bytes used by the cache table
    pub async fn table_size_bytes(&self) -> SearchResult<u64> {
        let client = self.connection().await?;
        let row = run(client.query_one(CacheSchema::table_size_sql(), &[]), "measure cache table").await?;
        let size: i64 = row.get(0);
        Ok(size.max(0) as u64)
    }

    /// Check database connection health
    pub async fn health_check(&self) -> SearchResult<()> {
        let client = self.connection().await?;
        run(client.query("SELECT 1", &[]), "health check").await?;
        Ok(())
    }

    async fn connection(&self) -> SearchResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| SearchError::StorageUnavailable(format!("Failed to get connection: {}", e)))
    }
}

/// Run a statement under `STATEMENT_TIMEOUT`
async fn run<T, F>(statement: F, what: &str) -> SearchResult<T>
where
    F: Future<Output = Result<T, tokio_postgres::Error>>,
{
    timeout(STATEMENT_TIMEOUT, statement)
        .await
        .map_err(|_| SearchError::DatabaseError(format!("Failed to {}: timeout exceeded", what)))?
        .map_err(|e| SearchError::DatabaseError(format!("Failed to {}: {}", what, e)))
}

fn row_to_entry(row: &Row) -> SearchResult<CacheEntry> {
    let query: String = row.get(1);
    let results = match row.get::<_, Value>(2) {
        Value::Array(records) => records,
        other => vec![other],
    };
    let metadata: HashMap<String, Value> = serde_json::from_value(row.get(9))?;
    let source: String = row.get(5);
    let priority: String = row.get(8);

    Ok(CacheEntry {
        id: row.get(0),
        query: NormalizedQuery::from_canonical(query),
        results,
        timestamp: row.get(3),
        ttl_ms: row.get::<_, i64>(4).max(0) as u64,
        source: source.parse()?,
        last_accessed: row.get(6),
        access_count: row.get::<_, i64>(7).max(0) as u64,
        priority: priority.parse()?,
        metadata,
    })
}

/// Sanitize URL for logging by masking credentials
pub(crate) fn sanitize_url_for_logging(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut sanitized = parsed.clone();
        if parsed.password().is_some() {
            let _ = sanitized.set_password(Some("***"));
        }
        if !parsed.username().is_empty() {
            let _ = sanitized.set_username("***");
        }
        sanitized.to_string()
    } else {
        // If URL parsing fails, just mask the entire thing after the protocol
        if let Some(pos) = url.find("://") {
            format!("{}://***", &url[..pos])
        } else {
            "***".to_string()
        }
    }
}
