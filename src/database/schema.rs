/// Database schema definitions
///
/// SQL for the `cache_entries` table, the schema version table and the
/// secondary indexes the cache migrations ask for.

use crate::cache::{IndexField, IndexSpec};

/// Database schema manager
pub struct CacheSchema;

impl CacheSchema {
    /// Get the SQL for creating the cache entries table
    pub fn create_entries_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS cache_entries (
            id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            results JSONB NOT NULL,
            written_at TIMESTAMPTZ NOT NULL,
            ttl_ms BIGINT NOT NULL,
            source TEXT NOT NULL,
            last_accessed TIMESTAMPTZ NOT NULL,
            access_count BIGINT NOT NULL DEFAULT 0,
            priority TEXT NOT NULL DEFAULT 'medium',
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb
        )
        "
    }

    /// Get the SQL for creating the single-row schema version table
    pub fn create_meta_table_sql() -> &'static str {
        "
        CREATE TABLE IF NOT EXISTS cache_schema_meta (
            singleton BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
            version INTEGER NOT NULL
        )
        "
    }

    pub fn select_version_sql() -> &'static str {
        "SELECT version FROM cache_schema_meta WHERE singleton"
    }

    pub fn upsert_version_sql() -> &'static str {
        "
        INSERT INTO cache_schema_meta (singleton, version) VALUES (TRUE, $1)
        ON CONFLICT (singleton) DO UPDATE SET version = EXCLUDED.version
        "
    }

    pub fn select_entry_sql() -> &'static str {
        "
        SELECT id, query, results, written_at, ttl_ms, source, last_accessed, access_count, priority, metadata
        FROM cache_entries
        WHERE id = $1
        "
    }

    pub fn select_all_entries_sql() -> &'static str {
        "
        SELECT id, query, results, written_at, ttl_ms, source, last_accessed, access_count, priority, metadata
        FROM cache_entries
        "
    }

    /// Whole-row upsert; concurrent writers are last-write-wins
    pub fn upsert_entry_sql() -> &'static str {
        "
        INSERT INTO cache_entries
            (id, query, results, written_at, ttl_ms, source, last_accessed, access_count, priority, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            query = EXCLUDED.query,
            results = EXCLUDED.results,
            written_at = EXCLUDED.written_at,
            ttl_ms = EXCLUDED.ttl_ms,
            source = EXCLUDED.source,
            last_accessed = EXCLUDED.last_accessed,
            access_count = EXCLUDED.access_count,
            priority = EXCLUDED.priority,
            metadata = EXCLUDED.metadata
        "
    }

    pub fn delete_entry_sql() -> &'static str {
        "DELETE FROM cache_entries WHERE id = $1"
    }

    /// Access bookkeeping for a read; skipped if the row was rewritten or removed
    pub fn touch_entry_sql() -> &'static str {
        "
        UPDATE cache_entries
        SET last_accessed = GREATEST(last_accessed, $3), access_count = access_count + 1
        WHERE id = $1 AND written_at = $2
        "
    }

    pub fn delete_unchanged_entry_sql() -> &'static str {
        "DELETE FROM cache_entries WHERE id = $1 AND written_at = $2"
    }

    pub fn count_entries_sql() -> &'static str {
        "SELECT COUNT(*) FROM cache_entries"
    }

    pub fn clear_entries_sql() -> &'static str {
        "TRUNCATE cache_entries"
    }

    /// On-disk size of the table including indexes and TOAST
    pub fn table_size_sql() -> &'static str {
        "SELECT pg_total_relation_size('cache_entries')"
    }

    /// Get SQL for creating a secondary index
    pub fn create_index_sql(spec: &IndexSpec) -> String {
        let column = match spec.field {
            IndexField::Query => "query",
            IndexField::LastAccessed => "last_accessed",
            IndexField::AccessCount => "access_count",
        };
        let unique = if spec.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON cache_entries({})",
            unique, spec.name, column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_sql() {
        assert_eq!(
            CacheSchema::create_index_sql(&IndexSpec::LAST_ACCESSED),
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_last_accessed ON cache_entries(last_accessed)"
        );
        assert_eq!(
            CacheSchema::create_index_sql(&IndexSpec::QUERY_UNIQUE),
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_entries_query_unique ON cache_entries(query)"
        );
    }

    #[test]
    fn test_entry_columns_match() {
        let columns = "id, query, results, written_at, ttl_ms, source, last_accessed, access_count, priority, metadata";
        assert!(CacheSchema::select_entry_sql().contains(columns));
        assert!(CacheSchema::select_all_entries_sql().contains(columns));
        assert!(CacheSchema::upsert_entry_sql().contains(columns));
        assert!(CacheSchema::upsert_entry_sql().contains("$10"));
    }

    #[test]
    fn test_conditional_statements_match_write_time() {
        assert!(CacheSchema::touch_entry_sql().contains("WHERE id = $1 AND written_at = $2"));
        assert!(!CacheSchema::touch_entry_sql().contains("results"));
        assert!(CacheSchema::delete_unchanged_entry_sql().ends_with("written_at = $2"));
    }

    #[test]
    fn test_tables_are_created_idempotently() {
        assert!(CacheSchema::create_entries_table_sql().contains("IF NOT EXISTS"));
        assert!(CacheSchema::create_meta_table_sql().contains("IF NOT EXISTS"));
    }
}
