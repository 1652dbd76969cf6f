pub mod autocorrect;
pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod query;
pub mod search;
pub mod types;

pub use error::{SearchError, SearchResult};
pub use types::*;
pub use config::Config;
pub use autocorrect::AutocorrectEngine;
pub use cache::{CacheManager, CacheHit, CacheStatistics, CacheStore, HitKind, MemoryStore, PutOptions};
pub use database::PostgresStore;
pub use search::{
    CitySearchService, CorrectedSearch, SearchOrigin, SearchOutcome,
    LookupCoordinator, LookupOutcome, LookupProvider,
    RetryExecutor, RetryConfig, RetryStrategy,
    GazetteerLookup, load_candidates,
};
