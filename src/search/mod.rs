/// Search module
///
/// This module contains:
/// - The lookup collaborator boundary and its coordinator (debounce,
///   supersession, timeout)
/// - Retry with exponential backoff
/// - Gazetteer loading
/// - The city search service orchestrating cache, lookup and autocorrect

pub mod coordinator;
pub mod gazetteer;
pub mod retry;
pub mod service;


pub use coordinator::{LookupCoordinator, LookupOutcome, LookupProvider};
pub use gazetteer::{load_candidates, GazetteerLookup};
pub use retry::{RetryConfig, RetryExecutor, RetryStrategy};
pub use service::{CitySearchService, CorrectedSearch, SearchOrigin, SearchOutcome};
