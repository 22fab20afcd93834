// src/lib.rs
// Library surface shared by the binary and integration tests.

pub mod config;
pub mod fetch;
pub mod filter;
pub mod group;
pub mod ingest;
pub mod merge;
pub mod report;

// ---- Re-exports for the common pipeline entry points ----
pub use crate::fetch::{FetchError, Fetcher, FetcherConfig};
pub use crate::filter::{classify, classify_all, FilterConfig, InclusionDecision, Reason};
pub use crate::group::{group_events, Bucket, Forecast, ForecastLookup, Grouping};
pub use crate::ingest::types::{Event, EventKind, ParseError, SourceProvider};
pub use crate::ingest::{IngestResults, Orchestrator};
pub use crate::merge::merge;
