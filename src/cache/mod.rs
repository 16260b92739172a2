//! Query cache.
//!
//! Key-addressed async result caching for the dashboard's REST reads:
//!
//! - **Dedup**: one fetch in flight per key, shared by every caller
//! - **Staleness**: fresh data is served directly, stale data is served while
//!   a background refetch runs
//! - **Observers**: RAII handles that poll and receive change notifications
//! - **Invalidation**: exact key or whole resource, never blocking
//! - **Garbage collection**: unobserved entries expire after `gc_time`
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! stale_time_ms = 0
//! gc_time_ms = 300000
//! retry = 3
//! # ... see config.rs for all options
//! ```

mod config;
mod keys;
pub mod metrics;
mod observer;
mod query;

pub use config::CacheConfig;
pub use keys::{KeyFilter, ParamValue, QueryKey, QueryParams, Resource};
pub use observer::{QueryObserver, QuerySnapshot};
pub use query::{QueryCache, QueryError, QueryOptions, QueryStatus};
