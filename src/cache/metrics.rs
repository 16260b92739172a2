//! Metric names emitted by the query cache.

pub const HIT_TOTAL: &str = "tds_admin_query_hit_total";
pub const STALE_HIT_TOTAL: &str = "tds_admin_query_stale_hit_total";
pub const MISS_TOTAL: &str = "tds_admin_query_miss_total";
pub const FETCH_TOTAL: &str = "tds_admin_query_fetch_total";
pub const FETCH_DEDUPED_TOTAL: &str = "tds_admin_query_fetch_deduped_total";
pub const FETCH_ERROR_TOTAL: &str = "tds_admin_query_fetch_error_total";
pub const INVALIDATION_TOTAL: &str = "tds_admin_query_invalidation_total";
pub const FETCH_MS: &str = "tds_admin_query_fetch_ms";
pub const ENTRIES: &str = "tds_admin_query_entries";
