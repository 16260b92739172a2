//! Query key definitions.
//!
//! A [`QueryKey`] is a resource plus an optional parameter set. Parameters
//! live in a sorted map so equality and hashing are structural.

use std::collections::BTreeMap;
use std::fmt;

/// Server resources the dashboard reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    DashboardSummary,
    Health,
    SyncRuns,
    SyncRunDetail,
    CombinedStats,
    Alerts,
    DeadLetter,
    CircuitBreakers,
    AutoHealingStats,
    RecentWebhooks,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::DashboardSummary => "dashboard_summary",
            Resource::Health => "health",
            Resource::SyncRuns => "sync_runs",
            Resource::SyncRunDetail => "sync_run_detail",
            Resource::CombinedStats => "combined_stats",
            Resource::Alerts => "alerts",
            Resource::DeadLetter => "dead_letter",
            Resource::CircuitBreakers => "circuit_breakers",
            Resource::AutoHealingStats => "auto_healing_stats",
            Resource::RecentWebhooks => "recent_webhooks",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(value) => f.write_str(value),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Parameter component of a query key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryParams(BTreeMap<&'static str, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    /// Insert only when a value is present; absent filters do not take part in equality.
    pub fn with_opt<V: Into<ParamValue>>(self, name: &'static str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub resource: Resource,
    pub params: Option<QueryParams>,
}

impl QueryKey {
    /// Key for the whole collection, without a parameter set.
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            params: None,
        }
    }

    pub fn with_params(resource: Resource, params: QueryParams) -> Self {
        Self {
            resource,
            params: Some(params),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource.as_str())?;
        if let Some(params) = &self.params {
            f.write_str("{")?;
            for (index, (name, value)) in params.0.iter().enumerate() {
                if index > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{name}={value}")?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

/// Selects the entries an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    /// One key, compared structurally.
    Exact(QueryKey),
    /// Every key of a resource, whatever its parameters.
    Resource(Resource),
}

impl KeyFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyFilter::Exact(expected) => expected == key,
            KeyFilter::Resource(resource) => key.resource == *resource,
        }
    }
}

impl From<QueryKey> for KeyFilter {
    fn from(key: QueryKey) -> Self {
        KeyFilter::Exact(key)
    }
}

impl From<Resource> for KeyFilter {
    fn from(resource: Resource) -> Self {
        KeyFilter::Resource(resource)
    }
}

impl fmt::Display for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFilter::Exact(key) => write!(f, "{key}"),
            KeyFilter::Resource(resource) => write!(f, "{resource}*"),
        }
    }
}
