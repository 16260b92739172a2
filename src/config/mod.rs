//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    AlertsArgs, AlertsCommand, BreakersArgs, BreakersCommand, CliArgs, Command, GlobalOverrides,
    HealingArgs, HealingCommand, SyncArgs, SyncCommand,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tds-admin";
const ENV_PREFIX: &str = "TDS_ADMIN";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
const DEFAULT_RECONNECT_MULTIPLIER: f64 = 2.0;
const DEFAULT_RECONNECT_JITTER_MS: u64 = 500;
const DEFAULT_STALE_TIME_MS: u64 = 0;
const DEFAULT_GC_TIME_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_GC_INTERVAL_MS: u64 = 60 * 1_000;
const DEFAULT_RETRY: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub socket: SocketSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub token: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SocketSettings {
    pub url: Url,
    pub reconnect: ReconnectSettings,
}

#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub stale_time: Duration,
    pub gc_time: Duration,
    pub gc_interval: Duration,
    pub retry: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    socket: RawSocketSettings,
    cache: RawCacheSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(token) = overrides.api_token.as_ref() {
            self.api.token = Some(token.clone());
        }
        if let Some(url) = overrides.socket_url.as_ref() {
            self.socket.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            socket,
            cache,
            logging,
        } = raw;

        Ok(Self {
            api: build_api_settings(api)?,
            socket: build_socket_settings(socket)?,
            cache: build_cache_settings(cache)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let base_url = required_url(api.base_url, "api.base_url", &["http", "https"])?;

    let token = api.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let timeout_secs = api
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "api.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ApiSettings {
        base_url,
        token,
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_socket_settings(socket: RawSocketSettings) -> Result<SocketSettings, LoadError> {
    let url = required_url(socket.url, "socket.url", &["ws", "wss"])?;

    let initial_ms = socket
        .reconnect_initial_ms
        .unwrap_or(DEFAULT_RECONNECT_INITIAL_MS);
    if initial_ms == 0 {
        return Err(LoadError::invalid(
            "socket.reconnect_initial_ms",
            "must be greater than zero",
        ));
    }

    let max_ms = socket.reconnect_max_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS);
    if max_ms < initial_ms {
        return Err(LoadError::invalid(
            "socket.reconnect_max_ms",
            "must be greater than or equal to socket.reconnect_initial_ms",
        ));
    }

    let multiplier = socket
        .reconnect_multiplier
        .unwrap_or(DEFAULT_RECONNECT_MULTIPLIER);
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(LoadError::invalid(
            "socket.reconnect_multiplier",
            "must be a finite number >= 1.0",
        ));
    }

    let jitter_ms = socket
        .reconnect_jitter_ms
        .unwrap_or(DEFAULT_RECONNECT_JITTER_MS);

    Ok(SocketSettings {
        url,
        reconnect: ReconnectSettings {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            multiplier,
            jitter: Duration::from_millis(jitter_ms),
        },
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let gc_interval_ms = cache.gc_interval_ms.unwrap_or(DEFAULT_GC_INTERVAL_MS);
    if gc_interval_ms == 0 {
        return Err(LoadError::invalid(
            "cache.gc_interval_ms",
            "must be greater than zero",
        ));
    }

    let retry_base_delay_ms = cache
        .retry_base_delay_ms
        .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS);
    let retry_max_delay_ms = cache
        .retry_max_delay_ms
        .unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS);
    if retry_max_delay_ms < retry_base_delay_ms {
        return Err(LoadError::invalid(
            "cache.retry_max_delay_ms",
            "must be greater than or equal to cache.retry_base_delay_ms",
        ));
    }

    Ok(CacheSettings {
        stale_time: Duration::from_millis(cache.stale_time_ms.unwrap_or(DEFAULT_STALE_TIME_MS)),
        gc_time: Duration::from_millis(cache.gc_time_ms.unwrap_or(DEFAULT_GC_TIME_MS)),
        gc_interval: Duration::from_millis(gc_interval_ms),
        retry: cache.retry.unwrap_or(DEFAULT_RETRY),
        retry_base_delay: Duration::from_millis(retry_base_delay_ms),
        retry_max_delay: Duration::from_millis(retry_max_delay_ms),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn required_url(
    value: Option<String>,
    key: &'static str,
    schemes: &[&str],
) -> Result<Url, LoadError> {
    let value = value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid(key, "value is required"))?;

    let url = Url::parse(&value)
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))?;

    if !schemes.contains(&url.scheme()) {
        return Err(LoadError::invalid(
            key,
            format!(
                "scheme `{}` is not supported (expected one of {})",
                url.scheme(),
                schemes.join(", ")
            ),
        ));
    }

    Ok(url)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    token: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSocketSettings {
    url: Option<String>,
    reconnect_initial_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
    reconnect_multiplier: Option<f64>,
    reconnect_jitter_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    stale_time_ms: Option<u64>,
    gc_time_ms: Option<u64>,
    gc_interval_ms: Option<u64>,
    retry: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[cfg(test)]
mod tests;
