use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the tds-admin binary.
#[derive(Debug, Parser)]
#[command(name = "tds-admin", version, about = "TDS sync/queue admin dashboard client")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TDS_ADMIN_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the REST API base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the bearer token sent to the REST API and the socket endpoint.
    #[arg(long = "api-token", value_name = "TOKEN", global = true)]
    pub api_token: Option<String>,

    /// Override the server-push socket URL.
    #[arg(long = "socket-url", value_name = "URL", global = true)]
    pub socket_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Keep every dashboard resource fresh and log each refresh until interrupted.
    Watch,
    /// Alert actions.
    Alerts(AlertsArgs),
    /// Circuit breaker actions.
    Breakers(BreakersArgs),
    /// Auto-healing actions.
    Healing(HealingArgs),
    /// Sync actions.
    Sync(SyncArgs),
}

#[derive(Debug, Args, Clone)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum AlertsCommand {
    /// Acknowledge an alert by id.
    Acknowledge {
        #[arg(value_name = "ID")]
        id: i64,
    },
}

#[derive(Debug, Args, Clone)]
pub struct BreakersArgs {
    #[command(subcommand)]
    pub command: BreakersCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum BreakersCommand {
    /// Reset a circuit breaker by name.
    Reset {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct HealingArgs {
    #[command(subcommand)]
    pub command: HealingCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum HealingCommand {
    /// Start an auto-healing pass now.
    Trigger,
}

#[derive(Debug, Args, Clone)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: SyncCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum SyncCommand {
    /// Start a sync run now.
    Trigger {
        /// Restrict the run to one source system.
        #[arg(long, value_name = "NAME")]
        source: Option<String>,
    },
}
