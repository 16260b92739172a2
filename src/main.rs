use std::process;

use serde::Serialize;
use tds_admin::{
    application::{context::AppContext, error::AppError, hooks::DataHook},
    cache::QuerySnapshot,
    config::{self, AlertsCommand, BreakersCommand, Command, HealingCommand, SyncCommand},
    infra::telemetry,
};
use tds_api_types::{AlertsQuery, DeadLetterQuery, SyncRunsQuery, WebhooksQuery};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.chain(), source = report.source, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.chain(), source = report.source, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command.unwrap_or(Command::Watch);

    telemetry::init(&settings.logging)?;

    let context = AppContext::new(&settings)?;
    let result = match command {
        Command::Watch => run_watch(&context).await,
        Command::Alerts(args) => match args.command {
            AlertsCommand::Acknowledge { id } => {
                print_json(&context.mutations().acknowledge_alert(id).await?)
            }
        },
        Command::Breakers(args) => match args.command {
            BreakersCommand::Reset { name } => {
                print_json(&context.mutations().reset_circuit_breaker(&name).await?)
            }
        },
        Command::Healing(args) => match args.command {
            HealingCommand::Trigger => print_json(&context.mutations().trigger_healing().await?),
        },
        Command::Sync(args) => match args.command {
            SyncCommand::Trigger { source } => {
                print_json(&context.mutations().trigger_sync(source).await?)
            }
        },
    };

    context.shutdown();
    result
}

async fn run_watch(context: &AppContext) -> Result<(), AppError> {
    context.start();

    let hooks = context.hooks();
    let watchers = vec![
        spawn_watcher(hooks.dashboard_summary()),
        spawn_watcher(hooks.health()),
        spawn_watcher(hooks.sync_runs(SyncRunsQuery::default())),
        spawn_watcher(hooks.combined_stats()),
        spawn_watcher(hooks.alerts(AlertsQuery {
            is_active: Some(true),
            ..AlertsQuery::default()
        })),
        spawn_watcher(hooks.dead_letter(DeadLetterQuery::default())),
        spawn_watcher(hooks.circuit_breakers()),
        spawn_watcher(hooks.auto_healing_stats()),
        spawn_watcher(hooks.recent_webhooks(WebhooksQuery::default())),
    ];
    info!(hooks = watchers.len(), "Dashboard hooks mounted");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::unexpected(format!("failed to listen for Ctrl-C: {err}")))?;
    info!("Interrupt received, unmounting hooks");

    for watcher in watchers {
        watcher.abort();
    }
    Ok(())
}

fn spawn_watcher<T>(mut hook: DataHook<T>) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    tokio::spawn(async move {
        while let Some(snapshot) = hook.changed().await {
            log_snapshot(&hook, &snapshot);
        }
    })
}

fn log_snapshot<T>(hook: &DataHook<T>, snapshot: &QuerySnapshot<T>)
where
    T: Send + Sync + 'static,
{
    match snapshot.error.as_ref() {
        Some(err) => warn!(
            key = %hook.key(),
            status = snapshot.status.as_str(),
            has_data = snapshot.data.is_some(),
            error = %err,
            "Query refresh failed"
        ),
        None => info!(
            key = %hook.key(),
            status = snapshot.status.as_str(),
            stale = snapshot.is_stale,
            fetch_count = snapshot.fetch_count,
            "Query updated"
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
