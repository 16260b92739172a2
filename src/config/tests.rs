use std::io::Write;

use super::*;

fn minimal_raw() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.api.base_url = Some("https://tds.example.com".to_string());
    raw.socket.url = Some("wss://tds.example.com/socket".to_string());
    raw
}

#[test]
fn defaults_apply_when_only_urls_are_set() {
    let settings = Settings::from_raw(minimal_raw()).expect("valid settings");

    assert_eq!(settings.api.request_timeout, Duration::from_secs(30));
    assert!(settings.api.token.is_none());
    assert_eq!(settings.socket.reconnect.initial, Duration::from_secs(1));
    assert_eq!(settings.socket.reconnect.max, Duration::from_secs(30));
    assert_eq!(settings.socket.reconnect.multiplier, 2.0);
    assert_eq!(settings.socket.reconnect.jitter, Duration::from_millis(500));
    assert_eq!(settings.cache.stale_time, Duration::ZERO);
    assert_eq!(settings.cache.gc_time, Duration::from_secs(300));
    assert_eq!(settings.cache.gc_interval, Duration::from_secs(60));
    assert_eq!(settings.cache.retry, 3);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = minimal_raw();
    raw.logging.level = Some("info".to_string());

    let overrides = GlobalOverrides {
        api_base_url: Some("http://localhost:8080".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.api.base_url.as_str(), "http://localhost:8080/");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = minimal_raw();
    let overrides = GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_token_is_treated_as_absent() {
    let mut raw = minimal_raw();
    raw.api.token = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.api.token.is_none());
}

#[test]
fn missing_base_url_is_rejected() {
    let mut raw = minimal_raw();
    raw.api.base_url = None;

    let err = Settings::from_raw(raw).expect_err("missing base url");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "api.base_url",
            ..
        }
    ));
}

#[test]
fn socket_url_requires_websocket_scheme() {
    let mut raw = minimal_raw();
    raw.socket.url = Some("https://tds.example.com/socket".to_string());

    let err = Settings::from_raw(raw).expect_err("wrong scheme");
    match err {
        LoadError::Invalid { key, reason } => {
            assert_eq!(key, "socket.url");
            assert!(reason.contains("https"), "unexpected reason: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn reconnect_max_must_not_undercut_initial() {
    let mut raw = minimal_raw();
    raw.socket.reconnect_initial_ms = Some(5_000);
    raw.socket.reconnect_max_ms = Some(1_000);

    let err = Settings::from_raw(raw).expect_err("max below initial");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "socket.reconnect_max_ms",
            ..
        }
    ));
}

#[test]
fn reconnect_multiplier_below_one_is_rejected() {
    let mut raw = minimal_raw();
    raw.socket.reconnect_multiplier = Some(0.5);

    let err = Settings::from_raw(raw).expect_err("multiplier below one");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "socket.reconnect_multiplier",
            ..
        }
    ));
}

#[test]
fn zero_gc_interval_is_rejected() {
    let mut raw = minimal_raw();
    raw.cache.gc_interval_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero gc interval");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.gc_interval_ms",
            ..
        }
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = minimal_raw();
    raw.logging.level = Some("chatty".to_string());

    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn config_file_is_layered_under_cli_flags() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        r#"
[api]
base_url = "https://from-file.example.com"
request_timeout_seconds = 5

[socket]
url = "wss://from-file.example.com/ws"
reconnect_max_ms = 10000

[cache]
retry = 1
"#
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from([
        "tds-admin",
        "--config-file",
        path.as_str(),
        "--socket-url",
        "ws://127.0.0.1:9000/ws",
    ]);

    let settings = load(&args).expect("settings load");

    assert_eq!(
        settings.api.base_url.as_str(),
        "https://from-file.example.com/"
    );
    assert_eq!(settings.api.request_timeout, Duration::from_secs(5));
    assert_eq!(settings.socket.url.as_str(), "ws://127.0.0.1:9000/ws");
    assert_eq!(settings.socket.reconnect.max, Duration::from_secs(10));
    assert_eq!(settings.cache.retry, 1);
}

#[test]
fn default_to_watch_command() {
    let args = CliArgs::parse_from(["tds-admin"]);
    let command = args.command.unwrap_or(Command::Watch);
    assert!(matches!(command, Command::Watch));
}

#[test]
fn parse_acknowledge_alert_arguments() {
    let args = CliArgs::parse_from(["tds-admin", "alerts", "acknowledge", "42"]);

    match args.command.expect("alerts command") {
        Command::Alerts(AlertsArgs {
            command: AlertsCommand::Acknowledge { id },
        }) => assert_eq!(id, 42),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_sync_trigger_with_source() {
    let args = CliArgs::parse_from([
        "tds-admin",
        "sync",
        "trigger",
        "--source",
        "erp",
        "--log-level",
        "warn",
    ]);

    assert_eq!(args.overrides.log_level.as_deref(), Some("warn"));
    match args.command.expect("sync command") {
        Command::Sync(SyncArgs {
            command: SyncCommand::Trigger { source },
        }) => assert_eq!(source.as_deref(), Some("erp")),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_breaker_reset_arguments() {
    let args = CliArgs::parse_from(["tds-admin", "breakers", "reset", "erp-api"]);

    match args.command.expect("breakers command") {
        Command::Breakers(BreakersArgs {
            command: BreakersCommand::Reset { name },
        }) => assert_eq!(name, "erp-api"),
        other => panic!("unexpected command: {other:?}"),
    }
}
