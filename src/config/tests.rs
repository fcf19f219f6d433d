use std::io::Write;

use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cache_defaults_enable_everything() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enable_output_cache);
    assert!(settings.cache.enable_etags);
    assert_eq!(settings.cache.watch_interval, Duration::from_millis(1000));
    assert_eq!(settings.cache.consume_batch_limit.get(), 100);
    assert_eq!(settings.assets.root, PathBuf::from("assets"));
}

#[test]
fn cache_can_be_disabled_via_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        cache_output: Some(false),
        cache_watch_interval_ms: Some(250),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(!settings.cache.enable_output_cache);
    assert_eq!(settings.cache.watch_interval, Duration::from_millis(250));
}

#[test]
fn zero_batch_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.consume_batch_limit = Some(0);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.consume_batch_limit",
            ..
        }
    ));
}

#[test]
fn zero_watch_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.watch_interval_ms = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["trellis"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_routes_command() {
    let args = CliArgs::parse_from(["trellis", "routes"]);
    assert!(matches!(args.command, Some(Command::Routes)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "trellis",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-etags",
        "false",
        "--assets-root",
        "/srv/assets",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache_etags, Some(false));
            assert_eq!(
                serve.overrides.assets_root.as_deref(),
                Some(std::path::Path::new("/srv/assets"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn config_file_is_layered_under_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[server]\nport = 8080\n\n[cache]\nenable_etags = false\nconsume_batch_limit = 7"
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "trellis",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "serve",
        "--server-port",
        "9090",
    ]);
    let settings = load(&args).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 9090);
    assert!(!settings.cache.enable_etags);
    assert_eq!(settings.cache.consume_batch_limit.get(), 7);
}
