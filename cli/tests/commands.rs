mod common;

use clap::Parser;
use cli::{run, Cli, CliError, Commands};
use ctx7_core::credentials::load_api_key_from;
use ctx7_core::{ContentType, CoreError};
use std::time::Duration;

fn output(buf: Vec<u8>) -> String {
    String::from_utf8(buf).expect("utf8 output")
}

#[test]
fn parses_port_argument_and_globals() {
    let cli = Cli::try_parse_from(["ctx7", "start-server", "9999", "--log-level", "debug"])
        .expect("parse");
    assert!(matches!(cli.command, Commands::StartServer { port: Some(9999) }));
    assert_eq!(cli.log_level, "debug");

    let cli = Cli::try_parse_from(["ctx7", "--config", "/tmp/x.toml", "stop-server"]).unwrap();
    assert!(matches!(cli.command, Commands::StopServer { port: None }));
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/x.toml")));
    assert_eq!(cli.log_level, "warn");
}

#[test]
fn rejects_bad_ports() {
    assert!(Cli::try_parse_from(["ctx7", "start-server", "0"]).is_err());
    assert!(Cli::try_parse_from(["ctx7", "status", "70000"]).is_err());
    assert!(Cli::try_parse_from(["ctx7", "stop-server", "abc"]).is_err());
}

#[test]
fn query_needs_exactly_one_library_flag() {
    assert!(Cli::try_parse_from(["ctx7", "query", "--topic", "hooks"]).is_err());
    assert!(Cli::try_parse_from([
        "ctx7",
        "query",
        "--library-id",
        "/reactjs/react.dev",
        "--library",
        "react"
    ])
    .is_err());

    let cli = Cli::try_parse_from(["ctx7", "query", "--library", "react"]).unwrap();
    let Commands::Query(args) = cli.command else {
        panic!("expected query");
    };
    assert_eq!(args.library.as_deref(), Some("react"));
    assert_eq!(args.content_type, ContentType::Examples);
    assert_eq!(args.port, None);
}

#[test]
fn query_content_type_is_checked() {
    let cli = Cli::try_parse_from([
        "ctx7",
        "query",
        "--library-id",
        "/vercel/next.js",
        "--content-type",
        "api-ref",
    ])
    .unwrap();
    let Commands::Query(args) = cli.command else {
        panic!("expected query");
    };
    assert_eq!(args.content_type, ContentType::ApiRef);

    assert!(Cli::try_parse_from([
        "ctx7",
        "query",
        "--library-id",
        "/vercel/next.js",
        "--content-type",
        "tutorials",
    ])
    .is_err());
}

#[tokio::test]
async fn invalid_library_id_fails_before_any_call() {
    let cli = Cli::try_parse_from(["ctx7", "query", "--library-id", "next.js"]).unwrap();
    let mut out = Vec::new();
    let err = run(&cli, &mut out).await.unwrap_err();
    assert!(matches!(err, CliError::InvalidArgument(_)));
    assert!(out.is_empty());
}

#[tokio::test]
async fn query_against_absent_helper_is_an_error() {
    let port = common::free_port().to_string();
    let cli = Cli::try_parse_from([
        "ctx7",
        "query",
        "--library-id",
        "/vercel/next.js",
        "--port",
        &port,
    ])
    .unwrap();
    let mut out = Vec::new();
    let err = common::run_with_timeout(Duration::from_secs(10), run(&cli, &mut out))
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::Core(CoreError::QueryError(_))));
}

#[test]
fn api_status_masks_the_key() {
    let key = load_api_key_from(Some("ctx7sk-0123456789abcdefwxyz"), None, None);
    let mut out = Vec::new();
    cli::render_api_status(key.as_ref(), &mut out).unwrap();
    let text = output(out);
    assert!(text.contains("ctx7sk-01234...wxyz"));
    assert!(text.contains("environment variable"));
    assert!(!text.contains("0123456789abcdef"));

    let mut out = Vec::new();
    cli::render_api_status(None, &mut out).unwrap();
    assert!(output(out).contains("No API key configured"));
}

#[test]
fn credential_failures_get_a_key_hint() {
    let limited = CoreError::RateLimited("query-docs: 429".to_string());
    let denied = CoreError::AuthFailed("query-docs: Unauthorized".to_string());

    let hint = cli::credential_hint(&limited, false).expect("hint");
    assert!(hint.contains("CONTEXT7_API_KEY"));
    assert_eq!(cli::credential_hint(&denied, false), Some(hint));

    assert!(cli::credential_hint(&limited, true).unwrap().contains("quota"));
    assert!(cli::credential_hint(&denied, true).unwrap().contains("invalid"));

    let plain = CoreError::QueryError("query-docs: not found".to_string());
    assert_eq!(cli::credential_hint(&plain, false), None);
}

#[tokio::test]
async fn missing_explicit_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let cli = Cli::try_parse_from([
        "ctx7",
        "--config",
        missing.to_str().unwrap(),
        "status",
    ])
    .unwrap();
    let mut out = Vec::new();
    assert!(matches!(
        run(&cli, &mut out).await,
        Err(CliError::ConfigError(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn start_status_stop_round() {
    let dir = tempfile::tempdir().unwrap();
    let port = common::free_port();
    let marker = format!("ctx7-cli-itest-{}", std::process::id());
    let config = common::write_sleeper_config(dir.path(), &marker, port);
    let config = config.to_str().unwrap();

    let exec = |args: &[&str]| {
        let mut argv = vec!["ctx7", "--config", config];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse")
    };

    common::run_with_timeout(Duration::from_secs(20), async {
        let mut out = Vec::new();
        run(&exec(&["start-server"]), &mut out).await.expect("start");
        let started = output(out);
        assert!(started.contains(&format!("started on port {port}")), "{started}");
        let record = dir.path().join("records").join(format!("context7-mcp-{port}.pid"));
        assert!(record.exists());

        let mut out = Vec::new();
        run(&exec(&["start-server"]), &mut out).await.expect("second start");
        assert!(output(out).contains("already running"));

        let mut out = Vec::new();
        run(&exec(&["status"]), &mut out).await.expect("status");
        assert!(output(out).contains(&format!("running on port {port}")));

        let mut out = Vec::new();
        run(&exec(&["stop-server"]), &mut out).await.expect("stop");
        assert!(output(out).contains("✓ Stopped"));
        assert!(!record.exists());

        let mut out = Vec::new();
        run(&exec(&["stop-server"]), &mut out).await.expect("second stop");
        assert!(output(out).contains("not running"));
    })
    .await;
}
