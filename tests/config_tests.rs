#![allow(clippy::unwrap_used, clippy::expect_used)]

use http::Method;
use std::io::Write;
use triemux::{App, AppConfig, MemorySink, Request};

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "debug = true").unwrap();
    writeln!(file, "strict_paths = true").unwrap();
    writeln!(file, "pool_max_idle = 8").unwrap();
    writeln!(file, "pool_prewarm = 3").unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(
        config,
        AppConfig {
            debug: true,
            strict_paths: true,
            pool_max_idle: 8,
            pool_prewarm: 3,
        }
    );
}

#[test]
fn test_missing_and_invalid_files_report_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let err = AppConfig::from_file(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"));

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "pool_max_idle = -1\n").unwrap();
    let err = AppConfig::from_file(&bad).unwrap_err();
    assert!(format!("{err:#}").contains("bad.toml"));
}

#[test]
fn test_config_shapes_the_app() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "strict_paths = true\npool_max_idle = 2\npool_prewarm = 2\n").unwrap();
    let config = AppConfig::from_file(file.path()).unwrap();

    let mut app = App::new(config);
    app.router_mut()
        .get("/Users", |ctx| {
            ctx.response_mut().plain(200, "users");
            Ok(())
        })
        .unwrap();
    let app = app.into_shared();
    assert_eq!(app.pool().stats().created, 2);

    let sink = MemorySink::new();
    app.handle(Request::new(Method::GET, "/Users"), sink.boxed());
    app.handle(Request::new(Method::GET, "/users"), sink.boxed());
    let statuses: Vec<u16> = sink.responses().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![200, 404]);
    assert_eq!(app.pool().stats().reused, 2);
}

#[test]
fn test_case_folding_by_default() {
    let mut app = App::new(AppConfig::default());
    app.router_mut()
        .get("/Users", |ctx| {
            ctx.response_mut().plain(200, "users");
            Ok(())
        })
        .unwrap();
    let app = app.into_shared();

    let sink = MemorySink::new();
    app.handle(Request::new(Method::GET, "/uSeRs"), sink.boxed());
    assert_eq!(sink.last().unwrap().status, 200);
}
