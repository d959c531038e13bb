#![allow(clippy::unwrap_used, clippy::expect_used)]

use http::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use triemux::error;
use triemux::ids::{RequestId, REQUEST_ID_HEADER};
use triemux::{App, AppConfig, Context, MemorySink, Middleware, Request, SentResponse};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn step(log: &Log, name: &'static str) -> Middleware {
    let log = Arc::clone(log);
    Middleware::named(name, move |ctx| {
        log.lock().unwrap().push(name.to_string());
        ctx.next();
    })
}

fn run(app: &Arc<App>, request: Request) -> Option<SentResponse> {
    let sink = MemorySink::new();
    app.handle(request, sink.boxed());
    assert!(sink.len() <= 1, "a request must flush at most once");
    sink.last()
}

fn get(app: &Arc<App>, path: &str) -> Option<SentResponse> {
    run(app, Request::new(Method::GET, path))
}

/// App with global g1, g2, group middleware `grp`, route middleware m1, m2 and a
/// handler that records `handler` on `/api/items/:id`.
fn ordered_app(log: &Log) -> Arc<App> {
    let mut app = App::default();
    app.use_middleware(step(log, "g1"));
    app.use_middleware(step(log, "g2"));

    let handler_log = Arc::clone(log);
    app.router_mut()
        .group("/api", |r| {
            r.get("/items/:id", move |ctx: &mut Context| {
                handler_log.lock().unwrap().push("handler".to_string());
                let id = ctx.param("id").unwrap_or_default().to_string();
                ctx.response_mut().plain(200, &id);
                Ok(())
            })?
            .use_middleware(step(log, "m1"))
            .use_middleware(step(log, "m2"));
            Ok(())
        })
        .unwrap()
        .use_middleware(step(log, "grp"));
    app.into_shared()
}

#[test]
fn test_phases_run_in_order_exactly_once() {
    let log = new_log();
    let app = ordered_app(&log);

    let sent = get(&app, "/api/items/100").unwrap();
    assert_eq!(sent.status, 200);
    assert_eq!(sent.body_str(), "100");
    assert_eq!(entries(&log), vec!["g1", "g2", "grp", "m1", "m2", "handler"]);
}

#[test]
fn test_extra_next_calls_are_no_ops() {
    let log = new_log();
    let mut app = App::default();
    let greedy_log = Arc::clone(&log);
    app.use_middleware(Middleware::named("greedy", move |ctx| {
        greedy_log.lock().unwrap().push("greedy".to_string());
        ctx.next();
        ctx.next();
        ctx.next();
    }));
    let handler_log = Arc::clone(&log);
    app.router_mut()
        .get("/", move |_ctx| {
            handler_log.lock().unwrap().push("handler".to_string());
            Ok(())
        })
        .unwrap()
        .use_middleware(step(&log, "route"));
    let app = app.into_shared();

    get(&app, "/");
    assert_eq!(entries(&log), vec!["greedy", "route", "handler"]);
}

#[test]
fn test_abort_in_global_phase_still_runs_route_chain() {
    let log = new_log();
    let mut app = App::default();
    let abort_log = Arc::clone(&log);
    app.use_middleware(Middleware::named("aborter", move |ctx| {
        abort_log.lock().unwrap().push("aborter".to_string());
        ctx.abort();
    }));
    app.use_middleware(step(&log, "skipped_global"));

    let handler_log = Arc::clone(&log);
    app.router_mut()
        .get("/x", move |ctx| {
            handler_log.lock().unwrap().push("handler".to_string());
            ctx.response_mut().plain(200, "done");
            Ok(())
        })
        .unwrap()
        .use_middleware(step(&log, "route"));
    let app = app.into_shared();

    let sent = get(&app, "/x").unwrap();
    assert_eq!(sent.body_str(), "done");
    assert_eq!(entries(&log), vec!["aborter", "route", "handler"]);
}

#[test]
fn test_abort_in_route_phase_jumps_to_handler() {
    let log = new_log();
    let mut app = App::default();
    app.use_middleware(step(&log, "global"));

    let abort_log = Arc::clone(&log);
    let handler_log = Arc::clone(&log);
    app.router_mut()
        .get("/x", move |_ctx| {
            handler_log.lock().unwrap().push("handler".to_string());
            Ok(())
        })
        .unwrap()
        .use_middleware(Middleware::named("aborter", move |ctx| {
            abort_log.lock().unwrap().push("aborter".to_string());
            ctx.abort();
        }))
        .use_middleware(step(&log, "skipped_route"));
    let app = app.into_shared();

    get(&app, "/x");
    assert_eq!(entries(&log), vec!["global", "aborter", "handler"]);
}

#[test]
fn test_abort_from_last_route_middleware_runs_handler() {
    let log = new_log();
    let mut app = App::default();

    let abort_log = Arc::clone(&log);
    let handler_log = Arc::clone(&log);
    app.router_mut()
        .get("/x", move |ctx: &mut Context| {
            handler_log.lock().unwrap().push("handler".to_string());
            // aborting once the handler runs changes nothing
            ctx.abort();
            Ok(())
        })
        .unwrap()
        .use_middleware(Middleware::named("aborter", move |ctx| {
            abort_log.lock().unwrap().push("aborter".to_string());
            ctx.abort();
        }));
    let app = app.into_shared();

    get(&app, "/x");
    assert_eq!(entries(&log), vec!["aborter", "handler"]);
}

#[test]
fn test_middleware_without_next_stops_the_request() {
    let log = new_log();
    let mut app = App::default();
    app.use_middleware(Middleware::named("deny", |ctx| {
        ctx.response_mut().plain(401, "no");
    }));
    let handler_log = Arc::clone(&log);
    app.router_mut()
        .get("/x", move |_ctx| {
            handler_log.lock().unwrap().push("handler".to_string());
            Ok(())
        })
        .unwrap();
    let app = app.into_shared();

    let sent = get(&app, "/x").unwrap();
    assert_eq!(sent.status, 401);
    assert!(entries(&log).is_empty());
}

#[test]
fn test_global_middleware_is_per_method() {
    let log = new_log();
    let mut app = App::default();
    app.use_middleware_for(step(&log, "post_only"), &["POST"])
        .unwrap();
    app.router_mut().any("/x", |_ctx| Ok(())).unwrap();
    let app = app.into_shared();

    get(&app, "/x");
    assert!(entries(&log).is_empty());
    run(&app, Request::new(Method::POST, "/x"));
    assert_eq!(entries(&log), vec!["post_only"]);
}

#[test]
fn test_constraint_rejection_answers_404() {
    let mut app = App::default();
    app.router_mut()
        .get("/article/:id", |ctx| {
            ctx.response_mut().plain(200, "found");
            Ok(())
        })
        .unwrap()
        .regexp("id", r"\d+")
        .unwrap();
    let app = app.into_shared();

    assert_eq!(get(&app, "/article/12").unwrap().status, 200);

    let sent = get(&app, "/article/12a").unwrap();
    assert_eq!(sent.status, 404);
    let body = sent.body_json().unwrap();
    assert_eq!(body["code"], 404);
    assert_eq!(body["message"], "404 route not found");
}

#[test]
fn test_not_found_as_text_when_client_accepts_text() {
    let app = App::default().into_shared();
    let sent = run(
        &app,
        Request::new(Method::GET, "/missing").with_header("Accept", "text/html,*/*"),
    )
    .unwrap();
    assert_eq!(sent.status, 404);
    assert_eq!(sent.body_str(), "404 route not found");
    assert_eq!(sent.header("x-content-type-options"), Some("nosniff"));
}

#[test]
fn test_json_label_forces_json_errors() {
    let mut app = App::default();
    app.router_mut()
        .get("/api", |_ctx| Err(error::mark_client(anyhow::anyhow!("bad input"))))
        .unwrap()
        .label("json");
    let app = app.into_shared();

    let sent = run(
        &app,
        Request::new(Method::GET, "/api").with_header("accept", "text/plain"),
    )
    .unwrap();
    assert_eq!(sent.status, 400);
    assert_eq!(sent.body_json().unwrap()["message"], "bad input");
}

#[test]
fn test_server_failures_hide_details_unless_debug() {
    let build = |debug: bool| {
        let mut app = App::new(AppConfig {
            debug,
            ..AppConfig::default()
        });
        app.router_mut()
            .get("/boom", |ctx| {
                ctx.response_mut().plain(200, "partial output");
                Err(anyhow::anyhow!("database password is hunter2"))
            })
            .unwrap();
        app.into_shared()
    };

    let sent = get(&build(false), "/boom").unwrap();
    assert_eq!(sent.status, 500);
    let body = sent.body_json().unwrap();
    assert_eq!(body["code"], 500);
    assert_eq!(body["message"], "Internal Server Error");
    assert!(!sent.body_str().contains("partial output"));

    let sent = get(&build(true), "/boom").unwrap();
    assert_eq!(sent.status, 500);
    assert!(sent.body_str().contains("hunter2"));
}

#[test]
fn test_classified_codes_become_statuses() {
    let mut app = App::default();
    app.router_mut()
        .get("/gone", |_ctx| Err(error::mark(anyhow::anyhow!("gone"), 410)))
        .unwrap();
    app.router_mut()
        .get("/busy", |_ctx| Err(error::mark(anyhow::anyhow!("busy"), 503)))
        .unwrap();
    app.router_mut()
        .get("/odd", |_ctx| Err(error::mark(anyhow::anyhow!("odd"), 42)))
        .unwrap();
    let app = app.into_shared();

    assert_eq!(get(&app, "/gone").unwrap().status, 410);
    assert_eq!(get(&app, "/busy").unwrap().status, 503);
    let odd = get(&app, "/odd").unwrap();
    assert_eq!(odd.status, 400);
    assert_eq!(odd.body_json().unwrap()["code"], 42);
}

fn counting_app(count: &Arc<AtomicUsize>, codes: &Arc<Mutex<Vec<i32>>>) -> App {
    let mut app = App::default();
    let count = Arc::clone(count);
    let codes = Arc::clone(codes);
    app.set_error_handler(move |ctx, err| {
        count.fetch_add(1, Ordering::SeqCst);
        codes
            .lock()
            .unwrap()
            .push(error::code_of(err).unwrap_or_default());
        ctx.response_mut().plain(599, "handled");
    });
    app
}

#[test]
fn test_handler_error_reported_exactly_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let codes = Arc::new(Mutex::new(Vec::new()));
    let mut app = counting_app(&count, &codes);
    app.router_mut()
        .get("/fail", |_ctx| Err(anyhow::anyhow!("plain failure")))
        .unwrap();
    let app = app.into_shared();

    let sent = get(&app, "/fail").unwrap();
    assert_eq!(sent.status, 599);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(*codes.lock().unwrap(), vec![error::SERVER_CODE]);
}

#[test]
fn test_error_handler_panic_is_not_reported_again() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut app = App::default();
    let calls = Arc::clone(&count);
    app.set_error_handler(move |ctx, _err| {
        calls.fetch_add(1, Ordering::SeqCst);
        ctx.response_mut().plain(418, "half written");
        panic!("error handler bug");
    });
    app.router_mut()
        .get("/fail", |_ctx| Err(anyhow::anyhow!("handler failed")))
        .unwrap();
    let app = app.into_shared();

    let sent = get(&app, "/fail").unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(sent.status, 500);
    assert!(!sent.body_str().contains("half written"));
    assert_eq!(app.pool().stats().released, 1);
}

#[test]
fn test_panics_are_recovered_and_reported_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let codes = Arc::new(Mutex::new(Vec::new()));
    let mut app = counting_app(&count, &codes);
    app.use_middleware(Middleware::named("writes_then_continues", |ctx| {
        ctx.response_mut().write(b"leaked");
        ctx.next();
    }));
    app.router_mut()
        .get("/panic", |_ctx| panic!("handler exploded"))
        .unwrap();
    app.router_mut()
        .get("/panic-string", |_ctx| {
            let detail = 7;
            panic!("exploded with {detail}")
        })
        .unwrap();
    let app = app.into_shared();

    let sent = get(&app, "/panic").unwrap();
    assert_eq!(sent.status, 599);
    assert_eq!(sent.body_str(), "handled");
    get(&app, "/panic-string");
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(*codes.lock().unwrap(), vec![500, 500]);

    // the context went back to the pool and serves the next request normally
    let stats = app.pool().stats();
    assert_eq!(stats.released, 2);
    assert_eq!(stats.idle, 1);
}

#[test]
fn test_default_handler_on_panic_answers_500() {
    let mut app = App::default();
    app.router_mut()
        .get("/panic", |_ctx| panic!("secret detail"))
        .unwrap();
    let app = app.into_shared();

    let sent = get(&app, "/panic").unwrap();
    assert_eq!(sent.status, 500);
    assert!(!sent.body_str().contains("secret detail"));
}

#[test]
fn test_throw_from_middleware_skips_handler() {
    let log = new_log();
    let mut app = App::default();
    app.use_middleware(Middleware::named("validate", |ctx| {
        if ctx.request().header("x-token").is_none() {
            ctx.throw(error::mark(anyhow::anyhow!("missing token"), 401));
            return;
        }
        ctx.next();
    }));
    let handler_log = Arc::clone(&log);
    app.router_mut()
        .get("/secure", move |_ctx| {
            handler_log.lock().unwrap().push("handler".to_string());
            Ok(())
        })
        .unwrap();
    let app = app.into_shared();

    let sent = get(&app, "/secure").unwrap();
    assert_eq!(sent.status, 401);
    assert_eq!(sent.body_json().unwrap()["message"], "missing token");
    assert!(entries(&log).is_empty());

    run(
        &app,
        Request::new(Method::GET, "/secure").with_header("x-token", "t"),
    );
    assert_eq!(entries(&log), vec!["handler"]);
}

#[test]
fn test_request_id_is_reused_or_generated() {
    let mut app = App::default();
    app.router_mut()
        .get("/id", |ctx| {
            let id = ctx.request_id().to_string();
            ctx.response_mut().plain(200, &id);
            Ok(())
        })
        .unwrap();
    let app = app.into_shared();

    let supplied = RequestId::new().to_string();
    let sent = run(
        &app,
        Request::new(Method::GET, "/id").with_header(REQUEST_ID_HEADER, supplied.clone()),
    )
    .unwrap();
    assert_eq!(sent.body_str(), supplied);
    assert_eq!(sent.header(REQUEST_ID_HEADER), Some(supplied.as_str()));

    let sent = run(
        &app,
        Request::new(Method::GET, "/id").with_header(REQUEST_ID_HEADER, "not-a-ulid"),
    )
    .unwrap();
    assert_ne!(sent.body_str(), "not-a-ulid");
    assert!(sent.body_str().parse::<RequestId>().is_ok());
}

#[test]
fn test_set_path_in_global_middleware_reroutes() {
    let mut app = App::default();
    app.use_middleware(Middleware::named("rewrite", |ctx| {
        if ctx.request().path() == "/old" {
            ctx.set_path("/new");
        }
        ctx.next();
    }));
    app.router_mut()
        .get("/new", |ctx| {
            ctx.response_mut().plain(200, "new");
            Ok(())
        })
        .unwrap();
    let app = app.into_shared();

    assert_eq!(get(&app, "/old").unwrap().body_str(), "new");
}

#[test]
fn test_query_and_trailing_slash_are_ignored_for_matching() {
    let mut app = App::default();
    app.router_mut()
        .get("/backend/check/:token", |ctx| {
            let token = ctx.param("token").unwrap_or_default().to_string();
            ctx.response_mut().plain(200, &token);
            Ok(())
        })
        .unwrap();
    let app = app.into_shared();

    assert_eq!(
        get(&app, "/backend/check/abc-123/?verbose=1").unwrap().body_str(),
        "abc-123"
    );
    assert_eq!(
        get(&app, "/Backend/Check/a%20b").unwrap().body_str(),
        "a b"
    );
}

#[test]
fn test_request_store_is_cleared_between_requests() {
    let log = new_log();
    let mut app = App::new(AppConfig {
        pool_max_idle: 1,
        ..AppConfig::default()
    });
    let handler_log = Arc::clone(&log);
    app.router_mut()
        .get("/store", move |ctx| {
            handler_log
                .lock()
                .unwrap()
                .push(format!("seen={}", ctx.store().contains("visited")));
            ctx.store().set("visited", true);
            if let Some(app) = ctx.app() {
                let hits = app.store().get::<AtomicUsize>("hits");
                if let Some(hits) = hits {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        })
        .unwrap();
    app.store().set("hits", AtomicUsize::new(0));
    let app = app.into_shared();

    get(&app, "/store");
    get(&app, "/store");
    assert_eq!(entries(&log), vec!["seen=false", "seen=false"]);
    assert_eq!(app.pool().stats().reused, 1);
    let hits = app.store().get::<AtomicUsize>("hits").unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_nothing_is_sent_without_output() {
    let mut app = App::default();
    app.router_mut().get("/silent", |_ctx| Ok(())).unwrap();
    let app = app.into_shared();
    assert!(get(&app, "/silent").is_none());
}
