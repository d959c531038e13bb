#![allow(clippy::expect_used)]

use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use std::hint::black_box;
use triemux::router::{ParamVec, Tree};
use triemux::{App, Context, HandlerResult, MemorySink, Middleware, Request};

const PATTERNS: &[&str] = &[
    "/",
    "/zoo/animals",
    "/zoo/animals/:id",
    "/zoo/animals/:id/toys/:toy_id",
    "/inventory/:warehouse_id/feeds/:feed_id/items/:item_id/batches/:batch_id",
    "/complex/:a/:b/:c/:d/:e/:f/:g/:h/:i",
    "/zoo/health",
];

const PATHS: &[&str] = &[
    "/zoo/animals/123",
    "/zoo/animals/123/toys/456",
    "/inventory/1/feeds/2/items/3/batches/4",
    "/complex/1/2/3/4/5/6/7/8/9",
    "/zoo/health",
];

fn ok(ctx: &mut Context) -> HandlerResult {
    ctx.response_mut().plain(200, "ok");
    Ok(())
}

fn bench_trie_search(c: &mut Criterion) {
    let mut tree = Tree::new(false);
    for (i, pattern) in PATTERNS.iter().enumerate() {
        tree.add(pattern, i).expect("bench patterns do not conflict");
    }

    c.bench_function("trie_search", |b| {
        let mut params = ParamVec::new();
        b.iter(|| {
            for path in PATHS {
                params.clear();
                black_box(tree.search(black_box(path), &mut params));
            }
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut app = App::default();
    app.use_middleware(Middleware::named("pass", |ctx| ctx.next()));
    for pattern in PATTERNS {
        app.router_mut()
            .get(pattern, ok)
            .expect("bench patterns do not conflict");
    }
    let app = app.into_shared();
    let sink = MemorySink::new();

    c.bench_function("full_dispatch", |b| {
        b.iter(|| {
            for path in PATHS {
                app.handle(Request::new(Method::GET, *path), sink.boxed());
            }
            black_box(sink.take());
        })
    });
}

criterion_group!(benches, bench_trie_search, bench_dispatch);
criterion_main!(benches);
