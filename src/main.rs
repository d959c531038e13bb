//! Demo binary: builds a sample application, prints its route table and runs requests
//! through it in memory.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use http::Method;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use triemux::config::AppConfig;
use triemux::logging::{init_logging_with_config, LogConfig};
use triemux::{App, MemorySink, Middleware, Request, Resource};

/// In-memory playground for the triemux router
#[derive(Parser)]
#[command(name = "triemux-demo")]
#[command(about = "Route table and request playground", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to TRIEMUX_* environment variables)
    #[arg(short, long, env = "TRIEMUX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the registered routes
    Routes {
        /// Emit JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Dispatch requests given as "METHOD /path" and print the responses
    Request {
        /// Requests to run, e.g. "GET /article/42"
        #[arg(required = true, num_args = 1..)]
        requests: Vec<String>,

        /// Extra request header as "name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging_with_config(&LogConfig::from_env())?;

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env(),
    };
    let app = build_app(config)?;

    match cli.command {
        Commands::Routes { json } => {
            if json {
                let rows = app.router().snapshot(STRIP_PREFIX);
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", app.router().dump_table(STRIP_PREFIX));
            }
        }
        Commands::Request { requests, headers } => {
            let sink = MemorySink::new();
            for line in &requests {
                let mut request = parse_request_line(line)?;
                for header in &headers {
                    let (name, value) = header
                        .split_once(':')
                        .with_context(|| format!("header must be 'name: value', got {header:?}"))?;
                    request.set_header(name.trim(), value.trim());
                }
                app.handle(request, sink.boxed());
                if let Some(sent) = sink.last() {
                    println!("{line} -> {} {}", sent.status, sent.body_str());
                }
            }
            info!(pool = ?app.pool().stats(), "Requests finished");
        }
    }
    Ok(())
}

const STRIP_PREFIX: &str = "triemux_demo::";

fn parse_request_line(line: &str) -> anyhow::Result<Request> {
    let (method, path) = line
        .trim()
        .split_once(char::is_whitespace)
        .with_context(|| format!("request must be 'METHOD /path', got {line:?}"))?;
    let method: Method = method
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("invalid method in {line:?}"))?;
    Ok(Request::new(method, path.trim()))
}

fn build_app(config: AppConfig) -> anyhow::Result<Arc<App>> {
    let mut app = App::new(config);

    app.use_middleware(Middleware::named("request_log", |ctx| {
        info!(request_id = %ctx.request_id(), path = %ctx.request().path(), "Incoming request");
        ctx.next();
    }));

    let router = app.router_mut();
    router.regexp("id", r"\d+")?;

    router
        .get("/", |ctx| {
            ctx.response_mut().plain(200, "triemux demo");
            Ok(())
        })?
        .name("home")?;

    router
        .get("/article/:id", |ctx| {
            let id = ctx.request().param_positive_int("id").unwrap_or_default();
            ctx.response_mut()
                .json(200, &serde_json::json!({ "article": id }))
        })?
        .name("article.show")?
        .label("json");

    router
        .get("/backend/check/:token", |ctx| {
            let token = ctx.param("token").unwrap_or_default().to_string();
            ctx.response_mut().plain(200, &format!("token {token}"));
            Ok(())
        })?
        .name("backend.check")?;

    router
        .group("/admin", |r| {
            r.get("/stats", |ctx| {
                let stats = ctx.app().map(|app| app.pool().stats());
                ctx.response_mut().json(200, &stats)
            })?;
            r.post("/fail", |_ctx| {
                Err(triemux::error::mark_client(anyhow::anyhow!(
                    "refusing to fail on request"
                )))
            })?;
            Ok(())
        })?
        .use_middleware(Middleware::named("admin_guard", |ctx| {
            if ctx.request().header("x-admin").is_some() {
                ctx.next();
            } else {
                ctx.response_mut().plain(403, "forbidden");
            }
        }))
        .label("json");

    router
        .resource(
            "/posts",
            Resource::new()
                .index(|ctx| {
                    ctx.response_mut().json(200, &["hello", "world"])
                })
                .show(|ctx| {
                    let id = ctx.param("id").unwrap_or_default().to_string();
                    ctx.response_mut().plain(200, &format!("post {id}"));
                    Ok(())
                }),
        )?
        .name("posts")?;

    Ok(app.into_shared())
}
