//! Demo server for the request tracing layers.
//!
//! ```text
//! GET /hello              200, adds a field (logged only with --verbose)
//! GET /missing            404, WARN
//! GET /redirect           307, WARN
//! GET /panic              handler panic, 500 with traceback, ERROR
//! GET /downstream?url=..  outbound call carrying X-Request-ID
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;

use http_trace::client::{self, set_global_user_agent};
use http_trace::config::{load_config, TraceConfig};
use http_trace::observability::logging;
use http_trace::{HttpServer, RequestContext, Shutdown};

#[derive(Parser)]
#[command(name = "http-trace")]
#[command(about = "Demo server with request tracing", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Log successful requests too
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TraceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    config.logging.verbose |= cli.verbose;

    logging::init(&config.logging)?;
    if !config.client.user_agent.is_empty() {
        set_global_user_agent(config.client.user_agent.clone())?;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        verbose = config.logging.verbose,
        request_header = %config.correlation.header,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, routes());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn routes() -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/missing", get(missing))
        .route("/redirect", get(redirect))
        .route("/panic", get(explode))
        .route("/downstream", get(downstream))
}

async fn hello(ctx: RequestContext) -> &'static str {
    ctx.add_field("greeting", "hello");
    "hello\n"
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn redirect() -> Redirect {
    Redirect::temporary("/hello")
}

async fn explode(ctx: RequestContext) -> &'static str {
    ctx.add_field("about_to", "panic");
    panic!("demo panic");
}

async fn downstream(
    ctx: RequestContext,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(url) = params.get("url") else {
        return (StatusCode::BAD_REQUEST, "missing url parameter\n").into_response();
    };
    ctx.add_field("downstream_url", url.as_str());

    match client::get(&ctx, url).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            ctx.add_field("downstream_status", status);
            format!("downstream answered {status}\n").into_response()
        }
        Err(e) => {
            ctx.add_field("downstream_error", e.to_string());
            (StatusCode::BAD_GATEWAY, format!("{e}\n")).into_response()
        }
    }
}
