//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap the application's routes with request tracing
//! - Apply the request timeout inside the tracing stack, so a timed-out
//!   request is logged with its 408
//! - Serve until a shutdown signal, then give in-flight requests a bounded
//!   amount of time to finish

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tower_http::timeout::TimeoutLayer;

use crate::config::TraceConfig;
use crate::http::middleware::TraceLayer;
use crate::lifecycle::signals::shutdown_signal;
use crate::observability::LogSink;

/// HTTP server with request tracing on every route.
pub struct HttpServer {
    router: Router,
    config: TraceConfig,
}

impl HttpServer {
    /// Serve `routes`, logging requests through `tracing`.
    pub fn new(config: TraceConfig, routes: Router) -> Self {
        let trace = TraceLayer::from_config(&config);
        Self::build(config, routes, trace)
    }

    /// Serve `routes`, logging requests to `sink`.
    pub fn with_sink(config: TraceConfig, routes: Router, sink: Arc<dyn LogSink>) -> Self {
        let trace = TraceLayer::with_sink(&config, sink);
        Self::build(config, routes, trace)
    }

    fn build(config: TraceConfig, routes: Router, trace: TraceLayer) -> Self {
        let router = Self::build_router(&config, routes, trace);
        Self { router, config }
    }

    /// Build the router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &TraceConfig, routes: Router, trace: TraceLayer) -> Router {
        routes
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(trace)
    }

    /// The fully layered router, for embedding into another server.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires or Ctrl+C is received.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = Duration::from_secs(self.config.listener.shutdown_timeout_secs);
        tracing::info!(
            address = %addr,
            verbose = self.config.logging.verbose,
            "HTTP server starting"
        );

        let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown_signal(shutdown).await;
                let _ = signalled_tx.send(());
            })
            .into_future();

        let deadline = async move {
            if signalled_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = serve => result?,
            () = deadline => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Shutdown deadline reached, abandoning in-flight requests"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }
}
