//! Request tracing for axum services.
//!
//! Every request gets a correlation ID (taken from `X-Request-ID` or
//! generated), a request-scoped field store handlers can write to, panic
//! containment, and exactly one structured log record whose severity
//! follows the final status. Outbound calls made through
//! [`client::TracingClient`] carry the same ID downstream.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use http_trace::{config::TraceConfig, RequestContext};
//!
//! async fn hello(ctx: RequestContext) -> &'static str {
//!     ctx.add_field("greeting", "hello");
//!     "hello"
//! }
//!
//! let app = http_trace::trace(Router::new().route("/", get(hello)), &TraceConfig::default());
//! # let _ = app;
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use client::TracingClient;
pub use config::schema::TraceConfig;
pub use http::{trace, CorrelationId, FieldStore, HttpServer, RequestContext, TraceLayer};
pub use lifecycle::Shutdown;
