//! HTTP request tracing.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → request.rs (resolve or generate the correlation ID)
//!     → middleware.rs (RequestContext, status capture, panic containment)
//!     → handler (adds fields through RequestContext)
//!     → response.rs (CapturedBody records the status as it is written)
//!     → recover.rs (panic → 500 with message and traceback)
//!     → observability::dispatch (one record per request)
//! ```

pub mod context;
pub mod middleware;
pub mod recover;
pub mod request;
pub mod response;
pub mod server;

pub use context::{FieldStore, RequestContext};
pub use middleware::{trace, RequestLogLayer, TraceLayer};
pub use recover::RecoveredPanic;
pub use request::{CorrelationId, CorrelationLayer, X_REQUEST_ID, X_UNIQUE_ID};
pub use response::StatusCapture;
pub use server::HttpServer;
