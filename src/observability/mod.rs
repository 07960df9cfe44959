//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline produces one RequestOutcome per request:
//!     → dispatch.rs (severity decision, LogRecord, sink)
//!     → logging.rs (subscriber the TracingSink writes through)
//!
//! Consumers:
//!     → stdout (text for development, JSON for log shippers)
//!     → MemorySink in tests
//! ```
//!
//! # Design Decisions
//! - One record per request, never zero, never two
//! - Successful requests are logged only in verbose mode
//! - The request ID is a plain field on the record, not a span

pub mod dispatch;
pub mod logging;

pub use dispatch::{Dispatcher, LogRecord, LogSink, MemorySink, RequestOutcome, Severity, TracingSink};
