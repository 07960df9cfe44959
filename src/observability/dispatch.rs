//! Severity dispatch for per-request log records.
//!
//! The pipeline hands over a [`RequestOutcome`] once per request. The
//! dispatcher derives the severity from the final status (or a panic or
//! error), decides whether the record is emitted at all, and passes the
//! [`LogRecord`] to a [`LogSink`].
//!
//! # Decision table (first match wins)
//! ```text
//! panic                   → ERROR  "request failed" (+ panic, traceback)
//! error (service, body)   → ERROR  "request failed" (+ error)
//! 100..300                → INFO   "request successful"   (verbose only)
//! 300..400                → WARN   "additional action required"
//! 400..500                → WARN   "request failed"
//! anything else (0, 5xx)  → ERROR  "request failed"
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::http::recover::RecoveredPanic;
use crate::http::request::CorrelationId;

/// Log level assigned to a request's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Map a final status (0 = no response produced) to a severity and the
    /// record's message. `failed` is set for a panic or an error; either one
    /// outranks the status.
    pub fn classify(status: u16, failed: bool) -> (Severity, &'static str) {
        if failed {
            return (Severity::Error, "request failed");
        }
        match status {
            100..=299 => (Severity::Info, "request successful"),
            300..=399 => (Severity::Warn, "additional action required"),
            400..=499 => (Severity::Warn, "request failed"),
            _ => (Severity::Error, "request failed"),
        }
    }
}

/// Everything the pipeline knows about a finished request.
#[derive(Debug)]
pub struct RequestOutcome {
    pub endpoint: String,
    pub method: String,
    pub elapsed: Duration,
    pub request_id: Option<CorrelationId>,
    /// Recorded status, 0 when no response head was produced.
    pub status: u16,
    /// Drained request fields.
    pub fields: Map<String, Value>,
    /// Error reported by the inner service, or cancellation.
    pub error: Option<String>,
    pub panic: Option<RecoveredPanic>,
}

/// The structured record handed to a sink.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: &'static str,
    pub endpoint: String,
    pub method: String,
    /// Human readable elapsed time.
    pub took: String,
    #[serde(skip)]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub status: u16,
    pub status_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    /// Fields added by handler code.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn status_text(status: u16) -> String {
    if status == 0 {
        return "no response".to_string();
    }
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown status")
        .to_string()
}

/// Receives finished log records.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

/// Writes each record as one `tracing` event at the record's severity.
///
/// `tracing` field names are static, so handler fields travel as a single
/// JSON object in the `fields` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! emit_event {
    ($macro:ident, $record:expr, $fields:expr) => {
        tracing::$macro!(
            endpoint = %$record.endpoint,
            method = %$record.method,
            took = %$record.took,
            request_id = $record.request_id.as_deref(),
            status = $record.status,
            status_text = %$record.status_text,
            error = $record.error.as_deref(),
            panic = $record.panic.as_deref(),
            traceback = $record.traceback.as_deref(),
            fields = %$fields,
            "{}",
            $record.message
        )
    };
}

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        let fields = Value::Object(record.fields.clone());
        match record.severity {
            Severity::Info => emit_event!(info, record, fields),
            Severity::Warn => emit_event!(warn, record, fields),
            Severity::Error => emit_event!(error, record, fields),
        }
    }
}

/// Keeps records in memory. Useful for asserting on request logs in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records emitted so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Turns request outcomes into log records and emits them.
#[derive(Clone)]
pub struct Dispatcher {
    verbose: bool,
    sink: Arc<dyn LogSink>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(verbose: bool, sink: Arc<dyn LogSink>) -> Self {
        Self { verbose, sink }
    }

    /// Dispatcher writing to the `tracing` subscriber.
    pub fn tracing(verbose: bool) -> Self {
        Self::new(verbose, Arc::new(TracingSink))
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Build the record for an outcome, or `None` when it is suppressed
    /// (successful request outside verbose mode).
    pub fn build(&self, outcome: RequestOutcome) -> Option<LogRecord> {
        let failed = outcome.panic.is_some() || outcome.error.is_some();
        let (severity, message) = Severity::classify(outcome.status, failed);
        if severity == Severity::Info && !self.verbose {
            return None;
        }

        let (panic, traceback) = match outcome.panic {
            Some(p) => (Some(p.message), Some(p.traceback)),
            None => (None, None),
        };

        Some(LogRecord {
            severity,
            message,
            endpoint: outcome.endpoint,
            method: outcome.method,
            took: format!("{:?}", outcome.elapsed),
            elapsed: outcome.elapsed,
            request_id: outcome.request_id.map(String::from),
            status: outcome.status,
            status_text: status_text(outcome.status),
            error: outcome.error,
            panic,
            traceback,
            fields: outcome.fields,
        })
    }

    /// Emit the record for an outcome. A failing sink is contained here; the
    /// response has already been handed to the transport.
    pub fn dispatch(&self, outcome: RequestOutcome) {
        let Some(record) = self.build(outcome) else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(&record))).is_err() {
            tracing::error!(
                endpoint = %record.endpoint,
                method = %record.method,
                "Log sink panicked; request record dropped"
            );
        }
    }
}
