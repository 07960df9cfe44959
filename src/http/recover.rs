//! Panic containment for request handlers.
//!
//! A panic inside a handler is caught at the pipeline boundary and turned
//! into a [`RecoveredPanic`]: a message and the backtrace of the panicking
//! thread. The serving task keeps running.
//!
//! The backtrace has to be taken while the panic is unwinding, so a
//! process-wide panic hook (installed once, chained to the existing hook)
//! parks it in a thread-local. `catch_unwind` returns on the same thread,
//! which picks it up.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

const MESSAGE_PREFIX: &str = "unhandled panic: ";

static HOOK: Once = Once::new();

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install the backtrace-recording panic hook. Idempotent.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .filter(|trace| !trace.is_empty())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// A panic caught at the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredPanic {
    pub message: String,
    pub traceback: String,
}

impl RecoveredPanic {
    /// Convert a `catch_unwind` payload. Must run on the thread that caught it.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("{MESSAGE_PREFIX}{}", payload_text(payload.as_ref())),
            traceback: take_backtrace(),
        }
    }

    /// Plain-text 500 response: `"<message> \n<traceback>"`.
    pub fn to_response(&self) -> Response<Body> {
        let mut response = Response::new(Body::from(format!(
            "{} \n{}",
            self.message, self.traceback
        )));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

/// Text of a panic payload: the string for `panic!("...")`, the error's
/// `Display` for boxed errors, a type label otherwise.
fn payload_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        err.to_string()
    } else {
        "Box<dyn Any + Send>".to_string()
    }
}
