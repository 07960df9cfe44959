//! Response status capture.
//!
//! # Responsibilities
//! - Record the status of the response head as it passes through
//! - Record an implicit 200 when body data is written before any status
//! - Forward every body frame unchanged and unbuffered
//! - Finish the request's log record when the body ends, fails, panics or
//!   is dropped
//!
//! # Design Decisions
//! - Last `set_status` wins; an implicit write only fills an unset status
//! - Frames are handed on as soon as the inner body yields them, so there
//!   is nothing to flush here; the transport flushes as it sends
//! - A panic while streaming ends the stream: the head is already committed
//!   and cannot be turned into a 500

use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::StatusCode;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::http::middleware::PendingLog;
use crate::http::recover::RecoveredPanic;

/// Status observed for one request. 0 means "not set yet".
#[derive(Debug, Default)]
pub struct StatusCapture {
    status: AtomicU16,
}

impl StatusCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an explicit status. Overwrites any earlier value.
    pub fn set_status(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::Relaxed);
    }

    /// Note a body write: an unset status becomes 200.
    pub fn record_write(&self) {
        let _ = self.status.compare_exchange(
            0,
            StatusCode::OK.as_u16(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Last recorded status, or 0.
    pub fn current_status(&self) -> u16 {
        self.status.load(Ordering::Relaxed)
    }

    /// Whether a response head has gone out (or been implied by a write).
    pub fn is_committed(&self) -> bool {
        self.current_status() != 0
    }
}

/// Response body forwarding frames from the handler's body while finishing
/// the request's log record when the stream is over.
pub struct CapturedBody {
    inner: Body,
    log: Option<PendingLog>,
}

impl CapturedBody {
    pub(crate) fn new(inner: Body, log: PendingLog) -> Self {
        Self {
            inner,
            log: Some(log),
        }
    }
}

impl HttpBody for CapturedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let polled = panic::catch_unwind(AssertUnwindSafe(|| Pin::new(&mut this.inner).poll_frame(cx)));

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(Some(Ok(frame)))) => {
                if frame.is_data() {
                    if let Some(log) = &this.log {
                        log.status().record_write();
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Ok(Poll::Ready(Some(Err(err)))) => {
                if let Some(log) = this.log.take() {
                    log.fail(format!("response body error: {err}"));
                }
                Poll::Ready(Some(Err(err)))
            }
            Ok(Poll::Ready(None)) => {
                if let Some(log) = this.log.take() {
                    log.finish();
                }
                Poll::Ready(None)
            }
            Err(payload) => {
                let recovered = RecoveredPanic::from_payload(payload);
                this.inner = Body::empty();
                if let Some(log) = this.log.take() {
                    log.finish_with_panic(recovered);
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
