//! Process-wide user agent.
//!
//! Set once at startup, read by every `TracingClient` that was not given its
//! own value. When nothing was set, the `SERVICE_NAME` environment variable
//! (read once, on first use) is used. Setting an empty value turns the
//! header off for the whole process.

use std::sync::{LazyLock, OnceLock};

use axum::http::HeaderValue;
use thiserror::Error;

/// Environment variable read when no user agent was set explicitly.
pub const SERVICE_NAME_ENV: &str = "SERVICE_NAME";

/// `Some(None)` once the header was explicitly turned off.
static GLOBAL_USER_AGENT: OnceLock<Option<HeaderValue>> = OnceLock::new();

static ENV_USER_AGENT: LazyLock<Option<HeaderValue>> = LazyLock::new(from_env);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserAgentError {
    #[error("user agent {0:?} is not a valid header value")]
    Invalid(String),

    #[error("process-wide user agent is already set")]
    AlreadySet,
}

/// Set the process-wide user agent. Succeeds at most once.
pub fn set_global_user_agent(value: impl Into<String>) -> Result<(), UserAgentError> {
    let header = parse(value.into())?;
    GLOBAL_USER_AGENT
        .set(header)
        .map_err(|_| UserAgentError::AlreadySet)
}

/// The process-wide user agent, if one is configured.
pub fn global_user_agent() -> Option<HeaderValue> {
    match GLOBAL_USER_AGENT.get() {
        Some(explicit) => explicit.clone(),
        None => ENV_USER_AGENT.clone(),
    }
}

/// Empty means "no user agent".
pub(crate) fn parse(value: String) -> Result<Option<HeaderValue>, UserAgentError> {
    if value.is_empty() {
        return Ok(None);
    }
    HeaderValue::from_str(&value)
        .map(Some)
        .map_err(|_| UserAgentError::Invalid(value))
}

fn from_env() -> Option<HeaderValue> {
    let name = std::env::var(SERVICE_NAME_ENV).ok()?;
    match parse(name) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring {SERVICE_NAME_ENV}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_values_that_cannot_be_sent() {
        let err = set_global_user_agent("bad\nagent").unwrap_err();
        assert_eq!(err, UserAgentError::Invalid("bad\nagent".to_string()));
        assert!(GLOBAL_USER_AGENT.get().is_none());
    }

    #[test]
    fn empty_value_means_no_header() {
        assert_eq!(parse(String::new()), Ok(None));
        assert_eq!(
            parse("svc-a".to_string()),
            Ok(Some(HeaderValue::from_static("svc-a")))
        );
    }
}
