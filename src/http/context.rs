//! Request-scoped context and field store.
//!
//! The logging stage installs a [`RequestContext`] in the request extensions.
//! Handlers extract it and add fields that end up in the request's log
//! record. The store is owned by the context, so its lifetime is the
//! request's lifetime and no other request can reach it.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Extensions;
use serde_json::{Map, Value};

use crate::http::request::CorrelationId;

type Entries = Map<String, Value>;

/// Per-request key/value bag merged into the request's log record.
///
/// Clones share the same entries, so sub-tasks of one request can write
/// concurrently. A detached store (the default) ignores writes.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    entries: Option<Arc<Mutex<Entries>>>,
}

impl FieldStore {
    /// A live store, as installed by the logging stage.
    pub fn new() -> Self {
        Self {
            entries: Some(Arc::new(Mutex::new(Map::new()))),
        }
    }

    /// A store that drops every write.
    pub fn detached() -> Self {
        Self { entries: None }
    }

    pub fn is_detached(&self) -> bool {
        self.entries.is_none()
    }

    fn lock(&self) -> Option<MutexGuard<'_, Entries>> {
        self.entries
            .as_ref()
            .map(|e| e.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Add a field. Later writes to the same key replace earlier ones.
    pub fn add(&self, key: impl Into<String>, value: impl Into<Value>) {
        if let Some(mut entries) = self.lock() {
            entries.insert(key.into(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().and_then(|entries| entries.get(key).cloned())
    }

    /// Take every field added so far, leaving the store empty.
    pub fn drain_all(&self) -> Map<String, Value> {
        self.lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Context of the request being served.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    correlation_id: Option<CorrelationId>,
    fields: FieldStore,
}

impl RequestContext {
    /// Context with a live field store.
    pub fn new(correlation_id: Option<CorrelationId>) -> Self {
        Self {
            correlation_id,
            fields: FieldStore::new(),
        }
    }

    /// Context of work not bound to a traced request.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Detached context that still propagates an identifier downstream,
    /// e.g. for background work started on behalf of a request.
    pub fn with_correlation_id(id: CorrelationId) -> Self {
        Self {
            correlation_id: Some(id),
            fields: FieldStore::detached(),
        }
    }

    /// Context for a request: the one installed by the logging stage if any,
    /// else a detached one carrying whatever identifier was resolved.
    pub fn from_extensions(extensions: &Extensions) -> Self {
        if let Some(ctx) = extensions.get::<RequestContext>() {
            return ctx.clone();
        }
        Self {
            correlation_id: extensions.get::<CorrelationId>().cloned(),
            fields: FieldStore::detached(),
        }
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Add a field to this request's log record.
    pub fn add_field(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.add(key, value);
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_extensions(&parts.extensions))
    }
}
