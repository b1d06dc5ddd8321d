//! Provide a [`Context`] for the request pipeline.
//!
//! Every stage of a request accepts a [`Context`]. It contains a DashMap which allows additional
//! data to be passed back and forth along the pipeline, the request's ordered error list, the
//! response extensions and the cancellation signal.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use derivative::Derivative;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::WaitForCancellationFuture;
use tower::BoxError;

use crate::graphql;
use crate::json_ext::ByteString;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

#[cfg(test)]
mod tests;

/// Holds [`Context`] entries.
pub(crate) type Entries = Arc<DashMap<String, Value>>;

/// Request-scoped state, shared by every stage of one request.
///
/// Cloning is cheap and every clone observes the same entries and errors.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Context {
    entries: Entries,
    errors: Arc<Mutex<Vec<graphql::Error>>>,
    response_extensions: Arc<Mutex<Object>>,
    #[derivative(Debug = "ignore")]
    cancellation: CancellationToken,
    created_at: Instant,
}

impl Context {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Creates a context that is cancelled together with `cancellation`.
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Context {
            entries: Default::default(),
            errors: Default::default(),
            response_extensions: Default::default(),
            cancellation,
            created_at: Instant::now(),
        }
    }

    /// When the request entered the pipeline.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// Request entries, shared between interceptors and resolvers.
impl Context {
    /// Reads the entry stored under `key`, or `None` when there is none.
    ///
    /// Fails when the stored value does not deserialize into `V`.
    pub fn get<V>(&self, key: &str) -> Result<Option<V>, BoxError>
    where
        V: DeserializeOwned,
    {
        match self.entries.get(key) {
            Some(entry) => Ok(Some(serde_json_bytes::from_value(entry.value().clone())?)),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn insert<V>(&self, key: impl Into<String>, value: V) -> Result<(), BoxError>
    where
        V: Serialize,
    {
        let value = serde_json_bytes::to_value(value)?;
        self.entries.insert(key.into(), value);
        Ok(())
    }

    /// Whether an entry is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// The error accumulator.
impl Context {
    /// Appends an error to the request's error list.
    pub fn add_error(&self, error: graphql::Error) {
        self.errors.lock().push(error);
    }

    /// Appends an error built from `message` at `path`.
    pub fn add_error_at(&self, path: Path, message: impl Into<String>) {
        self.add_error(
            graphql::Error::builder()
                .message(message)
                .path(path)
                .build(),
        )
    }

    /// The errors recorded so far, in the order they were added.
    pub fn errors(&self) -> Vec<graphql::Error> {
        self.errors.lock().clone()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }
}

/// Response extensions.
impl Context {
    /// Adds an entry to the `extensions` of the final response.
    pub fn insert_response_extension(&self, key: impl Into<ByteString>, value: impl Into<Value>) {
        self.response_extensions
            .lock()
            .insert(key.into(), value.into());
    }

    pub fn response_extensions(&self) -> Object {
        self.response_extensions.lock().clone()
    }
}

/// Cancellation.
impl Context {
    /// Cancels the request. In-flight resolution stops at its next suspension point.
    pub fn cancel(&self) {
        self.cancellation.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the request is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    /// The token this context is cancelled with.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
