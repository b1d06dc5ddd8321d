//! The per-request state built from raw parameters before dispatch.

use std::sync::Arc;
use std::time::Instant;

use crate::json_ext::Object;
use crate::spec::Operation;
use crate::spec::Query;

/// A start and end instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceTiming {
    pub start: Instant,
    pub end: Instant,
}

impl TraceTiming {
    /// A zero-length timing at the current instant.
    pub fn now() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            end: now,
        }
    }

    /// Times `f`.
    pub(crate) fn measure<T>(f: impl FnOnce() -> T) -> (T, Self) {
        let start = Instant::now();
        let result = f();
        (
            result,
            Self {
                start,
                end: Instant::now(),
            },
        )
    }

    pub fn duration(&self) -> std::time::Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Timings of the stages that ran before dispatch.
///
/// `parsing` and `validation` are zero-length when the document came from the cache.
#[derive(Clone, Copy, Debug)]
pub struct Stats {
    pub operation_start: Instant,
    pub read: TraceTiming,
    pub parsing: TraceTiming,
    pub validation: TraceTiming,
}

/// An executable, single-request context: the document, the selected operation and the coerced
/// variables.
///
/// Created by [`Executor::create_operation_context`](crate::Executor::create_operation_context)
/// and consumed by [`Executor::dispatch_operation`](crate::Executor::dispatch_operation).
#[derive(Clone, Debug)]
pub struct OperationContext {
    /// The query text exactly as received, after parameter mutators ran.
    pub raw_query: String,
    pub(crate) document: Arc<Query>,
    pub(crate) operation_index: usize,
    /// The operation name given in the request, if any.
    pub operation_name: Option<String>,
    /// Variables coerced against the selected operation's definitions.
    pub variables: Object,
    /// The request's `extensions`.
    pub extensions: Object,
    pub(crate) disable_suggestion: bool,
    pub stats: Stats,
}

impl OperationContext {
    /// The parsed and validated document, possibly shared with other requests through the cache.
    pub fn document(&self) -> &Arc<Query> {
        &self.document
    }

    /// The operation selected for execution.
    pub fn operation(&self) -> &Operation {
        &self.document.operations[self.operation_index]
    }

    /// Whether validation ran without "did you mean" suggestions.
    pub fn disable_suggestion(&self) -> bool {
        self.disable_suggestion
    }
}
