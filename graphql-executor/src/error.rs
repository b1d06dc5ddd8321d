//! Executor errors.
use std::time::Duration;

use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tower::BoxError;

pub use crate::configuration::ConfigurationError;
use crate::graphql;
use crate::graphql::ErrorExtension;
use crate::graphql::Location;
use crate::json_ext::Path;
pub use crate::spec::InputError;
pub use crate::spec::SchemaError;
pub use crate::spec::SpecError;

/// Error types raised while executing a selected operation.
///
/// These are not returned to the client as is, but converted to [`graphql::Error`].
#[derive(Error, Display, Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[non_exhaustive]
pub enum ExecutionError {
    /// request was cancelled
    Cancelled,

    /// request timed out after {0:?}
    Timeout(Duration),

    /// internal system error
    Panic,

    /// {type_name} cannot represent value: {value}
    InvalidLeafValue { type_name: String, value: String },

    /// abstract type {abstract_type} must resolve to an object type at runtime, received '{received}'
    UnresolvedAbstractType {
        abstract_type: String,
        received: String,
    },

    /// Cannot return null for non-nullable field {parent_type}.{field_name}.
    NullValueForNonNullField {
        parent_type: String,
        field_name: String,
    },

    /// Cannot return null for non-nullable array element of type {ty} at index {index}
    NullValueForNonNullListItem { ty: String, index: usize },

    /// {0}
    InvalidArguments(String),
}

impl ErrorExtension for ExecutionError {
    fn extension_code(&self) -> String {
        match self {
            ExecutionError::Cancelled => "REQUEST_CANCELLED",
            ExecutionError::Timeout(_) => "REQUEST_TIMEOUT",
            ExecutionError::Panic => "INTERNAL_SERVER_ERROR",
            ExecutionError::InvalidArguments(_) => crate::spec::GRAPHQL_VALIDATION_FAILURE_ERROR_KEY,
            ExecutionError::InvalidLeafValue { .. }
            | ExecutionError::UnresolvedAbstractType { .. }
            | ExecutionError::NullValueForNonNullField { .. }
            | ExecutionError::NullValueForNonNullListItem { .. } => "RESPONSE_VALIDATION_FAILED",
        }
        .to_string()
    }
}

impl ExecutionError {
    /// Converts to a client error located at `path`.
    pub(crate) fn at(&self, path: &Path, locations: Vec<Location>) -> graphql::Error {
        let mut error = self.to_graphql_error(locations);
        error.path = Some(path.clone());
        error
    }
}

/// Errors raised while building an [`crate::Executor`].
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum BuildError {
    /// extension {name} rejected the schema: {reason}
    ExtensionValidation { name: String, reason: BoxError },

    /// invalid configuration: {0}
    Configuration(#[from] ConfigurationError),
}

/// Turns a resolver failure into a client error, keeping GraphQL errors raised by the resolver.
pub(crate) fn from_resolver_error(
    error: BoxError,
    path: &Path,
    locations: Vec<Location>,
) -> graphql::Error {
    let mut error = match error.downcast::<graphql::Error>() {
        Ok(error) => *error,
        Err(error) => match error.downcast::<ExecutionError>() {
            Ok(error) => error.to_graphql_error(Vec::new()),
            Err(error) => graphql::Error::builder().message(error.to_string()).build(),
        },
    };
    if error.path.is_none() {
        error.path = Some(path.clone());
    }
    if error.locations.is_empty() {
        error.locations = locations;
    }
    error
}

/// Turns an error returned by an interceptor into a client error.
pub(crate) fn from_interceptor_error(error: BoxError) -> graphql::Error {
    match error.downcast::<graphql::Error>() {
        Ok(error) => *error,
        Err(error) => match error.downcast::<ExecutionError>() {
            Ok(error) => error.to_graphql_error(Vec::new()),
            Err(error) => graphql::Error::builder()
                .message(error.to_string())
                .extension_code(ExecutionError::Panic.extension_code())
                .build(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_codes() {
        let error = ExecutionError::Timeout(Duration::from_millis(20))
            .at(&Path::from("user/name"), vec![Location { line: 1, column: 3 }]);
        assert_eq!(error.message, "request timed out after 20ms");
        assert_eq!(error.extension_code().as_deref(), Some("REQUEST_TIMEOUT"));
        assert_eq!(error.path, Some(Path::from("user/name")));

        let error = ExecutionError::NullValueForNonNullField {
            parent_type: "Query".to_string(),
            field_name: "name".to_string(),
        }
        .to_graphql_error(Vec::new());
        assert_eq!(
            error.message,
            "Cannot return null for non-nullable field Query.name."
        );
    }

    #[test]
    fn resolver_errors_keep_their_shape() {
        let path = Path::from("user/0/name");
        let location = Location { line: 2, column: 5 };

        let custom = graphql::Error::builder()
            .message("forbidden")
            .extension_code("FORBIDDEN")
            .build();
        let error = from_resolver_error(Box::new(custom), &path, vec![location]);
        assert_eq!(error.message, "forbidden");
        assert_eq!(error.extension_code().as_deref(), Some("FORBIDDEN"));
        assert_eq!(error.path, Some(path.clone()));
        assert_eq!(error.locations, vec![location]);

        let error = from_resolver_error("boom".into(), &path, vec![location]);
        assert_eq!(error.message, "boom");
        assert_eq!(error.extension_code(), None);
    }
}
