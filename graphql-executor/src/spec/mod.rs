//! GraphQL schema, query documents, validation and input coercion.

mod field_type;
mod query;
mod schema;
mod selection;
pub(crate) mod suggestion;
pub(crate) mod validation;
pub(crate) mod variables;

use displaydoc::Display;
pub use field_type::FieldType;
pub use query::Fragment;
pub use query::Operation;
pub use query::OperationKind;
pub use query::Query;
pub use query::VariableDefinition;
pub use schema::Schema;
pub use schema::SchemaError;
pub(crate) use schema::TypeDefinition;
pub use selection::Argument;
pub use selection::Directive;
pub use selection::Field;
pub use selection::FragmentSpread;
pub use selection::InlineFragment;
pub use selection::InputValue;
pub use selection::Selection;
pub(crate) use selection::should_include;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
pub use variables::InputError;

use crate::graphql;
use crate::graphql::ErrorExtension;
use crate::graphql::Location;

/// The code of errors raised while parsing, validating or preparing an operation.
pub const GRAPHQL_VALIDATION_FAILURE_ERROR_KEY: &str = "GRAPHQL_VALIDATION_FAILED";

pub(crate) const TYPENAME: &str = "__typename";

/// GraphQL parsing and operation preparation errors.
#[derive(Error, Debug, Display, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum SpecError {
    /// Must provide query string.
    MissingQuery,
    /// parsing error: {message}
    ParsingError {
        message: String,
        location: Option<Location>,
    },
    /// validation error
    ValidationError(Vec<graphql::Error>),
    /// Must provide operation name if query contains multiple operations.
    MultipleOperationWithoutOperationName,
    /// operation {0} not found
    UnknownOperation(String),
    /// subscription operations are not supported
    SubscriptionNotSupported,
}

impl ErrorExtension for SpecError {
    fn extension_code(&self) -> String {
        match self {
            SpecError::SubscriptionNotSupported => "SUBSCRIPTION_NOT_SUPPORTED",
            SpecError::MissingQuery
            | SpecError::ParsingError { .. }
            | SpecError::ValidationError(_)
            | SpecError::MultipleOperationWithoutOperationName
            | SpecError::UnknownOperation(_) => GRAPHQL_VALIDATION_FAILURE_ERROR_KEY,
        }
        .to_string()
    }
}

impl SpecError {
    /// Converts into the errors reported to the client.
    pub fn into_graphql_errors(self) -> Vec<graphql::Error> {
        match self {
            SpecError::ValidationError(errors) => errors,
            SpecError::ParsingError { location, .. } => {
                vec![self.to_graphql_error(location.into_iter().collect())]
            }
            other => vec![other.to_graphql_error(Vec::new())],
        }
    }
}

/// A validation failure at the given locations.
pub(crate) fn validation_error(message: impl Into<String>, locations: Vec<Location>) -> graphql::Error {
    graphql::Error::builder()
        .message(message)
        .locations(locations)
        .extension_code(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_the_validation_code() {
        let errors = SpecError::UnknownOperation("badOp".to_string()).into_graphql_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "operation badOp not found");
        assert_eq!(
            errors[0].extension_code().as_deref(),
            Some(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)
        );

        let errors = SpecError::ParsingError {
            message: "expected a Name".to_string(),
            location: Some(Location { line: 1, column: 7 }),
        }
        .into_graphql_errors();
        assert_eq!(errors[0].message, "parsing error: expected a Name");
        assert_eq!(errors[0].locations, vec![Location { line: 1, column: 7 }]);

        let errors = SpecError::SubscriptionNotSupported.into_graphql_errors();
        assert_eq!(
            errors[0].extension_code().as_deref(),
            Some("SUBSCRIPTION_NOT_SUPPORTED")
        );
    }
}
