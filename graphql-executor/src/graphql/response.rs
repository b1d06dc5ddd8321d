use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A GraphQL response.
///
/// `data` is absent when the operation never started executing, and `null` when a non-null root
/// field failed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: Map<ByteString, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// append_errors adds the given errors at the end of the error list.
    pub fn append_errors(&mut self, errors: &mut Vec<Error>) {
        self.errors.append(errors)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::graphql::Location;
    use crate::json_ext::Path;

    #[test]
    fn explicit_null_data_is_serialized() {
        let response = Response::builder()
            .data(Value::Null)
            .error(
                Error::builder()
                    .message("Cannot return null for non-nullable field Query.name.")
                    .location(Location { line: 1, column: 3 })
                    .path(Path::from("name"))
                    .build(),
            )
            .build();
        assert_eq!(
            serde_json_bytes::to_value(&response).unwrap(),
            json!({
                "data": null,
                "errors": [{
                    "message": "Cannot return null for non-nullable field Query.name.",
                    "locations": [{ "line": 1, "column": 3 }],
                    "path": ["name"]
                }]
            })
        );
    }

    #[test]
    fn absent_data_is_omitted() {
        let response = Response::builder()
            .error(Error::builder().message("invalid").build())
            .extension("tracing", json!({ "version": 1 }))
            .build();
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"errors":[{"message":"invalid"}],"extensions":{"tracing":{"version":1}}}"#
        );
    }
}
