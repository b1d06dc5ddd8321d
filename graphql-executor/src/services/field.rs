use std::sync::Arc;

use static_assertions::assert_impl_all;
use tower::BoxError;

use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::spec::FieldType;
use crate::Context;
use crate::OperationContext;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;

assert_impl_all!(Request: Send);
/// The resolution of one field at any depth.
///
/// An error returned by this service is recorded at `path` and the field becomes null.
#[non_exhaustive]
pub struct Request {
    pub context: Context,

    pub operation_context: Arc<OperationContext>,

    /// The object type the field is selected on.
    pub parent_type: String,

    pub field_name: String,

    /// The alias, or the field name.
    pub response_key: String,

    /// Coerced argument values.
    pub arguments: Object,

    /// The value of the parent object, or the root value for root fields.
    pub parent: Arc<Value>,

    pub field_type: FieldType,

    pub path: Path,

    pub location: Location,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    #[allow(clippy::too_many_arguments)]
    fn new(
        context: Context,
        operation_context: Arc<OperationContext>,
        parent_type: String,
        field_name: String,
        response_key: String,
        arguments: Object,
        parent: Arc<Value>,
        field_type: FieldType,
        path: Path,
        location: Location,
    ) -> Request {
        Self {
            context,
            operation_context,
            parent_type,
            field_name,
            response_key,
            arguments,
            parent,
            field_type,
            path,
            location,
        }
    }

    /// Deserializes the argument `name`, if provided.
    pub fn argument<T>(&self, name: &str) -> Result<Option<T>, BoxError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        self.arguments
            .get(name)
            .map(|value| serde_json_bytes::from_value(value.clone()))
            .transpose()
            .map_err(|e| e.into())
    }
}

assert_impl_all!(Response: Send);
#[non_exhaustive]
pub struct Response {
    pub context: Context,

    /// The resolved value, completed against `field_type` by the executor.
    pub value: Value,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(context: Context, value: Value) -> Response {
        Self { context, value }
    }
}
