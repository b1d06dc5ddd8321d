use std::sync::Arc;

use static_assertions::assert_impl_all;
use tower::BoxError;

use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::spec::FieldType;
use crate::Context;
use crate::OperationContext;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;

assert_impl_all!(Request: Send);
/// The execution of one top-level field, sub-selections included.
#[non_exhaustive]
pub struct Request {
    pub context: Context,

    pub operation_context: Arc<OperationContext>,

    /// The root operation type, e.g. `Query`.
    pub parent_type: String,

    pub field_name: String,

    /// The alias, or the field name.
    pub response_key: String,

    pub field_type: FieldType,

    pub path: Path,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(
        context: Context,
        operation_context: Arc<OperationContext>,
        parent_type: String,
        field_name: String,
        response_key: String,
        field_type: FieldType,
    ) -> Request {
        let path = Path::empty().join_key(response_key.as_str());
        Self {
            context,
            operation_context,
            parent_type,
            field_name,
            response_key,
            field_type,
            path,
        }
    }
}

assert_impl_all!(Response: Send);
#[non_exhaustive]
pub struct Response {
    pub context: Context,

    /// The completed value. Null when the field failed.
    pub value: Value,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(context: Context, value: Value) -> Response {
        Self { context, value }
    }
}
