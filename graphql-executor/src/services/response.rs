use std::sync::Arc;

use static_assertions::assert_impl_all;
use tower::BoxError;

use crate::graphql;
use crate::Context;
use crate::OperationContext;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;

assert_impl_all!(Request: Send);
/// The production of the final response.
///
/// `operation_context` is absent when the request failed before dispatch. The errors recorded in
/// `context` so far end up in the response.
#[non_exhaustive]
pub struct Request {
    pub context: Context,

    pub operation_context: Option<Arc<OperationContext>>,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(context: Context, operation_context: Option<Arc<OperationContext>>) -> Request {
        Self {
            context,
            operation_context,
        }
    }
}

assert_impl_all!(Response: Send);
#[non_exhaustive]
pub struct Response {
    pub context: Context,

    pub response: graphql::Response,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(context: Context, response: graphql::Response) -> Response {
        Self { context, response }
    }
}
