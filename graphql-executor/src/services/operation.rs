use std::sync::Arc;

use futures::stream;
use futures::StreamExt;
use static_assertions::assert_impl_all;
use tower::BoxError;

use crate::graphql;
use crate::graphql::ResponseStream;
use crate::Context;
use crate::OperationContext;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;

assert_impl_all!(Request: Send);
/// The execution of one prepared operation.
#[non_exhaustive]
pub struct Request {
    pub context: Context,

    pub operation_context: Arc<OperationContext>,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(context: Context, operation_context: Arc<OperationContext>) -> Request {
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

    /// Lazy: the operation executes when the stream is polled.
    pub response: ResponseStream,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(context: Context, response: ResponseStream) -> Response {
        Self { context, response }
    }

    /// A response made of a single, already available GraphQL response.
    ///
    /// Useful for interceptors that short circuit the operation.
    #[builder(visibility = "pub")]
    fn single_new(context: Context, response: graphql::Response) -> Response {
        Self {
            context,
            response: stream::once(async move { response }).boxed(),
        }
    }

    /// Applies `f` to every response of the stream.
    pub fn map_stream<F>(self, f: F) -> Self
    where
        F: FnMut(graphql::Response) -> graphql::Response + Send + 'static,
    {
        Response {
            context: self.context,
            response: self.response.map(f).boxed(),
        }
    }
}
