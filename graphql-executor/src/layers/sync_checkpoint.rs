//! Synchronous Checkpoint.
//!
//! Provides a general mechanism for controlling the flow of a request. Useful in any situation
//! where the caller wishes to provide control flow for a request.
//!
//! If the evaluated closure succeeds then the request is passed onto the next service in the
//! chain of responsibilities. If it fails, then the control flow is broken and a response is
//! passed back to the invoking service.
//!
//! See [`Layer`] and [`Service`] for more details.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tower::BoxError;
use tower::Layer;
use tower::Service;

type CheckpointFn<S, Request> = Arc<
    dyn Fn(
            Request,
        ) -> Result<
            ControlFlow<<S as Service<Request>>::Response, Request>,
            <S as Service<Request>>::Error,
        > + Send
        + Sync
        + 'static,
>;

/// [`Layer`] for Synchronous Checkpoints. See [`ServiceBuilderExt::checkpoint()`](crate::layers::ServiceBuilderExt::checkpoint()).
pub struct CheckpointLayer<S, Request>
where
    S: Service<Request> + Send + 'static,
    Request: Send + 'static,
    S::Future: Send,
    S::Response: Send + 'static,
    S::Error: Into<BoxError> + Send + 'static,
{
    checkpoint_fn: CheckpointFn<S, Request>,
}

impl<S, Request> CheckpointLayer<S, Request>
where
    S: Service<Request> + Send + 'static,
    Request: Send + 'static,
    S::Future: Send,
    S::Response: Send + 'static,
    S::Error: Into<BoxError> + Send + 'static,
{
    /// Create a `CheckpointLayer` from a function that takes a Service Request and returns a `ControlFlow`
    pub fn new(
        checkpoint_fn: impl Fn(
                Request,
            ) -> Result<
                ControlFlow<<S as Service<Request>>::Response, Request>,
                <S as Service<Request>>::Error,
            > + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            checkpoint_fn: Arc::new(checkpoint_fn),
        }
    }
}

impl<S, Request> Layer<S> for CheckpointLayer<S, Request>
where
    S: Service<Request> + Send + 'static,
    <S as Service<Request>>::Future: Send + 'static,
    Request: Send + 'static,
    <S as Service<Request>>::Response: Send + 'static,
    <S as Service<Request>>::Error: Into<BoxError> + Send + 'static,
{
    type Service = CheckpointService<S, Request>;

    fn layer(&self, service: S) -> Self::Service {
        CheckpointService {
            checkpoint_fn: self.checkpoint_fn.clone(),
            inner: service,
        }
    }
}

/// [`Service`] for Synchronous Checkpoints. See [`ServiceBuilderExt::checkpoint()`](crate::layers::ServiceBuilderExt::checkpoint()).
pub struct CheckpointService<S, Request>
where
    Request: Send + 'static,
    S: Service<Request> + Send + 'static,
    <S as Service<Request>>::Error: Into<BoxError> + Send + 'static,
    <S as Service<Request>>::Response: Send + 'static,
    <S as Service<Request>>::Future: Send + 'static,
{
    inner: S,
    checkpoint_fn: CheckpointFn<S, Request>,
}

impl<S, Request> Service<Request> for CheckpointService<S, Request>
where
    S: Service<Request> + Send + 'static,
    <S as Service<Request>>::Future: Send + 'static,
    Request: Send + 'static,
    <S as Service<Request>>::Response: Send + 'static,
    <S as Service<Request>>::Error: Into<BoxError> + Send + 'static,
{
    type Response = <S as Service<Request>>::Response;

    type Error = <S as Service<Request>>::Error;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        match (self.checkpoint_fn)(req) {
            Ok(ControlFlow::Break(response)) => async move { Ok(response) }.boxed(),
            Ok(ControlFlow::Continue(request)) => self.inner.call(request).boxed(),
            Err(error) => async move { Err(error) }.boxed(),
        }
    }
}

#[cfg(test)]
mod checkpoint_tests {
    use test_log::test;
    use tower::ServiceBuilder;
    use tower::ServiceExt;

    use super::*;
    use crate::graphql;
    use crate::layers::ServiceBuilderExt;
    use crate::services::response;
    use crate::Context;

    fn terminal() -> response::BoxService {
        tower::service_fn(|request: response::Request| async move {
            Ok(response::Response::builder()
                .context(request.context)
                .response(
                    graphql::Response::builder()
                        .data(serde_json_bytes::json!({ "from": "inner" }))
                        .build(),
                )
                .build())
        })
        .boxed()
    }

    #[test(tokio::test)]
    async fn continue_calls_the_inner_service() {
        let service = ServiceBuilder::new()
            .checkpoint(|request: response::Request| Ok(ControlFlow::Continue(request)))
            .service(terminal());

        let response = service
            .oneshot(response::Request::builder().context(Context::new()).build())
            .await
            .unwrap();
        assert_eq!(
            response.response.data,
            Some(serde_json_bytes::json!({ "from": "inner" }))
        );
    }

    #[test(tokio::test)]
    async fn break_short_circuits() {
        let service = ServiceBuilder::new()
            .checkpoint(|request: response::Request| {
                Ok(ControlFlow::Break(
                    response::Response::builder()
                        .context(request.context)
                        .response(graphql::Response::default())
                        .build(),
                ))
            })
            .service(terminal());

        let response = service
            .oneshot(response::Request::builder().context(Context::new()).build())
            .await
            .unwrap();
        assert_eq!(response.response.data, None);
    }

    #[test(tokio::test)]
    async fn errors_are_returned() {
        let service = ServiceBuilder::new()
            .checkpoint(|_request: response::Request| Err(BoxError::from("rejected")))
            .service(terminal());

        let error = service
            .oneshot(response::Request::builder().context(Context::new()).build())
            .await
            .err()
            .unwrap();
        assert_eq!(error.to_string(), "rejected");
    }
}
