//! Runs a service's future inside a span built from the request.

use std::task::Context;
use std::task::Poll;

use tower::Layer;
use tower::Service;
use tracing::instrument::Instrumented;
use tracing::Instrument;
use tracing::Span;

/// Wraps services in [`InstrumentService`]. See [`ServiceBuilderExt::instrument()`](crate::layers::ServiceBuilderExt::instrument()).
#[derive(Clone)]
pub struct InstrumentLayer<F> {
    span_fn: F,
}

impl<F> InstrumentLayer<F> {
    pub fn new(span_fn: F) -> Self {
        Self { span_fn }
    }
}

impl<F, S> Layer<S> for InstrumentLayer<F>
where
    F: Clone,
{
    type Service = InstrumentService<F, S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentService {
            inner,
            span_fn: self.span_fn.clone(),
        }
    }
}

/// Enters the span returned by `span_fn` whenever the inner future is polled.
#[derive(Clone)]
pub struct InstrumentService<F, S> {
    inner: S,
    span_fn: F,
}

impl<F, S, Request> Service<Request> for InstrumentService<F, S>
where
    F: Fn(&Request) -> Span,
    S: Service<Request>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Instrumented<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let span = (self.span_fn)(&request);
        self.inner.call(request).instrument(span)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tower::BoxError;
    use tower::ServiceBuilder;
    use tower::ServiceExt;

    use crate::layers::ServiceBuilderExt;

    #[tokio::test]
    async fn builds_a_span_per_request() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let service = ServiceBuilder::new()
            .instrument(move |request: &&'static str| {
                recorded.lock().push(*request);
                tracing::info_span!("field", name = %request)
            })
            .service_fn(|request: &'static str| async move { Ok::<_, BoxError>(request.len()) });

        let length = service.clone().oneshot("name").await.unwrap();
        service.oneshot("email").await.unwrap();

        assert_eq!(length, 4);
        assert_eq!(*seen.lock(), vec!["name", "email"]);
    }
}
