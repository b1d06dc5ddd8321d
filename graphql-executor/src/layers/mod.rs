//! Reusable layers for building interceptors.
use std::ops::ControlFlow;

use tower::layer::util::Stack;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tracing::Span;

use crate::layers::instrument::InstrumentLayer;
use crate::layers::sync_checkpoint::CheckpointLayer;

pub mod instrument;
pub mod sync_checkpoint;

/// Extension to the [`ServiceBuilder`] trait to make it easy to add executor specific
/// capabilities (e.g.: checkpoints) to a [`Service`].
#[allow(clippy::type_complexity)]
pub trait ServiceBuilderExt<L>: Sized {
    /// Decide if processing should continue or not, and if not allow returning of a response.
    ///
    /// This is useful for validation functionality where you want to abort processing but return a
    /// valid response.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use std::ops::ControlFlow;
    /// # use tower::ServiceBuilder;
    /// # use graphql_executor::services::response;
    /// # use graphql_executor::layers::ServiceBuilderExt;
    /// # fn test(service: response::BoxService) {
    /// let _ = ServiceBuilder::new()
    ///     .checkpoint(|req: response::Request| {
    ///         if req.operation_context.is_none() {
    ///             Ok(ControlFlow::Break(response::Response::builder()
    ///                 .context(req.context)
    ///                 .response(Default::default())
    ///                 .build()))
    ///         } else {
    ///             Ok(ControlFlow::Continue(req))
    ///         }
    ///     })
    ///     .service(service);
    /// # }
    /// ```
    fn checkpoint<S, Request>(
        self,
        checkpoint_fn: impl Fn(
                Request,
            ) -> Result<
                ControlFlow<<S as Service<Request>>::Response, Request>,
                <S as Service<Request>>::Error,
            > + Send
            + Sync
            + 'static,
    ) -> ServiceBuilder<Stack<CheckpointLayer<S, Request>, L>>
    where
        S: Service<Request> + Send + 'static,
        Request: Send + 'static,
        S::Future: Send,
        S::Response: Send + 'static,
        S::Error: Into<BoxError> + Send + 'static,
    {
        self.layer(CheckpointLayer::new(checkpoint_fn))
    }

    /// Place a span around the request.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tower::ServiceBuilder;
    /// # use tracing::info_span;
    /// # use graphql_executor::services::field;
    /// # use graphql_executor::layers::ServiceBuilderExt;
    /// # fn test(service: field::BoxService) {
    /// let instrumented = ServiceBuilder::new()
    ///     .instrument(|request: &field::Request| info_span!("field", name = %request.field_name))
    ///     .service(service);
    /// # }
    /// ```
    fn instrument<F, Request>(self, span_fn: F) -> ServiceBuilder<Stack<InstrumentLayer<F>, L>>
    where
        F: Fn(&Request) -> Span,
    {
        self.layer(InstrumentLayer::new(span_fn))
    }

    /// Adds a layer to the builder.
    fn layer<T>(self, layer: T) -> ServiceBuilder<Stack<T, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn layer<T>(self, layer: T) -> ServiceBuilder<Stack<T, L>> {
        ServiceBuilder::layer(self, layer)
    }
}
