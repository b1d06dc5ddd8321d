//! Interceptors.
//!
//! A [`Plugin`] wraps any of the four chains by returning a new service around the one it is
//! given. Plugins are applied in reverse registration order, so the first registered plugin sees
//! a request first and its response last. Returning a response without calling the inner service
//! short circuits the rest of the chain.

use crate::services::field;
use crate::services::operation;
use crate::services::response;
use crate::services::root_field;

/// Interception hooks. Every hook defaults to leaving the service untouched.
pub trait Plugin: Send + Sync + 'static {
    /// Wraps the execution of a prepared operation.
    fn operation_service(&self, service: operation::BoxService) -> operation::BoxService {
        service
    }

    /// Wraps the production of the final response, including pre-dispatch failures.
    fn response_service(&self, service: response::BoxService) -> response::BoxService {
        service
    }

    /// Wraps each top-level field.
    fn root_field_service(&self, service: root_field::BoxService) -> root_field::BoxService {
        service
    }

    /// Wraps each field resolution.
    fn field_service(&self, service: field::BoxService) -> field::BoxService {
        service
    }
}

pub(crate) struct OperationServicePlugin<F>(pub(crate) F);
pub(crate) struct ResponseServicePlugin<F>(pub(crate) F);
pub(crate) struct RootFieldServicePlugin<F>(pub(crate) F);
pub(crate) struct FieldServicePlugin<F>(pub(crate) F);

impl<F> Plugin for OperationServicePlugin<F>
where
    F: 'static + Send + Sync + Fn(operation::BoxService) -> operation::BoxService,
{
    fn operation_service(&self, service: operation::BoxService) -> operation::BoxService {
        (self.0)(service)
    }
}

impl<F> Plugin for ResponseServicePlugin<F>
where
    F: 'static + Send + Sync + Fn(response::BoxService) -> response::BoxService,
{
    fn response_service(&self, service: response::BoxService) -> response::BoxService {
        (self.0)(service)
    }
}

impl<F> Plugin for RootFieldServicePlugin<F>
where
    F: 'static + Send + Sync + Fn(root_field::BoxService) -> root_field::BoxService,
{
    fn root_field_service(&self, service: root_field::BoxService) -> root_field::BoxService {
        (self.0)(service)
    }
}

impl<F> Plugin for FieldServicePlugin<F>
where
    F: 'static + Send + Sync + Fn(field::BoxService) -> field::BoxService,
{
    fn field_service(&self, service: field::BoxService) -> field::BoxService {
        (self.0)(service)
    }
}
