//! Operation execution core for GraphQL servers.
//!
//! Takes raw request parameters through extension mutators, a document cache, validation and
//! operation selection, then dispatches the selected operation through four interceptor chains
//! (operation, response, root field, field) and assembles a response with correctly scoped errors.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod cache;
mod configuration;
mod context;
pub mod error;
mod executor;
pub mod extension;
pub mod graphql;
pub mod json_ext;
pub mod layers;
mod operation_context;
pub mod plugin;
pub mod resolver;
pub mod services;
pub mod spec;

pub use configuration::*;
pub use context::Context;
pub use executor::Executor;
pub use executor::ExecutorBuilder;
pub use operation_context::OperationContext;
pub use operation_context::Stats;
pub use operation_context::TraceTiming;
pub use spec::Schema;
