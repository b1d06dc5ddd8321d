//! The request and response types of the four interceptor chains.
//!
//! Each chain is a tower [`Service`](tower::Service) that [`Plugin`](crate::plugin::Plugin)s wrap:
//!
//! * [`operation`]: the whole execution of one request,
//! * [`response`]: production of the final response, including pre-dispatch failures,
//! * [`root_field`]: each top-level field,
//! * [`field`]: each field resolution at any depth.

pub use self::field::Request as FieldRequest;
pub use self::field::Response as FieldResponse;
pub use self::operation::Request as OperationRequest;
pub use self::operation::Response as OperationResponse;
pub use self::response::Request as ResponseRequest;
pub use self::response::Response as ResponseResponse;
pub use self::root_field::Request as RootFieldRequest;
pub use self::root_field::Response as RootFieldResponse;

pub mod field;
pub mod operation;
pub mod response;
pub mod root_field;
