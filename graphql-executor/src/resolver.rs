//! Field resolvers.
//!
//! Resolvers are registered per `(type, field)`. Fields without a resolver read the key of the
//! same name from the parent value, and `__typename` always resolves to the parent type name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;

use crate::json_ext::Value;
use crate::services::field;

/// Produces the value of one field. The executor completes it against the field type.
///
/// Returning a [`graphql::Error`](crate::graphql::Error) as the error keeps its message and
/// extensions in the response.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, request: field::Request) -> Result<Value, BoxError>;
}

#[async_trait]
impl<F, Fut> Resolver for F
where
    F: Fn(field::Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    async fn resolve(&self, request: field::Request) -> Result<Value, BoxError> {
        (self)(request).await
    }
}

/// Resolvers keyed by type name, then field name.
#[derive(Clone, Default)]
pub struct Resolvers {
    types: HashMap<String, HashMap<String, Arc<dyn Resolver>>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` for `type_name.field_name`, replacing any previous one.
    pub fn field(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: impl Resolver,
    ) -> Self {
        self.insert(type_name, field_name, Arc::new(resolver));
        self
    }

    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) {
        self.types
            .entry(type_name.into())
            .or_default()
            .insert(field_name.into(), resolver);
    }

    pub(crate) fn get(&self, type_name: &str, field_name: &str) -> Option<Arc<dyn Resolver>> {
        self.types.get(type_name)?.get(field_name).cloned()
    }
}

/// Reads `field_name` from the parent value.
pub(crate) fn property(parent: &Value, field_name: &str) -> Value {
    parent
        .as_object()
        .and_then(|object| object.get(field_name))
        .cloned()
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn lookup_by_type_and_field() {
        let resolvers = Resolvers::new()
            .field("Query", "name", |_request: field::Request| async {
                Ok::<_, BoxError>(Value::from("test"))
            })
            .field("User", "name", |_request: field::Request| async {
                Ok::<_, BoxError>(Value::from("user"))
            });

        assert!(resolvers.get("Query", "name").is_some());
        assert!(resolvers.get("User", "name").is_some());
        assert!(resolvers.get("Query", "user").is_none());
        assert!(resolvers.get("Post", "name").is_none());
    }

    #[test]
    fn property_reads_the_parent() {
        let parent = json!({ "name": "test" });
        assert_eq!(property(&parent, "name"), json!("test"));
        assert_eq!(property(&parent, "id"), Value::Null);
        assert_eq!(property(&Value::Null, "name"), Value::Null);
    }
}
