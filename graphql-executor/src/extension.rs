//! Extensions: validation against the schema at build time, and per-request mutators.
//!
//! An [`Extension`] advertises the capabilities it has. The executor sorts each registered
//! extension into the relevant lists once, at build time, and invokes them in registration
//! order for every request.

use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;

use crate::error::BuildError;
use crate::graphql;
use crate::plugin::Plugin;
use crate::spec::Schema;
use crate::Context;
use crate::OperationContext;

/// Rewrites the raw request parameters before the operation context is built.
#[async_trait]
pub trait ParameterMutator: Send + Sync + 'static {
    async fn mutate_parameters(
        &self,
        context: &Context,
        request: &mut graphql::Request,
    ) -> Result<(), graphql::Error>;
}

/// Adjusts the operation context after it was built and before dispatch.
#[async_trait]
pub trait ContextMutator: Send + Sync + 'static {
    async fn mutate_context(
        &self,
        context: &Context,
        operation_context: &mut OperationContext,
    ) -> Result<(), graphql::Error>;
}

/// An executor extension. Every capability is optional.
pub trait Extension: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Checks the extension can work with `schema`. Runs once when the executor is built.
    fn validate(&self, _schema: &Schema) -> Result<(), BoxError> {
        Ok(())
    }

    fn parameter_mutator(self: Arc<Self>) -> Option<Arc<dyn ParameterMutator>> {
        None
    }

    fn context_mutator(self: Arc<Self>) -> Option<Arc<dyn ContextMutator>> {
        None
    }

    /// Interceptors this extension contributes.
    fn plugin(self: Arc<Self>) -> Option<Arc<dyn Plugin>> {
        None
    }
}

/// The registered extensions, sorted by capability.
#[derive(Clone, Default)]
pub(crate) struct Extensions {
    extensions: Vec<Arc<dyn Extension>>,
    pub(crate) parameter_mutators: Vec<Arc<dyn ParameterMutator>>,
    pub(crate) context_mutators: Vec<Arc<dyn ContextMutator>>,
    pub(crate) plugins: Vec<(String, Arc<dyn Plugin>)>,
}

impl Extensions {
    pub(crate) fn register(&mut self, extension: Arc<dyn Extension>) {
        tracing::debug!(name = extension.name(), "registering extension");
        if let Some(mutator) = extension.clone().parameter_mutator() {
            self.parameter_mutators.push(mutator);
        }
        if let Some(mutator) = extension.clone().context_mutator() {
            self.context_mutators.push(mutator);
        }
        if let Some(plugin) = extension.clone().plugin() {
            self.plugins.push((extension.name().to_string(), plugin));
        }
        self.extensions.push(extension);
    }

    pub(crate) fn register_plugin(&mut self, name: String, plugin: Arc<dyn Plugin>) {
        tracing::debug!(%name, "registering plugin");
        self.plugins.push((name, plugin));
    }

    pub(crate) fn validate(&self, schema: &Schema) -> Result<(), BuildError> {
        self.extensions.iter().try_for_each(|extension| {
            extension
                .validate(schema)
                .map_err(|reason| BuildError::ExtensionValidation {
                    name: extension.name().to_string(),
                    reason,
                })
        })
    }

    pub(crate) fn plugins(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter().map(|(_, plugin)| plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Both;

    #[async_trait]
    impl ParameterMutator for Both {
        async fn mutate_parameters(
            &self,
            _context: &Context,
            _request: &mut graphql::Request,
        ) -> Result<(), graphql::Error> {
            Ok(())
        }
    }

    impl Extension for Both {
        fn name(&self) -> &str {
            "both"
        }

        fn validate(&self, schema: &Schema) -> Result<(), BoxError> {
            if schema.has_type("Secret") {
                Err("Secret must not be exposed".into())
            } else {
                Ok(())
            }
        }

        fn parameter_mutator(self: Arc<Self>) -> Option<Arc<dyn ParameterMutator>> {
            Some(self)
        }

        fn plugin(self: Arc<Self>) -> Option<Arc<dyn Plugin>> {
            Some(Arc::new(NoopPlugin))
        }
    }

    struct NoopPlugin;

    impl Plugin for NoopPlugin {}

    #[test]
    fn extensions_are_sorted_by_capability() {
        let mut extensions = Extensions::default();
        extensions.register(Arc::new(Both));

        assert_eq!(extensions.parameter_mutators.len(), 1);
        assert!(extensions.context_mutators.is_empty());
        assert_eq!(extensions.plugins.len(), 1);
        assert_eq!(extensions.plugins[0].0, "both");
    }

    #[test]
    fn validation_names_the_extension() {
        let mut extensions = Extensions::default();
        extensions.register(Arc::new(Both));

        let schema = Schema::parse("type Query { name: String } type Secret { id: ID }").unwrap();
        let error = extensions.validate(&schema).unwrap_err();
        assert_eq!(
            error.to_string(),
            "extension both rejected the schema: Secret must not be exposed"
        );
        assert!(extensions
            .validate(&Schema::parse("type Query { name: String }").unwrap())
            .is_ok());
    }
}
