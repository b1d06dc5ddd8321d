//! The executor: builds operation contexts from raw requests and dispatches them through the
//! interceptor chains.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use futures::future::ready;
use futures::stream;
use futures::StreamExt;
use tower::BoxError;
use tower::ServiceBuilder;
use tower::ServiceExt;

use crate::cache::coalescing::DedupCache;
use crate::cache::InMemoryCache;
use crate::cache::LruQueryCache;
use crate::cache::QueryCache;
use crate::error::BuildError;
use crate::error::ConfigurationError;
use crate::error::ExecutionError;
use crate::error::from_interceptor_error;
use crate::extension::Extension;
use crate::extension::Extensions;
use crate::graphql;
use crate::graphql::ErrorExtension;
use crate::graphql::ResponseStream;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::layers::ServiceBuilderExt;
use crate::plugin::FieldServicePlugin;
use crate::plugin::OperationServicePlugin;
use crate::plugin::Plugin;
use crate::plugin::ResponseServicePlugin;
use crate::plugin::RootFieldServicePlugin;
use crate::resolver::Resolvers;
use crate::services::field;
use crate::services::operation;
use crate::services::response;
use crate::services::root_field;
use crate::spec::variables::coerce_variables;
use crate::spec::OperationKind;
use crate::spec::Query;
use crate::spec::Schema;
use crate::spec::SpecError;
use crate::spec::GRAPHQL_VALIDATION_FAILURE_ERROR_KEY;
use crate::Configuration;
use crate::Context;
use crate::OperationContext;
use crate::Stats;
use crate::TraceTiming;

pub(crate) mod execution;
#[cfg(test)]
mod tests;

type ErrorPresenter = dyn Fn(&Context, graphql::Error) -> graphql::Error + Send + Sync;

/// Executes GraphQL requests against a schema.
///
/// Cloning is cheap: clones share the document cache, extensions and resolvers.
#[derive(Clone)]
pub struct Executor {
    schema: Arc<Schema>,
    configuration: Arc<Configuration>,
    cache: DedupCache,
    extensions: Arc<Extensions>,
    resolvers: Arc<Resolvers>,
    root_value: Arc<Value>,
    error_presenter: Option<Arc<ErrorPresenter>>,
    disable_suggestion: bool,
}

/// Builder for [`Executor`].
// Not using buildstructor because the interceptor registrations have non-trivial signatures
// and their order matters
pub struct ExecutorBuilder {
    schema: Arc<Schema>,
    configuration: Option<Configuration>,
    query_cache: Option<Arc<dyn QueryCache<Arc<Query>>>>,
    extensions: Extensions,
    resolvers: Resolvers,
    root_value: Value,
    error_presenter: Option<Arc<ErrorPresenter>>,
    disable_suggestion: bool,
}

impl ExecutorBuilder {
    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Replaces the document cache. Defaults to an unbounded [`InMemoryCache`], or an
    /// [`LruQueryCache`] when `query_cache.limit` is configured.
    pub fn with_query_cache(mut self, cache: Arc<dyn QueryCache<Arc<Query>>>) -> Self {
        self.query_cache = Some(cache);
        self
    }

    /// Registers an extension. Its capabilities are invoked in registration order.
    pub fn extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.register(extension);
        self
    }

    /// Registers an interceptor. The first registered plugin is the outermost.
    pub fn plugin(mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        self.extensions.register_plugin(name.into(), plugin);
        self
    }

    /// Adds a callback-based hook similar to [`Plugin::operation_service`].
    pub fn around_operations(
        self,
        callback: impl Fn(operation::BoxService) -> operation::BoxService + Send + Sync + 'static,
    ) -> Self {
        self.plugin("around_operations", Arc::new(OperationServicePlugin(callback)))
    }

    /// Adds a callback-based hook similar to [`Plugin::response_service`].
    pub fn around_responses(
        self,
        callback: impl Fn(response::BoxService) -> response::BoxService + Send + Sync + 'static,
    ) -> Self {
        self.plugin("around_responses", Arc::new(ResponseServicePlugin(callback)))
    }

    /// Adds a callback-based hook similar to [`Plugin::root_field_service`].
    pub fn around_root_fields(
        self,
        callback: impl Fn(root_field::BoxService) -> root_field::BoxService + Send + Sync + 'static,
    ) -> Self {
        self.plugin(
            "around_root_fields",
            Arc::new(RootFieldServicePlugin(callback)),
        )
    }

    /// Adds a callback-based hook similar to [`Plugin::field_service`].
    pub fn around_fields(
        self,
        callback: impl Fn(field::BoxService) -> field::BoxService + Send + Sync + 'static,
    ) -> Self {
        self.plugin("around_fields", Arc::new(FieldServicePlugin(callback)))
    }

    /// Validates documents without "did you mean" suggestions, whatever the configuration says.
    pub fn disable_suggestion(mut self, disable: bool) -> Self {
        self.disable_suggestion = disable;
        self
    }

    /// Rewrites every error before it is recorded.
    pub fn error_presenter(
        mut self,
        presenter: impl Fn(&Context, graphql::Error) -> graphql::Error + Send + Sync + 'static,
    ) -> Self {
        self.error_presenter = Some(Arc::new(presenter));
        self
    }

    pub fn with_resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// The parent value of root fields. Defaults to an empty object.
    pub fn root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }

    pub fn build(self) -> Result<Executor, BuildError> {
        let configuration = self.configuration.unwrap_or_default().validate()?;
        self.extensions.validate(&self.schema)?;

        let storage = match self.query_cache {
            Some(cache) => cache,
            None => match configuration.query_cache.limit {
                Some(limit) => {
                    let capacity = NonZeroUsize::new(limit).ok_or(
                        ConfigurationError::InvalidConfiguration {
                            message: "query_cache.limit",
                            error: "must be greater than 0 when set".to_string(),
                        },
                    )?;
                    Arc::new(LruQueryCache::<Arc<Query>>::new(capacity))
                        as Arc<dyn QueryCache<Arc<Query>>>
                }
                None => Arc::new(InMemoryCache::<Arc<Query>>::new()),
            },
        };

        let disable_suggestion = self.disable_suggestion || !configuration.validation.suggestions;
        Ok(Executor {
            schema: self.schema,
            configuration: Arc::new(configuration),
            cache: DedupCache::new(storage),
            extensions: Arc::new(self.extensions),
            resolvers: Arc::new(self.resolvers),
            root_value: Arc::new(self.root_value),
            error_presenter: self.error_presenter,
            disable_suggestion,
        })
    }
}

impl Executor {
    pub fn builder(schema: impl Into<Arc<Schema>>) -> ExecutorBuilder {
        ExecutorBuilder {
            schema: schema.into(),
            configuration: None,
            query_cache: None,
            extensions: Extensions::default(),
            resolvers: Resolvers::default(),
            root_value: Value::Object(Object::new()),
            error_presenter: None,
            disable_suggestion: false,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Turns raw request parameters into an executable operation context.
    ///
    /// Runs the parameter mutators, looks the document up in the cache (parsing, validating and
    /// storing it on a miss), selects the operation, coerces the variables and finally runs the
    /// context mutators. The first failure aborts with the errors to report.
    #[tracing::instrument(skip_all, level = "trace")]
    pub async fn create_operation_context(
        &self,
        context: &Context,
        mut request: graphql::Request,
    ) -> Result<OperationContext, Vec<graphql::Error>> {
        let operation_start = Instant::now();
        for mutator in &self.extensions.parameter_mutators {
            mutator
                .mutate_parameters(context, &mut request)
                .await
                .map_err(|error| vec![error.or_extension_code(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)])?;
        }

        let read = request.read_time.unwrap_or_else(TraceTiming::now);
        let raw_query = request.query.take().unwrap_or_default();
        let disable_suggestion = self.disable_suggestion;
        let mut parsing = TraceTiming::now();
        let mut validation = parsing;
        let document = self
            .cache
            .get_or_build(&raw_query, || {
                let (query, parse_timing) =
                    TraceTiming::measure(|| Query::parse(raw_query.as_str(), &self.configuration));
                parsing = parse_timing;
                let query = query?;
                let (validated, validation_timing) =
                    TraceTiming::measure(|| query.validate(&self.schema, !disable_suggestion));
                validation = validation_timing;
                validated?;
                Ok(query)
            })
            .await
            .map_err(SpecError::into_graphql_errors)?;

        let operation_index = document
            .operation_index(request.operation_name.as_deref())
            .map_err(SpecError::into_graphql_errors)?;
        let variables = coerce_variables(
            &document.operations[operation_index],
            &request.variables,
            &self.schema,
        )?;

        let mut operation_context = OperationContext {
            raw_query,
            document,
            operation_index,
            operation_name: request.operation_name,
            variables,
            extensions: request.extensions,
            disable_suggestion,
            stats: Stats {
                operation_start,
                read,
                parsing,
                validation,
            },
        };

        for mutator in &self.extensions.context_mutators {
            mutator
                .mutate_context(context, &mut operation_context)
                .await
                .map_err(|error| vec![error.or_extension_code(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)])?;
        }

        Ok(operation_context)
    }

    /// Runs the operation through the operation chain.
    ///
    /// Nothing executes until the returned stream is polled.
    pub fn dispatch_operation(
        &self,
        context: Context,
        operation_context: OperationContext,
    ) -> (ResponseStream, Context) {
        let executor = self.clone();
        let terminal = tower::service_fn(move |request: operation::Request| {
            let executor = executor.clone();
            async move {
                let operation::Request {
                    context,
                    operation_context,
                } = request;
                let response_context = context.clone();
                let response = stream::once(async move {
                    executor
                        .respond(response_context, Some(operation_context))
                        .await
                })
                .boxed();
                Ok::<_, BoxError>(
                    operation::Response::builder()
                        .context(context)
                        .response(response)
                        .build(),
                )
            }
        });
        let service = self
            .extensions
            .plugins()
            .rev()
            .fold(terminal.boxed(), |acc, plugin| plugin.operation_service(acc));
        let service = ServiceBuilder::new()
            .instrument(|request: &operation::Request| {
                tracing::info_span!(
                    "operation",
                    graphql.operation.name = request
                        .operation_context
                        .operation_name
                        .as_deref()
                        .unwrap_or_default(),
                    graphql.operation.kind = %request.operation_context.operation().kind(),
                )
            })
            .service(service);

        let request = operation::Request::builder()
            .context(context.clone())
            .operation_context(Arc::new(operation_context))
            .build();
        let executor = self.clone();
        let error_context = context.clone();
        let stream = stream::once(async move {
            match service.oneshot(request).await {
                Ok(response) => response.response,
                Err(error) => {
                    let error = from_interceptor_error(error);
                    let response = executor.dispatch_error(error_context, vec![error]).await;
                    stream::once(ready(response)).boxed()
                }
            }
        })
        .flatten()
        .boxed();

        (stream, context)
    }

    /// Records `errors` and produces a response without data through the response chain.
    pub async fn dispatch_error(
        &self,
        context: Context,
        errors: Vec<graphql::Error>,
    ) -> graphql::Response {
        for error in errors {
            self.record_error(&context, error);
        }
        self.respond(context, None).await
    }

    /// Builds the operation context and dispatches it, or the errors that prevented it.
    pub async fn execute(&self, context: Context, request: graphql::Request) -> graphql::Response {
        match self.create_operation_context(&context, request).await {
            Ok(operation_context) => {
                let (mut stream, _context) = self.dispatch_operation(context, operation_context);
                stream.next().await.unwrap_or_default()
            }
            Err(errors) => self.dispatch_error(context, errors).await,
        }
    }

    /// Runs the response chain.
    async fn respond(
        &self,
        context: Context,
        operation_context: Option<Arc<OperationContext>>,
    ) -> graphql::Response {
        let executor = self.clone();
        let terminal = tower::service_fn(move |request: response::Request| {
            let executor = executor.clone();
            async move {
                let response = executor
                    .produce_response(&request.context, request.operation_context)
                    .await;
                Ok::<_, BoxError>(
                    response::Response::builder()
                        .context(request.context)
                        .response(response)
                        .build(),
                )
            }
        });
        let service = self
            .extensions
            .plugins()
            .rev()
            .fold(terminal.boxed(), |acc, plugin| plugin.response_service(acc));

        let request = response::Request::builder()
            .context(context.clone())
            .and_operation_context(operation_context)
            .build();
        match service.oneshot(request).await {
            Ok(response) => response.response,
            Err(error) => {
                self.record_error(&context, from_interceptor_error(error));
                graphql::Response::builder()
                    .errors(context.errors())
                    .extensions(context.response_extensions())
                    .build()
            }
        }
    }

    /// The terminal of the response chain.
    async fn produce_response(
        &self,
        context: &Context,
        operation_context: Option<Arc<OperationContext>>,
    ) -> graphql::Response {
        let data = match operation_context {
            None => None,
            Some(operation_context)
                if operation_context.operation().kind() == OperationKind::Subscription =>
            {
                self.record_error(
                    context,
                    SpecError::SubscriptionNotSupported.to_graphql_error(vec![
                        operation_context.operation().location,
                    ]),
                );
                None
            }
            Some(operation_context) => Some(self.run(context, operation_context).await),
        };

        graphql::Response::builder()
            .and_data(data)
            .errors(context.errors())
            .extensions(context.response_extensions())
            .build()
    }

    /// Executes the operation, racing cancellation and the configured timeout.
    ///
    /// Losing the race yields `null` data. Errors recorded before that point are kept, and the
    /// cancellation or timeout error is added after them.
    async fn run(&self, context: &Context, operation_context: Arc<OperationContext>) -> Value {
        let timeout = self.configuration.execution.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => futures::future::pending().await,
            }
        };
        let execution = execution::Execution {
            executor: self,
            context,
            operation_context: &operation_context,
        };

        tokio::select! {
            biased;

            _ = context.cancelled() => {
                tracing::debug!("request cancelled");
                self.record_error(context, ExecutionError::Cancelled.to_graphql_error(Vec::new()));
                Value::Null
            }
            _ = deadline => {
                tracing::debug!("request timed out");
                let error = ExecutionError::Timeout(timeout.unwrap_or_default());
                self.record_error(context, error.to_graphql_error(Vec::new()));
                Value::Null
            }
            data = execution.execute_operation() => data,
        }
    }

    pub(crate) fn record_error(&self, context: &Context, error: graphql::Error) {
        let error = match &self.error_presenter {
            Some(presenter) => presenter(context, error),
            None => error,
        };
        context.add_error(error);
    }
}
