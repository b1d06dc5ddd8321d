use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json_bytes::json;
use test_log::test;
use tower::BoxError;
use tower::ServiceBuilder;
use tower::ServiceExt;

use super::*;
use crate::cache::InMemoryCache;
use crate::extension::ContextMutator;
use crate::extension::ParameterMutator;
use crate::services::field;

const SCHEMA: &str = r#"
type Query {
    name: String!
    nickname: String
}

type Mutation {
    name: String!
}
"#;

fn resolvers() -> Resolvers {
    Resolvers::new().field("Query", "name", |_request: field::Request| async {
        Ok::<_, BoxError>(Value::from("test"))
    })
}

fn executor() -> ExecutorBuilder {
    Executor::builder(Schema::parse(SCHEMA).unwrap()).with_resolvers(resolvers())
}

fn request(query: &str) -> graphql::Request {
    graphql::Request::builder().query(query).build()
}

#[test(tokio::test)]
async fn calls_the_resolver() {
    let executor = executor().build().unwrap();

    let response = executor.execute(Context::new(), request("{name}")).await;

    assert_eq!(response.data, Some(json!({ "name": "test" })));
    assert!(response.errors.is_empty());
}

#[test(tokio::test)]
async fn empty_query_is_rejected_before_dispatch() {
    let executor = executor().build().unwrap();

    let response = executor.execute(Context::new(), request("")).await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "Must provide query string.");
    assert_eq!(
        response.errors[0].extension_code().as_deref(),
        Some(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)
    );
}

#[test(tokio::test)]
async fn unknown_operation_name_is_rejected() {
    let executor = executor().build().unwrap();

    let response = executor
        .execute(
            Context::new(),
            graphql::Request::builder()
                .query("query Foo {name}")
                .operation_name("badOp")
                .build(),
        )
        .await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].extension_code().as_deref(),
        Some(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)
    );
}

#[test(tokio::test)]
async fn unparsable_queries_fail_the_same_way_every_time() {
    let executor = executor().build().unwrap();

    let first = executor.execute(Context::new(), request("invalid")).await;
    let second = executor.execute(Context::new(), request("invalid")).await;

    assert_eq!(first.data, None);
    assert_eq!(first.errors.len(), 1);
    assert_eq!(
        first.errors[0].extension_code().as_deref(),
        Some(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)
    );
    assert_eq!(first.errors, second.errors);
}

#[test(tokio::test)]
async fn interceptors_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut builder = executor();
    for (chain, order) in [
        ("operation", "first"),
        ("operation", "second"),
        ("response", "first"),
        ("response", "second"),
        ("root_field", "first"),
        ("root_field", "second"),
        ("field", "first"),
        ("field", "second"),
    ] {
        let entry = format!("{chain}:{order}");
        let log = log.clone();
        let push = move || log.lock().push(entry.clone());
        builder = match chain {
            "operation" => builder.around_operations(move |service| {
                let push = push.clone();
                ServiceBuilder::new()
                    .map_request(move |request: operation::Request| {
                        push();
                        request
                    })
                    .service(service)
                    .boxed()
            }),
            "response" => builder.around_responses(move |service| {
                let push = push.clone();
                ServiceBuilder::new()
                    .map_request(move |request: response::Request| {
                        push();
                        request
                    })
                    .service(service)
                    .boxed()
            }),
            "root_field" => builder.around_root_fields(move |service| {
                let push = push.clone();
                ServiceBuilder::new()
                    .map_request(move |request: root_field::Request| {
                        push();
                        request
                    })
                    .service(service)
                    .boxed()
            }),
            _ => builder.around_fields(move |service| {
                let push = push.clone();
                ServiceBuilder::new()
                    .map_request(move |request: field::Request| {
                        push();
                        request
                    })
                    .service(service)
                    .boxed()
            }),
        };
    }
    let executor = builder.build().unwrap();

    let response = executor.execute(Context::new(), request("{name}")).await;
    assert_eq!(response.data, Some(json!({ "name": "test" })));

    assert_eq!(
        *log.lock(),
        vec![
            "operation:first",
            "operation:second",
            "response:first",
            "response:second",
            "root_field:first",
            "root_field:second",
            "field:first",
            "field:second",
        ]
    );
}

struct Recorder {
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ParameterMutator for Recorder {
    async fn mutate_parameters(
        &self,
        _context: &Context,
        request: &mut graphql::Request,
    ) -> Result<(), graphql::Error> {
        self.log.lock().push("param");
        request.query = Some("{ name }".to_string());
        Ok(())
    }
}

#[async_trait]
impl ContextMutator for Recorder {
    async fn mutate_context(
        &self,
        _context: &Context,
        operation_context: &mut OperationContext,
    ) -> Result<(), graphql::Error> {
        self.log.lock().push("context");
        assert_eq!(operation_context.raw_query, "{ name }");
        Ok(())
    }
}

impl Extension for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn parameter_mutator(self: Arc<Self>) -> Option<Arc<dyn ParameterMutator>> {
        Some(self)
    }

    fn context_mutator(self: Arc<Self>) -> Option<Arc<dyn ContextMutator>> {
        Some(self)
    }
}

#[test(tokio::test)]
async fn parameter_mutators_run_before_context_mutators() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = executor()
        .extension(Arc::new(Recorder { log: log.clone() }))
        .build()
        .unwrap();

    let response = executor
        .execute(Context::new(), request("{ nickname }"))
        .await;

    assert_eq!(*log.lock(), vec!["param", "context"]);
    assert_eq!(response.data, Some(json!({ "name": "test" })));
}

struct Rejecting;

#[async_trait]
impl ParameterMutator for Rejecting {
    async fn mutate_parameters(
        &self,
        _context: &Context,
        _request: &mut graphql::Request,
    ) -> Result<(), graphql::Error> {
        Err(graphql::Error::builder().message("rejected").build())
    }
}

impl Extension for Rejecting {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn parameter_mutator(self: Arc<Self>) -> Option<Arc<dyn ParameterMutator>> {
        Some(self)
    }
}

#[test(tokio::test)]
async fn parameter_mutator_errors_are_validation_failures() {
    let executor = executor().extension(Arc::new(Rejecting)).build().unwrap();

    let response = executor.execute(Context::new(), request("{name}")).await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "rejected");
    assert_eq!(
        response.errors[0].extension_code().as_deref(),
        Some(GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)
    );
}

#[test(tokio::test)]
async fn response_interceptors_see_preparation_errors() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();
    let executor = executor()
        .around_responses(move |service| {
            let captured = captured.clone();
            ServiceBuilder::new()
                .map_response(move |response: response::Response| {
                    captured.lock().push((
                        response.context.error_count(),
                        response.response.errors.len(),
                    ));
                    response
                })
                .service(service)
                .boxed()
        })
        .build()
        .unwrap();

    let response = executor
        .execute(
            Context::new(),
            graphql::Request::builder()
                .query("query Foo {name}")
                .operation_name("badOp")
                .build(),
        )
        .await;

    assert_eq!(response.errors.len(), 1);
    assert_eq!(*seen.lock(), vec![(1, 1)]);
}

#[test(tokio::test)]
async fn documents_are_cached_by_raw_query() {
    let cache = Arc::new(InMemoryCache::<Arc<Query>>::new());
    let executor = executor().with_query_cache(cache.clone()).build().unwrap();

    let response = executor
        .execute(Context::new(), request("query Foo {name}"))
        .await;
    assert!(response.errors.is_empty());

    let cached = cache.get("query Foo {name}").await.unwrap();
    assert_eq!(cached.operations()[0].name(), Some("Foo"));
}

#[test(tokio::test)]
async fn cached_documents_are_used() {
    let cache = Arc::new(InMemoryCache::<Arc<Query>>::new());
    let parsed = Query::parse("query Bar {name}", &Configuration::default()).unwrap();
    cache
        .add("query Foo {name}".to_string(), Arc::new(parsed))
        .await;
    let executor = executor().with_query_cache(cache).build().unwrap();

    let response = executor
        .execute(
            Context::new(),
            graphql::Request::builder()
                .query("query Foo {name}")
                .operation_name("Bar")
                .build(),
        )
        .await;

    assert!(response.errors.is_empty());
    assert_eq!(response.data, Some(json!({ "name": "test" })));
}

#[test(tokio::test)]
async fn stats_are_zero_length_for_cached_documents() {
    let executor = executor().build().unwrap();
    let context = Context::new();

    let first = executor
        .create_operation_context(&context, request("{name}"))
        .await
        .unwrap();
    let second = executor
        .create_operation_context(&context, request("{name}"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(first.document(), second.document()));
    assert_eq!(second.stats.parsing.duration(), Duration::ZERO);
    assert_eq!(second.stats.validation.duration(), Duration::ZERO);
    assert!(first.stats.operation_start <= first.stats.parsing.start);
}

#[test(tokio::test)]
async fn validation_errors_suggest_field_names() {
    let executor = executor().build().unwrap();

    let response = executor.execute(Context::new(), request("{nam}")).await;

    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        r#"Cannot query field "nam" on type "Query". Did you mean "name"?"#
    );
    assert_eq!(
        response.errors[0].locations,
        vec![graphql::Location { line: 1, column: 2 }]
    );
}

#[test(tokio::test)]
async fn suggestions_can_be_disabled() {
    let executor = executor().disable_suggestion(true).build().unwrap();

    let response = executor.execute(Context::new(), request("{nam}")).await;

    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        r#"Cannot query field "nam" on type "Query"."#
    );

    let repeated = executor.execute(Context::new(), request("{nam}")).await;
    assert_eq!(repeated.errors, response.errors);

    let operation_context = executor
        .create_operation_context(&Context::new(), request("{name}"))
        .await
        .unwrap();
    assert!(operation_context.disable_suggestion());
}

#[test(tokio::test)]
async fn non_null_root_failure_nulls_data() {
    let executor = executor()
        .with_resolvers(Resolvers::new().field(
            "Query",
            "name",
            |_request: field::Request| async {
                Err::<Value, _>(BoxError::from("resolver failed"))
            },
        ))
        .build()
        .unwrap();

    let response = executor.execute(Context::new(), request("{name}")).await;

    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "resolver failed");
    assert_eq!(
        response.errors[0].path,
        Some(crate::json_ext::Path::from("name"))
    );
}

#[test(tokio::test)]
async fn subscriptions_are_not_executed() {
    let schema = Schema::parse(
        "type Query { name: String } type Subscription { ticks: Int } \
         schema { query: Query subscription: Subscription }",
    )
    .unwrap();
    let executor = Executor::builder(schema).build().unwrap();

    let response = executor
        .execute(Context::new(), request("subscription { ticks }"))
        .await;

    assert_eq!(response.data, None);
    assert_eq!(
        response.errors[0].extension_code().as_deref(),
        Some("SUBSCRIPTION_NOT_SUPPORTED")
    );
}

#[test]
fn zero_cache_limit_is_rejected() {
    let configuration = Configuration::from_yaml("query_cache:\n  limit: 0\n");
    let error = match configuration {
        Ok(configuration) => executor()
            .with_configuration(configuration)
            .build()
            .err()
            .map(|error| error.to_string()),
        Err(error) => Some(error.to_string()),
    };
    assert!(error.unwrap().contains("query_cache.limit"));
}

#[test(tokio::test)]
async fn response_interceptors_see_resolver_errors() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();
    let executor = executor()
        .with_resolvers(resolvers().field("Query", "nickname", |_request: field::Request| async {
            Err::<Value, _>(BoxError::from("nickname unavailable"))
        }))
        .around_responses(move |service| {
            let captured = captured.clone();
            ServiceBuilder::new()
                .map_response(move |response: response::Response| {
                    captured
                        .lock()
                        .push((response.context.errors(), response.response.errors.clone()));
                    response
                })
                .service(service)
                .boxed()
        })
        .build()
        .unwrap();

    let response = executor
        .execute(Context::new(), request("{ name nickname }"))
        .await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let (accumulated, returned) = &seen[0];
    assert_eq!(accumulated, returned);
    assert_eq!(returned, &response.errors);
    assert_eq!(returned[0].message, "nickname unavailable");
}

#[test(tokio::test)]
async fn nullable_root_failure_keeps_sibling_data() {
    let executor = executor()
        .with_resolvers(resolvers().field("Query", "nickname", |_request: field::Request| async {
            Err::<Value, _>(BoxError::from("nickname unavailable"))
        }))
        .build()
        .unwrap();

    let response = executor
        .execute(Context::new(), request("{ name nickname }"))
        .await;

    assert_eq!(response.data, Some(json!({ "name": "test", "nickname": null })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].path,
        Some(crate::json_ext::Path::from("nickname"))
    );
}
