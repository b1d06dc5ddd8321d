//! Field collection, resolution and value completion.
//!
//! Completion returns `Err(InvalidValue)` only from non-null positions. Nullable positions absorb
//! it as `null`, which is how a failure bubbles up to the closest nullable ancestor.
//! `InvalidValue::reported` travels with it so each failure is recorded exactly once, whatever the
//! error presenter does to the recorded errors.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use tower::BoxError;
use tower::ServiceExt;

use super::Executor;
use crate::error::from_resolver_error;
use crate::error::ExecutionError;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::resolver::property;
use crate::services::field;
use crate::services::root_field;
use crate::spec::should_include;
use crate::spec::variables::coerce_arguments;
use crate::spec::Field;
use crate::spec::FieldType;
use crate::spec::OperationKind;
use crate::spec::Selection;
use crate::spec::TypeDefinition;
use crate::spec::TYPENAME;
use crate::Context;
use crate::OperationContext;

/// A value could not be completed and resolves to `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InvalidValue {
    /// An error describing the failure has been recorded.
    reported: bool,
}

impl InvalidValue {
    const REPORTED: InvalidValue = InvalidValue { reported: true };
    const UNREPORTED: InvalidValue = InvalidValue { reported: false };
}

/// Fields grouped by response key, in document order.
type GroupedFields<'a> = IndexMap<&'a str, Vec<&'a Field>>;

pub(crate) struct Execution<'a> {
    pub(crate) executor: &'a Executor,
    pub(crate) context: &'a Context,
    pub(crate) operation_context: &'a Arc<OperationContext>,
}

impl<'a> Execution<'a> {
    /// Executes the selected operation and returns its `data`.
    ///
    /// Query root fields run concurrently, mutation root fields one after the other. A mutation
    /// field that nulls `data` stops the remaining ones from running.
    #[tracing::instrument(skip_all, level = "trace")]
    pub(crate) async fn execute_operation(&self) -> Value {
        let operation = self.operation_context.operation();
        let Some(root_type) = self
            .executor
            .schema
            .root_operation_type(operation.kind())
        else {
            failfast_debug!("no root type for {} operations", operation.kind());
            return Value::Null;
        };
        let grouped = self.collect_fields(root_type, operation.selection_set().iter());

        let results = if operation.kind() == OperationKind::Mutation {
            let mut results = Vec::with_capacity(grouped.len());
            for (key, fields) in &grouped {
                let result = self.execute_root_field(root_type, key, fields).await;
                if result.is_err() {
                    return Value::Null;
                }
                results.push(result);
            }
            results
        } else {
            join_all(
                grouped
                    .iter()
                    .map(|(key, fields)| self.execute_root_field(root_type, key, fields)),
            )
            .await
        };

        let mut data = Object::with_capacity(results.len());
        for ((key, _), result) in grouped.iter().zip(results) {
            match result {
                Ok(value) => {
                    data.insert(*key, value);
                }
                Err(_) => return Value::Null,
            }
        }
        Value::Object(data)
    }

    /// Runs one root field through the root field chain.
    async fn execute_root_field(
        &self,
        root_type: &str,
        response_key: &str,
        fields: &[&Field],
    ) -> Result<Value, InvalidValue> {
        let field_name = fields[0].name.as_str();
        let path = Path::empty().join_key(response_key);
        let locations = vec![fields[0].location];
        if field_name == TYPENAME {
            return Ok(Value::String(root_type.into()));
        }
        let Some(field_type) = self.executor.schema.field_type(root_type, field_name) else {
            failfast_debug!("unknown root field {}.{}", root_type, field_name);
            return Ok(Value::Null);
        };

        let executor = self.executor.clone();
        let owned_fields: Vec<Field> = fields.iter().map(|field| (*field).clone()).collect();
        let reported = Arc::new(AtomicBool::new(false));
        let terminal_reported = reported.clone();
        let terminal = tower::service_fn(move |request: root_field::Request| {
            let executor = executor.clone();
            let fields = owned_fields.clone();
            let reported = terminal_reported.clone();
            async move {
                let execution = Execution {
                    executor: &executor,
                    context: &request.context,
                    operation_context: &request.operation_context,
                };
                let fields: Vec<&Field> = fields.iter().collect();
                let value = execution
                    .resolve_field(
                        &request.parent_type,
                        &fields,
                        executor.root_value.clone(),
                        request.path.clone(),
                    )
                    .await
                    .unwrap_or_else(|_| {
                        reported.store(true, Ordering::Relaxed);
                        Value::Null
                    });
                Ok::<_, BoxError>(
                    root_field::Response::builder()
                        .context(request.context.clone())
                        .value(value)
                        .build(),
                )
            }
        });
        let service = self
            .executor
            .extensions
            .plugins()
            .rev()
            .fold(terminal.boxed(), |acc, plugin| plugin.root_field_service(acc));

        let request = root_field::Request::builder()
            .context(self.context.clone())
            .operation_context(self.operation_context.clone())
            .parent_type(root_type)
            .field_name(field_name)
            .response_key(response_key)
            .field_type(field_type.clone())
            .build();
        let value = match service.oneshot(request).await {
            Ok(response) => response.value,
            Err(error) => {
                self.executor.record_error(
                    self.context,
                    from_resolver_error(error, &path, locations.clone()),
                );
                reported.store(true, Ordering::Relaxed);
                Value::Null
            }
        };

        if value.is_null() && field_type.is_non_null() {
            if !reported.load(Ordering::Relaxed) {
                self.null_for_non_null_field(root_type, field_name, &path, locations);
            }
            return Err(InvalidValue::REPORTED);
        }
        Ok(value)
    }

    /// Resolves and completes the fields sharing one response key.
    async fn resolve_field(
        &self,
        parent_type: &str,
        fields: &[&Field],
        parent: Arc<Value>,
        path: Path,
    ) -> Result<Value, InvalidValue> {
        let field = fields[0];
        if field.name == TYPENAME {
            return Ok(Value::String(parent_type.into()));
        }
        let schema = &self.executor.schema;
        let Some(definition) = schema.field(parent_type, &field.name) else {
            failfast_debug!("unknown field {}.{}", parent_type, field.name);
            return Ok(Value::Null);
        };
        let locations = vec![field.location];

        let resolved = match coerce_arguments(
            &definition.arguments,
            &field.arguments,
            &self.operation_context.variables,
            schema,
        ) {
            Ok(arguments) => {
                self.call_resolver(parent_type, field, arguments, parent, &definition.ty, &path)
                    .await
            }
            Err(message) => {
                self.executor.record_error(
                    self.context,
                    ExecutionError::InvalidArguments(message).at(&path, locations.clone()),
                );
                Err(InvalidValue::REPORTED)
            }
        };
        let (value, resolver_reported) = match resolved {
            Ok(value) => (value, false),
            Err(invalid) => (Value::Null, invalid.reported),
        };

        match self.complete_value(&definition.ty, fields, value, path.clone()).await {
            Ok(value) => Ok(value),
            Err(invalid) => {
                if !invalid.reported && !resolver_reported {
                    self.null_for_non_null_field(parent_type, &field.name, &path, locations);
                }
                Err(InvalidValue::REPORTED)
            }
        }
    }

    /// Runs the field chain down to the resolver. Failures are recorded before returning.
    async fn call_resolver(
        &self,
        parent_type: &str,
        field: &Field,
        arguments: Object,
        parent: Arc<Value>,
        field_type: &FieldType,
        path: &Path,
    ) -> Result<Value, InvalidValue> {
        let resolvers = self.executor.resolvers.clone();
        let terminal = tower::service_fn(move |request: field::Request| {
            let resolver = resolvers.get(&request.parent_type, &request.field_name);
            async move {
                let context = request.context.clone();
                let value = match resolver {
                    Some(resolver) => {
                        let path = request.path.clone();
                        match AssertUnwindSafe(resolver.resolve(request))
                            .catch_unwind()
                            .await
                        {
                            Ok(result) => result?,
                            Err(_) => {
                                failfast_error!("resolver panicked at {}", path);
                                return Err(BoxError::from(ExecutionError::Panic));
                            }
                        }
                    }
                    None => property(&request.parent, &request.field_name),
                };
                Ok::<_, BoxError>(
                    field::Response::builder()
                        .context(context)
                        .value(value)
                        .build(),
                )
            }
        });
        let service = self
            .executor
            .extensions
            .plugins()
            .rev()
            .fold(terminal.boxed(), |acc, plugin| plugin.field_service(acc));

        let request = field::Request::builder()
            .context(self.context.clone())
            .operation_context(self.operation_context.clone())
            .parent_type(parent_type)
            .field_name(field.name.as_str())
            .response_key(field.response_key())
            .arguments(arguments)
            .parent(parent)
            .field_type(field_type.clone())
            .path(path.clone())
            .location(field.location)
            .build();
        match service.oneshot(request).await {
            Ok(response) => Ok(response.value),
            Err(error) => {
                self.executor.record_error(
                    self.context,
                    from_resolver_error(error, path, vec![field.location]),
                );
                Err(InvalidValue::REPORTED)
            }
        }
    }

    /// Shapes `value` according to `field_type`.
    ///
    /// Only a non-null `field_type` yields `Err`. Nullable positions turn failures into `null`.
    fn complete_value<'b>(
        &'b self,
        field_type: &'b FieldType,
        fields: &'b [&'b Field],
        value: Value,
        path: Path,
    ) -> BoxFuture<'b, Result<Value, InvalidValue>> {
        async move {
            match field_type {
                FieldType::NonNull(_) if value.is_null() => Err(InvalidValue::UNREPORTED),
                FieldType::NonNull(inner) => self.complete_non_null(inner, fields, value, path).await,
                _ if value.is_null() => Ok(Value::Null),
                _ => Ok(self
                    .complete_non_null(field_type, fields, value, path)
                    .await
                    .unwrap_or(Value::Null)),
            }
        }
        .boxed()
    }

    /// Completes a value that is not `null`.
    async fn complete_non_null(
        &self,
        field_type: &FieldType,
        fields: &[&Field],
        value: Value,
        path: Path,
    ) -> Result<Value, InvalidValue> {
        let location = fields[0].location;
        match field_type {
            FieldType::NonNull(_) => self.complete_value(field_type, fields, value, path).await,
            FieldType::List(item_type) => {
                let items = match value {
                    Value::Array(items) => items,
                    single => vec![single],
                };
                let completed = join_all(items.into_iter().enumerate().map(|(index, item)| {
                    let item_path = path.join_index(index);
                    async move {
                        let result = self
                            .complete_value(item_type, fields, item, item_path.clone())
                            .await;
                        if matches!(result, Err(InvalidValue { reported: false })) {
                            self.executor.record_error(
                                self.context,
                                ExecutionError::NullValueForNonNullListItem {
                                    ty: item_type.to_string(),
                                    index,
                                }
                                .at(&item_path, vec![location]),
                            );
                        }
                        result
                    }
                }))
                .await;
                completed
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
                    .map_err(|_| InvalidValue::REPORTED)
            }
            FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => self.complete_leaf(field_type, value, &path, location),
            FieldType::Named(type_name) => match self.executor.schema.types.get(type_name) {
                Some(TypeDefinition::Object(_)) => {
                    self.complete_object(type_name, fields, value, path).await
                }
                Some(TypeDefinition::Interface(_) | TypeDefinition::Union(_)) => {
                    let received = value
                        .as_object()
                        .and_then(|object| object.get(TYPENAME))
                        .and_then(|typename| typename.as_str())
                        .unwrap_or_default()
                        .to_string();
                    if self.executor.schema.is_object(&received)
                        && self.executor.schema.is_subtype(type_name, &received)
                    {
                        self.complete_object(&received, fields, value, path).await
                    } else {
                        self.executor.record_error(
                            self.context,
                            ExecutionError::UnresolvedAbstractType {
                                abstract_type: type_name.clone(),
                                received,
                            }
                            .at(&path, vec![location]),
                        );
                        Err(InvalidValue::REPORTED)
                    }
                }
                Some(TypeDefinition::Enum(values)) => match value.as_str() {
                    Some(name) if values.iter().any(|variant| variant == name) => Ok(value),
                    _ => Err(self.invalid_leaf(type_name, &value, &path, location)),
                },
                // Custom scalars are serialized as returned
                Some(TypeDefinition::Scalar) => Ok(value),
                Some(TypeDefinition::InputObject(_)) | None => {
                    Err(self.invalid_leaf(type_name, &value, &path, location))
                }
            },
        }
    }

    fn complete_leaf(
        &self,
        field_type: &FieldType,
        value: Value,
        path: &Path,
        location: Location,
    ) -> Result<Value, InvalidValue> {
        let valid = match (field_type, &value) {
            (FieldType::String, Value::String(_)) => Some(value.clone()),
            (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (FieldType::Int, Value::Number(number)) => number
                .as_i64()
                .and_then(|int| i32::try_from(int).ok())
                .map(Value::from),
            (FieldType::Float, Value::Number(number)) => number.as_f64().map(Value::from),
            (FieldType::Id, Value::String(_)) => Some(value.clone()),
            (FieldType::Id, Value::Number(number)) if !number.is_f64() => {
                Some(Value::String(number.to_string().into()))
            }
            _ => None,
        };
        valid.ok_or_else(|| self.invalid_leaf(field_type.inner_type_name(), &value, path, location))
    }

    fn invalid_leaf(
        &self,
        type_name: &str,
        value: &Value,
        path: &Path,
        location: Location,
    ) -> InvalidValue {
        self.executor.record_error(
            self.context,
            ExecutionError::InvalidLeafValue {
                type_name: type_name.to_string(),
                value: value.to_string(),
            }
            .at(path, vec![location]),
        );
        InvalidValue::REPORTED
    }

    /// Executes the merged sub-selections of `fields` on an object of type `object_type`.
    async fn complete_object(
        &self,
        object_type: &str,
        fields: &[&Field],
        value: Value,
        path: Path,
    ) -> Result<Value, InvalidValue> {
        let parent = Arc::new(value);
        let grouped = self.collect_fields(
            object_type,
            fields.iter().flat_map(|field| field.selection_set.iter()),
        );
        let results = join_all(grouped.iter().map(|(key, fields)| {
            self.resolve_field(object_type, fields, parent.clone(), path.join_key(*key))
        }))
        .await;

        let mut object = Object::with_capacity(results.len());
        for ((key, _), result) in grouped.iter().zip(results) {
            object.insert(*key, result?);
        }
        Ok(Value::Object(object))
    }

    /// Groups the fields selected on `object_type` by response key, honoring `@skip`, `@include`
    /// and fragment type conditions.
    fn collect_fields<'b>(
        &'b self,
        object_type: &str,
        selections: impl Iterator<Item = &'b Selection>,
    ) -> GroupedFields<'b> {
        let mut grouped = GroupedFields::new();
        let mut visited_fragments = HashSet::new();
        self.collect_fields_into(object_type, selections, &mut grouped, &mut visited_fragments);
        grouped
    }

    fn collect_fields_into<'b>(
        &'b self,
        object_type: &str,
        selections: impl Iterator<Item = &'b Selection>,
        grouped: &mut GroupedFields<'b>,
        visited_fragments: &mut HashSet<&'b str>,
    ) {
        let variables = &self.operation_context.variables;
        let schema = &self.executor.schema;
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    if should_include(&field.directives, variables) {
                        grouped
                            .entry(field.response_key())
                            .or_default()
                            .push(field);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let applies = fragment
                        .type_condition
                        .as_deref()
                        .map(|condition| schema.does_fragment_type_apply(object_type, condition))
                        .unwrap_or(true);
                    if applies && should_include(&fragment.directives, variables) {
                        self.collect_fields_into(
                            object_type,
                            fragment.selection_set.iter(),
                            grouped,
                            visited_fragments,
                        );
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !should_include(&spread.directives, variables)
                        || !visited_fragments.insert(spread.fragment_name.as_str())
                    {
                        continue;
                    }
                    let Some(fragment) = self.operation_context.document.fragment(&spread.fragment_name)
                    else {
                        continue;
                    };
                    if schema.does_fragment_type_apply(object_type, &fragment.type_condition)
                        && should_include(&fragment.directives, variables)
                    {
                        self.collect_fields_into(
                            object_type,
                            fragment.selection_set.iter(),
                            grouped,
                            visited_fragments,
                        );
                    }
                }
            }
        }
    }

    fn null_for_non_null_field(
        &self,
        parent_type: &str,
        field_name: &str,
        path: &Path,
        locations: Vec<Location>,
    ) {
        self.executor.record_error(
            self.context,
            ExecutionError::NullValueForNonNullField {
                parent_type: parent_type.to_string(),
                field_name: field_name.to_string(),
            }
            .at(path, locations),
        );
    }
}
