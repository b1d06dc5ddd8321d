//! Coercion of variable values and field arguments to their declared input types.

use displaydoc::Display;
use indexmap::IndexMap;
use thiserror::Error;

use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::schema::InputValueDefinition;
use crate::spec::schema::TypeDefinition;
use crate::spec::validation_error;
use crate::spec::Argument;
use crate::spec::FieldType;
use crate::spec::InputValue;
use crate::spec::Operation;
use crate::spec::Schema;

/// Reasons an input value does not fit its type.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InputError {
    /// {ty} cannot represent a {found} value
    ExpectedType { ty: String, found: String },
    /// Int cannot represent non 32-bit signed integer value: {0}
    IntRange(String),
    /// field "{field}" is not defined by type "{ty}"
    UnknownField { field: String, ty: String },
    /// field "{field}" of required type "{ty}" was not provided
    MissingField { field: String, ty: String },
    /// value "{value}" does not exist in "{enum_name}" enum
    UnknownEnumValue { value: String, enum_name: String },
    /// expected non-nullable type "{ty}" not to be null
    NullForNonNull { ty: String },
}

/// Coerces the request variables for `operation`, applying declared defaults.
///
/// Variables that are neither provided nor defaulted are left out of the result.
#[tracing::instrument(skip_all, level = "trace")]
pub(crate) fn coerce_variables(
    operation: &Operation,
    provided: &Object,
    schema: &Schema,
) -> Result<Object, Vec<graphql::Error>> {
    let unknown: Vec<&str> = provided
        .keys()
        .map(|key| key.as_str())
        .filter(|key| !operation.variables.contains_key(*key))
        .collect();
    if !unknown.is_empty() {
        failfast_debug!("Received variable unknown to the query: {:?}", unknown);
    }

    let mut coerced = Object::new();
    let mut errors = Vec::new();
    for (name, definition) in &operation.variables {
        let ty = &definition.ty;
        let value = match (provided.get(name.as_str()), &definition.default_value) {
            (Some(Value::Null), _) if ty.is_non_null() => Err(format!(
                "Variable \"${name}\" of non-null type \"{ty}\" must not be null."
            )),
            (Some(value), _) => coerce_input_value(ty, value, schema).map_err(|error| {
                format!(
                    "Variable \"${name}\" got invalid value {}; {error}",
                    display_value(value)
                )
            }),
            (None, Some(default)) => {
                coerce_literal(ty, default, &Object::new(), schema).map_err(|error| {
                    format!("Variable \"${name}\" has an invalid default value; {error}")
                })
            }
            (None, None) if ty.is_non_null() => Err(format!(
                "Variable \"${name}\" of required type \"{ty}\" was not provided."
            )),
            (None, None) => continue,
        };
        match value {
            Ok(value) => {
                coerced.insert(name.as_str(), value);
            }
            Err(message) => errors.push(validation_error(message, vec![definition.location])),
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Coerces the arguments written on a field against its argument definitions.
///
/// `variables` must already be coerced. Arguments that are neither provided nor defaulted are
/// left out of the result.
pub(crate) fn coerce_arguments(
    definitions: &IndexMap<String, InputValueDefinition>,
    arguments: &[Argument],
    variables: &Object,
    schema: &Schema,
) -> Result<Object, String> {
    let mut coerced = Object::new();
    for (name, definition) in definitions {
        let provided = arguments
            .iter()
            .find(|argument| &argument.name == name)
            .map(|argument| &argument.value)
            .filter(|value| match value {
                InputValue::Variable(variable) => variables.contains_key(variable.as_str()),
                _ => true,
            });
        let ty = &definition.ty;
        let value = match (provided, &definition.default_value) {
            (Some(value), _) => coerce_literal(ty, value, variables, schema).map_err(|error| {
                format!(
                    "Argument \"{name}\" has invalid value {}; {error}",
                    display_value(&value.to_value(variables))
                )
            })?,
            (None, Some(default)) => coerce_literal(ty, default, &Object::new(), schema)
                .map_err(|error| format!("Argument \"{name}\" has an invalid default value; {error}"))?,
            (None, None) if ty.is_non_null() => {
                return Err(format!(
                    "Argument \"{name}\" of required type \"{ty}\" was not provided."
                ))
            }
            (None, None) => continue,
        };
        coerced.insert(name.as_str(), value);
    }
    Ok(coerced)
}

/// Coerces a literal from the document. Variables are taken as already coerced.
fn coerce_literal(
    ty: &FieldType,
    literal: &InputValue,
    variables: &Object,
    schema: &Schema,
) -> Result<Value, InputError> {
    match (ty, literal) {
        (_, InputValue::Variable(name)) => {
            let value = variables.get(name.as_str()).cloned().unwrap_or(Value::Null);
            if value.is_null() && ty.is_non_null() {
                Err(InputError::NullForNonNull { ty: ty.to_string() })
            } else {
                Ok(value)
            }
        }
        (FieldType::NonNull(inner), literal) => {
            if matches!(literal, InputValue::Null) {
                Err(InputError::NullForNonNull { ty: ty.to_string() })
            } else {
                coerce_literal(inner, literal, variables, schema)
            }
        }
        (_, InputValue::Null) => Ok(Value::Null),
        (FieldType::List(inner), InputValue::List(items)) => items
            .iter()
            .map(|item| coerce_literal(inner, item, variables, schema))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldType::List(inner), literal) => {
            Ok(Value::Array(vec![coerce_literal(inner, literal, variables, schema)?]))
        }
        (FieldType::Named(name), literal) => match (schema.types.get(name), literal) {
            (Some(TypeDefinition::Enum(values)), InputValue::Enum(value)) => {
                if values.contains(value) {
                    Ok(Value::from(value.as_str()))
                } else {
                    Err(InputError::UnknownEnumValue {
                        value: value.clone(),
                        enum_name: name.clone(),
                    })
                }
            }
            (Some(TypeDefinition::InputObject(fields)), InputValue::Object(provided)) => {
                let provided: IndexMap<&str, &InputValue> = provided
                    .iter()
                    .map(|(key, value)| (key.as_str(), value))
                    .collect();
                if let Some(unknown) = provided.keys().find(|key| !fields.contains_key(**key)) {
                    return Err(InputError::UnknownField {
                        field: unknown.to_string(),
                        ty: name.clone(),
                    });
                }
                let mut object = Object::new();
                for (field_name, field) in fields {
                    let value = match (provided.get(field_name.as_str()), &field.default_value) {
                        (Some(InputValue::Variable(variable)), Some(default))
                            if !variables.contains_key(variable.as_str()) =>
                        {
                            coerce_literal(&field.ty, default, &Object::new(), schema)?
                        }
                        (Some(value), _) => coerce_literal(&field.ty, value, variables, schema)?,
                        (None, Some(default)) => {
                            coerce_literal(&field.ty, default, &Object::new(), schema)?
                        }
                        (None, None) if field.ty.is_non_null() => {
                            return Err(InputError::MissingField {
                                field: field_name.clone(),
                                ty: field.ty.to_string(),
                            })
                        }
                        (None, None) => continue,
                    };
                    object.insert(field_name.as_str(), value);
                }
                Ok(Value::Object(object))
            }
            (Some(TypeDefinition::Scalar), literal) => Ok(literal.to_value(variables)),
            (Some(_) | None, literal) => Err(InputError::ExpectedType {
                ty: name.clone(),
                found: literal_kind(literal).to_string(),
            }),
        },
        (_, InputValue::Enum(_) | InputValue::List(_) | InputValue::Object(_)) => {
            Err(InputError::ExpectedType {
                ty: ty.to_string(),
                found: literal_kind(literal).to_string(),
            })
        }
        (builtin, literal) => coerce_input_value(builtin, &literal.to_value(variables), schema),
    }
}

/// Coerces a JSON input value to `ty`.
pub(crate) fn coerce_input_value(
    ty: &FieldType,
    value: &Value,
    schema: &Schema,
) -> Result<Value, InputError> {
    let expected = || InputError::ExpectedType {
        ty: ty.to_string(),
        found: value.json_type_name().to_string(),
    };
    match (ty, value) {
        (FieldType::NonNull(inner), value) => {
            if value.is_null() {
                Err(InputError::NullForNonNull { ty: ty.to_string() })
            } else {
                coerce_input_value(inner, value, schema)
            }
        }
        // graphql's types are all optional by default
        (_, Value::Null) => Ok(Value::Null),
        // Spec: https://spec.graphql.org/draft/#sec-Int.Input-Coercion
        (FieldType::Int, Value::Number(number)) => match number.as_i64() {
            Some(int) if i32::try_from(int).is_ok() => Ok(value.clone()),
            _ if number.is_f64() => Err(expected()),
            _ => Err(InputError::IntRange(number.to_string())),
        },
        // Spec: https://spec.graphql.org/draft/#sec-Float.Input-Coercion
        (FieldType::Float, Value::Number(number)) => number
            .as_f64()
            .map(Value::from)
            .ok_or_else(expected),
        (FieldType::String, Value::String(_)) => Ok(value.clone()),
        (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
        // Spec: https://spec.graphql.org/draft/#sec-ID.Input-Coercion
        (FieldType::Id, Value::String(_)) => Ok(value.clone()),
        (FieldType::Id, Value::Number(number)) if number.as_i64().is_some() => {
            Ok(Value::from(number.to_string()))
        }
        (FieldType::List(inner), Value::Array(items)) => items
            .iter()
            .map(|item| coerce_input_value(inner, item, schema))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        // For coercion from single value to list
        (FieldType::List(inner), value) => {
            Ok(Value::Array(vec![coerce_input_value(inner, value, schema)?]))
        }
        (FieldType::Named(name), value) => match (schema.types.get(name), value) {
            (Some(TypeDefinition::Scalar), value) => Ok(value.clone()),
            (Some(TypeDefinition::Enum(values)), Value::String(string)) => {
                if values.iter().any(|known| known == string.as_str()) {
                    Ok(value.clone())
                } else {
                    Err(InputError::UnknownEnumValue {
                        value: string.as_str().to_string(),
                        enum_name: name.clone(),
                    })
                }
            }
            (Some(TypeDefinition::InputObject(fields)), Value::Object(provided)) => {
                if let Some(unknown) = provided
                    .keys()
                    .find(|key| !fields.contains_key(key.as_str()))
                {
                    return Err(InputError::UnknownField {
                        field: unknown.as_str().to_string(),
                        ty: name.clone(),
                    });
                }
                let mut object = Object::new();
                for (field_name, field) in fields {
                    let value = match (provided.get(field_name.as_str()), &field.default_value) {
                        (Some(value), _) => coerce_input_value(&field.ty, value, schema)?,
                        (None, Some(default)) => {
                            coerce_literal(&field.ty, default, &Object::new(), schema)?
                        }
                        (None, None) if field.ty.is_non_null() => {
                            return Err(InputError::MissingField {
                                field: field_name.clone(),
                                ty: field.ty.to_string(),
                            })
                        }
                        (None, None) => continue,
                    };
                    object.insert(field_name.as_str(), value);
                }
                Ok(Value::Object(object))
            }
            _ => Err(expected()),
        },
        _ => Err(expected()),
    }
}

fn literal_kind(literal: &InputValue) -> &'static str {
    match literal {
        InputValue::Variable(_) => "variable",
        InputValue::Int(_) | InputValue::Float(_) => "number",
        InputValue::String(_) => "string",
        InputValue::Boolean(_) => "boolean",
        InputValue::Null => "null",
        InputValue::Enum(_) => "enum",
        InputValue::List(_) => "array",
        InputValue::Object(_) => "object",
    }
}

fn display_value(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::configuration::Configuration;
    use crate::spec::Query;

    const SCHEMA: &str = r#"
        type Query {
          user(id: ID!, filter: Filter, limit: Int = 10): String
          tags(names: [String!]): [String]
        }
        enum Color { RED GREEN }
        input Filter { color: Color = RED, name: String, minAge: Int! }
        scalar Date
    "#;

    fn schema() -> Schema {
        Schema::parse(SCHEMA).unwrap()
    }

    fn operation(query: &str) -> Operation {
        let query = Query::parse(query, &Configuration::default()).unwrap();
        query.operations[0].clone()
    }

    fn object(value: serde_json_bytes::Value) -> Object {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn variables_apply_defaults_and_coerce() {
        let schema = schema();
        let operation = operation(
            r#"query($id: ID!, $limit: Int = 5, $filter: Filter, $missing: String) {
                user(id: $id, limit: $limit, filter: $filter)
            }"#,
        );
        let coerced = coerce_variables(
            &operation,
            &object(json!({"id": 4, "filter": {"minAge": 18}})),
            &schema,
        )
        .unwrap();
        assert_eq!(
            Value::Object(coerced),
            json!({"id": "4", "limit": 5, "filter": {"color": "RED", "minAge": 18}})
        );
    }

    #[test]
    fn variable_errors() {
        let schema = schema();
        let operation = operation("query($id: ID!, $limit: Int) { user(id: $id, limit: $limit) }");

        let errors = coerce_variables(&operation, &Object::new(), &schema).unwrap_err();
        assert_eq!(
            errors[0].message,
            "Variable \"$id\" of required type \"ID!\" was not provided."
        );

        let errors =
            coerce_variables(&operation, &object(json!({"id": null})), &schema).unwrap_err();
        assert_eq!(
            errors[0].message,
            "Variable \"$id\" of non-null type \"ID!\" must not be null."
        );

        let errors = coerce_variables(
            &operation,
            &object(json!({"id": "1", "limit": 3000000000_i64})),
            &schema,
        )
        .unwrap_err();
        assert_eq!(
            errors[0].message,
            "Variable \"$limit\" got invalid value 3000000000; \
             Int cannot represent non 32-bit signed integer value: 3000000000"
        );
        assert_eq!(
            errors[0].extension_code().as_deref(),
            Some(crate::spec::GRAPHQL_VALIDATION_FAILURE_ERROR_KEY)
        );
    }

    #[test]
    fn input_values() {
        let schema = schema();
        let list = FieldType::List(Box::new(FieldType::String));
        assert_eq!(
            coerce_input_value(&list, &json!("a"), &schema).unwrap(),
            json!(["a"])
        );
        assert_eq!(
            coerce_input_value(&FieldType::named("Date"), &json!({"any": 1}), &schema).unwrap(),
            json!({"any": 1})
        );
        assert_eq!(
            coerce_input_value(&FieldType::named("Color"), &json!("BLUE"), &schema).unwrap_err(),
            InputError::UnknownEnumValue {
                value: "BLUE".to_string(),
                enum_name: "Color".to_string()
            }
        );
        assert_eq!(
            coerce_input_value(&FieldType::named("Filter"), &json!({"age": 1}), &schema)
                .unwrap_err(),
            InputError::UnknownField {
                field: "age".to_string(),
                ty: "Filter".to_string()
            }
        );
        assert!(coerce_input_value(&FieldType::Boolean, &json!("true"), &schema).is_err());
        assert_eq!(
            coerce_input_value(&FieldType::Float, &json!(1), &schema).unwrap(),
            json!(1.0)
        );
    }

    #[test]
    fn arguments() {
        let schema = schema();
        let operation = operation(
            r#"query($name: String) {
                user(id: 7, filter: {color: GREEN, minAge: 1, name: $name})
            }"#,
        );
        let crate::spec::Selection::Field(field) = &operation.selection_set[0] else {
            panic!("expected a field");
        };
        let definitions = &schema.field("Query", "user").unwrap().arguments;

        let coerced = coerce_arguments(
            definitions,
            &field.arguments,
            &object(json!({"name": "bob"})),
            &schema,
        )
        .unwrap();
        assert_eq!(
            Value::Object(coerced),
            json!({"id": "7", "filter": {"color": "GREEN", "name": "bob", "minAge": 1}, "limit": 10})
        );

        let error = coerce_arguments(definitions, &[], &Object::new(), &schema).unwrap_err();
        assert_eq!(error, "Argument \"id\" of required type \"ID!\" was not provided.");
    }
}
