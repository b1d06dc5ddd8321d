//! Query processing.
//!
//! Parsing of query documents and operation selection.

use std::fmt;

use apollo_parser::cst;
use derivative::Derivative;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::Configuration;
use crate::graphql::Location;
use crate::spec::field_type::missing;
use crate::spec::selection::Converter;
use crate::spec::Directive;
use crate::spec::FieldType;
use crate::spec::InputValue;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;

/// A parsed GraphQL query document.
///
/// Documents are shared through the cache and never modified once built.
#[derive(Debug, Derivative)]
#[derivative(PartialEq, Eq)]
pub struct Query {
    string: String,
    #[derivative(PartialEq = "ignore")]
    pub(crate) operations: Vec<Operation>,
    #[derivative(PartialEq = "ignore")]
    pub(crate) fragments: Vec<Fragment>,
}

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        })
    }
}

impl TryFrom<cst::OperationType> for OperationKind {
    type Error = SpecError;

    // Spec: https://spec.graphql.org/draft/#OperationType
    fn try_from(operation_type: cst::OperationType) -> Result<Self, Self::Error> {
        if operation_type.query_token().is_some() {
            Ok(Self::Query)
        } else if operation_type.mutation_token().is_some() {
            Ok(Self::Mutation)
        } else if operation_type.subscription_token().is_some() {
            Ok(Self::Subscription)
        } else {
            Err(missing("OperationType", "keyword"))
        }
    }
}

/// An executable operation of a document.
#[derive(Debug, Clone)]
pub struct Operation {
    pub(crate) name: Option<String>,
    pub(crate) kind: OperationKind,
    pub(crate) variables: IndexMap<String, VariableDefinition>,
    pub(crate) directives: Vec<Directive>,
    pub(crate) selection_set: Vec<Selection>,
    pub(crate) location: Location,
}

impl Operation {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn selection_set(&self) -> &[Selection] {
        &self.selection_set
    }

    pub fn variable_definitions(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.variables.values()
    }

    // Spec: https://spec.graphql.org/draft/#sec-Language.Operations
    fn from_cst(
        operation: cst::OperationDefinition,
        converter: &Converter<'_>,
    ) -> Result<Self, SpecError> {
        let name = operation.name().map(|x| x.text().to_string());

        let kind = operation
            .operation_type()
            .map(OperationKind::try_from)
            .transpose()?
            .unwrap_or(OperationKind::Query);

        let selection_set = converter.selection_set(operation.selection_set())?;

        let variables = operation
            .variable_definitions()
            .iter()
            .flat_map(|x| x.variable_definitions())
            .map(|definition| {
                let name = definition
                    .variable()
                    .and_then(|variable| variable.name())
                    .ok_or_else(|| missing("VariableDefinition", "Variable"))?
                    .text()
                    .to_string();
                let ty = definition
                    .ty()
                    .ok_or_else(|| missing("VariableDefinition", "Type"))?;
                let ty = FieldType::try_from(ty)?;
                let default_value = definition
                    .default_value()
                    .and_then(|default| default.value())
                    .map(|value| converter.value(value))
                    .transpose()?;
                Ok((
                    name.clone(),
                    VariableDefinition {
                        name,
                        ty,
                        default_value,
                        location: converter.location(&definition),
                    },
                ))
            })
            .collect::<Result<_, SpecError>>()?;

        Ok(Operation {
            name,
            kind,
            variables,
            directives: converter.directives(operation.directives())?,
            selection_set,
            location: converter.location(&operation),
        })
    }
}

/// A variable declared by an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: FieldType,
    pub default_value: Option<InputValue>,
    pub location: Location,
}

/// A named fragment definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
    pub location: Location,
}

impl Fragment {
    // Spec: https://spec.graphql.org/draft/#FragmentDefinition
    fn from_cst(
        fragment: cst::FragmentDefinition,
        converter: &Converter<'_>,
    ) -> Result<Self, SpecError> {
        let name = fragment
            .fragment_name()
            .and_then(|fragment_name| fragment_name.name())
            .ok_or_else(|| missing("FragmentDefinition", "FragmentName"))?
            .text()
            .to_string();
        let type_condition = fragment
            .type_condition()
            .and_then(|condition| condition.named_type())
            .and_then(|named| named.name())
            .ok_or_else(|| missing("FragmentDefinition", "TypeCondition"))?
            .text()
            .to_string();
        Ok(Fragment {
            name,
            type_condition,
            directives: converter.directives(fragment.directives())?,
            selection_set: converter.selection_set(fragment.selection_set())?,
            location: converter.location(&fragment),
        })
    }
}

impl Query {
    /// Parses a query document. Only the first syntax error is reported.
    #[tracing::instrument(skip_all, level = "trace")]
    pub fn parse(
        query: impl Into<String>,
        configuration: &Configuration,
    ) -> Result<Self, SpecError> {
        let string = query.into();
        if string.trim().is_empty() {
            return Err(SpecError::MissingQuery);
        }

        let mut parser = apollo_parser::Parser::new(string.as_str())
            .recursion_limit(configuration.parser.recursion_limit);
        if let Some(token_limit) = configuration.parser.token_limit {
            parser = parser.token_limit(token_limit);
        }
        let tree = parser.parse();

        // Trace log recursion limit data
        let recursion_limit = tree.recursion_limit();
        tracing::trace!(?recursion_limit, "recursion limit data");

        if let Some(error) = tree.errors().next() {
            let location = Location::from_offset(&string, error.index());
            failfast_debug!("parsing error: {:?}", error);
            return Err(SpecError::ParsingError {
                message: error.message().to_string(),
                location: Some(location),
            });
        }

        let converter = Converter { source: &string };
        let mut operations = Vec::new();
        let mut fragments = Vec::new();
        for definition in tree.document().definitions() {
            match definition {
                cst::Definition::OperationDefinition(operation) => {
                    operations.push(Operation::from_cst(operation, &converter)?)
                }
                cst::Definition::FragmentDefinition(fragment) => {
                    fragments.push(Fragment::from_cst(fragment, &converter)?)
                }
                other => {
                    return Err(SpecError::ValidationError(vec![
                        crate::spec::validation_error(
                            "The query document must only contain executable definitions.",
                            vec![converter.location(&other)],
                        ),
                    ]))
                }
            }
        }

        Ok(Query {
            string,
            operations,
            fragments,
        })
    }

    /// Validates the whole document against `schema`.
    pub fn validate(&self, schema: &Schema, suggestions: bool) -> Result<(), SpecError> {
        crate::spec::validation::validate(self, schema, suggestions)
            .map_err(SpecError::ValidationError)
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn fragment(&self, name: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|fragment| fragment.name == name)
    }

    /// Selects the operation to execute.
    pub fn operation(&self, operation_name: Option<&str>) -> Result<&Operation, SpecError> {
        self.operation_index(operation_name)
            .map(|index| &self.operations[index])
    }

    pub(crate) fn operation_index(&self, operation_name: Option<&str>) -> Result<usize, SpecError> {
        match operation_name.filter(|name| !name.is_empty()) {
            Some(name) => self
                .operations
                .iter()
                .position(|operation| operation.name.as_deref() == Some(name))
                .ok_or_else(|| SpecError::UnknownOperation(name.to_string())),
            None => match self.operations.len() {
                1 => Ok(0),
                0 => Err(SpecError::UnknownOperation(String::new())),
                _ => Err(SpecError::MultipleOperationWithoutOperationName),
            },
        }
    }
}
