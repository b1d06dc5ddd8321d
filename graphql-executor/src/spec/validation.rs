//! Validation of executable documents against a schema.

use std::collections::HashSet;

use crate::graphql;
use crate::graphql::Location;
use crate::spec::suggestion::did_you_mean;
use crate::spec::suggestion::suggestion_list;
use crate::spec::validation_error;
use crate::spec::Directive;
use crate::spec::FieldType;
use crate::spec::Fragment;
use crate::spec::Operation;
use crate::spec::Query;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::TYPENAME;

/// Runs every rule over the document, collecting all failures.
#[tracing::instrument(skip_all, level = "trace")]
pub(crate) fn validate(
    query: &Query,
    schema: &Schema,
    suggestions: bool,
) -> Result<(), Vec<graphql::Error>> {
    let mut validator = Validator {
        query,
        schema,
        suggestions,
        errors: Vec::new(),
    };
    validator.operation_names();
    validator.fragment_names();
    for operation in &query.operations {
        validator.operation(operation);
    }
    for fragment in &query.fragments {
        validator.fragment(fragment);
    }
    validator.unused_fragments();
    validator.fragment_cycles();

    if validator.errors.is_empty() {
        Ok(())
    } else {
        Err(validator.errors)
    }
}

struct Validator<'a> {
    query: &'a Query,
    schema: &'a Schema,
    suggestions: bool,
    errors: Vec<graphql::Error>,
}

impl<'a> Validator<'a> {
    fn report(&mut self, message: String, location: Location) {
        self.errors.push(validation_error(message, vec![location]));
    }

    fn hint<'b>(&self, input: &str, options: impl IntoIterator<Item = &'b str>) -> String {
        if self.suggestions {
            did_you_mean(&suggestion_list(input, options))
        } else {
            String::new()
        }
    }

    // Spec: https://spec.graphql.org/draft/#sec-Operation-Name-Uniqueness
    fn operation_names(&mut self) {
        let query = self.query;
        let operations = &query.operations;
        let mut seen = HashSet::new();
        for operation in operations {
            match &operation.name {
                Some(name) if !seen.insert(name.as_str()) => self.report(
                    format!("There can be only one operation named \"{name}\"."),
                    operation.location,
                ),
                None if operations.len() > 1 => self.report(
                    "This anonymous operation must be the only defined operation.".to_string(),
                    operation.location,
                ),
                _ => {}
            }
        }
    }

    // Spec: https://spec.graphql.org/draft/#sec-Fragment-Name-Uniqueness
    fn fragment_names(&mut self) {
        let query = self.query;
        let mut seen = HashSet::new();
        for fragment in &query.fragments {
            if !seen.insert(fragment.name.as_str()) {
                self.report(
                    format!("There can be only one fragment named \"{}\".", fragment.name),
                    fragment.location,
                );
            }
        }
    }

    fn operation(&mut self, operation: &'a Operation) {
        let schema = self.schema;
        let Some(root) = schema.root_operation_type(operation.kind) else {
            self.report(
                format!(
                    "Schema is not configured to execute {} operation.",
                    operation.kind
                ),
                operation.location,
            );
            return;
        };

        for definition in operation.variables.values() {
            self.variable_type(&definition.name, &definition.ty, definition.location);
        }
        self.directives(&operation.directives);
        self.selection_set(root, &operation.selection_set);

        // Spec: https://spec.graphql.org/draft/#sec-All-Variable-Uses-Defined
        let mut used = Vec::new();
        let mut visited = HashSet::new();
        self.variable_usages(&operation.selection_set, &mut used, &mut visited);
        used.extend(directive_variables(&operation.directives));
        let mut reported = HashSet::new();
        for (variable, location) in &used {
            if !operation.variables.contains_key(*variable) && reported.insert(*variable) {
                let message = match &operation.name {
                    Some(name) => {
                        format!("Variable \"${variable}\" is not defined by operation \"{name}\".")
                    }
                    None => format!("Variable \"${variable}\" is not defined."),
                };
                self.report(message, *location);
            }
        }

        // Spec: https://spec.graphql.org/draft/#sec-All-Variables-Used
        let used: HashSet<&str> = used.iter().map(|(variable, _)| *variable).collect();
        for definition in operation.variables.values() {
            if !used.contains(definition.name.as_str()) {
                let message = match &operation.name {
                    Some(name) => format!(
                        "Variable \"${}\" is never used in operation \"{name}\".",
                        definition.name
                    ),
                    None => format!("Variable \"${}\" is never used.", definition.name),
                };
                self.report(message, definition.location);
            }
        }
    }

    // Spec: https://spec.graphql.org/draft/#sec-Variables-Are-Input-Types
    fn variable_type(&mut self, variable: &str, ty: &FieldType, location: Location) {
        let schema = self.schema;
        let type_name = ty.inner_type_name();
        if !schema.has_type(type_name) {
            let hint = self.hint(type_name, schema.type_names());
            self.report(format!("Unknown type \"{type_name}\".{hint}"), location);
        } else if !schema.is_input_type(type_name) {
            self.report(
                format!("Variable \"${variable}\" cannot be non-input type \"{ty}\"."),
                location,
            );
        }
    }

    fn fragment(&mut self, fragment: &'a Fragment) {
        let schema = self.schema;
        let condition = fragment.type_condition.as_str();
        self.directives(&fragment.directives);
        if !schema.has_type(condition) {
            let hint = self.hint(condition, schema.type_names());
            self.report(format!("Unknown type \"{condition}\".{hint}"), fragment.location);
        } else if !schema.is_composite(condition) {
            self.report(
                format!(
                    "Fragment \"{}\" cannot condition on non composite type \"{condition}\".",
                    fragment.name
                ),
                fragment.location,
            );
        } else {
            self.selection_set(condition, &fragment.selection_set);
        }
    }

    fn selection_set(&mut self, parent: &str, selections: &[Selection]) {
        let schema = self.schema;
        let query = self.query;
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    self.directives(&field.directives);
                    if field.name == TYPENAME {
                        if !field.selection_set.is_empty() {
                            self.report(
                                format!(
                                    "Field \"{TYPENAME}\" must not have a selection since type \"String!\" has no subfields."
                                ),
                                field.location,
                            );
                        }
                        continue;
                    }

                    // Spec: https://spec.graphql.org/draft/#sec-Field-Selections
                    let Some(definition) = schema.field(parent, &field.name) else {
                        let hint = match schema.fields_of(parent) {
                            Some(fields) => self.hint(&field.name, fields.keys().map(String::as_str)),
                            None => String::new(),
                        };
                        self.report(
                            format!(
                                "Cannot query field \"{}\" on type \"{parent}\".{hint}",
                                field.name
                            ),
                            field.location,
                        );
                        continue;
                    };

                    // Spec: https://spec.graphql.org/draft/#sec-Argument-Names
                    for argument in &field.arguments {
                        if !definition.arguments.contains_key(&argument.name) {
                            let hint = self.hint(
                                &argument.name,
                                definition.arguments.keys().map(String::as_str),
                            );
                            self.report(
                                format!(
                                    "Unknown argument \"{}\" on field \"{parent}.{}\".{hint}",
                                    argument.name, field.name
                                ),
                                argument.location,
                            );
                        }
                    }
                    // Spec: https://spec.graphql.org/draft/#sec-Required-Arguments
                    for (name, argument) in &definition.arguments {
                        if argument.ty.is_non_null()
                            && argument.default_value.is_none()
                            && !field.arguments.iter().any(|provided| &provided.name == name)
                        {
                            self.report(
                                format!(
                                    "Field \"{}\" argument \"{name}\" of type \"{}\" is required, but it was not provided.",
                                    field.name, argument.ty
                                ),
                                field.location,
                            );
                        }
                    }

                    // Spec: https://spec.graphql.org/draft/#sec-Leaf-Field-Selections
                    let inner = definition.ty.inner_type_name();
                    if schema.is_composite(inner) {
                        if field.selection_set.is_empty() {
                            self.report(
                                format!(
                                    "Field \"{}\" of type \"{}\" must have a selection of subfields. Did you mean \"{} {{ ... }}\"?",
                                    field.name, definition.ty, field.name
                                ),
                                field.location,
                            );
                        } else {
                            self.selection_set(inner, &field.selection_set);
                        }
                    } else if !field.selection_set.is_empty() {
                        self.report(
                            format!(
                                "Field \"{}\" must not have a selection since type \"{}\" has no subfields.",
                                field.name, definition.ty
                            ),
                            field.location,
                        );
                    }
                }
                Selection::FragmentSpread(spread) => {
                    self.directives(&spread.directives);
                    // Spec: https://spec.graphql.org/draft/#sec-Fragment-spread-target-defined
                    let Some(fragment) = query.fragment(&spread.fragment_name) else {
                        self.report(
                            format!("Unknown fragment \"{}\".", spread.fragment_name),
                            spread.location,
                        );
                        continue;
                    };
                    let condition = fragment.type_condition.as_str();
                    if schema.is_composite(condition)
                        && !schema.fragment_applies(condition, parent)
                    {
                        self.report(
                            format!(
                                "Fragment \"{}\" cannot be spread here as objects of type \"{parent}\" can never be of type \"{condition}\".",
                                spread.fragment_name
                            ),
                            spread.location,
                        );
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.directives(&inline.directives);
                    let Some(condition) = inline.type_condition.as_deref() else {
                        self.selection_set(parent, &inline.selection_set);
                        continue;
                    };
                    if !schema.has_type(condition) {
                        let hint = self.hint(condition, schema.type_names());
                        self.report(format!("Unknown type \"{condition}\".{hint}"), inline.location);
                    } else if !schema.is_composite(condition) {
                        self.report(
                            format!("Fragment cannot condition on non composite type \"{condition}\"."),
                            inline.location,
                        );
                    } else if !schema.fragment_applies(condition, parent) {
                        self.report(
                            format!(
                                "Fragment cannot be spread here as objects of type \"{parent}\" can never be of type \"{condition}\"."
                            ),
                            inline.location,
                        );
                    } else {
                        self.selection_set(condition, &inline.selection_set);
                    }
                }
            }
        }
    }

    // Spec: https://spec.graphql.org/draft/#sec-Directives-Are-Defined
    fn directives(&mut self, directives: &[Directive]) {
        let schema = self.schema;
        for directive in directives {
            if !schema.directives.contains(&directive.name) {
                self.report(
                    format!("Unknown directive \"@{}\".", directive.name),
                    directive.location,
                );
            }
        }
    }

    /// Variables referenced by a selection set, following fragment spreads once each.
    fn variable_usages(
        &self,
        selections: &'a [Selection],
        used: &mut Vec<(&'a str, Location)>,
        visited: &mut HashSet<&'a str>,
    ) {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    for argument in &field.arguments {
                        used.extend(
                            argument
                                .value
                                .variables()
                                .into_iter()
                                .map(|variable| (variable, argument.location)),
                        );
                    }
                    used.extend(directive_variables(&field.directives));
                    self.variable_usages(&field.selection_set, used, visited);
                }
                Selection::FragmentSpread(spread) => {
                    used.extend(directive_variables(&spread.directives));
                    if visited.insert(spread.fragment_name.as_str()) {
                        if let Some(fragment) = self.query.fragment(&spread.fragment_name) {
                            used.extend(directive_variables(&fragment.directives));
                            self.variable_usages(&fragment.selection_set, used, visited);
                        }
                    }
                }
                Selection::InlineFragment(inline) => {
                    used.extend(directive_variables(&inline.directives));
                    self.variable_usages(&inline.selection_set, used, visited);
                }
            }
        }
    }

    // Spec: https://spec.graphql.org/draft/#sec-Fragments-Must-Be-Used
    fn unused_fragments(&mut self) {
        let query = self.query;
        let mut used = HashSet::new();
        let mut pending: Vec<&str> = query
            .operations
            .iter()
            .flat_map(|operation| spreads(&operation.selection_set))
            .collect();
        while let Some(name) = pending.pop() {
            if used.insert(name) {
                if let Some(fragment) = query.fragment(name) {
                    pending.extend(spreads(&fragment.selection_set));
                }
            }
        }
        for fragment in &query.fragments {
            if !used.contains(fragment.name.as_str()) {
                self.report(
                    format!("Fragment \"{}\" is never used.", fragment.name),
                    fragment.location,
                );
            }
        }
    }

    // Spec: https://spec.graphql.org/draft/#sec-Fragment-spreads-must-not-form-cycles
    fn fragment_cycles(&mut self) {
        let query = self.query;
        let mut reported: HashSet<&str> = HashSet::new();
        for fragment in &query.fragments {
            if reported.contains(fragment.name.as_str()) {
                continue;
            }
            let mut path = Vec::new();
            let mut visited = HashSet::new();
            if let Some(cycle) =
                self.find_cycle(&fragment.name, &fragment.selection_set, &mut path, &mut visited)
            {
                let message = if cycle.is_empty() {
                    format!("Cannot spread fragment \"{}\" within itself.", fragment.name)
                } else {
                    format!(
                        "Cannot spread fragment \"{}\" within itself via {}.",
                        fragment.name,
                        cycle.join(", ")
                    )
                };
                reported.insert(fragment.name.as_str());
                reported.extend(cycle);
                self.report(message, fragment.location);
            }
        }
    }

    fn find_cycle(
        &self,
        start: &str,
        selections: &'a [Selection],
        path: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
    ) -> Option<Vec<&'a str>> {
        for name in spreads(selections) {
            if name == start {
                return Some(path.clone());
            }
            if !visited.insert(name) {
                continue;
            }
            if let Some(fragment) = self.query.fragment(name) {
                path.push(name);
                if let Some(cycle) = self.find_cycle(start, &fragment.selection_set, path, visited)
                {
                    return Some(cycle);
                }
                path.pop();
            }
        }
        None
    }
}

/// Fragment names spread directly within a selection set, not following the spreads.
fn spreads(selections: &[Selection]) -> Vec<&str> {
    let mut names = Vec::new();
    for selection in selections {
        match selection {
            Selection::Field(field) => names.extend(spreads(&field.selection_set)),
            Selection::FragmentSpread(spread) => names.push(spread.fragment_name.as_str()),
            Selection::InlineFragment(inline) => names.extend(spreads(&inline.selection_set)),
        }
    }
    names
}

fn directive_variables(directives: &[Directive]) -> Vec<(&str, Location)> {
    directives
        .iter()
        .flat_map(|directive| &directive.arguments)
        .flat_map(|argument| {
            argument
                .value
                .variables()
                .into_iter()
                .map(move |variable| (variable, argument.location))
        })
        .collect()
}
