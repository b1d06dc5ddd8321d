use apollo_parser::cst;
use apollo_parser::cst::CstNode;

use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::field_type::missing;
use crate::spec::SpecError;

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

/// A selected field, e.g. `alias: name(arg: 1) @include(if: $x) { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
    pub location: Location,
}

impl Field {
    /// The key under which the field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub fragment_name: String,
    pub directives: Vec<Directive>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: InputValue,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub location: Location,
}

/// A literal input value as written in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Variable(String),
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    /// Variables referenced anywhere in the value.
    pub(crate) fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            InputValue::Variable(name) => names.push(name),
            InputValue::List(items) => items.iter().for_each(|item| item.collect_variables(names)),
            InputValue::Object(fields) => fields
                .iter()
                .for_each(|(_, value)| value.collect_variables(names)),
            _ => {}
        }
    }

    /// The JSON form of the literal. Variables are looked up in `variables` and absent ones
    /// become null.
    pub(crate) fn to_value(&self, variables: &Object) -> Value {
        match self {
            InputValue::Variable(name) => variables
                .get(name.as_str())
                .cloned()
                .unwrap_or(Value::Null),
            InputValue::Int(i) => Value::from(*i),
            InputValue::Float(f) => Value::from(*f),
            InputValue::String(s) | InputValue::Enum(s) => Value::from(s.as_str()),
            InputValue::Boolean(b) => Value::Bool(*b),
            InputValue::Null => Value::Null,
            InputValue::List(items) => {
                Value::Array(items.iter().map(|item| item.to_value(variables)).collect())
            }
            InputValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.as_str().into(), value.to_value(variables)))
                    .collect(),
            ),
        }
    }
}

/// Whether `@skip` and `@include` let the selection through.
pub(crate) fn should_include(directives: &[Directive], variables: &Object) -> bool {
    directives.iter().all(|directive| {
        let condition = || {
            directive
                .arguments
                .iter()
                .find(|argument| argument.name == "if")
                .map(|argument| argument.value.to_value(variables) == Value::Bool(true))
                .unwrap_or(false)
        };
        match directive.name.as_str() {
            "skip" => !condition(),
            "include" => condition(),
            _ => true,
        }
    })
}

/// Converts syntax tree nodes, computing locations against the document text.
pub(crate) struct Converter<'a> {
    pub(crate) source: &'a str,
}

impl<'a> Converter<'a> {
    pub(crate) fn location(&self, node: &impl CstNode) -> Location {
        let offset = u32::from(node.syntax().text_range().start()) as usize;
        Location::from_offset(self.source, offset)
    }

    pub(crate) fn selection_set(
        &self,
        selection_set: Option<cst::SelectionSet>,
    ) -> Result<Vec<Selection>, SpecError> {
        selection_set
            .iter()
            .flat_map(|set| set.selections())
            .map(|selection| self.selection(selection))
            .collect()
    }

    // Spec: https://spec.graphql.org/draft/#Selection
    fn selection(&self, selection: cst::Selection) -> Result<Selection, SpecError> {
        Ok(match selection {
            cst::Selection::Field(field) => {
                let name = field.name().ok_or_else(|| missing("Field", "Name"))?;
                Selection::Field(Field {
                    alias: field
                        .alias()
                        .and_then(|alias| alias.name())
                        .map(|name| name.text().to_string()),
                    name: name.text().to_string(),
                    arguments: self.arguments(field.arguments())?,
                    directives: self.directives(field.directives())?,
                    selection_set: self.selection_set(field.selection_set())?,
                    location: self.location(&field),
                })
            }
            cst::Selection::FragmentSpread(spread) => {
                let name = spread
                    .fragment_name()
                    .and_then(|fragment_name| fragment_name.name())
                    .ok_or_else(|| missing("FragmentSpread", "FragmentName"))?;
                Selection::FragmentSpread(FragmentSpread {
                    fragment_name: name.text().to_string(),
                    directives: self.directives(spread.directives())?,
                    location: self.location(&spread),
                })
            }
            cst::Selection::InlineFragment(inline) => Selection::InlineFragment(InlineFragment {
                type_condition: inline
                    .type_condition()
                    .and_then(|condition| condition.named_type())
                    .and_then(|named| named.name())
                    .map(|name| name.text().to_string()),
                directives: self.directives(inline.directives())?,
                selection_set: self.selection_set(inline.selection_set())?,
                location: self.location(&inline),
            }),
        })
    }

    pub(crate) fn arguments(
        &self,
        arguments: Option<cst::Arguments>,
    ) -> Result<Vec<Argument>, SpecError> {
        arguments
            .iter()
            .flat_map(|arguments| arguments.arguments())
            .map(|argument| {
                let name = argument.name().ok_or_else(|| missing("Argument", "Name"))?;
                let value = argument.value().ok_or_else(|| missing("Argument", "Value"))?;
                Ok(Argument {
                    name: name.text().to_string(),
                    value: self.value(value)?,
                    location: self.location(&argument),
                })
            })
            .collect()
    }

    pub(crate) fn directives(
        &self,
        directives: Option<cst::Directives>,
    ) -> Result<Vec<Directive>, SpecError> {
        directives
            .iter()
            .flat_map(|directives| directives.directives())
            .map(|directive| {
                let name = directive
                    .name()
                    .ok_or_else(|| missing("Directive", "Name"))?;
                Ok(Directive {
                    name: name.text().to_string(),
                    arguments: self.arguments(directive.arguments())?,
                    location: self.location(&directive),
                })
            })
            .collect()
    }

    // Spec: https://spec.graphql.org/draft/#sec-Input-Values
    pub(crate) fn value(&self, value: cst::Value) -> Result<InputValue, SpecError> {
        let invalid = |node: &dyn std::fmt::Display, location: Location| SpecError::ParsingError {
            message: format!("invalid value {node}"),
            location: Some(location),
        };
        Ok(match value {
            cst::Value::Variable(variable) => InputValue::Variable(
                variable
                    .name()
                    .ok_or_else(|| missing("Variable", "Name"))?
                    .text()
                    .to_string(),
            ),
            cst::Value::StringValue(string) => {
                InputValue::String(string_value(&string.syntax().text().to_string()))
            }
            cst::Value::FloatValue(float) => {
                let text = float.syntax().text().to_string();
                InputValue::Float(
                    text.parse::<f64>()
                        .map_err(|_| invalid(&text, self.location(&float)))?,
                )
            }
            cst::Value::IntValue(int) => {
                let text = int.syntax().text().to_string();
                match text.parse::<i64>() {
                    Ok(i) => InputValue::Int(i),
                    Err(_) => InputValue::Float(
                        text.parse::<f64>()
                            .map_err(|_| invalid(&text, self.location(&int)))?,
                    ),
                }
            }
            cst::Value::BooleanValue(boolean) => {
                InputValue::Boolean(boolean.true_token().is_some())
            }
            cst::Value::NullValue(_) => InputValue::Null,
            cst::Value::EnumValue(enum_value) => InputValue::Enum(
                enum_value
                    .name()
                    .ok_or_else(|| missing("EnumValue", "Name"))?
                    .text()
                    .to_string(),
            ),
            cst::Value::ListValue(list) => InputValue::List(
                list.values()
                    .map(|value| self.value(value))
                    .collect::<Result<_, _>>()?,
            ),
            cst::Value::ObjectValue(object) => InputValue::Object(
                object
                    .object_fields()
                    .map(|field| {
                        let name = field.name().ok_or_else(|| missing("ObjectField", "Name"))?;
                        let value = field
                            .value()
                            .ok_or_else(|| missing("ObjectField", "Value"))?;
                        Ok((name.text().to_string(), self.value(value)?))
                    })
                    .collect::<Result<_, SpecError>>()?,
            ),
        })
    }
}

/// The value of a string literal token, quotes included.
fn string_value(token: &str) -> String {
    if let Some(block) = token
        .strip_prefix("\"\"\"")
        .and_then(|rest| rest.strip_suffix("\"\"\""))
    {
        return block_string_value(&block.replace("\\\"\"\"", "\"\"\""));
    }
    let inner = token
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(token);

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => value.push('"'),
            Some('\\') => value.push('\\'),
            Some('/') => value.push('/'),
            Some('b') => value.push('\u{0008}'),
            Some('f') => value.push('\u{000C}'),
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some('t') => value.push('\t'),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => value.push(decoded),
                    None => {
                        value.push_str("\\u");
                        value.push_str(&code);
                    }
                }
            }
            Some(other) => {
                value.push('\\');
                value.push(other);
            }
            None => value.push('\\'),
        }
    }
    value
}

// Spec: https://spec.graphql.org/draft/#BlockStringValue()
fn block_string_value(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let is_indent = |c: char| c == ' ' || c == '\t';
    let indent_of = |line: &str| line.len() - line.trim_start_matches(is_indent).len();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim_start_matches(is_indent).is_empty())
        .map(|line| indent_of(line))
        .min()
        .unwrap_or(0);

    let mut lines: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            if index == 0 || line.len() < common_indent {
                *line
            } else {
                &line[common_indent..]
            }
        })
        .collect();

    let is_blank = |line: &&str| line.trim_start_matches(is_indent).is_empty();
    while lines.first().map(is_blank).unwrap_or(false) {
        lines.remove(0);
    }
    while lines.last().map(is_blank).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn string_escapes() {
        assert_eq!(string_value(r#""plain""#), "plain");
        assert_eq!(string_value(r#""a\"b\\c\nd""#), "a\"b\\c\nd");
        assert_eq!(string_value(r#""été""#), "été");
    }

    #[test]
    fn block_strings_are_dedented() {
        let token = "\"\"\"\n    Hello,\n      World!\n\n    Yours,\n      GraphQL.\n  \"\"\"";
        assert_eq!(
            string_value(token),
            "Hello,\n  World!\n\nYours,\n  GraphQL."
        );
        assert_eq!(string_value(r#""""say \"""hi""""#), r#"say """hi"#);
    }

    #[test]
    fn skip_and_include() {
        let variables: Object = json!({ "yes": true, "no": false })
            .as_object()
            .cloned()
            .unwrap();
        let directive = |name: &str, value: InputValue| Directive {
            name: name.to_string(),
            arguments: vec![Argument {
                name: "if".to_string(),
                value,
                location: Location { line: 1, column: 1 },
            }],
            location: Location { line: 1, column: 1 },
        };

        assert!(should_include(&[], &variables));
        assert!(!should_include(
            &[directive("skip", InputValue::Boolean(true))],
            &variables
        ));
        assert!(should_include(
            &[directive("include", InputValue::Variable("yes".to_string()))],
            &variables
        ));
        assert!(!should_include(
            &[
                directive("include", InputValue::Variable("yes".to_string())),
                directive("skip", InputValue::Variable("yes".to_string())),
            ],
            &variables
        ));
        assert!(!should_include(
            &[directive("include", InputValue::Variable("no".to_string()))],
            &variables
        ));
    }
}
