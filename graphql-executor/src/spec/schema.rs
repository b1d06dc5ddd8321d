//! GraphQL schema.

use std::collections::HashMap;
use std::collections::HashSet;

use apollo_parser::cst;
use displaydoc::Display;
use indexmap::IndexMap;
use thiserror::Error;

use crate::spec::field_type::missing;
use crate::spec::selection::Converter;
use crate::spec::FieldType;
use crate::spec::InputValue;
use crate::spec::OperationKind;
use crate::spec::SpecError;

/// Errors raised while building a [`Schema`].
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaError {
    /// schema parsing error: {0}
    Parse(String),
    /// the schema does not define a query root type
    MissingQueryType,
    /// the {0} root type {1} is not an object type
    InvalidRootType(OperationKind, String),
    /// type {referenced} referenced by {referrer} is not defined
    UnknownType { referrer: String, referenced: String },
}

impl From<SpecError> for SchemaError {
    fn from(error: SpecError) -> Self {
        SchemaError::Parse(error.to_string())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct InputValueDefinition {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) default_value: Option<InputValue>,
}

#[derive(Debug, Clone)]
pub(crate) struct FieldDefinition {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) arguments: IndexMap<String, InputValueDefinition>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ObjectType {
    pub(crate) fields: IndexMap<String, FieldDefinition>,
    pub(crate) interfaces: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum TypeDefinition {
    Scalar,
    Object(ObjectType),
    Interface(ObjectType),
    Union(Vec<String>),
    Enum(Vec<String>),
    InputObject(IndexMap<String, InputValueDefinition>),
}

impl TypeDefinition {
    fn kind(&self) -> &'static str {
        match self {
            TypeDefinition::Scalar => "scalar",
            TypeDefinition::Object(_) => "object",
            TypeDefinition::Interface(_) => "interface",
            TypeDefinition::Union(_) => "union",
            TypeDefinition::Enum(_) => "enum",
            TypeDefinition::InputObject(_) => "input object",
        }
    }
}

const BUILT_IN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];
const BUILT_IN_DIRECTIVES: [&str; 4] = ["skip", "include", "deprecated", "specifiedBy"];

/// A GraphQL schema.
#[derive(Debug)]
pub struct Schema {
    string: String,
    pub(crate) types: IndexMap<String, TypeDefinition>,
    pub(crate) directives: HashSet<String>,
    subtype_map: HashMap<String, HashSet<String>>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl std::str::FromStr for Schema {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Schema {
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let tree = apollo_parser::Parser::new(s).parse();
        let errors = tree
            .errors()
            .map(|err| format!("{} at index {}", err.message(), err.index()))
            .collect::<Vec<_>>();
        if !errors.is_empty() {
            return Err(SchemaError::Parse(errors.join(", ")));
        }

        let converter = Converter { source: s };
        let mut types: IndexMap<String, TypeDefinition> = BUILT_IN_SCALARS
            .iter()
            .map(|name| (name.to_string(), TypeDefinition::Scalar))
            .collect();
        let mut directives: HashSet<String> =
            BUILT_IN_DIRECTIVES.iter().map(|d| d.to_string()).collect();
        let mut roots: HashMap<OperationKind, String> = HashMap::new();

        for definition in tree.document().definitions() {
            match definition {
                // Spec: https://spec.graphql.org/draft/#SchemaDefinition
                cst::Definition::SchemaDefinition(schema) => {
                    for root in schema.root_operation_type_definitions() {
                        let kind = root
                            .operation_type()
                            .map(OperationKind::try_from)
                            .transpose()?
                            .ok_or_else(|| missing("RootOperationTypeDefinition", "OperationType"))?;
                        let name = root
                            .named_type()
                            .and_then(|named| named.name())
                            .ok_or_else(|| missing("RootOperationTypeDefinition", "NamedType"))?;
                        roots.insert(kind, name.text().to_string());
                    }
                }
                // Spec: https://spec.graphql.org/draft/#ObjectTypeDefinition
                cst::Definition::ObjectTypeDefinition(object) => {
                    let name = type_name(object.name(), "ObjectTypeDefinition")?;
                    let object_type = ObjectType {
                        fields: fields(&converter, object.fields_definition())?,
                        interfaces: implements(object.implements_interfaces()),
                    };
                    types.insert(name, TypeDefinition::Object(object_type));
                }
                // Spec: https://spec.graphql.org/draft/#sec-Object-Extensions
                cst::Definition::ObjectTypeExtension(object) => {
                    let name = type_name(object.name(), "ObjectTypeExtension")?;
                    let entry = types
                        .entry(name)
                        .or_insert_with(|| TypeDefinition::Object(ObjectType::default()));
                    if let TypeDefinition::Object(object_type) = entry {
                        object_type
                            .fields
                            .extend(fields(&converter, object.fields_definition())?);
                        object_type
                            .interfaces
                            .extend(implements(object.implements_interfaces()));
                    }
                }
                // Spec: https://spec.graphql.org/draft/#InterfaceTypeDefinition
                cst::Definition::InterfaceTypeDefinition(interface) => {
                    let name = type_name(interface.name(), "InterfaceTypeDefinition")?;
                    let interface_type = ObjectType {
                        fields: fields(&converter, interface.fields_definition())?,
                        interfaces: implements(interface.implements_interfaces()),
                    };
                    types.insert(name, TypeDefinition::Interface(interface_type));
                }
                // Spec: https://spec.graphql.org/draft/#sec-Interface-Extensions
                cst::Definition::InterfaceTypeExtension(interface) => {
                    let name = type_name(interface.name(), "InterfaceTypeExtension")?;
                    let entry = types
                        .entry(name)
                        .or_insert_with(|| TypeDefinition::Interface(ObjectType::default()));
                    if let TypeDefinition::Interface(interface_type) = entry {
                        interface_type
                            .fields
                            .extend(fields(&converter, interface.fields_definition())?);
                        interface_type
                            .interfaces
                            .extend(implements(interface.implements_interfaces()));
                    }
                }
                // Spec: https://spec.graphql.org/draft/#UnionTypeDefinition
                cst::Definition::UnionTypeDefinition(union) => {
                    let name = type_name(union.name(), "UnionTypeDefinition")?;
                    types.insert(name, TypeDefinition::Union(members(union.union_member_types())));
                }
                // Spec: https://spec.graphql.org/draft/#sec-Union-Extensions
                cst::Definition::UnionTypeExtension(union) => {
                    let name = type_name(union.name(), "UnionTypeExtension")?;
                    let entry = types
                        .entry(name)
                        .or_insert_with(|| TypeDefinition::Union(Vec::new()));
                    if let TypeDefinition::Union(existing) = entry {
                        existing.extend(members(union.union_member_types()));
                    }
                }
                // Spec: https://spec.graphql.org/draft/#EnumTypeDefinition
                cst::Definition::EnumTypeDefinition(enum_type) => {
                    let name = type_name(enum_type.name(), "EnumTypeDefinition")?;
                    let values = enum_type
                        .enum_values_definition()
                        .iter()
                        .flat_map(|values| values.enum_value_definitions())
                        .filter_map(|value| value.enum_value())
                        .filter_map(|value| value.name())
                        .map(|name| name.text().to_string())
                        .collect();
                    types.insert(name, TypeDefinition::Enum(values));
                }
                // Spec: https://spec.graphql.org/draft/#InputObjectTypeDefinition
                cst::Definition::InputObjectTypeDefinition(input) => {
                    let name = type_name(input.name(), "InputObjectTypeDefinition")?;
                    let fields = input_values(
                        &converter,
                        input
                            .input_fields_definition()
                            .into_iter()
                            .flat_map(|fields| fields.input_value_definitions()),
                    )?;
                    types.insert(name, TypeDefinition::InputObject(fields));
                }
                // Spec: https://spec.graphql.org/draft/#ScalarTypeDefinition
                cst::Definition::ScalarTypeDefinition(scalar) => {
                    let name = type_name(scalar.name(), "ScalarTypeDefinition")?;
                    types.insert(name, TypeDefinition::Scalar);
                }
                // Spec: https://spec.graphql.org/draft/#DirectiveDefinition
                cst::Definition::DirectiveDefinition(directive) => {
                    directives.insert(type_name(directive.name(), "DirectiveDefinition")?);
                }
                _ => {}
            }
        }

        let query_type = match roots.remove(&OperationKind::Query) {
            Some(name) => name,
            None if types.contains_key("Query") => "Query".to_string(),
            None => return Err(SchemaError::MissingQueryType),
        };
        let mutation_type = roots
            .remove(&OperationKind::Mutation)
            .or_else(|| types.contains_key("Mutation").then(|| "Mutation".to_string()));
        let subscription_type = roots
            .remove(&OperationKind::Subscription)
            .or_else(|| {
                types
                    .contains_key("Subscription")
                    .then(|| "Subscription".to_string())
            });

        // the logic of this algorithm is inspired from the npm package graphql:
        // https://github.com/graphql/graphql-js/blob/ac8f0c6b484a0d5dca2dc13c387247f96772580a/src/type/schema.ts#L302-L327
        let mut subtype_map: HashMap<String, HashSet<String>> = HashMap::new();
        for (name, definition) in &types {
            match definition {
                TypeDefinition::Object(ObjectType { interfaces, .. })
                | TypeDefinition::Interface(ObjectType { interfaces, .. }) => {
                    for interface in interfaces {
                        subtype_map
                            .entry(interface.clone())
                            .or_default()
                            .insert(name.clone());
                    }
                }
                TypeDefinition::Union(members) => {
                    subtype_map
                        .entry(name.clone())
                        .or_default()
                        .extend(members.iter().cloned());
                }
                _ => {}
            }
        }

        let schema = Self {
            string: s.to_owned(),
            types,
            directives,
            subtype_map,
            query_type,
            mutation_type,
            subscription_type,
        };
        schema.check()?;
        Ok(schema)
    }

    /// Every referenced type exists and root types are objects.
    fn check(&self) -> Result<(), SchemaError> {
        for (kind, root) in [
            (OperationKind::Query, Some(&self.query_type)),
            (OperationKind::Mutation, self.mutation_type.as_ref()),
            (OperationKind::Subscription, self.subscription_type.as_ref()),
        ] {
            if let Some(root) = root {
                match self.types.get(root) {
                    Some(TypeDefinition::Object(_)) => {}
                    Some(_) => return Err(SchemaError::InvalidRootType(kind, root.clone())),
                    None => {
                        return Err(SchemaError::UnknownType {
                            referrer: format!("the {kind} root"),
                            referenced: root.clone(),
                        })
                    }
                }
            }
        }

        let unknown = |referrer: String, referenced: &str| SchemaError::UnknownType {
            referrer,
            referenced: referenced.to_string(),
        };
        for (name, definition) in &self.types {
            match definition {
                TypeDefinition::Object(object) | TypeDefinition::Interface(object) => {
                    for interface in &object.interfaces {
                        if !matches!(self.types.get(interface), Some(TypeDefinition::Interface(_))) {
                            return Err(unknown(format!("{} {name}", definition.kind()), interface));
                        }
                    }
                    for field in object.fields.values() {
                        let referenced = field.ty.inner_type_name();
                        if !self.types.contains_key(referenced) {
                            return Err(unknown(format!("{name}.{}", field.name), referenced));
                        }
                        for argument in field.arguments.values() {
                            let referenced = argument.ty.inner_type_name();
                            if !self.types.contains_key(referenced) {
                                return Err(unknown(
                                    format!("{name}.{}({}:)", field.name, argument.name),
                                    referenced,
                                ));
                            }
                        }
                    }
                }
                TypeDefinition::Union(members) => {
                    for member in members {
                        if !matches!(self.types.get(member), Some(TypeDefinition::Object(_))) {
                            return Err(unknown(format!("union {name}"), member));
                        }
                    }
                }
                TypeDefinition::InputObject(fields) => {
                    for field in fields.values() {
                        let referenced = field.ty.inner_type_name();
                        if !self.types.contains_key(referenced) {
                            return Err(unknown(format!("{name}.{}", field.name), referenced));
                        }
                    }
                }
                TypeDefinition::Scalar | TypeDefinition::Enum(_) => {}
            }
        }
        Ok(())
    }

    pub fn read(path: impl AsRef<std::path::Path>) -> Result<Self, SchemaError> {
        std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Parse(e.to_string()))?
            .parse()
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }

    /// The name of the root type for operations of `kind`, if the schema supports them.
    pub fn root_operation_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// The declared type of `type_name.field_name`.
    pub fn field_type(&self, type_name: &str, field_name: &str) -> Option<&FieldType> {
        self.field(type_name, field_name).map(|field| &field.ty)
    }

    pub fn is_subtype(&self, abstract_type: &str, maybe_subtype: &str) -> bool {
        self.subtype_map
            .get(abstract_type)
            .map(|x| x.contains(maybe_subtype))
            .unwrap_or(false)
    }

    pub(crate) fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.fields_of(type_name)
            .and_then(|fields| fields.get(field_name))
    }

    pub(crate) fn fields_of(&self, type_name: &str) -> Option<&IndexMap<String, FieldDefinition>> {
        match self.types.get(type_name)? {
            TypeDefinition::Object(object) | TypeDefinition::Interface(object) => {
                Some(&object.fields)
            }
            _ => None,
        }
    }

    /// Objects, interfaces and unions.
    pub(crate) fn is_composite(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name),
            Some(
                TypeDefinition::Object(_)
                    | TypeDefinition::Interface(_)
                    | TypeDefinition::Union(_)
            )
        )
    }

    pub(crate) fn is_object(&self, type_name: &str) -> bool {
        matches!(self.types.get(type_name), Some(TypeDefinition::Object(_)))
    }

    /// Scalars, enums and input objects.
    pub(crate) fn is_input_type(&self, type_name: &str) -> bool {
        matches!(
            self.types.get(type_name),
            Some(TypeDefinition::Scalar | TypeDefinition::Enum(_) | TypeDefinition::InputObject(_))
        )
    }

    /// Whether a fragment on `condition` may apply within `parent`.
    pub(crate) fn fragment_applies(&self, condition: &str, parent: &str) -> bool {
        condition == parent
            || self.is_subtype(condition, parent)
            || self.is_subtype(parent, condition)
            || self.possible_types(condition)
                .iter()
                .any(|possible| self.possible_types(parent).contains(possible))
    }

    /// Whether an object of type `object_type` matches a type condition.
    pub(crate) fn does_fragment_type_apply(&self, object_type: &str, condition: &str) -> bool {
        object_type == condition || self.is_subtype(condition, object_type)
    }

    fn possible_types<'a>(&'a self, type_name: &'a str) -> HashSet<&'a str> {
        match self.types.get(type_name) {
            Some(TypeDefinition::Object(_)) => std::iter::once(type_name).collect(),
            Some(TypeDefinition::Interface(_) | TypeDefinition::Union(_)) => self
                .subtype_map
                .get(type_name)
                .map(|subtypes| {
                    subtypes
                        .iter()
                        .map(String::as_str)
                        .filter(|subtype| self.is_object(subtype))
                        .collect()
                })
                .unwrap_or_default(),
            _ => HashSet::new(),
        }
    }
}

fn type_name(name: Option<cst::Name>, node: &str) -> Result<String, SchemaError> {
    name.map(|name| name.text().to_string())
        .ok_or_else(|| missing(node, "Name").into())
}

fn implements(interfaces: Option<cst::ImplementsInterfaces>) -> Vec<String> {
    interfaces
        .iter()
        .flat_map(|interfaces| interfaces.named_types().flat_map(|x| x.name()))
        .map(|name| name.text().to_string())
        .collect()
}

fn members(members: Option<cst::UnionMemberTypes>) -> Vec<String> {
    members
        .iter()
        .flat_map(|members| members.named_types().flat_map(|x| x.name()))
        .map(|name| name.text().to_string())
        .collect()
}

fn fields(
    converter: &Converter<'_>,
    definition: Option<cst::FieldsDefinition>,
) -> Result<IndexMap<String, FieldDefinition>, SchemaError> {
    definition
        .iter()
        .flat_map(|fields| fields.field_definitions())
        .map(|field| {
            let name = type_name(field.name(), "FieldDefinition")?;
            let ty: FieldType = field
                .ty()
                .ok_or_else(|| missing("FieldDefinition", "Type"))?
                .try_into()?;
            let arguments = input_values(
                converter,
                field
                    .arguments_definition()
                    .into_iter()
                    .flat_map(|arguments| arguments.input_value_definitions()),
            )?;
            Ok((
                name.clone(),
                FieldDefinition {
                    name,
                    ty,
                    arguments,
                },
            ))
        })
        .collect()
}

fn input_values(
    converter: &Converter<'_>,
    definitions: impl Iterator<Item = cst::InputValueDefinition>,
) -> Result<IndexMap<String, InputValueDefinition>, SchemaError> {
    definitions
        .map(|definition| {
            let name = type_name(definition.name(), "InputValueDefinition")?;
            let ty: FieldType = definition
                .ty()
                .ok_or_else(|| missing("InputValueDefinition", "Type"))?
                .try_into()?;
            let default_value = definition
                .default_value()
                .and_then(|default| default.value())
                .map(|value| converter.value(value))
                .transpose()?;
            Ok((
                name.clone(),
                InputValueDefinition {
                    name,
                    ty,
                    default_value,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        schema { query: Root mutation: Mutations }
        type Root { user(id: ID!, verbose: Boolean = false): User, node(id: ID!): Node }
        type Mutations { rename(name: String!): User }
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String role: Role }
        enum Role { ADMIN USER }
        union SearchResult = User
        input Filter { name: String, limit: Int = 10 }
        extend type User { email: String }
        directive @cached on FIELD
    "#;

    #[test]
    fn parses_types_and_roots() {
        let schema = Schema::parse(SCHEMA).unwrap();
        assert_eq!(schema.root_operation_type(OperationKind::Query), Some("Root"));
        assert_eq!(
            schema.root_operation_type(OperationKind::Mutation),
            Some("Mutations")
        );
        assert_eq!(schema.root_operation_type(OperationKind::Subscription), None);
        assert!(schema.has_type("Filter"));
        assert!(schema.has_type("String"));
        assert_eq!(
            schema.field_type("Root", "user"),
            Some(&FieldType::Named("User".to_string()))
        );
        assert_eq!(schema.field_type("User", "email"), Some(&FieldType::String));
        assert!(schema.directives.contains("cached"));

        let user = schema.field("Root", "user").unwrap();
        assert_eq!(
            user.arguments["verbose"].default_value,
            Some(InputValue::Boolean(false))
        );
    }

    #[test]
    fn is_subtype() {
        let schema = Schema::parse(SCHEMA).unwrap();
        assert!(schema.is_subtype("Node", "User"));
        assert!(schema.is_subtype("SearchResult", "User"));
        assert!(!schema.is_subtype("User", "Node"));
        assert!(schema.does_fragment_type_apply("User", "Node"));
        assert!(schema.fragment_applies("User", "SearchResult"));
        assert!(!schema.fragment_applies("Role", "Node"));
    }

    #[test]
    fn default_root_names() {
        let schema: Schema = "type Query { a: Int } type Mutation { b: Int }".parse().unwrap();
        assert_eq!(schema.root_operation_type(OperationKind::Query), Some("Query"));
        assert_eq!(
            schema.root_operation_type(OperationKind::Mutation),
            Some("Mutation")
        );
    }

    #[test]
    fn rejects_invalid_schemas() {
        assert_eq!(
            Schema::parse("type Foo { a: Int }").unwrap_err(),
            SchemaError::MissingQueryType
        );
        assert_eq!(
            Schema::parse("type Query { a: Missing }").unwrap_err(),
            SchemaError::UnknownType {
                referrer: "Query.a".to_string(),
                referenced: "Missing".to_string()
            }
        );
        assert!(matches!(
            Schema::parse("type Query {").unwrap_err(),
            SchemaError::Parse(_)
        ));
    }
}
