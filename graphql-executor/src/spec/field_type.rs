use std::fmt;

use apollo_parser::cst;

use crate::spec::SpecError;

// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
/// A reference to a type, as found on field, argument and variable definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Named(String),
    List(Box<FieldType>),
    NonNull(Box<FieldType>),
    String,
    Int,
    Float,
    Id,
    Boolean,
}

impl FieldType {
    /// Creates a reference to the named type, mapping built-in scalar names.
    pub fn named(name: &str) -> Self {
        match name {
            "String" => Self::String,
            "Int" => Self::Int,
            "Float" => Self::Float,
            "ID" => Self::Id,
            "Boolean" => Self::Boolean,
            _ => Self::Named(name.to_string()),
        }
    }

    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_type_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name.as_str(),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
            FieldType::String => "String",
            FieldType::Int => "Int",
            FieldType::Float => "Float",
            FieldType::Id => "ID",
            FieldType::Boolean => "Boolean",
        }
    }

    pub fn is_builtin_scalar(&self) -> bool {
        match self {
            FieldType::Named(_) | FieldType::List(_) | FieldType::NonNull(_) => false,
            FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => true,
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }

    /// The type without its outermost non-null wrapper.
    pub fn nullable(&self) -> &FieldType {
        match self {
            FieldType::NonNull(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::List(inner) => write!(f, "[{inner}]"),
            FieldType::NonNull(inner) => write!(f, "{inner}!"),
            other => f.write_str(other.inner_type_name()),
        }
    }
}

impl TryFrom<cst::Type> for FieldType {
    type Error = SpecError;

    // Spec: https://spec.graphql.org/draft/#sec-Type-References
    fn try_from(ty: cst::Type) -> Result<Self, Self::Error> {
        match ty {
            cst::Type::NamedType(named) => named.try_into(),
            cst::Type::ListType(list) => list.try_into(),
            cst::Type::NonNullType(non_null) => non_null.try_into(),
        }
    }
}

impl TryFrom<cst::NamedType> for FieldType {
    type Error = SpecError;

    // Spec: https://spec.graphql.org/draft/#NamedType
    fn try_from(named: cst::NamedType) -> Result<Self, Self::Error> {
        let name = named.name().ok_or_else(|| missing("NamedType", "Name"))?;
        Ok(FieldType::named(&name.text().to_string()))
    }
}

impl TryFrom<cst::ListType> for FieldType {
    type Error = SpecError;

    // Spec: https://spec.graphql.org/draft/#ListType
    fn try_from(list: cst::ListType) -> Result<Self, Self::Error> {
        let inner = list.ty().ok_or_else(|| missing("ListType", "Type"))?;
        Ok(FieldType::List(Box::new(inner.try_into()?)))
    }
}

impl TryFrom<cst::NonNullType> for FieldType {
    type Error = SpecError;

    // Spec: https://spec.graphql.org/draft/#NonNullType
    fn try_from(non_null: cst::NonNullType) -> Result<Self, Self::Error> {
        if let Some(named) = non_null.named_type() {
            Ok(Self::NonNull(Box::new(named.try_into()?)))
        } else if let Some(list) = non_null.list_type() {
            Ok(Self::NonNull(Box::new(list.try_into()?)))
        } else {
            Err(missing("NonNullType", "NamedType or ListType"))
        }
    }
}

/// A node the grammar requires was absent from the syntax tree.
pub(crate) fn missing(node: &str, child: &str) -> SpecError {
    SpecError::ParsingError {
        message: format!("{node} is missing its {child}"),
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_sdl() {
        let ty = FieldType::NonNull(Box::new(FieldType::List(Box::new(FieldType::NonNull(
            Box::new(FieldType::Named("User".to_string())),
        )))));
        assert_eq!(ty.to_string(), "[User!]!");
        assert_eq!(ty.inner_type_name(), "User");
        assert!(ty.is_non_null());
        assert!(!ty.nullable().is_non_null());
        assert_eq!(FieldType::Id.to_string(), "ID");
    }

    #[test]
    fn named_maps_builtin_scalars() {
        assert_eq!(FieldType::named("Int"), FieldType::Int);
        assert_eq!(FieldType::named("ID"), FieldType::Id);
        assert!(FieldType::named("Boolean").is_builtin_scalar());
        assert_eq!(
            FieldType::named("Date"),
            FieldType::Named("Date".to_string())
        );
    }
}
