//! Logic for loading configuration in to an object model

use std::time::Duration;

use derivative::Derivative;
use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_json::Error),
}

/// The configuration for the executor.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with `serde_json::json!` and `serde_json::from_value`.
#[derive(Clone, Derivative, Deserialize, Serialize, JsonSchema, Default)]
#[derivative(Debug)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Query document parser limits.
    pub parser: Parser,

    /// Validation options.
    pub validation: Validation,

    /// Parsed document cache.
    pub query_cache: QueryCache,

    /// Execution options.
    pub execution: Execution,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(
        parser: Option<Parser>,
        validation: Option<Validation>,
        query_cache: Option<QueryCache>,
        execution: Option<Execution>,
    ) -> Self {
        Self {
            parser: parser.unwrap_or_default(),
            validation: validation.unwrap_or_default(),
            query_cache: query_cache.unwrap_or_default(),
            execution: execution.unwrap_or_default(),
        }
    }
}

impl Configuration {
    /// Parses and validates a YAML configuration. An empty document yields the defaults.
    pub fn from_yaml(raw_yaml: &str) -> Result<Self, ConfigurationError> {
        if raw_yaml.trim().is_empty() {
            return Ok(Configuration::default());
        }
        let yaml: serde_json::Value = serde_yaml::from_str(raw_yaml).map_err(|e| {
            ConfigurationError::InvalidConfiguration {
                message: "failed to parse yaml",
                error: e.to_string(),
            }
        })?;
        let configuration: Configuration =
            serde_json::from_value(yaml).map_err(ConfigurationError::DeserializeConfigError)?;
        configuration.validate()
    }

    pub(crate) fn validate(self) -> Result<Self, ConfigurationError> {
        if self.parser.recursion_limit == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "parser.recursion_limit",
                error: "must be greater than 0".to_string(),
            });
        }
        if self.query_cache.limit == Some(0) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "query_cache.limit",
                error: "must be greater than 0 when set".to_string(),
            });
        }
        Ok(self)
    }

    /// The JSON schema of the configuration file.
    pub fn json_schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings.into_generator().into_root_schema_for::<Configuration>()
    }
}

/// Query document parser limits.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Parser {
    /// Maximum nesting depth of a query document. Defaults to 4096.
    #[serde(default = "default_parser_recursion_limit")]
    pub recursion_limit: usize,

    /// Maximum number of tokens in a query document. Unlimited when absent.
    #[serde(default)]
    pub token_limit: Option<usize>,
}

#[buildstructor::buildstructor]
impl Parser {
    #[builder(visibility = "pub")]
    fn new(recursion_limit: Option<usize>, token_limit: Option<usize>) -> Self {
        Self {
            recursion_limit: recursion_limit.unwrap_or_else(default_parser_recursion_limit),
            token_limit,
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::builder().build()
    }
}

/// Validation options.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Validation {
    /// Append "Did you mean" hints to unknown-name validation errors. Defaults to true.
    #[serde(default = "default_suggestions")]
    pub suggestions: bool,
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            suggestions: default_suggestions(),
        }
    }
}

/// Parsed document cache.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueryCache {
    /// Maximum number of cached documents, least recently used first out.
    /// Unbounded when absent.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Execution options.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Execution {
    /// Abort execution of an operation after this long, e.g. `30s`.
    #[serde(default, with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<Duration>,
}

fn default_parser_recursion_limit() -> usize {
    // This is `apollo-parser`’s default, which protects against stack overflow
    // but is still very high for "reasonable" queries.
    4096
}

fn default_suggestions() -> bool {
    true
}
