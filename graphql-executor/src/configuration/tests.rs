use std::time::Duration;

use super::*;

#[test]
fn empty_yaml_is_default() {
    let configuration = Configuration::from_yaml("").unwrap();
    assert_eq!(configuration.parser.recursion_limit, 4096);
    assert_eq!(configuration.parser.token_limit, None);
    assert!(configuration.validation.suggestions);
    assert_eq!(configuration.query_cache.limit, None);
    assert_eq!(configuration.execution.timeout, None);
}

#[test]
fn full_yaml() {
    let configuration = Configuration::from_yaml(
        r#"
parser:
  recursion_limit: 64
  token_limit: 1000
validation:
  suggestions: false
query_cache:
  limit: 10
execution:
  timeout: 2s
"#,
    )
    .unwrap();
    assert_eq!(configuration.parser.recursion_limit, 64);
    assert_eq!(configuration.parser.token_limit, Some(1000));
    assert!(!configuration.validation.suggestions);
    assert_eq!(configuration.query_cache.limit, Some(10));
    assert_eq!(configuration.execution.timeout, Some(Duration::from_secs(2)));
}

#[test]
fn unknown_fields_are_rejected() {
    let error = Configuration::from_yaml("validation:\n  suggestion: false\n").unwrap_err();
    assert!(matches!(
        error,
        ConfigurationError::DeserializeConfigError(_)
    ));

    let error = Configuration::from_yaml("introspection: true\n").unwrap_err();
    assert!(error.to_string().contains("unknown field"));
}

#[test]
fn zero_limits_are_rejected() {
    let error = Configuration::from_yaml("query_cache:\n  limit: 0\n").unwrap_err();
    assert_eq!(
        error.to_string(),
        "query_cache.limit: must be greater than 0 when set"
    );
}

#[test]
fn builder_defaults() {
    let configuration = Configuration::builder()
        .validation(Validation { suggestions: false })
        .build();
    assert!(!configuration.validation.suggestions);
    assert_eq!(configuration.parser.recursion_limit, 4096);
}

#[test]
fn json_schema_lists_sections() {
    let schema = serde_json::to_value(Configuration::json_schema()).unwrap();
    let properties = schema["properties"].as_object().unwrap();
    for section in ["parser", "validation", "query_cache", "execution"] {
        assert!(properties.contains_key(section), "missing {section}");
    }
}
