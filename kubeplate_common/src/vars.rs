//! Template variables, supplied inline or from a YAML file.

use serde_json::{Map, Value};

use crate::prelude::*;

/// A mapping of template variables. Values are whatever YAML or JSON can
/// express: scalars, sequences and nested mappings.
pub type Vars = Map<String, Value>;

/// Parse a YAML (or JSON) document containing a mapping of variables.
///
/// Blank or `null` documents mean "no variables" and return `None`.
pub fn parse_vars(text: &str) -> Result<Option<Vars>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_yaml::from_str(text).context("unable to parse vars")?;
    vars_from_value(value)
}

/// Load variables from a YAML file.
pub fn load_vars_file(path: &Path) -> Result<Option<Vars>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read vars file {:?}", path))?;
    parse_vars(&text)
        .with_context(|| format!("failed to parse vars file {:?}", path))
}

/// Convert a parsed document into a variable mapping.
fn vars_from_value(value: Value) -> Result<Option<Vars>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(format_err!(
            "vars must be a mapping, found {}",
            value_kind(&other)
        )),
    }
}

/// A short human-readable name for the kind of a value.
fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Merge inline variables with variables loaded from a file.
///
/// Only top-level keys are merged. A key set inline always wins over the same
/// key from the file; nested mappings are never combined.
pub fn merge_vars(inline: Option<Vars>, from_file: Option<Vars>) -> Option<Vars> {
    let mut inline = match inline {
        Some(inline) => inline,
        None => return from_file,
    };
    for (key, value) in from_file.into_iter().flatten() {
        inline.entry(key).or_insert(value);
    }
    Some(inline)
}

#[cfg(test)]
fn vars(value: Value) -> Option<Vars> {
    match value {
        Value::Object(map) => Some(map),
        _ => panic!("test vars must be an object"),
    }
}

#[test]
fn parse_vars_handles_yaml_and_json() {
    use serde_json::json;

    let examples = &[
        ("\nkey: value", json!({ "key": "value" })),
        ("\nkey: |\n  value", json!({ "key": "value" })),
        ("\nkey: |\n  line 1\n  line 2", json!({ "key": "line 1\nline 2" })),
        (
            "\nkey: \"line 1: val1\nline 2: val2\n  line 3: val3\"",
            json!({ "key": "line 1: val1 line 2: val2 line 3: val3" }),
        ),
        ("{\"key\": \"val1\"}", json!({ "key": "val1" })),
        (
            "image:\n  name: nginx\n  tags: [1, 2]",
            json!({ "image": { "name": "nginx", "tags": [1, 2] } }),
        ),
    ];
    for (input, expected) in examples {
        let parsed = parse_vars(input).expect("vars should parse");
        assert_eq!(parsed, vars(expected.clone()), "parsing {:?}", input);
    }
}

#[test]
fn parse_vars_treats_blank_documents_as_unset() {
    assert_eq!(parse_vars("").unwrap(), None);
    assert_eq!(parse_vars("  \n").unwrap(), None);
    assert_eq!(parse_vars("~").unwrap(), None);
}

#[test]
fn parse_vars_reports_bad_indentation_with_line() {
    let input = "\nkey: |\n  line 1: val1\nline 2: val2\n  line 3: val3";
    let err = parse_vars(input).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.starts_with("unable to parse vars: "), "{}", message);
    assert!(message.contains("line "), "{}", message);
}

#[test]
fn parse_vars_rejects_non_mappings() {
    let err = parse_vars("- a\n- b").unwrap_err();
    assert_eq!(err.to_string(), "vars must be a mapping, found a sequence");
}

#[test]
fn load_vars_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.yml");
    let err = load_vars_file(&missing).unwrap_err();
    assert!(err.to_string().starts_with("failed to read vars file"));
    assert!(err.to_string().contains("missing.yml"));

    let path = dir.path().join("vars.yml");
    fs::write(&path, "replicas: 3\n").unwrap();
    let loaded = load_vars_file(&path).unwrap().unwrap();
    assert_eq!(loaded["replicas"], 3);
}

#[test]
fn merge_vars_prefers_inline_keys() {
    use serde_json::json;

    let examples = vec![
        (
            vars(json!({ "key_1": "value_1" })),
            vars(json!({ "key_2": "value_2" })),
            vars(json!({ "key_1": "value_1", "key_2": "value_2" })),
        ),
        (
            vars(json!({ "key": "value_1" })),
            vars(json!({ "key": "value_2" })),
            vars(json!({ "key": "value_1" })),
        ),
        (None, vars(json!({ "key": "value" })), vars(json!({ "key": "value" }))),
        (None, None, None),
        (vars(json!({ "key": "value" })), None, vars(json!({ "key": "value" }))),
        (
            vars(json!({ "image": { "tag": "v2" } })),
            vars(json!({ "image": { "name": "nginx", "tag": "v1" } })),
            vars(json!({ "image": { "tag": "v2" } })),
        ),
    ];
    for (inline, from_file, expected) in examples {
        assert_eq!(merge_vars(inline, from_file), expected);
    }
}
