//! The template resolver: `{{variable}}` placeholder discovery, binding
//! acquisition, substitution, and parsing of the substituted text into an
//! experiment document value.
//!
//! Discovery order is ascending lexicographic. It is the order variables are
//! prompted in, so it must be deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};

use regex::Regex;
use serde_json::Value;

use fex_core::{Error, Result};

const PLACEHOLDER_PATTERN: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";

fn placeholder_regex() -> Regex {
    Regex::new(PLACEHOLDER_PATTERN).expect("static placeholder pattern compiles")
}

/// Scans the template for placeholder names without evaluating anything.
pub fn find_variables(template: &str) -> Vec<String> {
    let pattern = placeholder_regex();
    let mut names = BTreeSet::new();
    for captures in pattern.captures_iter(template) {
        if let Some(name) = captures.get(1) {
            names.insert(name.as_str().to_string());
        }
    }
    names.into_iter().collect()
}

/// Substitutes every placeholder with its bound value. A placeholder without
/// a binding fails with `missing_variable`; a missing credential must never
/// silently turn into placeholder text inside an otherwise valid document.
pub fn fill_template(template: &str, bindings: &BTreeMap<String, String>) -> Result<String> {
    for name in find_variables(template) {
        if !bindings.contains_key(&name) {
            return Err(Error::MissingVariable(name));
        }
    }
    let pattern = placeholder_regex();
    let filled = pattern.replace_all(template, |captures: &regex::Captures| {
        bindings
            .get(&captures[1])
            .cloned()
            .unwrap_or_default()
    });
    Ok(filled.into_owned())
}

/// Reads one JSON object of string-to-string bindings from the reader, as
/// supplied on stdin in batch mode. Every discovered variable must be bound.
pub fn bindings_from_json(
    reader: &mut impl BufRead,
    variables: &[String],
) -> Result<BTreeMap<String, String>> {
    let mut raw = String::new();
    reader.read_to_string(&mut raw)?;
    let bindings: BTreeMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
        Error::MalformedDocument(format!(
            "variable bindings must be a json object mapping names to strings: {}",
            e
        ))
    })?;
    for variable in variables {
        if !bindings.contains_key(variable) {
            return Err(Error::MissingVariable(variable.clone()));
        }
    }
    Ok(bindings)
}

/// Prompts for one line per variable, in discovery order.
pub fn bindings_from_prompts(
    input: &mut impl BufRead,
    output: &mut impl Write,
    variables: &[String],
) -> Result<BTreeMap<String, String>> {
    let mut bindings = BTreeMap::new();
    for variable in variables {
        write!(output, "{}: ", variable)?;
        output.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        let value = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        bindings.insert(variable.clone(), value);
    }
    Ok(bindings)
}

/// Substitutes bindings (when the template carries placeholders) and parses
/// the result as a JSON document value.
pub fn parse_document(template: &str, bindings: &BTreeMap<String, String>) -> Result<Value> {
    let text = if find_variables(template).is_empty() {
        template.to_string()
    } else {
        fill_template(template, bindings)?
    };
    serde_json::from_str(&text).map_err(|e| {
        Error::MalformedDocument(format!("document is not valid json: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn discovery_is_sorted_and_deduplicated() {
        let template = r#"{"url": "{{url}}", "user": "{{ username }}", "again": "{{url}}"}"#;
        assert_eq!(find_variables(template), vec!["url", "username"]);
    }

    #[test]
    fn discovery_ignores_non_identifier_braces() {
        let template = r#"{"a": "{{not valid}}", "b": "{{9lead}}", "c": "{{ok_1}}"}"#;
        assert_eq!(find_variables(template), vec!["ok_1"]);
    }

    #[test]
    fn fill_substitutes_all_occurrences() {
        let mut bindings = BTreeMap::new();
        bindings.insert("host".to_string(), "example.org".to_string());
        let filled = fill_template(r#"{{host}}/{{ host }}"#, &bindings).unwrap();
        assert_eq!(filled, "example.org/example.org");
    }

    #[test]
    fn fill_fails_on_missing_binding_instead_of_nulling() {
        let err = fill_template("{{password}}", &BTreeMap::new()).unwrap_err();
        match err {
            Error::MissingVariable(name) => assert_eq!(name, "password"),
            other => panic!("expected missing_variable, got {}", other),
        }
    }

    #[test]
    fn json_bindings_require_every_variable() {
        let variables = vec!["password".to_string(), "username".to_string()];
        let mut reader = Cursor::new(r#"{"username": "alice"}"#);
        let err = bindings_from_json(&mut reader, &variables).unwrap_err();
        assert_eq!(err.code(), "missing_variable");
    }

    #[test]
    fn json_bindings_parse_complete_objects() {
        let variables = vec!["password".to_string()];
        let mut reader = Cursor::new(r#"{"password": "secret", "extra": "ignored"}"#);
        let bindings = bindings_from_json(&mut reader, &variables).unwrap();
        assert_eq!(bindings.get("password").map(String::as_str), Some("secret"));
    }

    #[test]
    fn prompts_follow_discovery_order() {
        let variables = vec!["password".to_string(), "username".to_string()];
        let mut input = Cursor::new("secret\nalice\n");
        let mut output = Vec::new();
        let bindings = bindings_from_prompts(&mut input, &mut output, &variables).unwrap();
        assert_eq!(bindings.get("password").map(String::as_str), Some("secret"));
        assert_eq!(bindings.get("username").map(String::as_str), Some("alice"));
        let prompted = String::from_utf8(output).unwrap();
        assert_eq!(prompted, "password: username: ");
    }

    #[test]
    fn parse_without_placeholders_ignores_bindings() {
        let value = parse_document(r#"{"a": 1}"#, &BTreeMap::new()).unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
    }

    #[test]
    fn substituted_document_round_trips() {
        let template = r#"{"auth": {"username": "{{username}}", "password": "{{password}}"}}"#;
        let mut bindings = BTreeMap::new();
        bindings.insert("username".to_string(), "alice".to_string());
        bindings.insert("password".to_string(), "secret".to_string());
        let value = parse_document(template, &bindings).unwrap();
        let rendered = serde_json::to_string_pretty(&value).unwrap();
        let reparsed = parse_document(&rendered, &BTreeMap::new()).unwrap();
        assert_eq!(value, reparsed);
    }

    #[test]
    fn broken_substitution_is_malformed_document() {
        let mut bindings = BTreeMap::new();
        bindings.insert("v".to_string(), "\"".to_string());
        let err = parse_document(r#"{"a": "{{v}}"}"#, &bindings).unwrap_err();
        assert_eq!(err.code(), "malformed_document");
    }
}
