//! The experiment document model.
//!
//! A document is the envelope `{"format_version": "1", "experiment": {...}}`.
//! The engine specific sections (`engine_config`, `instructions`) stay opaque
//! `serde_json::Value`s, while `meta_data` is parsed into a typed view once at
//! construction time. The list-or-mapping shape of every descriptions field is
//! decided here, and downstream code matches on the [`Descriptions`] variant
//! instead of re-inspecting the raw value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const FORMAT_VERSION: &str = "1";

static NULL: Value = Value::Null;

#[derive(Debug, Clone)]
pub struct Document {
    root: Value,
    engine_type: String,
    meta: MetaData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications: Option<BTreeMap<String, Value>>,
    pub input_files: Descriptions,
    pub result_files: Descriptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    pub descriptions: Descriptions,
    pub is_optional: bool,
}

/// A descriptions collection is either positional (identity by index) or
/// named (identity by key). Exactly one representation per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descriptions {
    Positional(Vec<DescriptionEntry>),
    Named(BTreeMap<String, DescriptionEntry>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptionEntry {
    pub description: String,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corresponding_instruction: Option<String>,
}

impl Descriptions {
    pub fn len(&self) -> usize {
        match self {
            Descriptions::Positional(entries) => entries.len(),
            Descriptions::Named(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, name: &str) -> bool {
        match self {
            Descriptions::Positional(_) => false,
            Descriptions::Named(entries) => entries.contains_key(name),
        }
    }

    pub fn any_optional(&self) -> bool {
        match self {
            Descriptions::Positional(entries) => entries.iter().any(|e| e.is_optional),
            Descriptions::Named(entries) => entries.values().any(|e| e.is_optional),
        }
    }
}

impl Document {
    /// Builds a document from the raw envelope value. The caller is expected
    /// to run the schema registry checks first; this constructor only
    /// enforces the structure the typed accessors rely on.
    pub fn from_value(root: Value) -> Result<Self> {
        let engine_type = root
            .pointer("/experiment/execution_engine/engine_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::MalformedDocument(
                    "missing experiment.execution_engine.engine_type".to_string(),
                )
            })?
            .to_string();
        if root.pointer("/experiment/execution_engine/engine_config").is_none() {
            return Err(Error::MalformedDocument(
                "missing experiment.execution_engine.engine_config".to_string(),
            ));
        }
        if root.pointer("/experiment/instructions").is_none() {
            return Err(Error::MalformedDocument(
                "missing experiment.instructions".to_string(),
            ));
        }
        let meta_value = root.pointer("/experiment/meta_data").ok_or_else(|| {
            Error::MalformedDocument("missing experiment.meta_data".to_string())
        })?;
        let meta: MetaData = serde_json::from_value(meta_value.clone()).map_err(|e| {
            Error::MalformedDocument(format!("meta_data does not match the descriptions model: {}", e))
        })?;
        Ok(Document {
            root,
            engine_type,
            meta,
        })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    pub fn engine_type(&self) -> &str {
        &self.engine_type
    }

    pub fn engine_config(&self) -> &Value {
        self.root
            .pointer("/experiment/execution_engine/engine_config")
            .unwrap_or(&NULL)
    }

    pub fn instructions(&self) -> &Value {
        self.root.pointer("/experiment/instructions").unwrap_or(&NULL)
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_root() -> Value {
        json!({
            "format_version": "1",
            "experiment": {
                "execution_engine": {
                    "engine_type": "curious-containers",
                    "engine_config": {}
                },
                "instructions": {
                    "input_files": [],
                    "result_files": []
                },
                "meta_data": {
                    "input_files": [],
                    "result_files": {}
                }
            }
        })
    }

    #[test]
    fn builds_from_minimal_document() {
        let doc = Document::from_value(minimal_root()).unwrap();
        assert_eq!(doc.engine_type(), "curious-containers");
        assert!(matches!(doc.meta_data().input_files, Descriptions::Positional(_)));
        assert!(matches!(doc.meta_data().result_files, Descriptions::Named(_)));
    }

    #[test]
    fn positional_descriptions_parse_from_array() {
        let value = json!([
            {"description": "first input"},
            {"description": "second input", "is_optional": true}
        ]);
        let descriptions: Descriptions = serde_json::from_value(value).unwrap();
        match &descriptions {
            Descriptions::Positional(entries) => {
                assert_eq!(entries.len(), 2);
                assert!(!entries[0].is_optional);
                assert!(entries[1].is_optional);
            }
            Descriptions::Named(_) => panic!("array must parse as positional"),
        }
        assert!(descriptions.any_optional());
    }

    #[test]
    fn named_descriptions_parse_from_mapping() {
        let value = json!({
            "out.csv": {"description": "aggregated results"}
        });
        let descriptions: Descriptions = serde_json::from_value(value).unwrap();
        assert!(descriptions.contains_key("out.csv"));
        assert!(!descriptions.contains_key("other"));
        assert!(!descriptions.any_optional());
    }

    #[test]
    fn missing_engine_type_is_rejected() {
        let mut root = minimal_root();
        root.pointer_mut("/experiment/execution_engine")
            .unwrap()
            .as_object_mut()
            .unwrap()
            .remove("engine_type");
        let err = Document::from_value(root).unwrap_err();
        assert_eq!(err.code(), "malformed_document");
    }

    #[test]
    fn unknown_meta_field_is_rejected() {
        let mut root = minimal_root();
        root.pointer_mut("/experiment/meta_data")
            .unwrap()
            .as_object_mut()
            .unwrap()
            .insert("unexpected".to_string(), json!(1));
        let err = Document::from_value(root).unwrap_err();
        assert_eq!(err.code(), "malformed_document");
    }
}
