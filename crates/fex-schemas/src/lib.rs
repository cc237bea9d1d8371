//! The schema registry: embedded JSON Schema documents plus compile and
//! validate helpers. Schemas are shipped inside the binary and compiled on
//! demand by file name; validation collects every violation instead of
//! stopping at the first.

use include_dir::{include_dir, Dir};
use jsonschema::JSONSchema;
use serde_json::Value;

use fex_core::{Error, Result};

static SCHEMA_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

pub const ENVELOPE_SCHEMA: &str = "envelope_v1.json";
pub const EXPERIMENT_SCHEMA: &str = "experiment_v1.json";
pub const DESCRIPTIONS_SCHEMA: &str = "descriptions_v1.json";
pub const SOURCE_REFERENCE_SCHEMA: &str = "source_reference_v1.json";
pub const CC_ENGINE_CONFIG_SCHEMA: &str = "cc_engine_config_v1.json";
pub const CC_INSTRUCTIONS_SCHEMA: &str = "cc_instructions_local_v1.json";
pub const CWL_ENGINE_CONFIG_SCHEMA: &str = "cwl_engine_config_v1.json";
pub const CWL_INSTRUCTIONS_SCHEMA: &str = "cwl_instructions_v1.json";

pub fn compile_schema(name: &str) -> Result<JSONSchema> {
    let file = SCHEMA_DIR
        .get_file(name)
        .ok_or_else(|| Error::ResourceUnavailable(format!("embedded schema not found: {}", name)))?;
    let text = file.contents_utf8().ok_or_else(|| {
        Error::ResourceUnavailable(format!("embedded schema is not utf-8: {}", name))
    })?;
    let value: Value = serde_json::from_str(text).map_err(|e| {
        Error::ResourceUnavailable(format!("embedded schema {} is not valid json: {}", name, e))
    })?;
    compile_value(&value, name)
}

/// Compiles a schema provided as a value, e.g. one fetched from a remote
/// engine at validation time.
pub fn compile_value(schema: &Value, section: &str) -> Result<JSONSchema> {
    JSONSchema::compile(schema).map_err(|e| Error::SchemaViolation {
        section: section.to_string(),
        violations: vec![format!("schema does not compile: {}", e)],
    })
}

pub fn validate_against(schema: &JSONSchema, value: &Value, section: &str) -> Result<()> {
    if let Err(errors) = schema.validate(value) {
        let mut violations = Vec::new();
        for error in errors {
            violations.push(error.to_string());
        }
        return Err(Error::SchemaViolation {
            section: section.to_string(),
            violations,
        });
    }
    Ok(())
}

/// Checks the outer envelope: `format_version` must be exactly `"1"` and the
/// payload must live under the `experiment` key, nothing else.
pub fn validate_envelope(root: &Value) -> Result<()> {
    let schema = compile_schema(ENVELOPE_SCHEMA)?;
    validate_against(&schema, root, "envelope")
}

/// Checks the unwrapped experiment: required sections, the list-or-mapping
/// descriptions union, and the applications key pattern.
pub fn validate_experiment(root: &Value) -> Result<()> {
    let experiment = root
        .pointer("/experiment")
        .ok_or_else(|| Error::MalformedDocument("missing experiment section".to_string()))?;
    let schema = compile_schema(EXPERIMENT_SCHEMA)?;
    validate_against(&schema, experiment, "experiment")
}

pub fn validate_meta_descriptions(value: &Value) -> Result<()> {
    let schema = compile_schema(DESCRIPTIONS_SCHEMA)?;
    validate_against(&schema, value, "meta_data descriptions")
}

pub fn validate_source_reference(value: &Value) -> Result<()> {
    let schema = compile_schema(SOURCE_REFERENCE_SCHEMA)?;
    validate_against(&schema, value, "applications entry")
}
