//! The document rewriter: redirects input and result file connectors to the
//! local file-serving endpoint of a provisioned VM. Pure transformations on a
//! deep copy; the caller's document is never mutated.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use fex_core::{Document, Error, Result};

/// Base URL of the file-serving container inside the provisioned VM.
pub const FILE_SERVER_URL: &str = "http://file-server";

#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptOptions {
    pub use_local_input_files: bool,
    pub use_local_result_files: bool,
}

impl AdaptOptions {
    pub fn local() -> Self {
        AdaptOptions {
            use_local_input_files: true,
            use_local_result_files: true,
        }
    }
}

/// Rewrites file connectors according to the locality flags. Input files are
/// indexed by position, result files by their deduplicated
/// `local_result_file` name; the `connector_*` fields are replaced outright,
/// never merged, which makes the rewrite idempotent.
pub fn adapt_connectors(doc: &Document, options: &AdaptOptions) -> Result<Document> {
    let mut root = doc.root().clone();
    if options.use_local_input_files {
        rewrite_input_connectors(&mut root)?;
    }
    if options.use_local_result_files {
        rewrite_result_connectors(&mut root)?;
    }
    Document::from_value(root)
}

fn rewrite_input_connectors(root: &mut Value) -> Result<()> {
    let input_files = root
        .pointer_mut("/experiment/instructions/input_files")
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| {
            Error::MalformedDocument("instructions.input_files must be an array".to_string())
        })?;
    for (index, input_file) in input_files.iter_mut().enumerate() {
        let entry = input_file.as_object_mut().ok_or_else(|| {
            Error::MalformedDocument("instructions.input_files entries must be objects".to_string())
        })?;
        entry.insert("connector_type".to_string(), json!("http"));
        entry.insert(
            "connector_access".to_string(),
            json!({
                "url": format!("{}/{}", FILE_SERVER_URL, index),
                "method": "GET"
            }),
        );
    }
    Ok(())
}

fn rewrite_result_connectors(root: &mut Value) -> Result<()> {
    let result_files = root
        .pointer_mut("/experiment/instructions/result_files")
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| {
            Error::MalformedDocument("instructions.result_files must be an array".to_string())
        })?;
    let mut names = BTreeSet::new();
    for result_file in result_files.iter() {
        let name = result_file
            .get("local_result_file")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::MalformedDocument(
                    "instructions.result_files entries must carry local_result_file".to_string(),
                )
            })?;
        names.insert(name.to_string());
    }
    *result_files = names
        .into_iter()
        .map(|name| {
            json!({
                "local_result_file": name,
                "connector_type": "http",
                "connector_access": {
                    "url": format!("{}/{}", FILE_SERVER_URL, name),
                    "method": "POST"
                }
            })
        })
        .collect();
    Ok(())
}

/// Redirects the engine endpoint to a local service, replacing `url` and
/// `auth` while leaving `install_requirements` and every other config field
/// in place.
pub fn adapt_engine_endpoint(
    doc: &Document,
    url: &str,
    username: &str,
    password: &str,
) -> Result<Document> {
    let mut root = doc.root().clone();
    let config = root
        .pointer_mut("/experiment/execution_engine/engine_config")
        .and_then(|v| v.as_object_mut())
        .ok_or_else(|| {
            Error::MalformedDocument("execution_engine.engine_config must be an object".to_string())
        })?;
    config.insert("url".to_string(), json!(url));
    config.insert(
        "auth".to_string(),
        json!({"username": username, "password": password}),
    );
    Document::from_value(root)
}
