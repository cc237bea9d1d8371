mod common;

use common::{cc_document, cc_value, cwl_document, UNREACHABLE_URL};
use serde_json::json;

use fex_core::Document;
use fex_engines::adapt::{adapt_connectors, adapt_engine_endpoint, AdaptOptions};
use fex_engines::get_engine;

#[test]
fn local_input_files_get_indexed_connectors() {
    let doc = cc_document(UNREACHABLE_URL);
    let adapted = adapt_connectors(
        &doc,
        &AdaptOptions {
            use_local_input_files: true,
            use_local_result_files: false,
        },
    )
    .unwrap();
    let connector = adapted
        .instructions()
        .pointer("/input_files/0/connector_access")
        .unwrap();
    assert_eq!(
        connector,
        &json!({"url": "http://file-server/0", "method": "GET"})
    );
    assert_eq!(
        adapted
            .instructions()
            .pointer("/input_files/0/connector_type")
            .unwrap(),
        &json!("http")
    );
    // result files untouched
    assert_eq!(
        adapted.instructions().pointer("/result_files"),
        doc.instructions().pointer("/result_files")
    );
}

#[test]
fn local_result_files_are_deduplicated_and_sorted() {
    let mut root = cc_value(UNREACHABLE_URL);
    *root
        .pointer_mut("/experiment/instructions/result_files")
        .unwrap() = json!([
        {"local_result_file": "zeta"},
        {"local_result_file": "alpha"},
        {"local_result_file": "zeta"}
    ]);
    let doc = Document::from_value(root).unwrap();
    let adapted = adapt_connectors(
        &doc,
        &AdaptOptions {
            use_local_input_files: false,
            use_local_result_files: true,
        },
    )
    .unwrap();
    let result_files = adapted
        .instructions()
        .pointer("/result_files")
        .and_then(|v| v.as_array())
        .unwrap();
    assert_eq!(result_files.len(), 2);
    assert_eq!(result_files[0].get("local_result_file").unwrap(), "alpha");
    assert_eq!(result_files[1].get("local_result_file").unwrap(), "zeta");
    assert_eq!(
        result_files[1].pointer("/connector_access").unwrap(),
        &json!({"url": "http://file-server/zeta", "method": "POST"})
    );
}

#[test]
fn adapt_is_idempotent() {
    let doc = cc_document(UNREACHABLE_URL);
    let once = adapt_connectors(&doc, &AdaptOptions::local()).unwrap();
    let twice = adapt_connectors(&once, &AdaptOptions::local()).unwrap();
    assert_eq!(once.root(), twice.root());
}

#[test]
fn adapt_leaves_the_original_document_untouched() {
    let doc = cc_document(UNREACHABLE_URL);
    let before = doc.root().clone();
    let _ = adapt_connectors(&doc, &AdaptOptions::local()).unwrap();
    assert_eq!(doc.root(), &before);
}

#[test]
fn adapt_without_flags_changes_nothing() {
    let doc = cc_document(UNREACHABLE_URL);
    let adapted = adapt_connectors(&doc, &AdaptOptions::default()).unwrap();
    assert_eq!(adapted.root(), doc.root());
}

#[test]
fn endpoint_rewrite_preserves_install_requirements() {
    let doc = cc_document(UNREACHABLE_URL);
    let rewritten =
        adapt_engine_endpoint(&doc, "http://localhost:45123", "user", "generated").unwrap();
    let config = rewritten.engine_config();
    assert_eq!(config.pointer("/url").unwrap(), "http://localhost:45123");
    assert_eq!(config.pointer("/auth/username").unwrap(), "user");
    assert_eq!(config.pointer("/auth/password").unwrap(), "generated");
    assert_eq!(
        config.pointer("/install_requirements/engine_version").unwrap(),
        "0.12"
    );
}

#[test]
fn connector_rewriting_is_not_supported_for_cwl() {
    let doc = cwl_document();
    let engine = get_engine(&doc).unwrap();
    let err = engine.adapt(&doc, &AdaptOptions::local()).unwrap_err();
    assert_eq!(err.code(), "not_supported");
}
