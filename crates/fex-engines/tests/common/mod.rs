#![allow(dead_code)]

use serde_json::{json, Value};

use fex_core::Document;

/// A complete curious-containers experiment with one input file and one
/// result file, pointing at the given engine url.
pub fn cc_value(url: &str) -> Value {
    json!({
        "format_version": "1",
        "experiment": {
            "execution_engine": {
                "engine_type": "curious-containers",
                "engine_config": {
                    "url": url,
                    "auth": {"username": "agent", "password": "secret"},
                    "install_requirements": {"engine_version": "0.12"}
                }
            },
            "instructions": {
                "application_container_description": {"image": "experiment-image"},
                "input_files": [{
                    "connector_type": "http",
                    "connector_access": {"url": "https://data.example.org/in0", "method": "GET"}
                }],
                "result_files": [{
                    "local_result_file": "out",
                    "connector_type": "http",
                    "connector_access": {"url": "https://data.example.org/out", "method": "POST"}
                }]
            },
            "meta_data": {
                "input_files": [{"description": "first input table"}],
                "result_files": {"out": {"description": "aggregated output"}}
            }
        }
    })
}

pub fn cc_document(url: &str) -> Document {
    Document::from_value(cc_value(url)).expect("fixture document is well formed")
}

/// A complete common-workflow-language experiment with inline workflow and
/// workflow input files.
pub fn cwl_value() -> Value {
    let workflow = "inputs:\n  data_csv:\n    type: File\n    doc: input table\noutputs: {}\n";
    let workflow_input = "data_csv:\n  class: File\n  path: /home/researcher/data.csv\n";
    json!({
        "format_version": "1",
        "experiment": {
            "execution_engine": {
                "engine_type": "common-workflow-language",
                "engine_config": {
                    "install_requirements": {"cwltool_version": "1.0.20170828135420"}
                }
            },
            "instructions": {
                "cwl_file": {"yaml": workflow},
                "cwl_input_file": {"yaml": workflow_input}
            },
            "meta_data": {
                "input_files": {"data_csv": {"description": "input table"}},
                "result_files": {}
            }
        }
    })
}

pub fn cwl_document() -> Document {
    Document::from_value(cwl_value()).expect("fixture document is well formed")
}

/// An engine url nothing listens on; connections are refused immediately.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";
