//! The common-workflow-language execution engine. Remote submission is not
//! available for this backend; experiments run inside a provisioned VM where
//! `cwltool` executes the workflow during provisioning.

use std::path::Path;

use serde_json::Value;
use tracing::info;

use fex_core::{ensure_dir, write_text, Descriptions, Document, Error, FileReference, Result};

use crate::adapt::AdaptOptions;
use crate::runbook::Runbook;
use crate::vagrant::{
    render_vagrantfile, VmDefinition, DEFAULT_VM_CPUS, DEFAULT_VM_MEMORY_MB, PROVISION_FILE_NAME,
    VAGRANT_FILE_NAME, VM_USER,
};
use crate::{
    Engine, InstructionsReport, LocalityOptions, ProvisioningBundle, RemoteSchemaStatus,
    SubmissionResult, COMMON_WORKFLOW_LANGUAGE,
};

const CWL_FILE_NAME: &str = "experiment.cwl";
const CWL_INPUT_FILE_NAME: &str = "experiment-cwl-input.yml";
const INPUTS_DIR: &str = "inputs";
const OUTPUTS_DIR: &str = "outputs";
const GUEST_INPUTS_DIR: &str = "/vagrant/inputs";

pub struct CommonWorkflowLanguageEngine;

struct CwlFiles {
    workflow: Value,
    workflow_input: Value,
}

fn cwltool_version(doc: &Document) -> Result<String> {
    doc.engine_config()
        .pointer("/install_requirements/cwltool_version")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            Error::MalformedDocument(
                "engine_config is missing install_requirements.cwltool_version".to_string(),
            )
        })
}

fn load_cwl_files(doc: &Document) -> Result<CwlFiles> {
    let instructions = doc.instructions();
    let workflow = load_yaml_reference(instructions, "/cwl_file")?;
    let workflow_input = load_yaml_reference(instructions, "/cwl_input_file")?;
    Ok(CwlFiles {
        workflow,
        workflow_input,
    })
}

fn load_yaml_reference(instructions: &Value, pointer: &str) -> Result<Value> {
    let reference_value = instructions.pointer(pointer).ok_or_else(|| {
        Error::MalformedDocument(format!("instructions are missing {}", pointer))
    })?;
    let reference = FileReference::from_value(reference_value)?;
    let text = reference.resolve_text()?;
    serde_yaml::from_str(&text).map_err(|e| {
        Error::MalformedDocument(format!("referenced file {} is not valid yaml: {}", pointer, e))
    })
}

/// Keys of every `File`-class entry in the workflow input mapping.
fn file_input_keys(workflow_input: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(entries) = workflow_input.as_object() {
        for (key, value) in entries {
            if value.get("class").and_then(|v| v.as_str()) == Some("File") {
                keys.push(key.clone());
            }
        }
    }
    keys
}

/// Redirects every `File`-class input to the shared folder of the VM.
fn adapt_workflow_input(workflow_input: &Value) -> Value {
    let mut adapted = workflow_input.clone();
    if let Some(entries) = adapted.as_object_mut() {
        for (key, value) in entries.iter_mut() {
            if value.get("class").and_then(|v| v.as_str()) == Some("File") {
                if let Some(entry) = value.as_object_mut() {
                    entry.insert(
                        "path".to_string(),
                        Value::String(format!("{}/{}", GUEST_INPUTS_DIR, key)),
                    );
                }
            }
        }
    }
    adapted
}

impl Engine for CommonWorkflowLanguageEngine {
    fn engine_type(&self) -> &'static str {
        COMMON_WORKFLOW_LANGUAGE
    }

    fn validate_engine_config(&self, doc: &Document) -> Result<()> {
        let schema = fex_schemas::compile_schema(fex_schemas::CWL_ENGINE_CONFIG_SCHEMA)?;
        fex_schemas::validate_against(&schema, doc.engine_config(), "engine_config")
    }

    fn validate_instructions(&self, doc: &Document) -> Result<InstructionsReport> {
        let schema = fex_schemas::compile_schema(fex_schemas::CWL_INSTRUCTIONS_SCHEMA)?;
        fex_schemas::validate_against(&schema, doc.instructions(), "instructions")?;
        Ok(InstructionsReport {
            remote_schema: RemoteSchemaStatus::NotApplicable,
        })
    }

    fn validate_meta_data(&self, doc: &Document) -> Result<()> {
        let meta = doc.meta_data();
        if let Some(applications) = &meta.applications {
            for entry in applications.values() {
                fex_schemas::validate_source_reference(entry)?;
            }
        }

        let cwl = load_cwl_files(doc)?;
        let file_keys = file_input_keys(&cwl.workflow_input);
        match &meta.input_files {
            Descriptions::Named(entries) => {
                for key in &file_keys {
                    if !entries.contains_key(key.as_str()) {
                        return Err(Error::InconsistentMetaData(format!(
                            "workflow input file '{}' has no description in meta_data.input_files",
                            key
                        )));
                    }
                }
            }
            Descriptions::Positional(entries) => {
                if entries.len() != file_keys.len() {
                    return Err(Error::InconsistentMetaData(format!(
                        "workflow references {} input files but meta_data describes {}",
                        file_keys.len(),
                        entries.len()
                    )));
                }
            }
        }
        Ok(())
    }

    fn adapt(&self, _doc: &Document, _options: &AdaptOptions) -> Result<Document> {
        Err(Error::NotSupported(
            "connector rewriting is not available with the common-workflow-language engine; \
             the vagrant tool rewrites workflow input paths on its own"
                .to_string(),
        ))
    }

    fn run(&self, _doc: &Document) -> Result<SubmissionResult> {
        Err(Error::NotSupported(
            "the run tool is not available with the common-workflow-language engine, \
             use the vagrant tool instead"
                .to_string(),
        ))
    }

    fn provision(
        &self,
        doc: &Document,
        output_directory: &Path,
        options: &LocalityOptions,
    ) -> Result<ProvisioningBundle> {
        self.validate_meta_data(doc)?;
        let version = cwltool_version(doc)?;
        let cwl = load_cwl_files(doc)?;
        let adapted_input = adapt_workflow_input(&cwl.workflow_input);

        ensure_dir(output_directory)?;
        let workflow_yaml = serde_yaml::to_string(&cwl.workflow).map_err(|e| {
            Error::ResourceUnavailable(format!("could not serialize workflow: {}", e))
        })?;
        let input_yaml = serde_yaml::to_string(&adapted_input).map_err(|e| {
            Error::ResourceUnavailable(format!("could not serialize workflow input: {}", e))
        })?;
        let artifacts = [
            (
                VAGRANT_FILE_NAME,
                render_vagrantfile(&VmDefinition {
                    memory_mb: DEFAULT_VM_MEMORY_MB,
                    cpus: DEFAULT_VM_CPUS,
                    forwarded_port: None,
                    provision_script: PROVISION_FILE_NAME,
                }),
            ),
            (PROVISION_FILE_NAME, render_provision_script(&version)),
            (CWL_FILE_NAME, workflow_yaml),
            (CWL_INPUT_FILE_NAME, input_yaml),
        ];
        let mut files = Vec::new();
        for (name, content) in artifacts {
            let path = output_directory.join(name);
            write_text(&path, &content)?;
            files.push(path);
        }
        let inputs_dir = output_directory.join(INPUTS_DIR);
        let outputs_dir = output_directory.join(OUTPUTS_DIR);
        ensure_dir(&inputs_dir)?;
        ensure_dir(&outputs_dir)?;

        info!(directory = %output_directory.display(), "wrote provisioning bundle");
        let runbook = build_runbook(doc, &cwl, output_directory, options);
        Ok(ProvisioningBundle {
            output_directory: output_directory.to_path_buf(),
            files,
            forwarded_port: None,
            runbook: runbook.render(),
        })
    }
}

fn render_provision_script(cwltool_version: &str) -> String {
    let lines = [
        "#!/usr/bin/env bash".to_string(),
        String::new(),
        "# bash strict mode".to_string(),
        "set -euo pipefail".to_string(),
        String::new(),
        "apt-get update".to_string(),
        "apt-get install -y docker.io python-pip".to_string(),
        String::new(),
        format!("usermod -aG docker {}", VM_USER),
        String::new(),
        format!("pip install \"cwltool=={}\"", cwltool_version),
        String::new(),
        "echo".to_string(),
        "echo setup successful".to_string(),
        "echo".to_string(),
        "echo run application...".to_string(),
        "echo".to_string(),
        String::new(),
        format!("cd /vagrant/{}", OUTPUTS_DIR),
        format!(
            "cwltool /vagrant/{} /vagrant/{}",
            CWL_FILE_NAME, CWL_INPUT_FILE_NAME
        ),
        String::new(),
    ];
    lines.join("\n")
}

fn build_runbook(
    doc: &Document,
    cwl: &CwlFiles,
    output_directory: &Path,
    options: &LocalityOptions,
) -> Runbook {
    let mut runbook = Runbook::new();
    let inputs_dir = output_directory.join(INPUTS_DIR);
    let outputs_dir = output_directory.join(OUTPUTS_DIR);

    runbook.blank();
    if options.use_local_data {
        runbook.note(
            "The option --use-local-data has been set. This setting is ignored by the \
             common-workflow-language execution engine.",
        );
        runbook.blank();
    }

    runbook.step(format!(
        "Copy the input files listed below into {} before running the experiment:",
        inputs_dir.display()
    ));
    for key in file_input_keys(&cwl.workflow_input) {
        runbook.blank();
        if let Some(description) = input_description(doc, &cwl.workflow, &key) {
            runbook.note(format!("file description: {}", description));
        }
        runbook.note(format!("file location: {}", inputs_dir.join(&key).display()));
    }
    runbook.blank();
    runbook.note(format!(
        "The result files will be written to {}",
        outputs_dir.display()
    ));

    runbook.blank();
    runbook.step(format!(
        "Change to {} and run: vagrant up --provider virtualbox \
         (Vagrant and VirtualBox are required beforehand)",
        output_directory.display()
    ));
    runbook.blank();
    runbook.note(
        "The experiment runs automatically while the virtual machine is being provisioned.",
    );
    runbook.blank();
    runbook
}

/// Prefers the named meta_data description for a workflow input, falling back
/// to the `doc` field of the workflow's own input declaration.
fn input_description(doc: &Document, workflow: &Value, key: &str) -> Option<String> {
    if let Descriptions::Named(entries) = &doc.meta_data().input_files {
        if let Some(entry) = entries.get(key) {
            return Some(entry.description.clone());
        }
    }
    workflow
        .pointer(&format!("/inputs/{}/doc", key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
