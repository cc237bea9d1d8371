//! Engine registry and dispatcher.
//!
//! An engine is one execution backend: it validates the engine specific
//! sections of an experiment document and either submits the instructions to
//! a remote service or emits a local provisioning bundle. Dispatch happens
//! once, on the `engine_type` discriminator, through [`get_engine`].

pub mod adapt;
pub mod runbook;

mod common_workflow_language;
mod curious_containers;
mod vagrant;

use std::path::{Path, PathBuf};

use serde_json::Value;

use fex_core::{Document, Error, Result};

pub use adapt::AdaptOptions;
pub use common_workflow_language::CommonWorkflowLanguageEngine;
pub use curious_containers::CuriousContainersEngine;

pub const CURIOUS_CONTAINERS: &str = "curious-containers";
pub const COMMON_WORKFLOW_LANGUAGE: &str = "common-workflow-language";

/// The fixed enumeration of known engine discriminators.
pub const ENGINE_TYPES: &[&str] = &[CURIOUS_CONTAINERS, COMMON_WORKFLOW_LANGUAGE];

/// Outcome of the best-effort remote schema check inside
/// `validate_instructions`. `Unavailable` is a warning, never an error: the
/// remote contract is best effort and local validation already passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSchemaStatus {
    Validated,
    Unavailable { reason: String },
    NotApplicable,
}

#[derive(Debug, Clone)]
pub struct InstructionsReport {
    pub remote_schema: RemoteSchemaStatus,
}

#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub response: Value,
}

#[derive(Debug, Clone)]
pub struct ProvisioningBundle {
    pub output_directory: PathBuf,
    pub files: Vec<PathBuf>,
    pub forwarded_port: Option<u16>,
    pub runbook: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalityOptions {
    pub use_local_data: bool,
}

pub trait Engine {
    fn engine_type(&self) -> &'static str;

    fn validate_engine_config(&self, doc: &Document) -> Result<()>;

    fn validate_instructions(&self, doc: &Document) -> Result<InstructionsReport>;

    fn validate_meta_data(&self, doc: &Document) -> Result<()>;

    /// Rewrites input and result file connectors for a different data
    /// locality. Pure: the input document is left untouched.
    fn adapt(&self, doc: &Document, options: &AdaptOptions) -> Result<Document>;

    /// Submits the instructions to the remote service. Local-provisioning
    /// engines fail with `not_supported` and point at [`Engine::provision`].
    fn run(&self, doc: &Document) -> Result<SubmissionResult>;

    /// Emits a self-contained local-VM provisioning bundle into the output
    /// directory and returns the written files plus a numbered runbook.
    fn provision(
        &self,
        doc: &Document,
        output_directory: &Path,
        options: &LocalityOptions,
    ) -> Result<ProvisioningBundle>;
}

pub fn engine_for_type(engine_type: &str) -> Result<Box<dyn Engine>> {
    match engine_type {
        CURIOUS_CONTAINERS => Ok(Box::new(CuriousContainersEngine)),
        COMMON_WORKFLOW_LANGUAGE => Ok(Box::new(CommonWorkflowLanguageEngine)),
        other => Err(Error::UnknownEngine(other.to_string())),
    }
}

pub fn get_engine(doc: &Document) -> Result<Box<dyn Engine>> {
    engine_for_type(doc.engine_type())
}

/// Runs the full validation pipeline on an already constructed document:
/// envelope and experiment schemas, engine lookup, then the three engine
/// stages in order (config, instructions, meta data). The returned report
/// carries the remote schema status for the caller to surface.
pub fn validate_document(doc: &Document) -> Result<InstructionsReport> {
    fex_schemas::validate_envelope(doc.root())?;
    fex_schemas::validate_experiment(doc.root())?;
    let engine = get_engine(doc)?;
    engine.validate_engine_config(doc)?;
    let report = engine.validate_instructions(doc)?;
    engine.validate_meta_data(doc)?;
    Ok(report)
}

/// Validates a raw envelope value and returns the constructed document
/// together with the validation report.
pub fn validate(root: Value) -> Result<(Document, InstructionsReport)> {
    fex_schemas::validate_envelope(&root)?;
    fex_schemas::validate_experiment(&root)?;
    let doc = Document::from_value(root)?;
    let report = validate_document(&doc)?;
    Ok((doc, report))
}
