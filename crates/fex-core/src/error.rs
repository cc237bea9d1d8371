//! Error taxonomy shared across the fex crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed_document: {0}")]
    MalformedDocument(String),
    #[error("schema_violation in {section}: {}", .violations.join("; "))]
    SchemaViolation {
        section: String,
        violations: Vec<String>,
    },
    #[error("unknown_engine: '{0}' is not a registered engine_type")]
    UnknownEngine(String),
    #[error("inconsistent_meta_data: {0}")]
    InconsistentMetaData(String),
    #[error("unsupported_feature: {0}")]
    UnsupportedFeature(String),
    #[error("submission_rejected: engine responded with status {status}: {body}")]
    SubmissionRejected { status: u16, body: String },
    #[error("resource_unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("missing_variable: no binding provided for '{0}'")]
    MissingVariable(String),
    #[error("not_supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Stable machine readable code, independent of the message text.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedDocument(_) => "malformed_document",
            Error::SchemaViolation { .. } => "schema_violation",
            Error::UnknownEngine(_) => "unknown_engine",
            Error::InconsistentMetaData(_) => "inconsistent_meta_data",
            Error::UnsupportedFeature(_) => "unsupported_feature",
            Error::SubmissionRejected { .. } => "submission_rejected",
            Error::ResourceUnavailable(_) => "resource_unavailable",
            Error::MissingVariable(_) => "missing_variable",
            Error::NotSupported(_) => "not_supported",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::ResourceUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedDocument(err.to_string())
    }
}
