//! Loading of documents, templates and referenced instruction files.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};

/// Bounded timeouts applied to every remote call made by the tool suite.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(READ_TIMEOUT)
        .build()
        .map_err(|e| Error::ResourceUnavailable(format!("could not build http client: {}", e)))
}

pub fn load_local(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::ResourceUnavailable(format!("could not read {}: {}", path.display(), e)))
}

pub fn load_url(url: &str) -> Result<String> {
    let response = http_client()?
        .get(url)
        .send()
        .map_err(|e| Error::ResourceUnavailable(format!("GET {} failed: {}", url, e)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::ResourceUnavailable(format!(
            "GET {} returned status {}",
            url, status
        )));
    }
    response
        .text()
        .map_err(|e| Error::ResourceUnavailable(format!("could not read body of {}: {}", url, e)))
}

/// A reference to an instruction file: a local path, a URL, or inline text.
/// Exactly one form is present in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReference {
    Path(String),
    Url(String),
    InlineJson(String),
    InlineYaml(String),
}

impl FileReference {
    pub fn from_value(value: &Value) -> Result<Self> {
        let entries = value.as_object().ok_or_else(|| {
            Error::MalformedDocument("file reference must be an object".to_string())
        })?;
        if entries.len() != 1 {
            return Err(Error::MalformedDocument(
                "file reference must carry exactly one of: path, url, json, yaml".to_string(),
            ));
        }
        let (key, raw) = match entries.iter().next() {
            Some(entry) => entry,
            None => {
                return Err(Error::MalformedDocument(
                    "file reference must not be empty".to_string(),
                ))
            }
        };
        let text = raw.as_str().ok_or_else(|| {
            Error::MalformedDocument(format!("file reference field '{}' must be a string", key))
        })?;
        match key.as_str() {
            "path" => Ok(FileReference::Path(text.to_string())),
            "url" => Ok(FileReference::Url(text.to_string())),
            "json" => Ok(FileReference::InlineJson(text.to_string())),
            "yaml" => Ok(FileReference::InlineYaml(text.to_string())),
            other => Err(Error::MalformedDocument(format!(
                "unknown file reference field '{}'",
                other
            ))),
        }
    }

    pub fn resolve_text(&self) -> Result<String> {
        match self {
            FileReference::Path(path) => load_local(Path::new(path)),
            FileReference::Url(url) => load_url(url),
            FileReference::InlineJson(text) | FileReference::InlineYaml(text) => {
                Ok(text.clone())
            }
        }
    }
}
