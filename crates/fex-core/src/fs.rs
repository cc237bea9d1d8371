//! Filesystem helpers for provisioning output.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            Error::ResourceUnavailable(format!("could not create {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, content).map_err(|e| {
        Error::ResourceUnavailable(format!("could not write {}: {}", path.display(), e))
    })
}
