//! Locally minted external identifiers for indexed database images.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("external id {0:?} was never issued during this run")]
    UnknownId(String),
}

/// Maps sequential ids ("1", "2", ...) to original database image paths.
///
/// Ids are issued in registration order starting at 1 and each id is
/// written exactly once. The remote service echoes them back unchanged, so
/// an unknown id on resolution is a defect rather than a user error.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    // Index `n` holds the path for id `n + 1`.
    originals: Vec<PathBuf>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `original` and return its newly minted id.
    pub fn register(&mut self, original: impl Into<PathBuf>) -> String {
        self.originals.push(original.into());
        self.originals.len().to_string()
    }

    /// Look up the original path behind an id returned by the remote service.
    pub fn resolve(&self, id: &str) -> Result<&Path, RegistryError> {
        id.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| self.originals.get(index))
            .map(PathBuf::as_path)
            .ok_or_else(|| RegistryError::UnknownId(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }
}
