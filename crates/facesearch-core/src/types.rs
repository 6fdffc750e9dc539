use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque name of the remote face collection used for one run.
///
/// Supplied externally and never created by this program. Always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle(String);

impl CollectionHandle {
    /// Build a handle from raw configuration text, trimming surrounding
    /// whitespace. Returns `None` when nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a search returns every candidate or only the top-ranked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    All,
    BestOnly,
}

/// One candidate returned by the remote service for a searched image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    /// External identifier attached to the face at index time.
    pub external_id: String,
    /// Similarity percentage in [0, 100].
    pub similarity: f32,
}

#[derive(Error, Debug, PartialEq)]
pub enum OptionsError {
    #[error("similarity threshold must be between 0 and 100, got {0}")]
    ThresholdOutOfRange(f32),
    #[error("maximum faces per image must be at least 1")]
    ZeroMaxFaces,
}

/// Immutable per-run matching options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunOptions {
    pub return_mode: ReturnMode,
    /// Minimum similarity (0–100) the remote service requires for a match.
    pub similarity_threshold: f32,
    /// Cap on faces registered from a single database image.
    pub max_faces: u32,
}

impl RunOptions {
    /// The "standard" preset: best match only, threshold 80, up to 40 faces.
    pub const STANDARD: RunOptions = RunOptions {
        return_mode: ReturnMode::BestOnly,
        similarity_threshold: 80.0,
        max_faces: 40,
    };

    pub fn new(
        return_mode: ReturnMode,
        similarity_threshold: f32,
        max_faces: u32,
    ) -> Result<Self, OptionsError> {
        if !(0.0..=100.0).contains(&similarity_threshold) {
            return Err(OptionsError::ThresholdOutOfRange(similarity_threshold));
        }
        if max_faces == 0 {
            return Err(OptionsError::ZeroMaxFaces);
        }
        Ok(Self {
            return_mode,
            similarity_threshold,
            max_faces,
        })
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::STANDARD
    }
}
