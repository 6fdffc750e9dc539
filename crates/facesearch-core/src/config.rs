use crate::preparer::{DATABASE_LONG_EDGE, DEFAULT_JPEG_QUALITY, QUERY_LONG_EDGE};
use crate::types::CollectionHandle;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Deployment-time region of the remote face service.
pub const DEFAULT_REGION: &str = "eu-west-2";
pub const DEFAULT_COLLECTION_FILE: &str = "CollectionID.txt";
pub const DEFAULT_SCRATCH_DIR: &str = "TEMP";

const FIXED_DATABASE_DIR: &str = "Database";
const FIXED_QUERY_DIR: &str = "Query";
const FIXED_OUTPUT_DIR: &str = "Output";
/// Output folder created inside the query tree for user-chosen paths.
pub const MATCHES_DIR: &str = "Matches";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("collection id file {0} not found")]
    MissingHandle(PathBuf),
    #[error("collection id file {0} is empty")]
    EmptyHandle(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runtime settings, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// File holding the collection handle.
    pub collection_file: PathBuf,
    /// Region of the remote face service.
    pub region: String,
    /// Root of the per-run scratch area.
    pub scratch_root: PathBuf,
    /// Long edge of downsized database images.
    pub database_edge: u32,
    /// Long edge of downsized query images.
    pub query_edge: u32,
    pub jpeg_quality: u8,
}

impl Settings {
    /// Load settings from `FACESEARCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            collection_file: std::env::var("FACESEARCH_COLLECTION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_COLLECTION_FILE)),
            region: std::env::var("FACESEARCH_REGION")
                .unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            scratch_root: std::env::var("FACESEARCH_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCRATCH_DIR)),
            database_edge: env_u32("FACESEARCH_DATABASE_EDGE", DATABASE_LONG_EDGE),
            query_edge: env_u32("FACESEARCH_QUERY_EDGE", QUERY_LONG_EDGE),
            jpeg_quality: env_u8("FACESEARCH_JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection_file: PathBuf::from(DEFAULT_COLLECTION_FILE),
            region: DEFAULT_REGION.to_string(),
            scratch_root: PathBuf::from(DEFAULT_SCRATCH_DIR),
            database_edge: DATABASE_LONG_EDGE,
            query_edge: QUERY_LONG_EDGE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read the collection handle from its well-known file.
pub fn read_collection_handle(path: &Path) -> Result<CollectionHandle, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingHandle(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source: err,
            }
        }
    })?;
    CollectionHandle::new(&raw).ok_or_else(|| ConfigError::EmptyHandle(path.to_path_buf()))
}

/// Where source images come from and where results go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// `Database`, `Query` and `Output` folders under `root`; flat scratch
    /// and single-level discovery.
    Fixed { root: PathBuf },
    /// User-chosen source trees; results go to `<query>/Matches`, scratch
    /// mirrors the source trees and discovery is recursive.
    UserPaths { query: PathBuf, database: PathBuf },
}

/// Concrete folders for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub database: PathBuf,
    pub query: PathBuf,
    pub output: PathBuf,
    pub scratch_root: PathBuf,
    /// Recursive discovery with a scratch tree mirroring the sources.
    pub tree_preserving: bool,
}

impl Layout {
    pub fn resolve(&self, scratch_root: &Path) -> RunPaths {
        match self {
            Layout::Fixed { root } => RunPaths {
                database: root.join(FIXED_DATABASE_DIR),
                query: root.join(FIXED_QUERY_DIR),
                output: root.join(FIXED_OUTPUT_DIR),
                scratch_root: scratch_root.to_path_buf(),
                tree_preserving: false,
            },
            Layout::UserPaths { query, database } => RunPaths {
                database: database.clone(),
                query: query.clone(),
                output: query.join(MATCHES_DIR),
                scratch_root: scratch_root.to_path_buf(),
                tree_preserving: true,
            },
        }
    }
}
