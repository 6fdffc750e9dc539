//! facesearch-core: Match database photos against query photos by face.
//!
//! Face detection and similarity live behind the [`FaceCollection`]
//! capability; this crate prepares downsized working copies, indexes them
//! under locally minted ids, interprets search results and guarantees the
//! remote collection and scratch area are purged when a run ends.

pub mod collection;
pub mod config;
pub mod discovery;
pub mod exporter;
pub mod preparer;
pub mod registry;
pub mod report;
pub mod scratch;
pub mod types;
pub mod workflow;

pub use collection::{CollectionError, FaceCollection, PurgeOutcome, SEARCH_MAX_FACES};
pub use config::{read_collection_handle, ConfigError, Layout, RunPaths, Settings};
pub use exporter::{check_previous_matches, ExportError, MatchExporter};
pub use preparer::{target_dimensions, ImagePreparer, PrepareOutcome, PreparedImage};
pub use registry::{IdentifierRegistry, RegistryError};
pub use report::{MatchRecord, QueryReport, RunReport};
pub use types::{CollectionHandle, FaceMatch, OptionsError, ReturnMode, RunOptions};
pub use workflow::{run, RunContext, RunSummary, WorkflowConfig, WorkflowError};
