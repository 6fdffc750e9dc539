//! The match-and-cleanup workflow.
//!
//! `run` drives a linear sequence: validate sources and output folder,
//! establish scratch, downsize database and query images, index the
//! database into the remote collection, search each query and export
//! matches, then purge the collection and delete scratch.
//!
//! Purge and scratch deletion are owned by [`RunContext`]: they run when the
//! context is finished explicitly and, failing that, when it is dropped, so
//! an early return or a panic anywhere between indexing and export still
//! leaves the collection empty and no scratch behind.

use crate::collection::{CollectionError, FaceCollection, PurgeOutcome};
use crate::config::{RunPaths, Settings};
use crate::discovery::discover_images;
use crate::exporter::{ExportError, MatchExporter};
use crate::preparer::{ImagePreparer, PrepareOutcome, PreparedImage};
use crate::registry::{IdentifierRegistry, RegistryError};
use crate::report::{write_report, MatchRecord, QueryReport, RunReport, REPORT_FILE_NAME};
use crate::scratch::ScratchArea;
use crate::types::{CollectionHandle, RunOptions};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("source folder {0} does not exist")]
    MissingSource(PathBuf),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("scratch area {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("remote collection: {0}")]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Everything a run needs besides the remote collection itself.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub handle: CollectionHandle,
    pub options: RunOptions,
    pub paths: RunPaths,
    pub database_edge: u32,
    pub query_edge: u32,
    pub jpeg_quality: u8,
}

impl WorkflowConfig {
    pub fn new(
        handle: CollectionHandle,
        options: RunOptions,
        paths: RunPaths,
        settings: &Settings,
    ) -> Self {
        Self {
            handle,
            options,
            paths,
            database_edge: settings.database_edge,
            query_edge: settings.query_edge,
            jpeg_quality: settings.jpeg_quality,
        }
    }
}

/// Counters and outcomes of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub downsized: usize,
    pub skipped: usize,
    pub indexed_images: usize,
    pub indexed_faces: usize,
    pub queries_searched: usize,
    pub matches_found: usize,
    pub matches_exported: usize,
    pub report: Option<PathBuf>,
    /// `None` when indexing never started and no purge was needed.
    pub purge: Option<PurgeOutcome>,
    pub scratch_removed: bool,
}

/// What the cleanup phase did.
#[derive(Debug, Clone, Copy)]
pub struct CleanupReport {
    pub purge: Option<PurgeOutcome>,
    pub scratch_removed: bool,
}

/// Per-run state: the remote collection, the id registry and the scratch
/// area. Cleans up after itself exactly once.
pub struct RunContext<'a, C: FaceCollection> {
    collection: &'a C,
    handle: CollectionHandle,
    registry: IdentifierRegistry,
    scratch: ScratchArea,
    indexing_started: bool,
    cleaned_up: bool,
}

impl<'a, C: FaceCollection> RunContext<'a, C> {
    /// Establish a fresh scratch area and an empty registry.
    pub fn begin(
        collection: &'a C,
        handle: CollectionHandle,
        scratch_root: &Path,
    ) -> Result<Self, WorkflowError> {
        let scratch = ScratchArea::create(scratch_root).map_err(|source| WorkflowError::Scratch {
            path: scratch_root.to_path_buf(),
            source,
        })?;
        tracing::info!(collection = %handle, scratch = %scratch_root.display(), "run started");
        Ok(Self {
            collection,
            handle,
            registry: IdentifierRegistry::new(),
            scratch,
            indexing_started: false,
            cleaned_up: false,
        })
    }

    pub fn registry(&self) -> &IdentifierRegistry {
        &self.registry
    }

    pub fn scratch(&self) -> &ScratchArea {
        &self.scratch
    }

    /// Index one downsized database image under a freshly minted id.
    ///
    /// Returns the number of faces registered, or `None` when the working
    /// copy could not be read and the image was skipped.
    pub fn index_image(
        &mut self,
        image: &PreparedImage,
        max_faces: u32,
    ) -> Result<Option<usize>, WorkflowError> {
        let name = display_name(&image.original);
        let bytes = match fs::read(&image.working) {
            Ok(bytes) => bytes,
            Err(err) => {
                println!("  Problem reading {name}.");
                tracing::warn!(working = %image.working.display(), error = %err, "index skipped");
                return Ok(None);
            }
        };

        self.indexing_started = true;
        let external_id = self.registry.register(image.original.clone());
        let faces = match self
            .collection
            .index(&bytes, &self.handle, &external_id, max_faces)
        {
            Ok(faces) => faces,
            Err(CollectionError::NoFaceInImage) => 0,
            Err(err) => return Err(err.into()),
        };

        if faces == 1 {
            println!("  1 face indexed for {name}");
        } else {
            println!("  {faces} faces indexed for {name}");
        }
        tracing::debug!(
            external_id = %external_id,
            faces,
            original = %image.original.display(),
            "image indexed"
        );
        Ok(Some(faces))
    }

    /// Search the collection with one downsized query image and export
    /// every match it returns.
    pub fn search_image(
        &self,
        query: &PreparedImage,
        options: &RunOptions,
        exporter: &MatchExporter,
    ) -> Result<QueryReport, WorkflowError> {
        let name = display_name(&query.original);
        println!("Searching for faces in {name}");
        let mut report = QueryReport::new(&query.original);

        let bytes = match fs::read(&query.working) {
            Ok(bytes) => bytes,
            Err(err) => {
                println!("  Problem reading {name}.");
                tracing::warn!(working = %query.working.display(), error = %err, "search skipped");
                report.skipped = Some(err.to_string());
                return Ok(report);
            }
        };

        let matches = match self.collection.search(
            &bytes,
            &self.handle,
            options.return_mode,
            options.similarity_threshold,
        ) {
            Ok(Some(matches)) => matches,
            Ok(None) => {
                println!("  No faces matched.");
                return Ok(report);
            }
            Err(CollectionError::NoFaceInImage) => {
                println!("  No face detected in {name}.");
                report.skipped = Some(CollectionError::NoFaceInImage.to_string());
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };

        for candidate in matches {
            let original = self.registry.resolve(&candidate.external_id)?.to_path_buf();
            println!(
                "  {} matched with a similarity of {:.4}%",
                display_name(&original),
                candidate.similarity
            );
            let exported_as = exporter.export(&original, &query.original);
            report.matches.push(MatchRecord {
                database_image: original,
                similarity: candidate.similarity,
                exported_as,
            });
        }
        Ok(report)
    }

    /// Purge the collection (once indexing has begun) and delete scratch.
    pub fn finish(mut self) -> CleanupReport {
        self.cleanup()
    }

    fn cleanup(&mut self) -> CleanupReport {
        if self.cleaned_up {
            return CleanupReport {
                purge: None,
                scratch_removed: !self.scratch.root().exists(),
            };
        }
        self.cleaned_up = true;

        let purge = if self.indexing_started {
            println!("\nRemoving faces from collection");
            let outcome = self.collection.purge(&self.handle);
            if outcome.is_success() {
                println!("Collection successfully emptied.");
            } else {
                println!(
                    "Problem removing faces from collection (status {})",
                    outcome.status_code()
                );
            }
            Some(outcome)
        } else {
            None
        };

        println!("\nRemoving temporary files");
        let scratch_removed = self.scratch.remove();
        if scratch_removed {
            println!("Temporary files deleted.");
        }
        tracing::info!(?purge, scratch_removed, "run cleaned up");

        CleanupReport {
            purge,
            scratch_removed,
        }
    }
}

impl<C: FaceCollection> Drop for RunContext<'_, C> {
    fn drop(&mut self) {
        if !self.cleaned_up {
            tracing::warn!("run ended before cleanup; purging now");
            self.cleanup();
        }
    }
}

/// Run the whole workflow against `collection`.
pub fn run<C: FaceCollection>(
    collection: &C,
    config: &WorkflowConfig,
) -> Result<RunSummary, WorkflowError> {
    let paths = &config.paths;
    let database_root = existing_dir(&paths.database)?;
    let query_root = existing_dir(&paths.query)?;

    // Refuses to start over leftovers before anything is mutated.
    let exporter = MatchExporter::open(&paths.output)?;
    let output_root = fs::canonicalize(exporter.output_dir())
        .unwrap_or_else(|_| exporter.output_dir().to_path_buf());

    let mut context = RunContext::begin(collection, config.handle.clone(), &paths.scratch_root)?;
    let mut summary = RunSummary::default();
    let scratch_root = fs::canonicalize(context.scratch().root())
        .unwrap_or_else(|_| context.scratch().root().to_path_buf());

    let sources = Sources {
        database: &database_root,
        query: &query_root,
        output: &output_root,
        scratch: &scratch_root,
    };
    let outcome = execute(&mut context, config, &sources, &exporter, &mut summary);

    let cleanup = context.finish();
    summary.purge = cleanup.purge;
    summary.scratch_removed = cleanup.scratch_removed;

    match outcome {
        Ok(()) => Ok(summary),
        Err(err) => {
            tracing::error!(error = %err, "run aborted");
            Err(err)
        }
    }
}

struct Sources<'p> {
    database: &'p Path,
    query: &'p Path,
    output: &'p Path,
    scratch: &'p Path,
}

fn execute<C: FaceCollection>(
    context: &mut RunContext<'_, C>,
    config: &WorkflowConfig,
    sources: &Sources<'_>,
    exporter: &MatchExporter,
    summary: &mut RunSummary,
) -> Result<(), WorkflowError> {
    let preparer = ImagePreparer::new(config.jpeg_quality);
    let tree_preserving = config.paths.tree_preserving;
    // Either folder may sit inside a source tree.
    let excluded = [sources.output, sources.scratch];

    println!("\nProducing downsized Database copies.");
    let database = downsize_all(
        &preparer,
        sources.database,
        &context.scratch().database_dir(),
        config.database_edge,
        tree_preserving,
        &excluded,
        summary,
    );

    println!("\nProducing downsized Query copies.");
    let queries = downsize_all(
        &preparer,
        sources.query,
        &context.scratch().query_dir(),
        config.query_edge,
        tree_preserving,
        &excluded,
        summary,
    );

    println!("\nIndexing images.");
    for image in &database {
        if let Some(faces) = context.index_image(image, config.options.max_faces)? {
            summary.indexed_images += 1;
            summary.indexed_faces += faces;
        }
    }
    if context.registry().is_empty() {
        println!("No database images were indexed.");
    }
    tracing::info!(registered = context.registry().len(), "indexing finished");
    println!();

    let mut report = RunReport {
        collection: config.handle.to_string(),
        options: config.options,
        queries: Vec::with_capacity(queries.len()),
    };
    for query in &queries {
        let query_report = context.search_image(query, &config.options, exporter)?;
        if query_report.skipped.is_none() {
            summary.queries_searched += 1;
        }
        summary.matches_exported += query_report
            .matches
            .iter()
            .filter(|record| record.exported_as.is_some())
            .count();
        report.queries.push(query_report);
    }

    summary.matches_found = report.matches_found();

    let report_path = exporter.output_dir().join(REPORT_FILE_NAME);
    match write_report(&report, &report_path) {
        Ok(()) => summary.report = Some(report_path),
        Err(err) => {
            tracing::error!(path = %report_path.display(), error = %err, "failed to write report");
        }
    }
    Ok(())
}

/// Downsize every image under `source_root` into `scratch_dir`.
///
/// In tree-preserving mode the working copy keeps its position relative to
/// the source root.
fn downsize_all(
    preparer: &ImagePreparer,
    source_root: &Path,
    scratch_dir: &Path,
    long_edge: u32,
    tree_preserving: bool,
    exclude: &[&Path],
    summary: &mut RunSummary,
) -> Vec<PreparedImage> {
    discover_images(source_root, tree_preserving, exclude)
        .into_iter()
        .filter_map(|source| {
            let destination = match source.parent().map(|p| p.strip_prefix(source_root)) {
                Some(Ok(relative)) if tree_preserving => scratch_dir.join(relative),
                _ => scratch_dir.to_path_buf(),
            };
            match preparer.prepare(&source, &destination, long_edge) {
                PrepareOutcome::Downsized(prepared) => {
                    summary.downsized += 1;
                    Some(prepared)
                }
                PrepareOutcome::Skipped { .. } => {
                    summary.skipped += 1;
                    None
                }
            }
        })
        .collect()
}

fn existing_dir(path: &Path) -> Result<PathBuf, WorkflowError> {
    if !path.is_dir() {
        return Err(WorkflowError::MissingSource(path.to_path_buf()));
    }
    fs::canonicalize(path).map_err(|_| WorkflowError::MissingSource(path.to_path_buf()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
