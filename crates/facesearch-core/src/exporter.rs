//! Copies matched database images into the output folder.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// OS-generated folder caches tolerated in an otherwise empty output folder.
const IGNORED_LEFTOVERS: [&str; 2] = ["Thumbs.db", ".DS_Store"];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("previous matches are still present in {0}")]
    PreviousMatches(PathBuf),
    #[error("file name not found for {0}")]
    MissingFileName(PathBuf),
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fail if `output` holds anything besides OS folder caches.
///
/// A missing folder counts as empty.
pub fn check_previous_matches(output: &Path) -> Result<(), ExportError> {
    let entries = match fs::read_dir(output) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(ExportError::Io {
                path: output.to_path_buf(),
                source: err,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|err| ExportError::Io {
            path: output.to_path_buf(),
            source: err,
        })?;
        let name = entry.file_name();
        if !IGNORED_LEFTOVERS.iter().any(|ignored| name == *ignored) {
            return Err(ExportError::PreviousMatches(output.to_path_buf()));
        }
    }
    Ok(())
}

/// Writes collision-safe copies of matched images into one output folder.
#[derive(Debug, Clone)]
pub struct MatchExporter {
    output_dir: PathBuf,
}

impl MatchExporter {
    /// Create the output folder if needed, refusing to reuse one that still
    /// holds results from an earlier run.
    pub fn open(output_dir: &Path) -> Result<Self, ExportError> {
        check_previous_matches(output_dir)?;
        fs::create_dir_all(output_dir).map_err(|err| ExportError::Io {
            path: output_dir.to_path_buf(),
            source: err,
        })?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Copy `matched` into the output folder as `<query-stem>_<matched-name>`.
    ///
    /// Returns the written path, or `None` after logging when the copy fails.
    pub fn export(&self, matched: &Path, query: &Path) -> Option<PathBuf> {
        match self.try_export(matched, query) {
            Ok(destination) => {
                tracing::debug!(
                    matched = %matched.display(),
                    destination = %destination.display(),
                    "match exported"
                );
                Some(destination)
            }
            Err(error) => {
                println!("Error when copying file to the output folder.");
                tracing::error!(matched = %matched.display(), error = %error, "export failed");
                None
            }
        }
    }

    fn try_export(&self, matched: &Path, query: &Path) -> Result<PathBuf, ExportError> {
        let destination = resolve_destination(&self.output_dir, matched, query)?;
        fs::copy(matched, &destination).map_err(|err| ExportError::Io {
            path: matched.to_path_buf(),
            source: err,
        })?;
        Ok(destination)
    }
}

/// First free path for the export of `matched` triggered by `query`.
///
/// Collisions append `#2`, `#3`, ... before the extension.
fn resolve_destination(
    output_dir: &Path,
    matched: &Path,
    query: &Path,
) -> Result<PathBuf, ExportError> {
    let query_stem = query
        .file_stem()
        .ok_or_else(|| ExportError::MissingFileName(query.to_path_buf()))?
        .to_string_lossy();
    let matched_name = matched
        .file_name()
        .ok_or_else(|| ExportError::MissingFileName(matched.to_path_buf()))?
        .to_string_lossy();

    let file_name = format!("{query_stem}_{matched_name}");
    let mut candidate = output_dir.join(&file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let base = Path::new(&file_name);
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());
    let extension = base.extension().and_then(|ext| ext.to_str());

    let mut index = 2;
    loop {
        let mut name = format!("{stem}#{index}");
        if let Some(ext) = extension {
            name.push('.');
            name.push_str(ext);
        }
        candidate = output_dir.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
        index += 1;
    }
}
