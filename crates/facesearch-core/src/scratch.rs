//! Scratch area holding downsized working copies for one run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const DATABASE_DIR: &str = "Database";
const QUERY_DIR: &str = "Query";

/// Owned scratch directory tree: `<root>/Database` and `<root>/Query`.
#[derive(Debug)]
pub struct ScratchArea {
    root: PathBuf,
}

impl ScratchArea {
    /// Establish a fresh scratch tree at `root`.
    ///
    /// Leftovers from an earlier, interrupted run are removed first.
    pub fn create(root: &Path) -> io::Result<Self> {
        if root.exists() {
            tracing::warn!(root = %root.display(), "clearing leftover scratch area");
            clear_entries(root);
        }
        fs::create_dir_all(root.join(DATABASE_DIR))?;
        fs::create_dir_all(root.join(QUERY_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_dir(&self) -> PathBuf {
        self.root.join(DATABASE_DIR)
    }

    pub fn query_dir(&self) -> PathBuf {
        self.root.join(QUERY_DIR)
    }

    /// Delete everything under the scratch root, then the root itself.
    ///
    /// Each entry is removed independently; a failure is logged and the
    /// remaining entries are still attempted. Returns whether the root is gone.
    pub fn remove(&self) -> bool {
        if !self.root.exists() {
            return true;
        }
        clear_entries(&self.root);
        match fs::remove_dir(&self.root) {
            Ok(()) => true,
            Err(err) => {
                println!(
                    "Failed to delete {}. Reason: {err}",
                    self.root.display()
                );
                tracing::error!(root = %self.root.display(), error = %err, "scratch root not removed");
                false
            }
        }
    }
}

fn clear_entries(root: &Path) {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(root = %root.display(), error = %err, "cannot list scratch area");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let result = match entry.file_type() {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("Failed to delete {name}. Reason: {err}");
            tracing::error!(path = %path.display(), error = %err, "scratch entry not removed");
        }
    }
}
