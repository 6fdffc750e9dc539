//! Source image discovery.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of discoverable raster images. Matched case-sensitively.
pub const IMAGE_EXTENSION: &str = "jpg";

/// List the images under `root` in a stable, name-sorted order.
///
/// With `recursive` unset only the direct children of `root` are examined.
/// Anything at or below one of the `exclude` folders is skipped, so an output
/// or scratch folder nested in a source tree never feeds back into discovery.
pub fn discover_images(root: &Path, recursive: bool, exclude: &[&Path]) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    walker
        .into_iter()
        .filter_entry(|entry| {
            !exclude
                .iter()
                .any(|excluded| entry.path().starts_with(excluded))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_image(path))
        .collect()
}

fn is_image(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(IMAGE_EXTENSION)
}
