use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::ThrottledProgress;

/// Whether a file name maps to an `image/*` MIME type. Extension case is ignored.
pub fn is_image(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map_or(false, |mime| mime.type_() == mime_guess::mime::IMAGE)
}

/// Collect image files under `search` in a stable order.
///
/// Entries are visited sorted by file name within each directory, so an
/// unchanged tree is always discovered in the same sequence.
pub fn collect_images(
    search: &Path,
    recursive: bool,
    progress: &ThrottledProgress,
) -> anyhow::Result<Vec<PathBuf>> {
    if !search.is_dir() {
        anyhow::bail!("search root {} is not a directory", search.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(search)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name();

    let mut images = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }

        let path = match entry.path().canonicalize() {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Cannot resolve {}: {}", entry.path().display(), e);
                continue;
            }
        };
        log::trace!("Found {}", path.display());
        images.push(path);
        // Total is unknown while walking
        progress.report("scan", images.len() as u64, 0, "Scanning");
    }

    log::info!("Found {} image file(s) in {}", images.len(), search.display());
    Ok(images)
}
