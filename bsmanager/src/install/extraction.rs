use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::logger;

/// Extract a zip archive into an existing directory on the blocking pool
///
/// Entries whose names would land outside `destination` are skipped. Files
/// already written stay in place when a later entry fails.
pub async fn extract_archive(archive: &Path, destination: &Path) -> Result<usize> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive_blocking(&archive, &destination))
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))?
}

/// Returns the number of files written
pub fn extract_archive_blocking(archive_path: &Path, destination: &Path) -> Result<usize> {
    if !destination.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("extraction target {} does not exist", destination.display()),
        )));
    }

    let file = fs::File::open(archive_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| Error::CorruptArchive(e.to_string()))?;

    let mut written = 0usize;
    let mut skipped = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::CorruptArchive(e.to_string()))?;

        let relative = match entry.enclosed_name().and_then(|p| sanitize_path(&p)) {
            Some(p) => p,
            None => {
                logger::log_debug(
                    &format!("Skipping ZIP entry with unsafe path: {}", entry.name()),
                    Some("extraction"),
                );
                skipped += 1;
                continue;
            }
        };
        let outpath = destination.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                Error::CorruptArchive(format!("{}: {}", relative.display(), e))
            } else {
                Error::Io(e)
            }
        })?;
        written += 1;
    }

    if skipped > 0 {
        logger::log_info(
            &format!("Skipped {} unsafe ZIP entries", skipped),
            Some("extraction"),
        );
    }

    Ok(written)
}

/// Keep only normal components; None when nothing usable remains
fn sanitize_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}
