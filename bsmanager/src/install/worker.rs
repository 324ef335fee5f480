//! Single-item install: fetch, extract, name, commit
//!
//! The archive lands in a hidden temp file inside the library root and is
//! extracted into a staging folder named after the content id. Once the
//! descriptor is readable the staging folder is renamed to
//! `"{key} ({title} - {author})"`. Guards clean up whatever a failed step
//! leaves behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::path_utils::{sanitize_folder_component, truncate_component};
use crate::error::{ApiError, Result};
use crate::install::extraction::extract_archive;
use crate::install::fetcher::{Fetcher, ProgressFn};
use crate::library::cache::MetadataCache;
use crate::library::index::PROVENANCE_FILE;
use crate::logger;
use crate::models::{ContentId, InstallOutcome, ManifestItem};

const UNKNOWN_AUTHOR: &str = "Unknown";
const UNKNOWN_TITLE_PLACEHOLDER: &str = "Unknown Title";
const UNKNOWN_ARTIST_PLACEHOLDER: &str = "Unknown Artist";

// Byte budgets per name part; with the separators and a collision suffix
// the folder name stays under the common 255-byte limit
const MAX_KEY_BYTES: usize = 32;
const MAX_TITLE_BYTES: usize = 120;
const MAX_AUTHOR_BYTES: usize = 80;

/// Downloaded archive; the file is deleted when this is dropped
struct TempArchive {
    path: tempfile::TempPath,
}

impl TempArchive {
    fn create_in(root: &Path) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(".bsm-")
            .suffix(".zip")
            .tempfile_in(root)?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Removes the staging folder on drop unless committed, and only when empty
struct StagingGuard {
    path: PathBuf,
    committed: bool,
}

impl StagingGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if !self.committed {
            // remove_dir refuses non-empty folders
            let _ = fs::remove_dir(&self.path);
        }
    }
}

/// `"{key} ({title} - {author})"`, or `"{title} - {author}"` without a key
pub fn compose_folder_name(key: Option<&str>, title: &str, author: &str) -> String {
    let title = match truncate_component(&sanitize_folder_component(title), MAX_TITLE_BYTES) {
        t if t.is_empty() => UNKNOWN_TITLE_PLACEHOLDER.to_string(),
        t => t,
    };
    let author = match truncate_component(&sanitize_folder_component(author), MAX_AUTHOR_BYTES) {
        a if a.is_empty() => UNKNOWN_ARTIST_PLACEHOLDER.to_string(),
        a => a,
    };
    let key = key
        .map(|k| truncate_component(&sanitize_folder_component(k), MAX_KEY_BYTES))
        .filter(|k| !k.is_empty());

    match key {
        Some(key) => format!("{} ({} - {})", key, title, author),
        None => format!("{} - {}", title, author),
    }
}

fn read_marker(folder: &Path) -> Option<ContentId> {
    fs::read_to_string(folder.join(PROVENANCE_FILE))
        .ok()
        .and_then(|raw| ContentId::parse(&raw))
}

/// Pick a free final folder name
///
/// A folder previously installed from the same id is replaced; any other
/// occupant gets a ` (2)`, ` (3)`, ... suffix on the new folder.
fn resolve_final_target(root: &Path, base_name: &str, id: &ContentId) -> Result<(String, PathBuf)> {
    let mut attempt = 1usize;
    loop {
        let name = if attempt == 1 {
            base_name.to_string()
        } else {
            format!("{} ({})", base_name, attempt)
        };
        let target = root.join(&name);

        if !target.exists() {
            return Ok((name, target));
        }
        if read_marker(&target).as_ref() == Some(id) {
            logger::log_info(
                &format!("Replacing previous install of {} at {}", id, name),
                Some("installer"),
            );
            fs::remove_dir_all(&target)?;
            return Ok((name, target));
        }
        attempt += 1;
    }
}

pub struct InstallWorker {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<MetadataCache>,
    cdn_base: String,
    /// Held while a final name is picked and the staging folder moved there
    commit_lock: Mutex<()>,
}

impl InstallWorker {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<MetadataCache>, cdn_base: impl Into<String>) -> Self {
        Self {
            fetcher,
            cache,
            cdn_base: cdn_base.into().trim_end_matches('/').to_string(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Install one manifest item into `root`. Never fails: errors become
    /// [`InstallOutcome::Failed`].
    pub async fn install(&self, item: &ManifestItem, root: &Path, on_progress: ProgressFn) -> InstallOutcome {
        match self.try_install(item, root, on_progress).await {
            Ok(folder_name) => {
                logger::log_info(
                    &format!("Installed {} as {}", item.id, folder_name),
                    Some("installer"),
                );
                InstallOutcome::Succeeded {
                    id: item.id.clone(),
                    key: item.key.clone(),
                    folder_name,
                }
            }
            Err(e) => {
                logger::log_error(
                    &format!("Failed to install {}: {}", item.id, e),
                    Some("installer"),
                );
                let api = ApiError::from(e);
                InstallOutcome::Failed {
                    id: item.id.clone(),
                    key: item.key.clone(),
                    code: api.code,
                    cause: api.message,
                }
            }
        }
    }

    async fn try_install(&self, item: &ManifestItem, root: &Path, on_progress: ProgressFn) -> Result<String> {
        let staging = root.join(item.id.as_str());
        tokio::fs::create_dir_all(&staging).await?;
        let mut staging_guard = StagingGuard::new(staging.clone());

        let archive = TempArchive::create_in(root)?;
        let url = format!("{}/{}.zip", self.cdn_base, item.id);
        logger::log_debug(&format!("Fetching {}", url), Some("installer"));

        self.fetcher.retrieve(&url, archive.path(), on_progress).await?;
        extract_archive(archive.path(), &staging).await?;
        drop(archive);

        tokio::fs::write(staging.join(PROVENANCE_FILE), item.id.as_str()).await?;

        let descriptor = self.cache.read(&staging).unwrap_or_default();
        let title = descriptor.title.unwrap_or_else(|| item.id.to_string());
        let author = descriptor
            .artist
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
        let base_name = compose_folder_name(item.key.as_deref(), &title, &author);

        let (folder_name, target) = {
            let _commit = self.commit_lock.lock().await;
            let (folder_name, target) = resolve_final_target(root, &base_name, &item.id)?;
            tokio::fs::rename(&staging, &target).await?;
            (folder_name, target)
        };
        staging_guard.commit();

        self.cache.invalidate_folder(&staging);
        self.cache.invalidate_folder(&target);

        Ok(folder_name)
    }
}
