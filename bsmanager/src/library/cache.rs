use dashmap::DashMap;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::core::performance;
use crate::library::descriptor;
use crate::logger;
use crate::models::InstallDescriptor;

/// Descriptor file names, tried in order
pub const DESCRIPTOR_CANDIDATES: [&str; 2] = ["info.dat", "Info.dat"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Entries are keyed by absolute path so relative and absolute callers agree
fn absolute_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Normalized descriptor, valid while the file's mtime is unchanged
#[derive(Clone, Debug)]
struct CacheEntry {
    modified: SystemTime,
    descriptor: InstallDescriptor,
}

/// Descriptor cache keyed by descriptor file path
///
/// Shared between the library indexer and the install pipeline. A stale entry
/// is replaced on the next read; deleted or renamed folders are dropped via
/// [`MetadataCache::invalidate_folder`].
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<PathBuf, CacheEntry>,
    disk_reads: AtomicU64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the normalized descriptor of an install folder
    ///
    /// Returns None when no candidate exists or none decodes.
    pub fn read(&self, folder: &Path) -> Option<InstallDescriptor> {
        let folder = absolute_key(folder);
        DESCRIPTOR_CANDIDATES
            .iter()
            .find_map(|name| self.read_candidate(&folder.join(name)))
    }

    fn read_candidate(&self, path: &Path) -> Option<InstallDescriptor> {
        let modified = fs::metadata(path)
            .ok()
            .filter(|meta| meta.is_file())?
            .modified()
            .ok()?;

        if let Some(entry) = self.entries.get(path) {
            if entry.modified == modified {
                performance::record_cache_hit();
                return Some(entry.descriptor.clone());
            }
        }
        performance::record_cache_miss();

        self.disk_reads.fetch_add(1, Ordering::Relaxed);
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                logger::log_debug(
                    &format!("Failed to read {}: {}", path.display(), e),
                    Some("cache"),
                );
                return None;
            }
        };
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

        let data: Value = match serde_json::from_slice(bytes) {
            Ok(data) => data,
            Err(e) => {
                logger::log_debug(
                    &format!("Ignoring undecodable descriptor {}: {}", path.display(), e),
                    Some("cache"),
                );
                self.entries.remove(path);
                return None;
            }
        };

        let descriptor = descriptor::normalize(&data);
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                modified,
                descriptor: descriptor.clone(),
            },
        );
        Some(descriptor)
    }

    /// Drop every cached descriptor belonging to `folder`
    pub fn invalidate_folder(&self, folder: &Path) {
        let folder = absolute_key(folder);
        self.entries
            .retain(|path, _| path.parent() != Some(folder.as_path()));
    }

    /// Number of descriptor files read from disk so far
    pub fn disk_reads(&self) -> u64 {
        self.disk_reads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
