//! Library index for the installed maps folder
//!
//! Scans the immediate subfolders of the library root, resolves each
//! folder's descriptor through the shared [`MetadataCache`] and assembles
//! the sorted list the library panel renders. Cover art is loaded lazily,
//! one folder at a time.

use base64::Engine;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::core::path_utils::resolve_direct_child;
use crate::error::Result;
use crate::library::cache::MetadataCache;
use crate::logger;
use crate::models::{ContentId, LibraryEntry};

/// Marker written into folders installed by the batch pipeline
pub const PROVENANCE_FILE: &str = ".bsm_hash";

const COVER_FALLBACKS: [&str; 4] = ["cover.jpg", "cover.png", "cover.jpeg", "cover.webp"];

/// `"{key} ({title} - {author})"` as produced by the installer
static KEYED_FOLDER_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^([0-9a-fA-F]+) \(.+ - .+\)$").expect("static regex"));

/// List the installed maps, sorted by title (case-insensitive, stable)
///
/// A missing root is an empty library.
pub fn list_library(root: &Path, cache: &MetadataCache) -> Result<Vec<LibraryEntry>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut folders: Vec<(std::path::PathBuf, String)> = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let folder_name = match entry.file_name().to_str() {
            Some(name) => name.to_string(),
            None => continue,
        };
        // Skip hidden folders
        if folder_name.starts_with('.') {
            continue;
        }
        folders.push((entry.into_path(), folder_name));
    }

    let mut entries: Vec<LibraryEntry> = folders
        .par_iter()
        .map(|(path, folder_name)| build_entry(path, folder_name, cache))
        .collect();

    sort_by_title(&mut entries);

    logger::log_debug(
        &format!(
            "Indexed {} maps (cache hit rate {:.0}%)",
            entries.len(),
            crate::core::performance::get_cache_hit_rate() * 100.0
        ),
        Some("library"),
    );

    Ok(entries)
}

fn build_entry(folder: &Path, folder_name: &str, cache: &MetadataCache) -> LibraryEntry {
    let descriptor = cache.read(folder).unwrap_or_default();

    let content_id = fs::read_to_string(folder.join(PROVENANCE_FILE))
        .ok()
        .and_then(|raw| ContentId::parse(&raw));

    let installed_at = fs::metadata(folder)
        .ok()
        .and_then(|meta| meta.created().or_else(|_| meta.modified()).ok())
        .map(DateTime::<Utc>::from);

    let key = KEYED_FOLDER_PATTERN
        .captures(folder_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    LibraryEntry {
        folder_name: folder_name.to_string(),
        key,
        content_id,
        title: descriptor
            .title
            .unwrap_or_else(|| folder_name.to_string()),
        artist: descriptor.artist.unwrap_or_default(),
        level_author: descriptor.level_author.unwrap_or_default(),
        bpm: descriptor.bpm,
        duration: descriptor.duration,
        cover_file: descriptor.cover_file,
        difficulties: descriptor.difficulties,
        installed_at,
    }
}

/// Base-strength collation key: compatibility-decomposed, accents dropped,
/// lowercased. The full lowercase title breaks ties so "é" and "e" stay stable.
fn title_sort_key(title: &str) -> (String, String) {
    let base = title
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    (base, title.to_lowercase())
}

fn compare_titles(a: &LibraryEntry, b: &LibraryEntry) -> Ordering {
    title_sort_key(&a.title).cmp(&title_sort_key(&b.title))
}

fn sort_by_title(entries: &mut [LibraryEntry]) {
    entries.sort_by_cached_key(|entry| title_sort_key(&entry.title));
}

/// Sort modes offered by the library panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// A to Z
    #[default]
    Title,
    /// Newest first
    InstallDate,
    /// Longest first
    Duration,
}

/// One library scan, re-sortable and filterable without touching the disk
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    entries: Vec<LibraryEntry>,
}

impl LibrarySnapshot {
    pub fn scan(root: &Path, cache: &MetadataCache) -> Result<Self> {
        Ok(Self {
            entries: list_library(root, cache)?,
        })
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    /// Entries matching `filter` (case-insensitive substring over title,
    /// artist, mapper and key), in the requested order
    pub fn view(&self, sort: SortKey, inverted: bool, filter: Option<&str>) -> Vec<LibraryEntry> {
        let needle = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);

        let mut view: Vec<LibraryEntry> = self
            .entries
            .iter()
            .filter(|entry| match &needle {
                Some(needle) => matches_filter(entry, needle),
                None => true,
            })
            .cloned()
            .collect();

        view.sort_by(|a, b| {
            let ordering = match sort {
                SortKey::Title => compare_titles(a, b),
                SortKey::InstallDate => b.installed_at.cmp(&a.installed_at),
                SortKey::Duration => b
                    .duration
                    .unwrap_or(0.0)
                    .total_cmp(&a.duration.unwrap_or(0.0)),
            };
            if inverted {
                ordering.reverse()
            } else {
                ordering
            }
        });
        view
    }
}

fn matches_filter(entry: &LibraryEntry, needle: &str) -> bool {
    [
        Some(entry.title.as_str()),
        Some(entry.artist.as_str()),
        Some(entry.level_author.as_str()),
        entry.key.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}

/// Delete an installed map folder
///
/// `folder_name` must name a direct child of `root`; anything else fails with
/// `InvalidTarget` before the filesystem is touched. A folder that is already
/// gone is not an error.
pub fn delete_entry(root: &Path, folder_name: &str, cache: &MetadataCache) -> Result<()> {
    let target = resolve_direct_child(root, folder_name)?;

    match fs::remove_dir_all(&target) {
        Ok(()) => {
            logger::log_info(&format!("Deleted map folder {}", folder_name), Some("library"));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            logger::log_debug(
                &format!("Map folder {} already removed", folder_name),
                Some("library"),
            );
        }
        Err(e) => return Err(e.into()),
    }

    cache.invalidate_folder(&target);
    Ok(())
}

fn cover_mime_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Load a folder's cover art as a `data:` URL
///
/// Tries the descriptor's cover file first, then the conventional names.
/// Returns None when no candidate is readable.
pub fn load_cover_image(
    root: &Path,
    folder_name: &str,
    cache: &MetadataCache,
) -> Result<Option<String>> {
    let folder = resolve_direct_child(root, folder_name)?;

    let declared = cache.read(&folder).and_then(|d| d.cover_file);
    let candidates = declared
        .iter()
        .map(String::as_str)
        .filter(|name| is_plain_relative(name))
        .chain(COVER_FALLBACKS);

    for name in candidates {
        if let Ok(bytes) = fs::read(folder.join(name)) {
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            return Ok(Some(format!("data:{};base64,{}", cover_mime_type(name), encoded)));
        }
    }
    Ok(None)
}

/// Cover paths declared by a descriptor must stay inside the folder
fn is_plain_relative(name: &str) -> bool {
    let path = Path::new(name);
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}
