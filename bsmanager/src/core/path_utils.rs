//! Shared path validation utilities
//!
//! Helpers for keeping user-supplied folder names inside the library root
//! and for turning arbitrary metadata into safe folder names.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve `folder_name` against `base` and verify it is a direct child of it.
///
/// Works lexically so a crafted name is rejected before any filesystem access:
/// `..`, absolute paths, separators and anything that does not resolve to
/// exactly one normal component below `base` fail with `InvalidTarget`.
pub fn resolve_direct_child(base: &Path, folder_name: &str) -> Result<PathBuf> {
    let invalid = || Error::InvalidTarget(folder_name.to_string());

    if folder_name.trim().is_empty() {
        return Err(invalid());
    }

    let base = absolutize(base)?;
    let candidate = normalize_lexically(&base.join(folder_name)).ok_or_else(invalid)?;

    match candidate.strip_prefix(&base) {
        Ok(rest) if rest.components().count() == 1 => {}
        _ => return Err(invalid()),
    }

    // `x/../y` normalizes to a direct child but still carries traversal segments.
    let single = Path::new(folder_name).components().count() == 1
        && matches!(
            Path::new(folder_name).components().next(),
            Some(Component::Normal(_))
        );
    if !single {
        return Err(invalid());
    }

    Ok(candidate)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    normalize_lexically(&absolute)
        .ok_or_else(|| Error::InvalidTarget(path.display().to_string()))
}

/// Collapse `.` and `..` without touching the filesystem. Returns None when
/// `..` would climb above the root.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => result.push(p.as_os_str()),
            Component::RootDir => result.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    return None;
                }
            }
            Component::Normal(c) => result.push(c),
        }
    }
    Some(result)
}

/// Remove characters that are illegal in folder names on any supported platform
pub fn sanitize_folder_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect();
    // Windows rejects trailing dots and spaces
    cleaned
        .trim()
        .trim_end_matches(['.', ' '])
        .to_string()
}

/// Cut `name` to at most `max_bytes` without splitting a character
pub fn truncate_component(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].trim_end_matches(['.', ' ']).to_string()
}
