//! Playlist (`.bplist`) decoding
//!
//! A playlist is a JSON object with a `songs` array of `{hash, key}` objects
//! and an optional `playlistTitle`. Invalid hashes are dropped silently; the
//! key travels with its hash so naming stays aligned after filtering.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{ContentId, Manifest, ManifestItem};

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    #[serde(default, rename = "playlistTitle")]
    playlist_title: Option<Value>,
    #[serde(default)]
    songs: Vec<Value>,
}

/// Read and decode a playlist file; the file stem is the fallback title
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let bytes = fs::read(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Playlist");
    parse_manifest(&bytes, stem)
}

pub fn parse_manifest(bytes: &[u8], fallback_title: &str) -> Result<Manifest> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::MalformedManifest(format!("not UTF-8: {}", e)))?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let raw: RawPlaylist =
        serde_json::from_str(text).map_err(|e| Error::MalformedManifest(e.to_string()))?;

    let title = raw
        .playlist_title
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title)
        .to_string();

    let mut items: Vec<ManifestItem> = Vec::new();
    let mut seen: HashMap<ContentId, usize> = HashMap::new();

    for song in &raw.songs {
        let Some(id) = song
            .get("hash")
            .and_then(Value::as_str)
            .and_then(ContentId::parse)
        else {
            continue;
        };
        let key = song
            .get("key")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        match seen.get(&id) {
            Some(&index) => {
                if items[index].key.is_none() {
                    items[index].key = key;
                }
            }
            None => {
                seen.insert(id.clone(), items.len());
                items.push(ManifestItem { id, key });
            }
        }
    }

    Ok(Manifest { title, items })
}
