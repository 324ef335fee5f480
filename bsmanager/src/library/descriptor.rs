//! `info.dat` normalization
//!
//! Maps have shipped several descriptor layouts over the years: legacy
//! underscore keys (`_songName`), flat keys (`songName`), nested `song` /
//! `_song` objects and the v4 layout with `song.title` and an `audio` block.
//! Each logical field is resolved independently by walking a fixed list of
//! key paths and taking the first present value.

use serde_json::Value;

use crate::models::{Difficulty, InstallDescriptor};

/// Key paths per logical field, in priority order
const TITLE_PATHS: &[&[&str]] = &[
    &["_songName"],
    &["songName"],
    &["song", "songName"],
    &["_song", "_songName"],
    &["song", "title"],
];

const ARTIST_PATHS: &[&[&str]] = &[
    &["_songAuthorName"],
    &["songAuthorName"],
    &["song", "songAuthorName"],
    &["_song", "_songAuthorName"],
    &["song", "author"],
];

const LEVEL_AUTHOR_PATHS: &[&[&str]] = &[
    &["_levelAuthorName"],
    &["levelAuthorName"],
    &["song", "levelAuthorName"],
    &["_song", "_levelAuthorName"],
    &["song", "mapper"],
];

const BPM_PATHS: &[&[&str]] = &[
    &["_beatsPerMinute"],
    &["beatsPerMinute"],
    &["song", "bpm"],
    &["audio", "bpm"],
];

const DURATION_PATHS: &[&[&str]] = &[
    &["_songDuration"],
    &["songDuration"],
    &["song", "duration"],
    &["audio", "songDuration"],
];

const COVER_PATHS: &[&[&str]] = &[
    &["_coverImageFilename"],
    &["coverImageFilename"],
    &["coverImage"],
    &["song", "coverImageFilename"],
    &["_song", "_coverImageFilename"],
];

const DIFFICULTY_SET_KEYS: &[&str] = &[
    "_difficultyBeatmapSets",
    "difficultyBeatmapSets",
    "_beatmapCharacteristicDatas",
];

const DIFFICULTY_LIST_KEYS: &[&str] = &["_difficultyBeatmaps", "difficultyBeatmaps"];

const DIFFICULTY_NAME_KEYS: &[&str] = &["_difficulty", "difficulty"];

fn lookup<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(data, |current, key| current.get(key))
}

fn first_text(data: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        lookup(data, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn first_number(data: &Value, paths: &[&[&str]]) -> Option<f64> {
    paths.iter().find_map(|path| {
        let value = lookup(data, path)?;
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        (number.is_finite() && number != 0.0).then_some(number)
    })
}

fn difficulty_names(list: &Value) -> impl Iterator<Item = &str> {
    list.as_array()
        .into_iter()
        .flatten()
        .filter_map(|diff| {
            DIFFICULTY_NAME_KEYS
                .iter()
                .find_map(|key| diff.get(key).and_then(Value::as_str))
        })
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Distinct difficulty labels across all characteristic sets, in display order
pub fn extract_difficulties(data: &Value) -> Vec<String> {
    let mut found: Vec<Difficulty> = Vec::new();

    let sets = DIFFICULTY_SET_KEYS
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_array));
    for set in sets.into_iter().flatten() {
        let list = DIFFICULTY_LIST_KEYS.iter().find_map(|key| set.get(key));
        if let Some(list) = list {
            found.extend(difficulty_names(list).map(Difficulty::from_raw));
        }
    }

    // v4 keeps a flat list at the top level
    if let Some(list) = data.get("difficultyBeatmaps") {
        found.extend(difficulty_names(list).map(Difficulty::from_raw));
    }

    found.sort();
    found.dedup();
    found.iter().map(|d| d.label().to_string()).collect()
}

/// Normalize a decoded descriptor into the fields the library cares about
pub fn normalize(data: &Value) -> InstallDescriptor {
    InstallDescriptor {
        title: first_text(data, TITLE_PATHS),
        artist: first_text(data, ARTIST_PATHS),
        level_author: first_text(data, LEVEL_AUTHOR_PATHS),
        bpm: first_number(data, BPM_PATHS),
        duration: first_number(data, DURATION_PATHS),
        cover_file: first_text(data, COVER_PATHS),
        difficulties: extract_difficulties(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_layout() {
        let data = json!({
            "_songName": "Legacy Song",
            "_songAuthorName": "Legacy Artist",
            "_levelAuthorName": "Mapper",
            "_beatsPerMinute": 128,
            "_coverImageFilename": "cover.png",
            "_difficultyBeatmapSets": [
                {"_difficultyBeatmaps": [{"_difficulty": "ExpertPlus"}, {"_difficulty": "Hard"}]}
            ]
        });
        let descriptor = normalize(&data);
        assert_eq!(descriptor.title.as_deref(), Some("Legacy Song"));
        assert_eq!(descriptor.artist.as_deref(), Some("Legacy Artist"));
        assert_eq!(descriptor.level_author.as_deref(), Some("Mapper"));
        assert_eq!(descriptor.bpm, Some(128.0));
        assert_eq!(descriptor.cover_file.as_deref(), Some("cover.png"));
        assert_eq!(descriptor.difficulties, vec!["Hard", "Expert+"]);
    }

    #[test]
    fn test_nested_v4_layout() {
        let data = json!({
            "version": "4.0.0",
            "song": {"title": "New Song", "author": "New Artist"},
            "audio": {"bpm": 174.5, "songDuration": 201.3},
            "coverImageFilename": "cover.jpg",
            "difficultyBeatmaps": [
                {"difficulty": "Expert", "characteristic": "Standard"},
                {"difficulty": "Easy", "characteristic": "Standard"},
                {"difficulty": "Expert", "characteristic": "OneSaber"}
            ]
        });
        let descriptor = normalize(&data);
        assert_eq!(descriptor.title.as_deref(), Some("New Song"));
        assert_eq!(descriptor.artist.as_deref(), Some("New Artist"));
        assert_eq!(descriptor.level_author, None);
        assert_eq!(descriptor.bpm, Some(174.5));
        assert_eq!(descriptor.duration, Some(201.3));
        assert_eq!(descriptor.difficulties, vec!["Easy", "Expert"]);
    }

    #[test]
    fn test_fields_resolve_independently() {
        // Empty or zero values do not count as present
        let data = json!({
            "_songName": "",
            "songName": "Flat Title",
            "_song": {"_songAuthorName": "Nested Artist"},
            "_beatsPerMinute": 0,
            "song": {"bpm": "140"}
        });
        let descriptor = normalize(&data);
        assert_eq!(descriptor.title.as_deref(), Some("Flat Title"));
        assert_eq!(descriptor.artist.as_deref(), Some("Nested Artist"));
        assert_eq!(descriptor.bpm, Some(140.0));
    }

    #[test]
    fn test_characteristic_datas_and_unknown_labels() {
        let data = json!({
            "_beatmapCharacteristicDatas": [
                {"difficultyBeatmaps": [{"difficulty": "Lightshow"}, {"difficulty": "Normal"}]},
                {"difficultyBeatmaps": [{"difficulty": "Normal"}, {"difficulty": "Expert+"}]},
                {"difficultyBeatmaps": "garbage"}
            ]
        });
        assert_eq!(
            extract_difficulties(&data),
            vec!["Normal", "Expert+", "Lightshow"]
        );
    }

    #[test]
    fn test_empty_object() {
        assert_eq!(normalize(&json!({})), InstallDescriptor::default());
        assert_eq!(normalize(&json!([1, 2])), InstallDescriptor::default());
    }
}
