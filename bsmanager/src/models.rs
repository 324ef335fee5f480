use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use crate::error::ApiErrorCode;

/// Validates normalized content hashes
static CONTENT_ID_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-f0-9]{40}$").expect("static regex"));

/// 40-character lowercase hex hash naming a remote map package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Trim, lowercase and validate raw input
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if CONTENT_ID_PATTERN.is_match(&normalized) {
            Some(Self(normalized))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One playlist entry: the hash and the optional short map key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: ContentId,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub title: String,
    pub items: Vec<ManifestItem>,
}

/// Normalized view of a map's `info.dat`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallDescriptor {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub level_author: Option<String>,
    pub bpm: Option<f64>,
    /// Song length in seconds
    pub duration: Option<f64>,
    pub cover_file: Option<String>,
    /// Distinct labels in display order
    pub difficulties: Vec<String>,
}

/// Difficulty label with the in-game display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Expert,
    ExpertPlus,
    Other(String),
}

impl Difficulty {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "Easy" => Difficulty::Easy,
            "Normal" => Difficulty::Normal,
            "Hard" => Difficulty::Hard,
            "Expert" => Difficulty::Expert,
            "ExpertPlus" | "Expert+" => Difficulty::ExpertPlus,
            other => Difficulty::Other(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Normal => 1,
            Difficulty::Hard => 2,
            Difficulty::Expert => 3,
            Difficulty::ExpertPlus => 4,
            Difficulty::Other(_) => u8::MAX,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
            Difficulty::Expert => "Expert",
            Difficulty::ExpertPlus => "Expert+",
            Difficulty::Other(raw) => raw,
        }
    }
}

impl Ord for Difficulty {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.label().cmp(other.label()))
    }
}

impl PartialOrd for Difficulty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One installed map as shown in the library panel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    pub folder_name: String,
    /// Short map key recovered from a `"{key} (title - author)"` folder name
    pub key: Option<String>,
    /// Hash from the provenance marker, when this pipeline installed the map
    pub content_id: Option<ContentId>,
    pub title: String,
    pub artist: String,
    pub level_author: String,
    pub bpm: Option<f64>,
    pub duration: Option<f64>,
    pub cover_file: Option<String>,
    pub difficulties: Vec<String>,
    pub installed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum InstallOutcome {
    #[serde(rename_all = "camelCase")]
    Succeeded {
        id: ContentId,
        key: Option<String>,
        folder_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        id: ContentId,
        key: Option<String>,
        code: ApiErrorCode,
        cause: String,
    },
}

impl InstallOutcome {
    pub fn id(&self) -> &ContentId {
        match self {
            InstallOutcome::Succeeded { id, .. } | InstallOutcome::Failed { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub id: ContentId,
    pub key: Option<String>,
    pub code: ApiErrorCode,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub title: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedItem>,
    /// One outcome per manifest item, in manifest order
    pub outcomes: Vec<InstallOutcome>,
}

impl BatchSummary {
    pub fn from_outcomes(title: String, outcomes: Vec<InstallOutcome>) -> Self {
        let failed = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                InstallOutcome::Failed {
                    id,
                    key,
                    code,
                    cause,
                } => Some(FailedItem {
                    id: id.clone(),
                    key: key.clone(),
                    code: code.clone(),
                    cause: cause.clone(),
                }),
                InstallOutcome::Succeeded { .. } => None,
            })
            .collect::<Vec<_>>();

        Self {
            title,
            total: outcomes.len(),
            succeeded: outcomes.len() - failed.len(),
            failed,
            outcomes,
        }
    }
}
