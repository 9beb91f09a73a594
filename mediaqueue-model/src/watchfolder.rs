#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::label::Label;

/// File-extension filter for a watchfolder (§4.10 step 5): the exclude
/// list wins when present; otherwise the include list restricts.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileFilter {
    #[cfg_attr(feature = "serde", serde(default))]
    pub include: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub exclude: Vec<String>,
}

impl FileFilter {
    /// `extension` is expected normalized with a leading dot
    /// (e.g. `.mp4`), lowercased — the watchfolder scanner's
    /// `extension_of` helper produces values in this shape.
    pub fn accepts(&self, extension: &str) -> bool {
        if !self.exclude.is_empty() {
            return !self.exclude.iter().any(|e| e.eq_ignore_ascii_case(extension));
        }
        if !self.include.is_empty() {
            return self.include.iter().any(|e| e.eq_ignore_ascii_case(extension));
        }
        true
    }
}

/// A persistent record describing a directory to poll and the preset to
/// apply to newly stable files found in it (§3, §4.10).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Watchfolder {
    pub uuid: uuid::Uuid,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub path: String,
    pub interval_seconds: u64,
    pub growth_checks: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub filter: FileFilter,
    pub preset: uuid::Uuid,
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels: Vec<Label>,
    pub suspended: bool,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub last_run: Option<DateTime<Utc>>,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub last_check: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub error: String,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    pub updated_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub deleted_at: Option<DateTime<Utc>>,
}
