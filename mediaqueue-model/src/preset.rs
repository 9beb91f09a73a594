#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::label::Label;
use crate::path_pair::PathPair;
use crate::task::HookRecord;
use crate::webhook::Webhook;

/// A reusable task template (§3). Fields left unset on a task request that
/// names a preset are filled in from here before the task row is inserted
/// (§1.2 supplemented feature); request fields always win when present.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Preset {
    pub uuid: uuid::Uuid,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    pub command: PathPair,
    pub output_file: PathPair,
    pub priority: u32,
    pub retries: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels: Vec<Label>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub webhooks: Vec<Webhook>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub pre_processing: HookRecord,
    #[cfg_attr(feature = "serde", serde(default))]
    pub post_processing: HookRecord,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    pub updated_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub deleted_at: Option<DateTime<Utc>>,
}
