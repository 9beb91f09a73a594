#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::label::Label;
use crate::path_pair::PathPair;
use crate::webhook::Webhook;

/// Task lifecycle state (§4.1). `QUEUED` is the only initial state; the
/// three `DONE_*` variants are terminal and monotonic except via explicit
/// restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum TaskStatus {
    Queued,
    PreProcessing,
    Running,
    PostProcessing,
    DoneSuccessful,
    DoneError,
    DoneCanceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DoneSuccessful | Self::DoneError | Self::DoneCanceled
        )
    }
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::PreProcessing => "PRE_PROCESSING",
            Self::Running => "RUNNING",
            Self::PostProcessing => "POST_PROCESSING",
            Self::DoneSuccessful => "DONE_SUCCESSFUL",
            Self::DoneError => "DONE_ERROR",
            Self::DoneCanceled => "DONE_CANCELED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "PRE_PROCESSING" => Ok(Self::PreProcessing),
            "RUNNING" => Ok(Self::Running),
            "POST_PROCESSING" => Ok(Self::PostProcessing),
            "DONE_SUCCESSFUL" => Ok(Self::DoneSuccessful),
            "DONE_ERROR" => Ok(Self::DoneError),
            "DONE_CANCELED" => Ok(Self::DoneCanceled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Where a task originated (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TaskSource {
    Api,
    Watchfolder,
}

impl TaskSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Watchfolder => "watchfolder",
        }
    }
}

impl std::str::FromStr for TaskSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "watchfolder" => Ok(Self::Watchfolder),
            other => Err(format!("unknown task source: {other}")),
        }
    }
}

/// A pre- or post-processing hook record (§4.5): an optional sidecar write
/// and an optional external script invocation, each as a `(raw, resolved)`
/// pair, plus its own timing/error bookkeeping.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HookRecord {
    #[cfg_attr(feature = "serde", serde(default))]
    pub script_path: PathPair,
    #[cfg_attr(feature = "serde", serde(default))]
    pub sidecar_path: PathPair,
    #[cfg_attr(feature = "serde", serde(default))]
    pub import_sidecar: bool,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub started_at: Option<DateTime<Utc>>,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub finished_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub error: String,
}

impl HookRecord {
    /// A hook is inert (never invoked) unless it names a script or sidecar.
    pub fn is_configured(&self) -> bool {
        !self.script_path.raw.is_empty() || !self.sidecar_path.raw.is_empty()
    }
}

/// The unit of work (§3). Every mutation is expected to flow through a
/// single `Update` entry point (§4.4) rather than ad hoc field writes, so
/// that the batch-completion and event-fanout side effects always fire.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Task {
    pub uuid: uuid::Uuid,
    #[cfg_attr(feature = "serde", serde(default))]
    pub batch: Option<uuid::Uuid>,
    pub name: String,
    pub command: PathPair,
    pub input_file: PathPair,
    pub output_file: PathPair,
    #[cfg_attr(feature = "serde", serde(default))]
    pub metadata: Value,
    pub status: TaskStatus,
    pub progress: f64,
    pub remaining: f64,
    pub priority: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels: Vec<Label>,
    pub source: TaskSource,
    #[cfg_attr(feature = "serde", serde(default))]
    pub webhooks: Vec<Webhook>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub pre_processing: HookRecord,
    #[cfg_attr(feature = "serde", serde(default))]
    pub post_processing: HookRecord,
    #[cfg_attr(feature = "serde", serde(default))]
    pub retries: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub retried: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub error: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub client_identifier: Option<String>,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub started_at: Option<DateTime<Utc>>,
    #[cfg(feature = "chrono")]
    #[cfg_attr(feature = "serde", serde(default))]
    pub finished_at: Option<DateTime<Utc>>,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// `true` once `status` reaches one of the three `DONE_*` states.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The §4.3 affinity rule: unlabeled tasks are eligible everywhere,
    /// otherwise at least one task label must glob-match a client label.
    pub fn eligible_for(&self, client_labels: &[Label]) -> bool {
        if self.labels.is_empty() {
            return true;
        }
        if client_labels.is_empty() {
            return false;
        }
        self.labels.iter().any(|t| {
            let pattern = t.as_like_pattern();
            client_labels
                .iter()
                .any(|c| crate::label_like::matches(c.as_str(), &pattern))
        })
    }
}
