#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::label::Label;

/// A running server instance (§3, §4.11). `identifier` is operator-chosen
/// or defaults to the host name; `session` is fresh per process start;
/// `cluster` is adopted from the first existing row at startup, else
/// generated.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Client {
    pub identifier: String,
    pub session: uuid::Uuid,
    pub cluster: uuid::Uuid,
    pub os: String,
    pub arch: String,
    pub version: String,
    pub ffmpeg_path: String,
    pub max_concurrent_tasks: u32,
    #[cfg(feature = "chrono")]
    pub last_seen: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels: Vec<Label>,
}

impl Client {
    /// Staleness threshold from §3/§4.11: a client is stale once its
    /// heartbeat is older than 60 seconds.
    #[cfg(feature = "chrono")]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_seen) > chrono::Duration::seconds(60)
    }
}
