#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The single-row settings record (§3). A pure sink in this specification:
/// nothing in the core reads it back to change behaviour.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    #[cfg_attr(feature = "serde", serde(default))]
    pub values: Value,
}
