#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A path (or command string) stored alongside its placeholder-expanded form.
///
/// `raw` is whatever the caller submitted, verbatim. `resolved` starts empty
/// and is filled in once by the executor's placeholder resolution step
/// (§4.7); it stays empty until that happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathPair {
    pub raw: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub resolved: String,
}

impl PathPair {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            resolved: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}
