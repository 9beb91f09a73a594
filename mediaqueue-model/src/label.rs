#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A normalized free-form tag used for client-task affinity matching.
///
/// Labels are created on first reference (find-or-create) and linked to
/// clients/tasks/presets/watchfolders through join tables; this type is the
/// in-memory representation of one row in the `labels` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Label(pub String);

impl Label {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Translates the `*`-wildcard glob used in task labels into a SQL
    /// `LIKE` pattern (§4.3, §6): `*` becomes `%`, everything else is
    /// escaped so it is matched literally.
    pub fn as_like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.0.len());
        for ch in self.0.chars() {
            match ch {
                '*' => pattern.push('%'),
                '%' | '_' | '\\' => {
                    pattern.push('\\');
                    pattern.push(ch);
                }
                other => pattern.push(other),
            }
        }
        pattern
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_to_like_pattern() {
        assert_eq!(Label::new("g*").as_like_pattern(), "g%");
        assert_eq!(Label::new("gpu").as_like_pattern(), "gpu");
        assert_eq!(Label::new("100%_done").as_like_pattern(), "100\\%\\_done");
    }
}
