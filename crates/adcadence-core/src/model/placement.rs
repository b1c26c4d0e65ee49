use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a logical ad placement (a screen's interstitial slot,
/// the process-wide app-open slot, a feed's native slot, ...).
///
/// Each placement has exactly one owning controller at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlacementId(String);

impl PlacementId {
    /// The singleton app-open placement.
    pub const APP_OPEN: &'static str = "app_open";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn app_open() -> Self {
        Self::new(Self::APP_OPEN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlacementId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PlacementId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PlacementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
