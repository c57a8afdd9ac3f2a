use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque platform-assigned signal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SignalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Market region a signal trades in (USA, EUR, CHN, ...).
///
/// Kept as an opaque string: the platform adds regions without notice and the
/// corpus must keep indexing signals it has never seen the region of before.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region(pub String);

impl Region {
    pub fn new(region: impl Into<String>) -> Self {
        Self(region.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(region: &str) -> Self {
        Self(region.to_string())
    }
}
