//! Session policy enums

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a remote change is merged into an existing mirror row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Keep the mirror row as is
    Skip,
    /// Replace every remote-owned field
    Overwrite,
    /// Fill only empty mirror fields
    Merge,
    /// Overwrite when the remote is strictly newer, otherwise skip
    #[default]
    Newer,
}

impl ConflictStrategy {
    pub const ALL: [Self; 4] = [Self::Skip, Self::Overwrite, Self::Merge, Self::Newer];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Merge => "merge",
            Self::Newer => "newer",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            "newer" => Ok(Self::Newer),
            other => Err(format!("unknown conflict strategy '{other}'")),
        }
    }
}

/// What happens to mirror rows whose remote node disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Flag rows as deleted, keep them
    #[default]
    Soft,
    /// Physically remove rows
    Hard,
    /// Leave rows untouched
    None,
}

impl CleanupMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
            Self::None => "none",
        }
    }
}

impl fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            "none" => Ok(Self::None),
            other => Err(format!("unknown cleanup mode '{other}'")),
        }
    }
}
