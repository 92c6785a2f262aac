//! The fixed set of pipeline stage identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stage identifier reserved for the predefined bucket.
///
/// Names match exactly and are case-sensitive: `ACCESS` is predefined,
/// `access` is an ordinary custom name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredefinedStage {
    /// Access control gate.
    Access,
    /// Response cache lookup/store.
    Cache,
    /// Document retrieval.
    Retrieval,
    /// Model call.
    Model,
    /// Tool execution.
    Tools,
    /// Post-processing of the model answer.
    PostProcess,
}

impl PredefinedStage {
    /// Every predefined stage.
    pub const ALL: [PredefinedStage; 6] = [
        Self::Access,
        Self::Cache,
        Self::Retrieval,
        Self::Model,
        Self::Tools,
        Self::PostProcess,
    ];

    /// The identifier used in plans.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "ACCESS",
            Self::Cache => "CACHE",
            Self::Retrieval => "RETRIEVAL",
            Self::Model => "MODEL",
            Self::Tools => "TOOLS",
            Self::PostProcess => "POST_PROCESS",
        }
    }

    /// Match a stage name against the predefined identifiers.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Whether `name` is reserved.
    pub fn is_predefined(name: &str) -> bool {
        Self::parse(name).is_some()
    }
}

impl fmt::Display for PredefinedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a predefined stage identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown predefined stage `{0}`")]
pub struct ParseStageError(pub String);

impl FromStr for PredefinedStage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ParseStageError(s.to_owned()))
    }
}
