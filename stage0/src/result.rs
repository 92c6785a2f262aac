//! What handlers return and how async group members are reported.

use crate::context::OutputMap;
use serde::{Deserialize, Serialize};

/// Output of one stage invocation.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage that produced the data.
    pub stage_name: String,
    /// Keys to fold into the accumulated output.
    #[serde(default)]
    pub data: OutputMap,
}

impl StageResult {
    /// Create a result.
    pub fn new(stage_name: impl Into<String>, data: OutputMap) -> Self {
        Self {
            stage_name: stage_name.into(),
            data,
        }
    }

    /// A result that writes nothing.
    pub fn empty(stage_name: impl Into<String>) -> Self {
        Self::new(stage_name, OutputMap::new())
    }

    /// Builder-style single key write.
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Output of one capability (tool/action) invocation.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    /// Capability that produced the data.
    pub capability_name: String,
    /// Keys to fold into the accumulated output.
    #[serde(default)]
    pub data: OutputMap,
}

impl CapabilityResult {
    /// Create a result.
    pub fn new(capability_name: impl Into<String>, data: OutputMap) -> Self {
        Self {
            capability_name: capability_name.into(),
            data,
        }
    }

    /// Builder-style single key write.
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

impl From<CapabilityResult> for StageResult {
    fn from(r: CapabilityResult) -> Self {
        StageResult::new(r.capability_name, r.data)
    }
}

/// Serializable description of why an async member failed.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Error type name, matched against retry policies.
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
}

impl StageFailure {
    /// Create a failure record.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

/// The outcome of one member of an async group. Exactly one of `result`
/// and `error` is set. Every member produces an entry, failures included.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncGroupResultEntry {
    /// The member's stage name.
    pub stage_name: String,
    /// Set when the member succeeded.
    #[serde(default)]
    pub result: Option<StageResult>,
    /// Set when the member failed.
    #[serde(default)]
    pub error: Option<StageFailure>,
}

impl AsyncGroupResultEntry {
    /// A successful member.
    pub fn success(stage_name: impl Into<String>, result: StageResult) -> Self {
        Self {
            stage_name: stage_name.into(),
            result: Some(result),
            error: None,
        }
    }

    /// A failed member.
    pub fn failure(stage_name: impl Into<String>, error: StageFailure) -> Self {
        Self {
            stage_name: stage_name.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Whether the member succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// The member's data, if it succeeded.
    pub fn data(&self) -> Option<&OutputMap> {
        self.result.as_ref().map(|r| &r.data)
    }
}
