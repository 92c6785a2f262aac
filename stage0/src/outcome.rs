//! Outcome and signal envelopes exchanged with the hosting process.

use crate::context::OutputMap;
use crate::error::KernelError;
use serde::{Deserialize, Serialize};

/// Coarse classification of a failed execution.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected before any invocation.
    Validation,
    /// A name or plan did not resolve.
    Resolution,
    /// A sequential stage failed.
    Stage,
    /// A merge policy failed.
    Merge,
    /// Cancelled by signal.
    Cancelled,
    /// Halted by a hook.
    Halted,
    /// Anything else.
    Internal,
}

impl KernelError {
    /// Classify the error for the outcome envelope.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::UnknownPlan(_) | Self::Unresolved(_) => FailureKind::Resolution,
            Self::StageFailed { .. } => FailureKind::Stage,
            Self::MergeFailed { .. } => FailureKind::Merge,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Halted(_) => FailureKind::Halted,
            Self::Reentrant(_) | Self::Other(_) => FailureKind::Internal,
        }
    }
}

/// Final result of one command: the full accumulated output, or a failure.
/// There is no partial variant.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Every group ran.
    Completed {
        /// Final accumulated output.
        output: OutputMap,
    },
    /// A fatal error aborted the plan.
    Failed {
        /// Error class.
        kind: FailureKind,
        /// Rendered error chain.
        message: String,
    },
}

impl ExecutionOutcome {
    /// Whether the execution completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The output of a completed execution.
    pub fn output(&self) -> Option<&OutputMap> {
        match self {
            Self::Completed { output } => Some(output),
            _ => None,
        }
    }
}

impl From<Result<OutputMap, KernelError>> for ExecutionOutcome {
    fn from(result: Result<OutputMap, KernelError>) -> Self {
        match result {
            Ok(output) => Self::Completed { output },
            Err(error) => Self::Failed {
                kind: error.failure_kind(),
                message: error.to_string(),
            },
        }
    }
}

/// Signals the host can deliver to a running execution.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ExecutionSignal {
    /// Abort the current group and fail the execution.
    Cancel {
        /// Why the execution is cancelled.
        #[serde(default)]
        reason: String,
    },
}

impl ExecutionSignal {
    /// A cancel signal.
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self::Cancel {
            reason: reason.into(),
        }
    }
}
