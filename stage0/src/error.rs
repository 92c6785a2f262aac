//! Error types for each boundary.

use crate::duration::DurationMs;
use crate::handler::HandlerKind;
use crate::result::StageFailure;
use thiserror::Error;

/// Errors raised by a handler.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StageError {
    /// The handler failed but retrying might succeed.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The handler failed and retrying won't help.
    /// Invalid input, denied access, exhausted budget.
    #[error("non-retryable: {0}")]
    NonRetryable(String),

    /// A failure with an application-defined type name. Retry policies
    /// can list the name as non-retryable.
    #[error("{error_type}: {message}")]
    Typed {
        /// Type name, e.g. `"QuotaExceeded"`.
        error_type: String,
        /// Error message.
        message: String,
    },

    /// The invocation ran past its start-to-close budget.
    #[error("timed out after {0}")]
    Timeout(DurationMs),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StageError {
    /// Build a [`StageError::Typed`].
    pub fn typed(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Typed {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// The type name retry policies match against.
    pub fn error_type(&self) -> &str {
        match self {
            Self::Retryable(_) => "Retryable",
            Self::NonRetryable(_) => "NonRetryable",
            Self::Typed { error_type, .. } => error_type,
            Self::Timeout(_) => "Timeout",
            Self::Other(_) => "Other",
        }
    }
}

/// Errors surfaced by the invocation boundary after its retry policy ran.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No handler is registered under the name.
    #[error("handler not found: {0}")]
    NotFound(String),

    /// The name resolved to a handler of the wrong kind.
    #[error("handler `{name}` is a {actual} handler, expected {expected}")]
    WrongKind {
        /// Resolved name.
        name: String,
        /// Kind the caller needed.
        expected: HandlerKind,
        /// Kind that was found.
        actual: HandlerKind,
    },

    /// The handler failed with an error the retry policy will not retry.
    #[error("`{name}` failed with a non-retryable error: {source}")]
    NonRetryable {
        /// Invoked name.
        name: String,
        /// The handler's error.
        #[source]
        source: StageError,
    },

    /// Every allowed attempt failed.
    #[error("`{name}` failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Invoked name.
        name: String,
        /// Attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: StageError,
    },

    /// A schedule-to-start or schedule-to-close budget ran out.
    #[error("`{name}` exceeded its {budget} {limit} budget")]
    TimedOut {
        /// Invoked name.
        name: String,
        /// Which limit fired.
        limit: &'static str,
        /// The configured budget.
        budget: DurationMs,
    },

    /// The invocation was cancelled before it completed.
    #[error("invocation cancelled")]
    Cancelled,

    /// Transport or substrate failure.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl InvokeError {
    /// Serializable summary, used for async group error entries.
    pub fn to_failure(&self) -> StageFailure {
        let error_type = match self {
            Self::NotFound(_) => "NotFound",
            Self::WrongKind { .. } => "WrongKind",
            Self::NonRetryable { source, .. } | Self::Exhausted { source, .. } => {
                source.error_type()
            }
            Self::TimedOut { .. } => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Other(_) => "Other",
        };
        StageFailure::new(error_type, self.to_string())
    }
}

/// Pre-execution plan validation failures. Raised before any invocation.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A stage is missing from the effective allowlist.
    #[error("unauthorized stage in plan: `{0}`")]
    UnauthorizedStage(String),

    /// The plan is deeper than the configured bound.
    #[error("plan depth {depth} exceeds maximum {max}")]
    DepthExceeded {
        /// Effective depth of the plan.
        depth: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Sub-plan references loop back onto a plan already on the path.
    #[error("plan cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// Plan ids along the offending reference path, ending with the
        /// re-entered plan.
        path: Vec<String>,
    },

    /// A definition references a plan the catalog does not hold.
    #[error("unknown sub-plan `{0}`")]
    UnknownSubPlan(String),

    /// A stage name resolves to no stage or capability handler.
    #[error("stage `{0}` does not resolve to a stage handler")]
    UnresolvedStage(String),

    /// A merge policy name resolves to no merge handler.
    #[error("merge policy `{0}` does not resolve to a merge handler")]
    UnresolvedMergePolicy(String),

    /// An async group without a merge policy.
    #[error("group {group} is async but names no merge policy")]
    MissingMergePolicy {
        /// Zero-based group index.
        group: usize,
    },

    /// A sequential group that names a merge policy.
    #[error("group {group} is sequential but names merge policy `{policy}`")]
    UnexpectedMergePolicy {
        /// Zero-based group index.
        group: usize,
        /// The stray policy name.
        policy: String,
    },
}

/// Registry and catalog construction failures.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A predefined stage identifier was registered outside the predefined bucket.
    #[error("`{0}` is a predefined stage and cannot be registered as a custom stage")]
    ReservedName(String),

    /// The same key was registered twice in one bucket.
    #[error("duplicate registration of `{name}` in {bucket}")]
    Duplicate {
        /// Bucket that rejected the registration.
        bucket: &'static str,
        /// The duplicated key.
        name: String,
    },

    /// A plan without an id cannot live in a catalog.
    #[error("plan has no id and cannot be stored in a catalog")]
    MissingPlanId,
}

/// Fatal execution errors. Any of these aborts the remaining plan.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum KernelError {
    /// The plan failed validation; nothing was invoked.
    #[error("plan validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The command references a plan the catalog does not hold.
    #[error("unknown plan `{0}`")]
    UnknownPlan(String),

    /// A stage or merge policy name did not resolve during execution.
    #[error("`{0}` did not resolve to a handler")]
    Unresolved(String),

    /// A sequential stage failed for good.
    #[error("stage `{stage}` failed: {source}")]
    StageFailed {
        /// Failing stage.
        stage: String,
        /// Boundary error.
        #[source]
        source: InvokeError,
    },

    /// A merge policy failed.
    #[error("merge policy `{policy}` failed: {source}")]
    MergeFailed {
        /// Failing policy.
        policy: String,
        /// Boundary error.
        #[source]
        source: InvokeError,
    },

    /// A nested plan re-entered a plan that was still running.
    #[error("plan `{0}` re-entered itself during execution")]
    Reentrant(String),

    /// The execution was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// A kernel hook halted the execution.
    #[error("execution halted: {0}")]
    Halted(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl KernelError {
    /// Whether an async sub-plan member reports this as an error entry for
    /// the merge policy. Everything else aborts the whole execution.
    pub fn is_contained_by_branch(&self) -> bool {
        matches!(self, Self::StageFailed { .. } | Self::MergeFailed { .. })
    }
}
