//! The invocation boundary between the kernel and handlers.
//!
//! The kernel never calls a handler directly. It hands a request to a
//! [`StageInvoker`], which may run the handler in-process, on a worker
//! queue, or as an activity of a durable-execution engine. The boundary owns
//! retries and timeouts; the kernel only sees the final outcome.

use crate::context::{OutputMap, Scratch};
use crate::duration::DurationMs;
use crate::error::{InvokeError, StageError};
use crate::id::{RequestId, TenantId};
use crate::result::{AsyncGroupResultEntry, StageResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One stage invocation: the stage to run and the state it may read.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRequest {
    /// Tenant of the execution.
    pub tenant_id: TenantId,
    /// Request of the execution.
    pub request_id: RequestId,
    /// Stage to resolve and run.
    pub stage_name: String,
    /// Explicit plugin variant, if the plan chose one.
    #[serde(default)]
    pub plugin_id: Option<String>,
    /// Definition-level overrides.
    #[serde(default)]
    pub config_overrides: OutputMap,
    /// The caller's input.
    pub original_input: Arc<OutputMap>,
    /// Accumulated output as this invocation sees it. For async group
    /// members this is the snapshot taken at group entry.
    #[serde(default)]
    pub accumulated_output: OutputMap,
    /// Routing hint for queue-based invokers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_queue: Option<String>,
    /// Execution-scoped side channel. Not carried across processes.
    #[serde(skip)]
    pub scratch: Scratch,
}

impl StageRequest {
    /// Read a key of the original input.
    pub fn input(&self, key: &str) -> Option<&serde_json::Value> {
        self.original_input.get(key)
    }

    /// Read a key of the accumulated output.
    pub fn accumulated(&self, key: &str) -> Option<&serde_json::Value> {
        self.accumulated_output.get(key)
    }

    /// Read a configuration override.
    pub fn config(&self, key: &str) -> Option<&serde_json::Value> {
        self.config_overrides.get(key)
    }
}

/// One merge invocation for an async group.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Tenant of the execution.
    pub tenant_id: TenantId,
    /// Request of the execution.
    pub request_id: RequestId,
    /// Merge policy to resolve and run.
    pub merge_policy: String,
    /// The caller's input.
    pub original_input: Arc<OutputMap>,
    /// Accumulated output as of group entry.
    #[serde(default)]
    pub accumulated_output: OutputMap,
    /// One entry per group member, in definition order.
    #[serde(default)]
    pub entries: Vec<AsyncGroupResultEntry>,
    /// Routing hint for queue-based invokers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_queue: Option<String>,
}

/// Retry behaviour of the invocation boundary.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 mean 1.
    pub maximum_attempts: u32,
    /// Delay before the first retry.
    pub initial_interval: DurationMs,
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Upper bound for the delay. `None` means 100 × `initial_interval`.
    pub maximum_interval: Option<DurationMs>,
    /// Error type names (see [`StageError::error_type`]) that are never retried.
    pub non_retryable_error_types: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            initial_interval: DurationMs::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: None,
            non_retryable_error_types: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retries() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    /// Builder-style attempt count.
    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    /// Builder-style initial interval.
    pub fn with_initial_interval(mut self, interval: DurationMs) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Builder-style non-retryable type.
    pub fn with_non_retryable(mut self, error_type: impl Into<String>) -> Self {
        self.non_retryable_error_types.push(error_type.into());
        self
    }

    /// Attempts allowed, never less than one.
    pub fn attempts(&self) -> u32 {
        self.maximum_attempts.max(1)
    }

    /// Whether an error may be retried under this policy.
    pub fn is_retryable(&self, error: &StageError) -> bool {
        if matches!(error, StageError::NonRetryable(_)) {
            return false;
        }
        let error_type = error.error_type();
        !self
            .non_retryable_error_types
            .iter()
            .any(|t| t == error_type)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> DurationMs {
        let cap = self
            .maximum_interval
            .unwrap_or_else(|| self.initial_interval.scale(100.0));
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self
            .initial_interval
            .scale(self.backoff_coefficient.max(1.0).powi(exponent));
        delay.min(cap)
    }
}

/// Per-invocation limits, sourced from configuration.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationOptions {
    /// Longest wait between scheduling and the first attempt starting.
    pub schedule_to_start: Option<DurationMs>,
    /// Budget of a single attempt.
    pub start_to_close: Option<DurationMs>,
    /// Budget of the whole invocation, retries included.
    pub schedule_to_close: Option<DurationMs>,
    /// Retry behaviour.
    pub retry: RetryPolicy,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            schedule_to_start: None,
            start_to_close: Some(DurationMs::from_secs(60)),
            schedule_to_close: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl InvocationOptions {
    /// Builder-style retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder-style start-to-close budget.
    pub fn with_start_to_close(mut self, budget: DurationMs) -> Self {
        self.start_to_close = Some(budget);
        self
    }

    /// Builder-style schedule-to-close budget.
    pub fn with_schedule_to_close(mut self, budget: DurationMs) -> Self {
        self.schedule_to_close = Some(budget);
        self
    }

    /// Builder-style schedule-to-start budget.
    pub fn with_schedule_to_start(mut self, budget: DurationMs) -> Self {
        self.schedule_to_start = Some(budget);
        self
    }
}

/// The invocation boundary.
///
/// Implementations:
/// - `LocalInvoker`: in-process, resolves handlers from a registry
/// - a durable-execution activity client: retried, journaled, replay-safe
/// - a queue client: ships the serialized request to a worker pool
///
/// Delivery is at-least-once. The kernel does not deduplicate.
#[async_trait]
pub trait StageInvoker: Send + Sync {
    /// Run one stage or capability.
    async fn invoke_stage(
        &self,
        request: StageRequest,
        options: &InvocationOptions,
    ) -> Result<StageResult, InvokeError>;

    /// Run one merge policy.
    async fn invoke_merge(
        &self,
        request: MergeRequest,
        options: &InvocationOptions,
    ) -> Result<OutputMap, InvokeError>;
}
