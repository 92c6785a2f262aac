//! In-process implementation of the [`StageInvoker`] boundary.
//!
//! Resolves handlers by name through a [`StageResolver`] and runs them on
//! the current task. No durability: a crashed process loses the
//! invocation. Retries, timeouts and the concurrency limit follow the
//! [`InvocationOptions`] passed with each call.

use async_trait::async_trait;
use conduit_registry::StageResolver;
use stage0::{
    DurationMs, Handler, HandlerKind, InvocationOptions, InvokeError, MergeRequest, OutputMap,
    StageError, StageInvoker, StageRequest, StageResult,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// In-process invocation boundary.
///
/// Cancellation is cooperative: dropping the returned future drops the
/// handler future and any pending backoff sleep.
#[derive(Debug, Clone)]
pub struct LocalInvoker {
    resolver: Arc<StageResolver>,
    limiter: Option<Arc<Semaphore>>,
}

impl LocalInvoker {
    /// Create an invoker without a concurrency limit.
    pub fn new(resolver: Arc<StageResolver>) -> Self {
        Self {
            resolver,
            limiter: None,
        }
    }

    /// Allow at most `permits` handler attempts to run at once. Waiting for
    /// a permit is bounded by the schedule-to-start budget.
    pub fn with_concurrency_limit(mut self, permits: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(permits.max(1))));
        self
    }

    /// The resolver handlers are looked up in.
    pub fn resolver(&self) -> &StageResolver {
        &self.resolver
    }

    fn lookup(
        &self,
        name: &str,
        plugin_id: Option<&str>,
        expected: HandlerKind,
    ) -> Result<Handler, InvokeError> {
        let handler = self
            .resolver
            .resolve_with(name, plugin_id)
            .ok_or_else(|| InvokeError::NotFound(name.to_owned()))?;
        let fits = match expected {
            HandlerKind::Merge => handler.kind() == HandlerKind::Merge,
            _ => handler.runs_as_stage(),
        };
        if !fits {
            return Err(InvokeError::WrongKind {
                name: name.to_owned(),
                expected,
                actual: handler.kind(),
            });
        }
        Ok(handler)
    }

    async fn acquire(
        &self,
        name: &str,
        options: &InvocationOptions,
    ) -> Result<Option<OwnedSemaphorePermit>, InvokeError> {
        let Some(limiter) = &self.limiter else {
            return Ok(None);
        };
        let permit = Arc::clone(limiter).acquire_owned();
        let permit = match options.schedule_to_start {
            Some(budget) => tokio::time::timeout(budget.to_std(), permit)
                .await
                .map_err(|_| InvokeError::TimedOut {
                    name: name.to_owned(),
                    limit: "schedule-to-start",
                    budget,
                })?,
            None => permit.await,
        };
        permit
            .map(Some)
            .map_err(|e| InvokeError::Other(Box::new(e)))
    }

    /// Run `attempt` under the retry policy and every budget of `options`.
    async fn call<T, F, Fut>(
        &self,
        name: &str,
        options: &InvocationOptions,
        attempt: F,
    ) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let retried = self.retry(name, options, attempt);
        match options.schedule_to_close {
            Some(budget) => tokio::time::timeout(budget.to_std(), retried)
                .await
                .map_err(|_| InvokeError::TimedOut {
                    name: name.to_owned(),
                    limit: "schedule-to-close",
                    budget,
                })?,
            None => retried.await,
        }
    }

    async fn retry<T, F, Fut>(
        &self,
        name: &str,
        options: &InvocationOptions,
        mut attempt: F,
    ) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let policy = &options.retry;
        let max_attempts = policy.attempts();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let permit = self.acquire(name, options).await?;
            let result = with_start_to_close(options.start_to_close, attempt()).await;
            drop(permit);

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if !policy.is_retryable(&error) {
                tracing::debug!(name, %error, "conduit.invoke.non_retryable");
                return Err(InvokeError::NonRetryable {
                    name: name.to_owned(),
                    source: error,
                });
            }
            if attempts >= max_attempts {
                tracing::debug!(name, attempts, %error, "conduit.invoke.exhausted");
                return Err(InvokeError::Exhausted {
                    name: name.to_owned(),
                    attempts,
                    source: error,
                });
            }
            let delay = policy.delay_for(attempts);
            tracing::debug!(name, attempt = attempts, %delay, %error, "conduit.invoke.retry");
            tokio::time::sleep(delay.to_std()).await;
        }
    }
}

async fn with_start_to_close<T>(
    budget: Option<DurationMs>,
    attempt: impl Future<Output = Result<T, StageError>>,
) -> Result<T, StageError> {
    match budget {
        Some(budget) => tokio::time::timeout(budget.to_std(), attempt)
            .await
            .unwrap_or(Err(StageError::Timeout(budget))),
        None => attempt.await,
    }
}

#[async_trait]
impl StageInvoker for LocalInvoker {
    async fn invoke_stage(
        &self,
        request: StageRequest,
        options: &InvocationOptions,
    ) -> Result<StageResult, InvokeError> {
        let handler = self.lookup(
            &request.stage_name,
            request.plugin_id.as_deref(),
            HandlerKind::Stage,
        )?;
        let (handler, request) = (&handler, &request);
        self.call(&request.stage_name, options, move || async move {
            handler.run_stage(request).await.unwrap_or_else(|| {
                Err(StageError::NonRetryable(format!(
                    "`{}` cannot run as a stage",
                    request.stage_name
                )))
            })
        })
        .await
    }

    async fn invoke_merge(
        &self,
        request: MergeRequest,
        options: &InvocationOptions,
    ) -> Result<OutputMap, InvokeError> {
        let handler = self.lookup(&request.merge_policy, None, HandlerKind::Merge)?;
        let (handler, request) = (&handler, &request);
        self.call(&request.merge_policy, options, move || async move {
            handler.run_merge(request).await.unwrap_or_else(|| {
                Err(StageError::NonRetryable(format!(
                    "`{}` is not a merge policy",
                    request.merge_policy
                )))
            })
        })
        .await
    }
}
