//! FailingStage / FlakyStage: stages that fail on purpose.

use crate::context::OutputMap;
use crate::error::StageError;
use crate::handler::StageHandler;
use crate::invoke::StageRequest;
use crate::result::StageResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

/// A stage that fails on every attempt and counts how often it ran.
pub struct FailingStage {
    retryable: bool,
    message: String,
    attempts: AtomicU32,
}

impl FailingStage {
    /// Fail with [`StageError::Retryable`].
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
            attempts: AtomicU32::new(0),
        }
    }

    /// Fail with [`StageError::NonRetryable`].
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
            attempts: AtomicU32::new(0),
        }
    }

    /// How many times the stage ran.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageHandler for FailingStage {
    async fn execute(&self, _request: &StageRequest) -> Result<StageResult, StageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.retryable {
            Err(StageError::Retryable(self.message.clone()))
        } else {
            Err(StageError::NonRetryable(self.message.clone()))
        }
    }
}

/// A stage that fails a fixed number of times, then succeeds.
pub struct FlakyStage {
    failures: u32,
    data: OutputMap,
    attempts: AtomicU32,
}

impl FlakyStage {
    /// Fail `failures` times with a retryable error, then write `data`.
    pub fn new(failures: u32, data: OutputMap) -> Self {
        Self {
            failures,
            data,
            attempts: AtomicU32::new(0),
        }
    }

    /// How many times the stage ran.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageHandler for FlakyStage {
    async fn execute(&self, request: &StageRequest) -> Result<StageResult, StageError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(StageError::Retryable(format!("attempt {attempt} failed")));
        }
        Ok(StageResult::new(
            request.stage_name.clone(),
            self.data.clone(),
        ))
    }
}
