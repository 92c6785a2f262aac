//! SlowStage: sleeps before answering.

use crate::context::OutputMap;
use crate::error::StageError;
use crate::handler::StageHandler;
use crate::invoke::StageRequest;
use crate::result::StageResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A stage that sleeps for a fixed time, then writes a fixed map.
/// `.finished()` reports whether any invocation ran to completion.
pub struct SlowStage {
    delay: Duration,
    data: OutputMap,
    finished: AtomicBool,
}

impl SlowStage {
    /// Create a stage that waits `delay` before writing `data`.
    pub fn new(delay: Duration, data: OutputMap) -> Self {
        Self {
            delay,
            data,
            finished: AtomicBool::new(false),
        }
    }

    /// Whether an invocation completed its sleep.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageHandler for SlowStage {
    async fn execute(&self, request: &StageRequest) -> Result<StageResult, StageError> {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(StageResult::new(
            request.stage_name.clone(),
            self.data.clone(),
        ))
    }
}
