//! RecordingStage: records the state each invocation observed.

use crate::context::OutputMap;
use crate::error::StageError;
use crate::handler::StageHandler;
use crate::invoke::StageRequest;
use crate::result::StageResult;
use async_trait::async_trait;
use std::sync::Mutex;

/// A stage that writes a fixed map and records the accumulated output it
/// was handed. Use `.observed()` to inspect what it saw.
pub struct RecordingStage {
    data: OutputMap,
    observed: Mutex<Vec<OutputMap>>,
}

impl RecordingStage {
    /// Create a stage that writes `data`.
    pub fn new(data: OutputMap) -> Self {
        Self {
            data,
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every accumulated output this stage received.
    pub fn observed(&self) -> Vec<OutputMap> {
        self.observed.lock().unwrap().clone()
    }

    /// Number of invocations.
    pub fn calls(&self) -> usize {
        self.observed.lock().unwrap().len()
    }
}

#[async_trait]
impl StageHandler for RecordingStage {
    async fn execute(&self, request: &StageRequest) -> Result<StageResult, StageError> {
        self.observed
            .lock()
            .unwrap()
            .push(request.accumulated_output.clone());
        Ok(StageResult::new(
            request.stage_name.clone(),
            self.data.clone(),
        ))
    }
}
