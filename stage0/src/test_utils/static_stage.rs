//! StaticStage / StaticCapability: always return the same data.

use crate::context::OutputMap;
use crate::error::StageError;
use crate::handler::{CapabilityHandler, StageHandler};
use crate::invoke::StageRequest;
use crate::result::{CapabilityResult, StageResult};
use async_trait::async_trait;

/// A stage that writes a fixed map every time it runs.
pub struct StaticStage {
    data: OutputMap,
}

impl StaticStage {
    /// Create a stage that writes `data`.
    pub fn new(data: OutputMap) -> Self {
        Self { data }
    }
}

#[async_trait]
impl StageHandler for StaticStage {
    async fn execute(&self, request: &StageRequest) -> Result<StageResult, StageError> {
        Ok(StageResult::new(
            request.stage_name.clone(),
            self.data.clone(),
        ))
    }
}

/// A capability that returns a fixed map every time it runs.
pub struct StaticCapability {
    data: OutputMap,
}

impl StaticCapability {
    /// Create a capability that returns `data`.
    pub fn new(data: OutputMap) -> Self {
        Self { data }
    }
}

#[async_trait]
impl CapabilityHandler for StaticCapability {
    async fn invoke(&self, request: &StageRequest) -> Result<CapabilityResult, StageError> {
        Ok(CapabilityResult::new(
            request.stage_name.clone(),
            self.data.clone(),
        ))
    }
}
