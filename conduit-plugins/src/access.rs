//! Access gate that admits every request.

use async_trait::async_trait;
use stage0::{StageError, StageHandler, StageRequest, StageResult};

/// Key the gate writes its decision under.
pub const ACCESS_ALLOWED_KEY: &str = "accessAllowed";

/// `ACCESS` stage for deployments that authorize upstream. Writes
/// `accessAllowed: true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGate;

#[async_trait]
impl StageHandler for AllowAllGate {
    async fn execute(&self, request: &StageRequest) -> Result<StageResult, StageError> {
        tracing::trace!(tenant = %request.tenant_id, "conduit.access.allowed");
        Ok(StageResult::empty(request.stage_name.clone())
            .with(ACCESS_ALLOWED_KEY, serde_json::Value::Bool(true)))
    }
}
