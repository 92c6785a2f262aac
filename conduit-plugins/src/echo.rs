//! A capability that echoes part of the request back.

use async_trait::async_trait;
use stage0::{CapabilityHandler, CapabilityResult, StageError, StageRequest};

/// Echoes one value into the accumulated output.
///
/// Config overrides:
///
/// | Key | Default | Meaning |
/// |-----|---------|---------|
/// | `reply` | unset | Literal value to write. Wins over `input_key`. |
/// | `input_key` | `"prompt"` | Original-input key to copy. |
/// | `output_key` | `"toolResult"` | Key written. |
///
/// Fails non-retryably when neither a reply nor the input key is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTool;

#[async_trait]
impl CapabilityHandler for EchoTool {
    async fn invoke(&self, request: &StageRequest) -> Result<CapabilityResult, StageError> {
        let input_key = request
            .config("input_key")
            .and_then(|v| v.as_str())
            .unwrap_or("prompt");
        let output_key = request
            .config("output_key")
            .and_then(|v| v.as_str())
            .unwrap_or("toolResult");

        let value = request
            .config("reply")
            .or_else(|| request.input(input_key))
            .cloned()
            .ok_or_else(|| {
                StageError::NonRetryable(format!("original input has no `{input_key}`"))
            })?;
        Ok(CapabilityResult::new(request.stage_name.clone(), Default::default()).with(output_key, value))
    }
}
