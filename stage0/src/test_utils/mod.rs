//! In-memory handlers for testing.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! implementations that exercise the kernel without real backends.

mod failing_stage;
mod fold_merge;
mod recording_stage;
mod slow_stage;
mod static_stage;

pub use failing_stage::{FailingStage, FlakyStage};
pub use fold_merge::{FailingMerge, FoldMerge};
pub use recording_stage::RecordingStage;
pub use slow_stage::SlowStage;
pub use static_stage::{StaticCapability, StaticStage};

use crate::context::OutputMap;

/// Turn a `json!` object literal into an [`OutputMap`]. Non-objects give an
/// empty map.
pub fn output_map(value: serde_json::Value) -> OutputMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => OutputMap::new(),
    }
}
