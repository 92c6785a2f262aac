//! Reference merge policies.
//!
//! All three start from the pre-group accumulated output and fold member
//! data over it in definition order. They differ in how failed members are
//! treated.

use async_trait::async_trait;
use stage0::{AsyncGroupResultEntry, MergePolicy, MergeRequest, OutputMap, StageError};

/// Key [`PartialDegrade`] lists failed members under.
pub const DEGRADED_KEY: &str = "degraded";

fn fold_all<'a>(base: &OutputMap, data: impl Iterator<Item = &'a OutputMap>) -> OutputMap {
    let mut out = base.clone();
    for (key, value) in data.flatten() {
        out.insert(key.clone(), value.clone());
    }
    out
}

fn failed_names(entries: &[AsyncGroupResultEntry]) -> Vec<&str> {
    entries
        .iter()
        .filter(|e| !e.is_success())
        .map(|e| e.stage_name.as_str())
        .collect()
}

/// Keeps the data of the first member that succeeded and ignores the rest.
/// Fails when every member failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSuccess;

#[async_trait]
impl MergePolicy for FirstSuccess {
    async fn merge(&self, request: &MergeRequest) -> Result<OutputMap, StageError> {
        match request.entries.iter().find_map(AsyncGroupResultEntry::data) {
            Some(data) => Ok(fold_all(&request.accumulated_output, std::iter::once(data))),
            None if request.entries.is_empty() => Ok(request.accumulated_output.clone()),
            None => Err(StageError::NonRetryable(format!(
                "no member succeeded: {}",
                failed_names(&request.entries).join(", ")
            ))),
        }
    }
}

/// Folds every member's data, but only if all of them succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllOrNothing;

#[async_trait]
impl MergePolicy for AllOrNothing {
    async fn merge(&self, request: &MergeRequest) -> Result<OutputMap, StageError> {
        let failed = failed_names(&request.entries);
        if !failed.is_empty() {
            return Err(StageError::NonRetryable(format!(
                "members failed: {}",
                failed.join(", ")
            )));
        }
        Ok(fold_all(
            &request.accumulated_output,
            request.entries.iter().filter_map(AsyncGroupResultEntry::data),
        ))
    }
}

/// Folds whatever succeeded and records failed member names under
/// [`DEGRADED_KEY`]. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialDegrade;

#[async_trait]
impl MergePolicy for PartialDegrade {
    async fn merge(&self, request: &MergeRequest) -> Result<OutputMap, StageError> {
        let mut out = fold_all(
            &request.accumulated_output,
            request.entries.iter().filter_map(AsyncGroupResultEntry::data),
        );
        let failed = failed_names(&request.entries);
        if !failed.is_empty() {
            tracing::debug!(failed = ?failed, "conduit.merge.degraded");
            out.insert(DEGRADED_KEY.into(), serde_json::json!(failed));
        }
        Ok(out)
    }
}
