//! FoldMerge / FailingMerge: minimal merge policies.

use crate::context::OutputMap;
use crate::error::StageError;
use crate::handler::MergePolicy;
use crate::invoke::MergeRequest;
use crate::result::AsyncGroupResultEntry;
use async_trait::async_trait;
use std::sync::Mutex;

/// Folds every successful entry over the pre-group output in entry order
/// and records the entry lists it received.
pub struct FoldMerge {
    received: Mutex<Vec<Vec<AsyncGroupResultEntry>>>,
}

impl FoldMerge {
    /// Create the policy.
    pub fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
        }
    }

    /// Every entry list this policy was invoked with.
    pub fn received(&self) -> Vec<Vec<AsyncGroupResultEntry>> {
        self.received.lock().unwrap().clone()
    }
}

impl Default for FoldMerge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MergePolicy for FoldMerge {
    async fn merge(&self, request: &MergeRequest) -> Result<OutputMap, StageError> {
        self.received.lock().unwrap().push(request.entries.clone());
        let mut output = request.accumulated_output.clone();
        for data in request.entries.iter().filter_map(AsyncGroupResultEntry::data) {
            for (key, value) in data {
                output.insert(key.clone(), value.clone());
            }
        }
        Ok(output)
    }
}

/// A merge policy that always fails.
pub struct FailingMerge;

#[async_trait]
impl MergePolicy for FailingMerge {
    async fn merge(&self, _request: &MergeRequest) -> Result<OutputMap, StageError> {
        Err(StageError::NonRetryable("merge refused".into()))
    }
}
