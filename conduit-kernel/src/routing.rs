//! Task-queue routing hints.

use serde::{Deserialize, Serialize};
use stage0::TenantId;

/// How invocations are spread across worker queues. The kernel only
/// computes the queue name; invokers decide what to do with it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueIsolation {
    /// Every invocation goes to the base queue.
    #[default]
    Shared,
    /// One queue per tenant.
    PerTenant,
    /// One queue per tenant and stage.
    PerStage,
}

/// Queue settings.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Isolation strategy.
    pub isolation: QueueIsolation,
    /// Prefix of every queue name.
    pub base_queue: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            isolation: QueueIsolation::Shared,
            base_queue: "conduit".into(),
        }
    }
}

impl QueueConfig {
    /// Builder-style isolation strategy.
    pub fn with_isolation(mut self, isolation: QueueIsolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Queue name for an invocation of `name` on behalf of `tenant`.
    pub fn task_queue(&self, tenant: &TenantId, name: &str) -> String {
        match self.isolation {
            QueueIsolation::Shared => self.base_queue.clone(),
            QueueIsolation::PerTenant => format!("{}.{}", self.base_queue, tenant),
            QueueIsolation::PerStage => format!("{}.{}.{}", self.base_queue, tenant, name),
        }
    }
}
