//! Top-level configuration.

use conduit_kernel::QueueConfig;
use conduit_registry::ResolverConfig;
use conduit_validator::ValidatorConfig;
use serde::{Deserialize, Serialize};
use stage0::InvocationOptions;

/// Everything a [`Runtime`](crate::Runtime) is built from, apart from the
/// handlers themselves.
///
/// Every section defaults, so an empty document is a valid configuration:
///
/// ```toml
/// concurrency_limit = 32
///
/// [validator]
/// allowed_stage_names = ["ACCESS", "MODEL", "FirstSuccess"]
/// max_plan_depth = 8
///
/// [resolver.stage_plugins]
/// MODEL = "openai"
///
/// [invocation]
/// start_to_close = 30000
///
/// [invocation.retry]
/// maximum_attempts = 5
///
/// [queue]
/// isolation = "per_tenant"
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    /// Plan validation.
    pub validator: ValidatorConfig,
    /// Plugin selection for predefined stages.
    pub resolver: ResolverConfig,
    /// Timeouts and retries of every invocation.
    pub invocation: InvocationOptions,
    /// Task-queue routing hints.
    pub queue: QueueConfig,
    /// Upper bound on invocations in flight across all executions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency_limit: Option<usize>,
}

impl ConduitConfig {
    /// Builder-style validator section.
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Builder-style resolver section.
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Builder-style invocation section.
    pub fn with_invocation(mut self, invocation: InvocationOptions) -> Self {
        self.invocation = invocation;
        self
    }

    /// Builder-style queue section.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Builder-style concurrency limit.
    pub fn with_concurrency_limit(mut self, permits: usize) -> Self {
        self.concurrency_limit = Some(permits);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_kernel::QueueIsolation;
    use stage0::DurationMs;

    #[test]
    fn empty_document_is_default() {
        let config: ConduitConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ConduitConfig::default());
        assert!(config.validator.enabled);
        assert_eq!(config.queue.base_queue, "conduit");
    }

    #[test]
    fn documented_example_parses() {
        let text = r#"
            concurrency_limit = 32

            [validator]
            allowed_stage_names = ["ACCESS", "MODEL", "FirstSuccess"]
            max_plan_depth = 8

            [resolver.stage_plugins]
            MODEL = "openai"

            [invocation]
            start_to_close = 30000

            [invocation.retry]
            maximum_attempts = 5

            [queue]
            isolation = "per_tenant"
        "#;
        let config: ConduitConfig = toml::from_str(text).unwrap();
        assert_eq!(config.concurrency_limit, Some(32));
        assert_eq!(config.validator.max_plan_depth, 8);
        assert!(config.validator.allowed_stage_names.contains("FirstSuccess"));
        assert_eq!(config.resolver.stage_plugins["MODEL"], "openai");
        assert_eq!(
            config.invocation.start_to_close,
            Some(DurationMs::from_millis(30_000))
        );
        assert_eq!(config.invocation.retry.maximum_attempts, 5);
        // Untouched retry fields keep their defaults.
        assert_eq!(config.invocation.retry.backoff_coefficient, 2.0);
        assert_eq!(config.queue.isolation, QueueIsolation::PerTenant);
    }
}
