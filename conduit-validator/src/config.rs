//! Validator policy.

use serde::{Deserialize, Serialize};
use stage0::TenantId;
use std::collections::{BTreeMap, BTreeSet};

/// Depth bound used when configuration does not set one.
pub const DEFAULT_MAX_PLAN_DEPTH: usize = 16;

/// What the validator enforces.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Run validation before each execution.
    pub enabled: bool,
    /// Stage names every plan may use. Empty means no restriction.
    pub allowed_stage_names: BTreeSet<String>,
    /// Per-tenant allowlists. A tenant listed here is checked against its
    /// own list instead of `allowed_stage_names`.
    pub tenant_allowlists: BTreeMap<String, BTreeSet<String>>,
    /// Maximum plan depth. Values below 1 are treated as 1.
    pub max_plan_depth: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_stage_names: BTreeSet::new(),
            tenant_allowlists: BTreeMap::new(),
            max_plan_depth: DEFAULT_MAX_PLAN_DEPTH,
        }
    }
}

impl ValidatorConfig {
    /// Builder-style global allowlist.
    pub fn with_allowed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_stage_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style tenant allowlist.
    pub fn with_tenant_allowed<I, S>(mut self, tenant: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tenant_allowlists
            .insert(tenant.into(), names.into_iter().map(Into::into).collect());
        self
    }

    /// Builder-style depth bound.
    pub fn with_max_plan_depth(mut self, max: usize) -> Self {
        self.max_plan_depth = max;
        self
    }

    /// Builder-style on/off switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The depth bound actually enforced.
    pub fn effective_max_depth(&self) -> usize {
        self.max_plan_depth.max(1)
    }

    /// The allowlist that applies to `tenant`.
    pub fn allowlist_for(&self, tenant: &TenantId) -> &BTreeSet<String> {
        self.tenant_allowlists
            .get(tenant.as_str())
            .unwrap_or(&self.allowed_stage_names)
    }
}
