//! Name → handler resolution with fixed precedence.

use crate::bucket::{ActivityRegistry, CustomBucket, PredefinedBucket};
use crate::predefined::PredefinedStage;
use serde::{Deserialize, Serialize};
use stage0::{DEFAULT_PLUGIN_ID, Handler, StageDefinition};
use std::collections::BTreeMap;

/// Resolver settings sourced from configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Predefined stage name → plugin id, used when a definition does not
    /// pick a plugin itself.
    pub stage_plugins: BTreeMap<String, String>,
}

impl ResolverConfig {
    /// Builder-style stage → plugin override.
    pub fn with_stage_plugin(mut self, stage: PredefinedStage, plugin_id: impl Into<String>) -> Self {
        self.stage_plugins
            .insert(stage.as_str().to_owned(), plugin_id.into());
        self
    }
}

/// Which table answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// [`PredefinedBucket`].
    Predefined,
    /// [`ActivityRegistry`].
    Activity,
    /// [`CustomBucket`].
    Custom,
}

/// Resolves stage and merge policy names to handlers.
///
/// Precedence, first hit wins:
/// 1. predefined stage identifiers → [`PredefinedBucket`] by plugin id
/// 2. [`ActivityRegistry`]
/// 3. [`CustomBucket`]
///
/// A predefined identifier never falls through to the later tables: if its
/// selected plugin is missing, resolution yields `None`.
#[derive(Debug, Clone, Default)]
pub struct StageResolver {
    predefined: PredefinedBucket,
    activities: ActivityRegistry,
    custom: CustomBucket,
    config: ResolverConfig,
}

impl StageResolver {
    /// Create a resolver over the three tables.
    pub fn new(
        predefined: PredefinedBucket,
        activities: ActivityRegistry,
        custom: CustomBucket,
    ) -> Self {
        Self {
            predefined,
            activities,
            custom,
            config: ResolverConfig::default(),
        }
    }

    /// Apply configuration-level plugin overrides.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// The plugin id a predefined stage resolves with: the explicit id,
    /// else the configured override, else [`DEFAULT_PLUGIN_ID`].
    pub fn plugin_for<'a>(&'a self, stage: PredefinedStage, explicit: Option<&'a str>) -> &'a str {
        explicit
            .or_else(|| {
                self.config
                    .stage_plugins
                    .get(stage.as_str())
                    .map(String::as_str)
            })
            .unwrap_or(DEFAULT_PLUGIN_ID)
    }

    /// Resolve a name without an explicit plugin id.
    pub fn resolve(&self, name: &str) -> Option<Handler> {
        self.resolve_with(name, None)
    }

    /// Resolve the handler a definition refers to.
    pub fn resolve_definition(&self, definition: &StageDefinition) -> Option<Handler> {
        self.resolve_with(&definition.stage_name, definition.plugin_id.as_deref())
    }

    /// Resolve a name, selecting predefined variants by `plugin_id`.
    pub fn resolve_with(&self, name: &str, plugin_id: Option<&str>) -> Option<Handler> {
        self.lookup(name, plugin_id).map(|(handler, _)| handler)
    }

    /// Resolve and report which table answered.
    pub fn lookup(&self, name: &str, plugin_id: Option<&str>) -> Option<(Handler, ResolutionTier)> {
        if let Some(stage) = PredefinedStage::parse(name) {
            let plugin = self.plugin_for(stage, plugin_id);
            let found = self.predefined.get(stage, plugin);
            if found.is_none() {
                tracing::debug!(stage = %stage, plugin, "conduit.resolve.missing_plugin");
            }
            return found.map(|h| (h, ResolutionTier::Predefined));
        }
        if let Some(handler) = self.activities.get(name) {
            return Some((handler, ResolutionTier::Activity));
        }
        self.custom
            .get(name)
            .map(|handler| (handler, ResolutionTier::Custom))
    }

    /// The predefined bucket.
    pub fn predefined(&self) -> &PredefinedBucket {
        &self.predefined
    }

    /// The activity registry.
    pub fn activities(&self) -> &ActivityRegistry {
        &self.activities
    }

    /// The custom bucket.
    pub fn custom(&self) -> &CustomBucket {
        &self.custom
    }
}
