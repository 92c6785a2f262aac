//! The three registration tables and their builders.

use crate::predefined::PredefinedStage;
use stage0::{Handler, RegistryError};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Handlers for predefined stages, keyed by stage and plugin id.
#[derive(Debug, Clone, Default)]
pub struct PredefinedBucket {
    handlers: HashMap<(PredefinedStage, String), Handler>,
}

impl PredefinedBucket {
    /// Start building a bucket.
    pub fn builder() -> PredefinedBucketBuilder {
        PredefinedBucketBuilder::default()
    }

    /// Look up one plugin variant of a stage.
    pub fn get(&self, stage: PredefinedStage, plugin_id: &str) -> Option<Handler> {
        self.handlers.get(&(stage, plugin_id.to_owned())).cloned()
    }

    /// Plugin ids registered for a stage, sorted.
    pub fn plugins_for(&self, stage: PredefinedStage) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .handlers
            .keys()
            .filter(|(s, _)| *s == stage)
            .map(|(_, id)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered variants.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`PredefinedBucket`]. Rejects a second handler for the same
/// (stage, plugin id) pair.
#[derive(Debug, Default)]
pub struct PredefinedBucketBuilder {
    handlers: HashMap<(PredefinedStage, String), Handler>,
}

impl PredefinedBucketBuilder {
    /// Register a plugin variant.
    pub fn register(
        mut self,
        stage: PredefinedStage,
        plugin_id: impl Into<String>,
        handler: Handler,
    ) -> Result<Self, RegistryError> {
        let plugin_id = plugin_id.into();
        match self.handlers.entry((stage, plugin_id)) {
            Entry::Occupied(e) => Err(RegistryError::Duplicate {
                bucket: "predefined bucket",
                name: format!("{}/{}", stage, e.key().1),
            }),
            Entry::Vacant(e) => {
                e.insert(handler);
                Ok(self)
            }
        }
    }

    /// Finish the bucket.
    pub fn build(self) -> PredefinedBucket {
        PredefinedBucket {
            handlers: self.handlers,
        }
    }
}

/// Flat name → handler table for cross-cutting plugins.
///
/// Predefined names are allowed here; the resolver's precedence makes the
/// predefined bucket win for them.
#[derive(Debug, Clone, Default)]
pub struct ActivityRegistry {
    handlers: HashMap<String, Handler>,
}

impl ActivityRegistry {
    /// Start building a registry.
    pub fn builder() -> ActivityRegistryBuilder {
        ActivityRegistryBuilder::default()
    }

    /// Look up a handler.
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`ActivityRegistry`]. Rejects duplicate names.
#[derive(Debug, Default)]
pub struct ActivityRegistryBuilder {
    handlers: HashMap<String, Handler>,
}

impl ActivityRegistryBuilder {
    /// Register a handler under `name`.
    pub fn register(mut self, name: impl Into<String>, handler: Handler) -> Result<Self, RegistryError> {
        insert_unique(&mut self.handlers, "activity registry", name.into(), handler)?;
        Ok(self)
    }

    /// Finish the registry.
    pub fn build(self) -> ActivityRegistry {
        ActivityRegistry {
            handlers: self.handlers,
        }
    }
}

/// User-registered stages and capabilities under non-predefined names.
#[derive(Debug, Clone, Default)]
pub struct CustomBucket {
    handlers: HashMap<String, Handler>,
}

impl CustomBucket {
    /// Start building a bucket.
    pub fn builder() -> CustomBucketBuilder {
        CustomBucketBuilder::default()
    }

    /// Look up a handler.
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`CustomBucket`]. Rejects predefined names and duplicates.
#[derive(Debug, Default)]
pub struct CustomBucketBuilder {
    handlers: HashMap<String, Handler>,
}

impl CustomBucketBuilder {
    /// Register a handler under `name`.
    pub fn register(mut self, name: impl Into<String>, handler: Handler) -> Result<Self, RegistryError> {
        let name = name.into();
        if PredefinedStage::is_predefined(&name) {
            return Err(RegistryError::ReservedName(name));
        }
        insert_unique(&mut self.handlers, "custom bucket", name, handler)?;
        Ok(self)
    }

    /// Finish the bucket.
    pub fn build(self) -> CustomBucket {
        CustomBucket {
            handlers: self.handlers,
        }
    }
}

fn insert_unique(
    handlers: &mut HashMap<String, Handler>,
    bucket: &'static str,
    name: String,
    handler: Handler,
) -> Result<(), RegistryError> {
    match handlers.entry(name) {
        Entry::Occupied(e) => Err(RegistryError::Duplicate {
            bucket,
            name: e.key().clone(),
        }),
        Entry::Vacant(e) => {
            e.insert(handler);
            Ok(())
        }
    }
}
