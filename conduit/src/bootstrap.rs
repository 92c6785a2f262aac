//! Loading [`ConduitConfig`] from layered sources.
//!
//! Sources are read in order and deep-merged, later sources winning key by
//! key. A source that fails transiently is retried under a [`RetryPolicy`];
//! any other failure aborts the load. Bootstrap runs once, before the
//! kernel is built, so nothing here is on the execution path.

use crate::config::ConduitConfig;
use async_trait::async_trait;
use serde_json::{Map, Value};
use stage0::RetryPolicy;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The source could not be reached. Retrying might succeed.
    #[error("config source `{name}` unavailable: {message}")]
    Unavailable {
        /// Source name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// The source answered with something that is not a config document.
    #[error("config source `{name}` is malformed: {message}")]
    Malformed {
        /// Source name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// A source stayed unavailable through every attempt.
    #[error("config source `{name}` unavailable after {attempts} attempts: {message}")]
    Exhausted {
        /// Source name.
        name: String,
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        message: String,
    },

    /// The merged document does not fit [`ConduitConfig`].
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ConfigError {
    /// Whether the load may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// One layer of configuration.
///
/// `load` returns a JSON object. Keys it leaves out fall through to earlier
/// layers and finally to the defaults of [`ConduitConfig`].
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    /// Read the layer.
    async fn load(&self) -> Result<Value, ConfigError>;
}

/// A TOML file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    required: bool,
    name: String,
}

impl FileSource {
    /// A file that must exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self {
            path,
            required: true,
            name,
        }
    }

    /// A file that is skipped when absent.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            required: false,
            ..Self::new(path)
        }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !self.required => {
                tracing::debug!(path = %self.name, "conduit.config.file_skipped");
                return Ok(Value::Object(Map::new()));
            }
            Err(e) => {
                return Err(ConfigError::Unavailable {
                    name: self.name.clone(),
                    message: format!("failed to read config file: {e}"),
                });
            }
        };
        toml::from_str(&text).map_err(|e| ConfigError::Malformed {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// Environment variables under a prefix.
///
/// `CONDUIT_QUEUE__ISOLATION=per_tenant` becomes
/// `{"queue": {"isolation": "per_tenant"}}`: the prefix and one `_` are
/// stripped, `__` separates levels and key segments are lowercased. Values
/// that parse as JSON are taken as JSON, anything else as a string. Maps
/// whose keys are case-sensitive, such as `resolver.stage_plugins`, are
/// set with a JSON object value:
/// `CONDUIT_RESOLVER__STAGE_PLUGINS={"MODEL":"openai"}`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    vars: Option<Vec<(String, String)>>,
}

impl EnvSource {
    /// Default prefix.
    pub const DEFAULT_PREFIX: &'static str = "CONDUIT";

    /// Read the process environment under `CONDUIT_`.
    pub fn new() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }

    /// Read the process environment under a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from a fixed set of variables instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: Self::DEFAULT_PREFIX.into(),
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    fn collect(&self) -> Value {
        let marker = format!("{}_", self.prefix);
        let vars: Vec<(String, String)> = match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };
        let mut root = Value::Object(Map::new());
        for (key, raw) in vars {
            let Some(path) = key.strip_prefix(&marker) else {
                continue;
            };
            let segments: Vec<String> = path
                .split("__")
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .collect();
            if segments.is_empty() {
                continue;
            }
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            let nested = segments
                .iter()
                .rev()
                .fold(value, |inner, segment| {
                    let mut map = Map::new();
                    map.insert(segment.clone(), inner);
                    Value::Object(map)
                });
            merge_values(&mut root, nested);
        }
        root
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        Ok(self.collect())
    }
}

/// A fixed document, typically compiled-in defaults or test overrides.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    value: Value,
}

impl StaticSource {
    /// Wrap a document.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[async_trait]
impl ConfigSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        if !self.value.is_object() {
            return Err(ConfigError::Malformed {
                name: self.name.clone(),
                message: "expected an object".into(),
            });
        }
        Ok(self.value.clone())
    }
}

/// Deep-merge `overlay` into `base`. Objects merge key by key; anything
/// else replaces.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Load every source, merge them in order and deserialize the result.
///
/// Transient failures of a source are retried with the delays of `retry`;
/// once its attempts are spent the load fails with
/// [`ConfigError::Exhausted`].
pub async fn load_config(
    sources: &[Arc<dyn ConfigSource>],
    retry: &RetryPolicy,
) -> Result<ConduitConfig, ConfigError> {
    let mut merged = Value::Object(Map::new());
    for source in sources {
        let layer = load_with_retry(source.as_ref(), retry).await?;
        merge_values(&mut merged, layer);
    }
    let config = serde_json::from_value(merged)?;
    tracing::info!(sources = sources.len(), "conduit.config.loaded");
    Ok(config)
}

async fn load_with_retry(
    source: &dyn ConfigSource,
    retry: &RetryPolicy,
) -> Result<Value, ConfigError> {
    let max_attempts = retry.attempts();
    let mut attempts = 0;
    loop {
        attempts += 1;
        match source.load().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempts < max_attempts => {
                let delay = retry.delay_for(attempts);
                tracing::warn!(
                    source = source.name(),
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "conduit.config.retry"
                );
                tokio::time::sleep(delay.to_std()).await;
            }
            Err(e) if e.is_transient() => {
                return Err(ConfigError::Exhausted {
                    name: source.name().to_owned(),
                    attempts,
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_deep_and_later_wins() {
        let mut base = json!({"queue": {"isolation": "shared", "base_queue": "conduit"}, "x": [1]});
        merge_values(
            &mut base,
            json!({"queue": {"isolation": "per_stage"}, "x": [2, 3]}),
        );
        assert_eq!(
            base,
            json!({"queue": {"isolation": "per_stage", "base_queue": "conduit"}, "x": [2, 3]})
        );
    }

    #[test]
    fn env_keys_nest_and_values_parse() {
        let source = EnvSource::from_vars([
            ("CONDUIT_QUEUE__ISOLATION", "per_tenant"),
            ("CONDUIT_CONCURRENCY_LIMIT", "8"),
            ("CONDUIT_VALIDATOR__ENABLED", "false"),
            ("CONDUIT_RESOLVER__STAGE_PLUGINS", r#"{"MODEL":"openai"}"#),
            ("OTHER_QUEUE__ISOLATION", "per_stage"),
            ("CONDUIT_", "ignored"),
        ]);
        assert_eq!(
            source.collect(),
            json!({
                "queue": {"isolation": "per_tenant"},
                "concurrency_limit": 8,
                "validator": {"enabled": false},
                "resolver": {"stage_plugins": {"MODEL": "openai"}},
            })
        );
    }

    #[test]
    fn transient_only_for_unavailable() {
        let unavailable = ConfigError::Unavailable {
            name: "s".into(),
            message: "m".into(),
        };
        let malformed = ConfigError::Malformed {
            name: "s".into(),
            message: "m".into(),
        };
        assert!(unavailable.is_transient());
        assert!(!malformed.is_transient());
    }
}
