//! Read-through response cache.
//!
//! One [`InMemoryCache`] handler serves two positions in a plan:
//!
//! - `mode: "lookup"` (default), early in the plan. On a hit it writes the
//!   cached map plus `cacheHit: true`; on a miss it writes
//!   `cacheHit: false` and leaves the key in the execution scratch store.
//! - `mode: "store"`, late in the plan. If the lookup missed, it copies the
//!   configured accumulated keys into the cache under the remembered key.
//!
//! Entries are scoped per tenant. The cache holds at most `capacity`
//! entries across all tenants and evicts the oldest insertion first.

use async_trait::async_trait;
use stage0::{OutputMap, StageError, StageHandler, StageRequest, StageResult};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Key the lookup writes its verdict under.
pub const CACHE_HIT_KEY: &str = "cacheHit";

/// Scratch entry carrying the key of a missed lookup.
const PENDING_KEY: &str = "conduit.cache.pending";

/// Default bound on cached entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Tenant-scoped in-memory cache stage with FIFO eviction.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: RwLock<Entries>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<String, OutputMap>,
    order: VecDeque<String>,
}

impl Entries {
    fn insert(&mut self, key: String, entry: OutputMap, capacity: usize) {
        if self.values.insert(key.clone(), entry).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.values.remove(&oldest);
                tracing::debug!("conduit.cache.evicted");
            }
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl InMemoryCache {
    /// Create an empty cache holding up to [`DEFAULT_CACHE_CAPACITY`]
    /// entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache holding up to `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached entries across all tenants.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.values.is_empty()
    }

    fn cache_key(request: &StageRequest) -> Option<String> {
        let field = request
            .config("key_field")
            .and_then(|v| v.as_str())
            .unwrap_or("prompt");
        let value = request.input(field)?;
        Some(format!("{}\0{}", request.tenant_id, value))
    }

    async fn lookup(&self, request: &StageRequest) -> StageResult {
        let mut result = StageResult::empty(request.stage_name.clone());
        let Some(key) = Self::cache_key(request) else {
            return result.with(CACHE_HIT_KEY, false.into());
        };
        if let Some(cached) = self.entries.read().await.values.get(&key) {
            tracing::debug!(tenant = %request.tenant_id, "conduit.cache.hit");
            result.data = cached.clone();
            return result.with(CACHE_HIT_KEY, true.into());
        }
        tracing::debug!(tenant = %request.tenant_id, "conduit.cache.miss");
        request.scratch.put(PENDING_KEY, key.into());
        result.with(CACHE_HIT_KEY, false.into())
    }

    async fn store(&self, request: &StageRequest) -> StageResult {
        let result = StageResult::empty(request.stage_name.clone());
        let Some(key) = request
            .scratch
            .remove(PENDING_KEY)
            .and_then(|v| v.as_str().map(str::to_owned))
        else {
            return result;
        };
        let fields: Vec<&str> = match request.config("fields").and_then(|v| v.as_array()) {
            Some(list) => list.iter().filter_map(|v| v.as_str()).collect(),
            None => vec!["result"],
        };
        let entry: OutputMap = fields
            .into_iter()
            .filter_map(|f| request.accumulated(f).map(|v| (f.to_owned(), v.clone())))
            .collect();
        if !entry.is_empty() {
            self.entries
                .write()
                .await
                .insert(key, entry, self.capacity);
        }
        result
    }
}

#[async_trait]
impl StageHandler for InMemoryCache {
    async fn execute(&self, request: &StageRequest) -> Result<StageResult, StageError> {
        match request.config("mode").and_then(|v| v.as_str()).unwrap_or("lookup") {
            "lookup" => Ok(self.lookup(request).await),
            "store" => Ok(self.store(request).await),
            other => Err(StageError::NonRetryable(format!("unknown cache mode `{other}`"))),
        }
    }
}
