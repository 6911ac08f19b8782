//! Pipeline registry: descriptors, the built-chain cache and statistics.

use super::components::ComponentRegistry;
use super::descriptor::{PipelineDescriptor, StepDescriptor};
use crate::chain::{Chain, ErrorPolicy};
use crate::context::Context;
use crate::errors::{ChainflowError, ComponentNotFoundError, PipelineNotFoundError, PipelineValidationError};
use crate::links::LinkRef;
use crate::middleware::MiddlewareRef;
use crate::utils::{now_utc, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatistics {
    /// Chains built from the descriptor.
    pub builds: u64,
    /// Requests served from the cache.
    pub cache_hits: u64,
    /// Completed executions.
    pub executions: u64,
    /// Executions whose final context carried an error.
    pub failures: u64,
}

/// Snapshot of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// SHA-256 of the descriptor the chain was built from.
    pub fingerprint: String,
    /// When the chain was built.
    pub built_at: Timestamp,
    /// How many times the cached chain was handed out.
    pub hit_count: u64,
}

/// Outcome of [`PipelineRegistry::execute`].
#[derive(Debug, Clone)]
pub struct Execution {
    /// The context the chain returned. Check `final_ctx.error()` for a
    /// captured failure.
    pub final_ctx: Context,
    /// Copy of `final_ctx.response_sent()`.
    pub response_sent: bool,
}

struct CacheEntry {
    chain: Arc<Chain>,
    built_at: Timestamp,
    hit_count: AtomicU64,
    fingerprint: String,
}

/// Named pipelines, built lazily into cached chains.
///
/// Configuring a pipeline stores its descriptor and drops any cached chain;
/// the chain is (re)built on the next [`create_pipeline`](Self::create_pipeline).
/// Repeated creates with an unchanged descriptor return the same `Arc`.
pub struct PipelineRegistry {
    components: Arc<ComponentRegistry>,
    // Lock order: `descriptors` before `cache`.
    descriptors: RwLock<HashMap<String, PipelineDescriptor>>,
    cache: DashMap<String, CacheEntry>,
    stats: DashMap<String, PipelineStatistics>,
    default_policy: ErrorPolicy,
}

impl PipelineRegistry {
    /// Creates a registry resolving steps through `components`.
    #[must_use]
    pub fn new(components: Arc<ComponentRegistry>) -> Self {
        Self {
            components,
            descriptors: RwLock::new(HashMap::new()),
            cache: DashMap::new(),
            stats: DashMap::new(),
            default_policy: ErrorPolicy::default(),
        }
    }

    /// Sets the policy used by descriptors that do not name one.
    #[must_use]
    pub fn with_default_policy(mut self, policy: ErrorPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Returns the policy used by descriptors that do not name one.
    #[must_use]
    pub fn default_policy(&self) -> ErrorPolicy {
        self.default_policy
    }

    /// Returns the component registry steps resolve through.
    #[must_use]
    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    /// Stores `descriptor` under `name`, replacing any previous one and
    /// dropping its cached chain.
    ///
    /// The stored descriptor's `name` is set to `name`. Components are not
    /// resolved here, so they may be registered afterwards.
    pub fn configure_pipeline(
        &self,
        name: impl Into<String>,
        mut descriptor: PipelineDescriptor,
    ) -> Result<(), PipelineValidationError> {
        descriptor.name = name.into();
        descriptor.validate()?;

        let name = descriptor.name.clone();
        let steps = descriptor.steps.len();
        let version = descriptor.version.clone();
        {
            let mut descriptors = self.descriptors.write();
            descriptors.insert(name.clone(), descriptor);
            self.cache.remove(&name);
        }
        info!(pipeline = %name, %version, steps, "pipeline configured");
        Ok(())
    }

    /// Returns the chain for `name`, building and caching it on first use.
    pub fn create_pipeline(&self, name: &str) -> Result<Arc<Chain>, ChainflowError> {
        if let Some(chain) = self.cached(name) {
            return Ok(chain);
        }

        let descriptor = self
            .descriptors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineNotFoundError::new(name))?;

        let chain = match self.build(&descriptor) {
            Ok(chain) => Arc::new(chain),
            Err(error) => {
                warn!(pipeline = %name, error = %error, "pipeline build failed");
                return Err(error.into());
            }
        };
        let fingerprint = descriptor.fingerprint();
        self.stats.entry(name.to_string()).or_default().builds += 1;

        // The descriptor may have been replaced while we were building; only
        // cache a chain that matches what is registered now.
        let descriptors = self.descriptors.read();
        let current = descriptors.get(name).map(PipelineDescriptor::fingerprint);
        if current.as_deref() != Some(fingerprint.as_str()) {
            debug!(pipeline = %name, "descriptor changed during build, not caching");
            return Ok(chain);
        }

        let winner = match self.cache.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                existing.get().hit_count.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&existing.get().chain))
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry {
                    chain: Arc::clone(&chain),
                    built_at: now_utc(),
                    hit_count: AtomicU64::new(0),
                    fingerprint,
                });
                None
            }
        };
        drop(descriptors);

        match winner {
            // Another caller cached first; hand out theirs so callers share one chain.
            Some(existing) => {
                self.stats.entry(name.to_string()).or_default().cache_hits += 1;
                Ok(existing)
            }
            None => {
                debug!(pipeline = %name, links = chain.len(), "pipeline built");
                Ok(chain)
            }
        }
    }

    /// Alias of [`create_pipeline`](Self::create_pipeline).
    pub fn create_chain(&self, name: &str) -> Result<Arc<Chain>, ChainflowError> {
        self.create_pipeline(name)
    }

    fn cached(&self, name: &str) -> Option<Arc<Chain>> {
        let chain = {
            let entry = self.cache.get(name)?;
            entry.hit_count.fetch_add(1, Ordering::Relaxed);
            Arc::clone(&entry.chain)
        };
        self.stats.entry(name.to_string()).or_default().cache_hits += 1;
        debug!(pipeline = %name, "pipeline cache hit");
        Some(chain)
    }

    fn build(&self, descriptor: &PipelineDescriptor) -> Result<Chain, ComponentNotFoundError> {
        let links = descriptor
            .steps
            .iter()
            .map(|step| self.resolve_step(step))
            .collect::<Result<Vec<LinkRef>, _>>()
            .map_err(|e| e.in_pipeline(&descriptor.name))?;

        let middleware = descriptor
            .middleware
            .iter()
            .map(|name| self.components.resolve_middleware(name))
            .collect::<Result<Vec<MiddlewareRef>, _>>()
            .map_err(|e| e.in_pipeline(&descriptor.name))?;

        let policy = descriptor.error_handling.unwrap_or(self.default_policy);
        let chain = Chain::named(&descriptor.name, links).with_policy(policy);
        chain.using_all(middleware);
        Ok(chain)
    }

    fn resolve_step(&self, step: &StepDescriptor) -> Result<LinkRef, ComponentNotFoundError> {
        match step {
            StepDescriptor::Component { name, params } => self.components.resolve(name, params),
            StepDescriptor::Link { name } => self.components.resolve_link(name),
        }
    }

    /// Runs the named pipeline against `ctx`.
    ///
    /// Only programmer errors (unknown pipeline, unresolvable step) return
    /// `Err`; failures inside the chain come back in
    /// [`Execution::final_ctx`].
    pub async fn execute(&self, name: &str, ctx: Context) -> Result<Execution, ChainflowError> {
        let chain = self.create_pipeline(name)?;
        let final_ctx = chain.invoke(ctx).await;

        {
            let mut stats = self.stats.entry(name.to_string()).or_default();
            stats.executions += 1;
            if final_ctx.has_error() {
                stats.failures += 1;
            }
        }

        Ok(Execution {
            response_sent: final_ctx.response_sent(),
            final_ctx,
        })
    }

    /// Returns the counters of every pipeline that has been built.
    #[must_use]
    pub fn get_statistics(&self) -> HashMap<String, PipelineStatistics> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Returns the counters of one pipeline.
    #[must_use]
    pub fn statistics(&self, name: &str) -> Option<PipelineStatistics> {
        self.stats.get(name).map(|entry| *entry)
    }

    /// Drops the cached chain for `name`. Returns true if one was cached.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.cache.remove(name).is_some();
        if removed {
            debug!(pipeline = %name, "pipeline cache invalidated");
        }
        removed
    }

    /// Forgets a pipeline entirely: descriptor, cached chain and counters.
    pub fn remove_pipeline(&self, name: &str) -> Option<PipelineDescriptor> {
        let removed = {
            let mut descriptors = self.descriptors.write();
            let removed = descriptors.remove(name);
            self.cache.remove(name);
            removed
        };
        self.stats.remove(name);
        if removed.is_some() {
            info!(pipeline = %name, "pipeline removed");
        }
        removed
    }

    /// Returns a copy of the stored descriptor.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<PipelineDescriptor> {
        self.descriptors.read().get(name).cloned()
    }

    /// Returns true if a descriptor is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.read().contains_key(name)
    }

    /// Returns the configured pipeline names, sorted.
    #[must_use]
    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Describes the cached chain for `name`, if any.
    #[must_use]
    pub fn cache_info(&self, name: &str) -> Option<CacheInfo> {
        self.cache.get(name).map(|entry| CacheInfo {
            fingerprint: entry.fingerprint.clone(),
            built_at: entry.built_at,
            hit_count: entry.hit_count.load(Ordering::Relaxed),
        })
    }
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.pipeline_names())
            .field("cached", &self.cache.len())
            .field("default_policy", &self.default_policy)
            .finish()
    }
}
