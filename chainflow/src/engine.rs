//! The [`Engine`] facade.
//!
//! An engine owns one component registry, one pipeline registry and one
//! flag store. Engines are independent values: several can coexist in a
//! process, and each test can build its own.

use crate::chain::{Chain, ErrorPolicy};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::errors::{ChainflowError, PipelineValidationError};
use crate::links::LinkRef;
use crate::middleware::MiddlewareRef;
use crate::registry::{
    ComponentRegistry, Execution, FlagStore, PipelineDescriptor, PipelineRegistry, PipelineStatistics,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Components, pipelines and flags bundled behind one handle.
///
/// `Engine` is `Send + Sync`; share it across tasks behind an `Arc`.
///
/// ```
/// use chainflow::prelude::*;
/// use serde_json::Value;
///
/// # tokio_test::block_on(async {
/// let engine = Engine::new();
/// engine.register_component("inc", |_: &Value| {
///     link_fn("inc", |mut ctx| {
///         let n = ctx.get_i64("n").unwrap_or(0);
///         ctx.set("n", n + 1);
///         Ok(ctx)
///     })
/// });
/// engine
///     .configure_pipeline("p", PipelineDescriptor::new("p").component("inc", Value::Null))
///     .unwrap();
///
/// let run = engine.execute("p", Context::new().with("n", 1)).await.unwrap();
/// assert_eq!(run.final_ctx.get_i64("n"), Some(2));
/// # });
/// ```
#[derive(Debug)]
pub struct Engine {
    components: Arc<ComponentRegistry>,
    pipelines: PipelineRegistry,
    flags: FlagStore,
    environment: Option<String>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an empty engine with the `stop` default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ErrorPolicy::default())
    }

    /// Creates an empty engine whose descriptors default to `policy`.
    #[must_use]
    pub fn with_policy(policy: ErrorPolicy) -> Self {
        let components = Arc::new(ComponentRegistry::new());
        Self {
            pipelines: PipelineRegistry::new(Arc::clone(&components)).with_default_policy(policy),
            components,
            flags: FlagStore::new(),
            environment: None,
        }
    }

    /// Builds an engine seeded from `config`.
    ///
    /// Descriptors are validated and stored but not built, so the components
    /// they reference may be registered afterwards.
    pub fn from_config(config: EngineConfig) -> Result<Self, ChainflowError> {
        let mut engine = Self::with_policy(config.default_error_handling);
        engine.environment = config.resolve_environment();

        for setting in config.feature_flags {
            engine
                .flags
                .set_feature_flag(setting.name, setting.value, setting.scope.as_deref());
        }
        for (env, value) in config.environments {
            engine.flags.set_environment_config(env, value);
        }
        for descriptor in config.pipelines {
            let name = descriptor.name.clone();
            engine.pipelines.configure_pipeline(name, descriptor)?;
        }

        tracing::info!(
            environment = engine.environment.as_deref().unwrap_or("-"),
            pipelines = engine.pipelines.pipeline_names().len(),
            "engine configured"
        );
        Ok(engine)
    }

    /// Sets the active environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Returns the active environment.
    #[must_use]
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Returns the component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Returns the pipeline registry.
    #[must_use]
    pub fn pipelines(&self) -> &PipelineRegistry {
        &self.pipelines
    }

    /// Returns the flag store.
    #[must_use]
    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    /// See [`ComponentRegistry::register_component`].
    pub fn register_component<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> LinkRef + Send + Sync + 'static,
    {
        self.components.register_component(name, factory);
    }

    /// See [`ComponentRegistry::register_link`].
    pub fn register_link(&self, name: impl Into<String>, link: LinkRef) {
        self.components.register_link(name, link);
    }

    /// See [`ComponentRegistry::register_middleware`].
    pub fn register_middleware(&self, name: impl Into<String>, middleware: MiddlewareRef) {
        self.components.register_middleware(name, middleware);
    }

    /// See [`PipelineRegistry::configure_pipeline`].
    pub fn configure_pipeline(
        &self,
        name: impl Into<String>,
        descriptor: PipelineDescriptor,
    ) -> Result<(), PipelineValidationError> {
        self.pipelines.configure_pipeline(name, descriptor)
    }

    /// See [`PipelineRegistry::create_pipeline`].
    pub fn create_pipeline(&self, name: &str) -> Result<Arc<Chain>, ChainflowError> {
        self.pipelines.create_pipeline(name)
    }

    /// See [`PipelineRegistry::execute`].
    pub async fn execute(&self, name: &str, ctx: Context) -> Result<Execution, ChainflowError> {
        self.pipelines.execute(name, ctx).await
    }

    /// See [`PipelineRegistry::get_statistics`].
    #[must_use]
    pub fn get_statistics(&self) -> HashMap<String, PipelineStatistics> {
        self.pipelines.get_statistics()
    }

    /// See [`FlagStore::set_feature_flag`].
    pub fn set_feature_flag(&self, name: impl Into<String>, value: impl Into<Value>, scope: Option<&str>) {
        self.flags.set_feature_flag(name, value, scope);
    }

    /// See [`FlagStore::is_feature_enabled`].
    #[must_use]
    pub fn is_feature_enabled(&self, name: &str, scope: Option<&str>) -> bool {
        self.flags.is_feature_enabled(name, scope)
    }

    /// Checks a flag scoped to the active environment.
    #[must_use]
    pub fn feature_enabled(&self, name: &str) -> bool {
        self.flags.is_feature_enabled(name, self.environment())
    }

    /// See [`FlagStore::set_environment_config`].
    pub fn set_environment_config(&self, env: impl Into<String>, config: Value) {
        self.flags.set_environment_config(env, config);
    }

    /// See [`FlagStore::get_environment_config`].
    #[must_use]
    pub fn get_environment_config(&self, env: &str) -> Option<Value> {
        self.flags.get_environment_config(env)
    }

    /// Returns the config of the active environment.
    #[must_use]
    pub fn active_environment_config(&self) -> Option<Value> {
        self.environment().and_then(|env| self.flags.get_environment_config(env))
    }
}
