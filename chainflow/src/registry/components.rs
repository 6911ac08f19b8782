//! Component registry: named link factories, links and middleware.

use crate::errors::ComponentNotFoundError;
use crate::links::LinkRef;
use crate::middleware::MiddlewareRef;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Factory that builds a link from descriptor parameters.
pub type ComponentFactory = Arc<dyn Fn(&Value) -> LinkRef + Send + Sync>;

/// Registry of everything a pipeline descriptor can reference by name.
///
/// Re-registering a name overwrites the previous entry. Chains that were
/// already built keep the links they were built with.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: RwLock<HashMap<String, ComponentFactory>>,
    links: RwLock<HashMap<String, LinkRef>>,
    middleware: RwLock<HashMap<String, MiddlewareRef>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parametrized link factory.
    ///
    /// ```
    /// use chainflow::links::link_fn;
    /// use chainflow::registry::ComponentRegistry;
    /// use serde_json::json;
    ///
    /// let registry = ComponentRegistry::new();
    /// registry.register_component("add", |params| {
    ///     let delta = params["delta"].as_i64().unwrap_or(1);
    ///     link_fn("add", move |mut ctx| {
    ///         let n = ctx.get_i64("n").unwrap_or(0);
    ///         ctx.set("n", n + delta);
    ///         Ok(ctx)
    ///     })
    /// });
    /// assert!(registry.resolve("add", &json!({"delta": 5})).is_ok());
    /// ```
    pub fn register_component<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> LinkRef + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.write().insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::debug!(component = %name, "component re-registered");
        }
    }

    /// Builds a link from the named factory.
    pub fn resolve(&self, name: &str, params: &Value) -> Result<LinkRef, ComponentNotFoundError> {
        // Clone the factory out so user code never runs under the lock.
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ComponentNotFoundError::component(name))?;
        Ok(factory(params))
    }

    /// Registers a ready-made link.
    pub fn register_link(&self, name: impl Into<String>, link: LinkRef) {
        let name = name.into();
        if self.links.write().insert(name.clone(), link).is_some() {
            tracing::debug!(link = %name, "link re-registered");
        }
    }

    /// Looks up a named link.
    pub fn resolve_link(&self, name: &str) -> Result<LinkRef, ComponentNotFoundError> {
        self.links
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ComponentNotFoundError::link(name))
    }

    /// Registers a named middleware.
    pub fn register_middleware(&self, name: impl Into<String>, middleware: MiddlewareRef) {
        let name = name.into();
        if self.middleware.write().insert(name.clone(), middleware).is_some() {
            tracing::debug!(middleware = %name, "middleware re-registered");
        }
    }

    /// Looks up a named middleware.
    pub fn resolve_middleware(&self, name: &str) -> Result<MiddlewareRef, ComponentNotFoundError> {
        self.middleware
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ComponentNotFoundError::middleware(name))
    }

    /// Returns true if a component factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Returns the registered component names, sorted.
    #[must_use]
    pub fn component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.component_names())
            .field("links", &self.links.read().len())
            .field("middleware", &self.middleware.read().len())
            .finish()
    }
}
