//! Service registry
//!
//! Explicit start-up wiring: each logical service name maps to a factory
//! closure. A service is built the first time it is resolved and cached from
//! then on. Factories resolve their own dependencies through the registry.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{EngineError, EngineResult};

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&ServiceRegistry) -> EngineResult<Instance> + Send + Sync>;

/// Name-to-factory wiring, resolved lazily and cached.
///
/// Meant to be resolved during start-up. Cycle detection tracks the names
/// currently being built, so concurrent first resolutions of the same
/// service may be reported as a cycle.
#[derive(Default)]
pub struct ServiceRegistry {
    factories: HashMap<String, Factory>,
    instances: Mutex<HashMap<String, Instance>>,
    resolving: Mutex<Vec<String>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any previous one with the same name.
    pub fn register<T, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> EngineResult<T> + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move |registry| Ok(Arc::new(factory(registry)?) as Instance));
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the service registered as `name`, building it on first use.
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> EngineResult<Arc<T>> {
        let instance = match self.cached(name)? {
            Some(instance) => instance,
            None => self.build(name)?,
        };
        instance.downcast::<T>().map_err(|_| {
            EngineError::invalid_argument(format!(
                "service '{}' is not a {}",
                name,
                type_name::<T>()
            ))
        })
    }

    fn cached(&self, name: &str) -> EngineResult<Option<Instance>> {
        Ok(lock(&self.instances)?.get(name).cloned())
    }

    fn build(&self, name: &str) -> EngineResult<Instance> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EngineError::invalid_argument(format!("no service named '{}'", name)))?;

        {
            let mut resolving = lock(&self.resolving)?;
            if resolving.iter().any(|n| n == name) {
                let chain = resolving.join(" -> ");
                return Err(EngineError::invalid_argument(format!(
                    "dependency cycle: {} -> {}",
                    chain, name
                )));
            }
            resolving.push(name.to_string());
        }

        let built = factory(self);
        lock(&self.resolving)?.retain(|n| n != name);
        let built = built?;

        debug!(target: "aerodoc::service", service = name, "Built service");
        let mut instances = lock(&self.instances)?;
        Ok(Arc::clone(instances.entry(name.to_string()).or_insert(built)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> EngineResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| EngineError::invalid_argument("service registry lock poisoned"))
}
