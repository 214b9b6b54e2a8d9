//! Policies of every dependency a service talks to, built once at startup.

use crate::config::DependencyPolicyConfig;
use crate::error::RegistryError;
use crate::policy::ResiliencePolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use svc_resilience_core::{Clock, SharedClock, SystemClock};
use svc_resilience_store::{InMemoryStore, SharedStateStore, SharedStore};
use tracing::info;

/// Policies keyed by dependency name.
///
/// ```
/// use svc_resilience::{DependencyPolicyConfig, PolicyRegistry};
/// use std::time::Duration;
///
/// let registry = PolicyRegistry::builder()
///     .register(DependencyPolicyConfig::builder("payments").failure_threshold(3).build()?)
///     .register(
///         DependencyPolicyConfig::builder("search")
///             .per_call_timeout(Duration::from_secs(2))
///             .base_delay(Duration::from_millis(100))
///             .build()?,
///     )
///     .build()?;
///
/// assert_eq!(registry.names().collect::<Vec<_>>(), ["payments", "search"]);
/// assert!(registry.get("payments").is_some());
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<ResiliencePolicy>>,
}

impl PolicyRegistry {
    /// Starts an empty registry builder.
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Builds a registry from a TOML document with one
    /// `[dependencies.<name>]` table per dependency. Every policy keeps its
    /// circuit in `store`.
    ///
    /// ```
    /// use svc_resilience::PolicyRegistry;
    /// use svc_resilience_store::InMemoryStore;
    /// use std::sync::Arc;
    ///
    /// let registry = PolicyRegistry::from_toml(
    ///     r#"
    ///     [dependencies.payments]
    ///     failure_threshold = 3
    ///     recovery_timeout = 10
    ///
    ///     [dependencies.search]
    ///     per_call_timeout = 2.5
    ///     base_delay = 0.1
    ///     "#,
    ///     Arc::new(InMemoryStore::new()),
    /// )?;
    /// assert_eq!(registry.policy("payments")?.config().failure_threshold, 3);
    /// # Ok::<_, svc_resilience::RegistryError>(())
    /// ```
    pub fn from_toml(document: &str, store: SharedStore) -> Result<Self, RegistryError> {
        Self::builder()
            .shared_store(store)
            .register_toml(document)?
            .build()
    }

    /// Policy of `name`, if registered.
    pub fn get(&self, name: &str) -> Option<&Arc<ResiliencePolicy>> {
        self.policies.get(name)
    }

    /// Policy of `name`, or [`RegistryError::UnknownDependency`].
    pub fn policy(&self, name: &str) -> Result<&Arc<ResiliencePolicy>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownDependency(name.to_string()))
    }

    /// Registered dependency names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Number of registered dependencies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true if no dependency is registered.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    #[serde(default)]
    dependencies: BTreeMap<String, DependencyPolicyConfig>,
}

/// Builder for a [`PolicyRegistry`].
#[derive(Default)]
pub struct PolicyRegistryBuilder {
    store: Option<SharedStore>,
    clock: Option<SharedClock>,
    configs: Vec<DependencyPolicyConfig>,
}

impl PolicyRegistryBuilder {
    /// Store shared by every policy's circuit.
    ///
    /// Default: one process-local [`InMemoryStore`].
    pub fn store<S: SharedStateStore>(self, store: S) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Like [`store`](Self::store), for an already shared store.
    pub fn shared_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Wall clock shared by every policy.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Adds a dependency. Validation happens in [`build`](Self::build).
    pub fn register(mut self, config: DependencyPolicyConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Adds every dependency of a TOML policy document. The table key names
    /// the dependency.
    pub fn register_toml(mut self, document: &str) -> Result<Self, RegistryError> {
        let document: PolicyDocument = toml::from_str(document)?;
        for (name, mut config) in document.dependencies {
            config.name = name;
            self.configs.push(config);
        }
        Ok(self)
    }

    /// Validates every configuration and builds the policies.
    pub fn build(self) -> Result<PolicyRegistry, RegistryError> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as SharedClock);
        let store = self.store.unwrap_or_else(|| {
            Arc::new(InMemoryStore::with_clock(Arc::clone(&clock))) as SharedStore
        });

        let mut policies = BTreeMap::new();
        for config in self.configs {
            let name = config.name.clone();
            if policies.contains_key(&name) {
                return Err(RegistryError::DuplicateDependency(name));
            }
            let policy = ResiliencePolicy::builder(config)
                .shared_store(Arc::clone(&store))
                .shared_clock(Arc::clone(&clock))
                .build()
                .map_err(|source| RegistryError::Config {
                    dependency: name.clone(),
                    source,
                })?;
            policies.insert(name, Arc::new(policy));
        }

        info!(dependencies = policies.len(), "policy registry built");
        Ok(PolicyRegistry { policies })
    }
}
