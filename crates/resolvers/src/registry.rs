//! Name → resolver lookup.
//!
//! The process-wide registry is built once, on first use, from the built-in
//! resolvers and is immutable afterwards.  Tests and embedders that need a
//! different set build their own with [`ResolverRegistry::builder`].

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::{builtin, Resolver};

static BUILTIN: Lazy<Arc<ResolverRegistry>> = Lazy::new(|| {
    Arc::new(
        ResolverRegistry::builder()
            .register(builtin::OBJECT_CREATOR, builtin::ObjectCreator)
            .register(builtin::OBJECT_UPDATER, builtin::ObjectUpdater)
            .register(builtin::ORGANIZATION_ADMINS, builtin::OrganizationAdmins)
            .build(),
    )
});

/// Immutable mapping from resolver key to implementation.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    pub fn builder() -> ResolverRegistryBuilder {
        ResolverRegistryBuilder::default()
    }

    /// The shared registry holding the built-in resolvers.
    pub fn builtin() -> Arc<ResolverRegistry> {
        Arc::clone(&BUILTIN)
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.get(key.trim()).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolvers.contains_key(key.trim())
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[derive(Default)]
pub struct ResolverRegistryBuilder {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistryBuilder {
    /// Register `resolver` under `key`, replacing any earlier registration.
    pub fn register(mut self, key: impl Into<String>, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.insert(key.into(), Arc::new(resolver));
        self
    }

    pub fn register_arc(mut self, key: impl Into<String>, resolver: Arc<dyn Resolver>) -> Self {
        self.resolvers.insert(key.into(), resolver);
        self
    }

    /// Copy every registration from `registry`.
    pub fn extend(mut self, registry: &ResolverRegistry) -> Self {
        for (key, resolver) in &registry.resolvers {
            self.resolvers.insert(key.clone(), Arc::clone(resolver));
        }
        self
    }

    pub fn build(self) -> ResolverRegistry {
        ResolverRegistry {
            resolvers: self.resolvers,
        }
    }
}
