//! Capability contract and registry.
//!
//! A capability is the external unit of work a `task` or `error_handler`
//! node delegates to. The engine only looks capabilities up; it never
//! mutates them.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::error::CapabilityError;

/// Input and result shape of a capability call.
pub type CapabilityMap = Map<String, Value>;

/// An executable unit of work.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Run with the node's mapped input and return its result map.
    async fn execute(&self, input: CapabilityMap) -> Result<CapabilityMap, CapabilityError>;
}

/// Adapter turning an async closure into a [`Capability`].
pub struct FnCapability<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnCapability<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability").finish_non_exhaustive()
    }
}

/// Wrap an async closure as a [`Capability`].
pub fn capability_fn<F, Fut>(f: F) -> FnCapability<F>
where
    F: Fn(CapabilityMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CapabilityMap, CapabilityError>> + Send + 'static,
{
    FnCapability { f }
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(CapabilityMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CapabilityMap, CapabilityError>> + Send + 'static,
{
    async fn execute(&self, input: CapabilityMap) -> Result<CapabilityMap, CapabilityError> {
        (self.f)(input).await
    }
}

/// Thread-safe registry of capabilities, keyed by name.
///
/// Uses `DashMap` so hosts can register while executions are reading.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: DashMap<String, Arc<dyn Capability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        let name = name.into();
        tracing::info!(capability = %name, "registered capability");
        self.capabilities.insert(name, capability);
    }

    /// Register an async closure under `name`.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(CapabilityMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CapabilityMap, CapabilityError>> + Send + 'static,
    {
        self.register(name, Arc::new(capability_fn(f)));
    }

    /// Look up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).map(|entry| entry.value().clone())
    }

    /// Check if a capability is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Remove a capability. Returns it, if it was registered.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.remove(name).map(|(_, v)| v)
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Arc<dyn Capability> {
        Arc::new(capability_fn(|input| async move { Ok(input) }))
    }

    #[tokio::test]
    async fn closure_capability_runs() {
        let cap = echo();
        let mut input = Map::new();
        input.insert("x".into(), json!(1));
        let out = cap.execute(input.clone()).await.unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn register_and_lookup() {
        let registry = CapabilityRegistry::new();
        registry.register("echo", echo());
        registry.register_fn("fail", |_| async { Err(CapabilityError::fatal("nope")) });

        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo".to_string(), "fail".to_string()]);
    }

    #[test]
    fn register_replaces_existing() {
        let registry = CapabilityRegistry::new();
        registry.register("echo", echo());
        registry.register("echo", echo());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_returns_capability() {
        let registry = CapabilityRegistry::new();
        registry.register("echo", echo());
        assert!(registry.remove("echo").is_some());
        assert!(registry.is_empty());
    }
}
