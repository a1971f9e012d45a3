//! # Resource-Kind Handlers
//!
//! The engine never provisions anything itself. For every kind tag a
//! [`ResourceHandler`] does the real work: start, stop, report readiness, and
//! publish outputs for dependents.

use crate::error::{BuildError, HandlerError};
use crate::parameter::ResolvedValue;
use crate::registry::Registry;
use crate::resource::{Endpoint, Lifetime, VolumeMount};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Named values a ready resource publishes, e.g. `connection_string`.
pub type Outputs = BTreeMap<String, ResolvedValue>;

/// Result of one readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReadyYet,
    Failed(String),
}

/// Everything a handler needs to start one resource, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StartSpec {
    pub name: String,
    pub kind: String,
    pub lifetime: Lifetime,
    pub config: BTreeMap<String, ResolvedValue>,
    pub args: Vec<ResolvedValue>,
    pub env: BTreeMap<String, ResolvedValue>,
    pub volumes: Vec<VolumeMount>,
    pub endpoints: Vec<Endpoint>,
}

impl StartSpec {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(ResolvedValue::expose)
    }
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Whether an instance from an earlier run is still up. Only asked for
    /// `Persistent` resources; a `true` skips `start` and readiness polling.
    async fn find_running(&self, _spec: &StartSpec) -> Result<bool, HandlerError> {
        Ok(false)
    }

    async fn start(&self, spec: &StartSpec) -> Result<(), HandlerError>;

    /// One readiness check. The prober calls this repeatedly.
    async fn check_ready(&self, spec: &StartSpec) -> Readiness;

    /// Values published once the resource is ready.
    async fn outputs(&self, _spec: &StartSpec) -> Result<Outputs, HandlerError> {
        Ok(Outputs::new())
    }

    /// Must tolerate being called for a resource whose `start` was interrupted.
    async fn stop(&self, spec: &StartSpec) -> Result<(), HandlerError>;
}

/// Maps kind tags to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn ResourceHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn with(mut self, kind: impl Into<String>, handler: Arc<dyn ResourceHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Every registered resource must have a handler for its kind.
    pub fn check(&self, registry: &Registry) -> Result<(), BuildError> {
        for resource in registry.resources() {
            if !self.handlers.contains_key(&resource.kind) {
                return Err(BuildError::UnknownKind {
                    kind: resource.kind.clone(),
                    resource: resource.name.clone(),
                });
            }
        }
        Ok(())
    }
}
