//! # Resource Registry
//!
//! In-memory catalog of declared resources and parameters, keyed by name and
//! remembering declaration order. Populated once, then only read.

use crate::error::BuildError;
use crate::parameter::Parameter;
use crate::resource::{Lifetime, Resource};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    parameters: Vec<Parameter>,
    parameter_index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: Resource) -> Result<(), BuildError> {
        if self.index.contains_key(&resource.name) {
            return Err(BuildError::DuplicateName(resource.name));
        }
        self.index.insert(resource.name.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    pub fn register_parameter(&mut self, parameter: Parameter) -> Result<(), BuildError> {
        if self.parameter_index.contains_key(&parameter.name) {
            return Err(BuildError::DuplicateName(parameter.name));
        }
        self.parameter_index
            .insert(parameter.name.clone(), self.parameters.len());
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Resource, BuildError> {
        self.index
            .get(name)
            .map(|&i| &self.resources[i])
            .ok_or_else(|| BuildError::UnknownResource(name.to_string()))
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameter_index.get(name).map(|&i| &self.parameters[i])
    }

    /// Position of a resource in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Resources in declaration order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Effective lifetime: explicit, else the parent chain's, else `Session`.
    pub fn lifetime_of(&self, name: &str) -> Lifetime {
        let mut current = self.get(name).ok();
        let mut hops = 0;
        while let Some(resource) = current {
            if let Some(lifetime) = resource.lifetime {
                return lifetime;
            }
            // Parent chains are acyclic once the graph is built; the hop limit
            // only guards calls made before that.
            hops += 1;
            if hops > self.resources.len() {
                break;
            }
            current = resource
                .parent
                .as_deref()
                .and_then(|parent| self.get(parent).ok());
        }
        Lifetime::Session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = Registry::new();
        registry.register(Resource::new("db", "settle")).unwrap();
        let err = registry.register(Resource::new("db", "process")).unwrap_err();
        assert_eq!(err, BuildError::DuplicateName("db".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_unknown_resource_fails() {
        let registry = Registry::new();
        assert_eq!(
            registry.get("nope").unwrap_err(),
            BuildError::UnknownResource("nope".into())
        );
    }

    #[test]
    fn keeps_declaration_order() {
        let mut registry = Registry::new();
        for name in ["c", "a", "b"] {
            registry.register(Resource::new(name, "settle")).unwrap();
        }
        let names: Vec<_> = registry.resources().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(registry.position("a"), Some(1));
    }

    #[test]
    fn child_inherits_parent_lifetime() {
        let mut registry = Registry::new();
        registry
            .register(Resource::new("server", "process").with_lifetime(Lifetime::Persistent))
            .unwrap();
        registry
            .register(Resource::new("db", "settle").with_parent("server"))
            .unwrap();
        registry
            .register(
                Resource::new("scratch", "settle")
                    .with_parent("server")
                    .with_lifetime(Lifetime::Session),
            )
            .unwrap();

        assert_eq!(registry.lifetime_of("db"), Lifetime::Persistent);
        assert_eq!(registry.lifetime_of("scratch"), Lifetime::Session);
    }
}
