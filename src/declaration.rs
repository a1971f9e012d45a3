//! # Declaration Files
//!
//! Resources and parameters are declared in TOML. Arrays of tables keep
//! declaration order, which the graph uses to break ties.
//!
//! ```toml
//! [[parameter]]
//! name = "password"
//! secret = true
//!
//! [[resource]]
//! name = "db"
//! kind = "process"
//! lifetime = "persistent"
//! args = ["--port", "5432"]
//! env = { PGPASSWORD = { parameter = "password" } }
//!
//! [[resource.endpoint]]
//! name = "tcp"
//! target = 5432
//!
//! [[resource]]
//! name = "api"
//! kind = "process"
//! wait_for = ["db"]
//! config = { command = "./api", db_port = { resource = "db", output = "tcp.port" } }
//! ```
//!
//! A config value is a plain string (or number or bool), `{ parameter = "..." }`
//! or `{ resource = "...", output = "..." }`.

use anyhow::{Context, Result};
use apphost_engine::{
    BuildError, ConfigValue, Lifetime, Parameter, Registry, Resource, StaticValues, VolumeSource,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("Secret parameter '{0}' must not carry a value in the declaration file")]
    SecretValue(String),

    #[error("Resource '{resource}': a volume needs exactly one of `source` or `host_path`")]
    VolumeSource { resource: String },

    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declarations {
    #[serde(default, rename = "parameter")]
    pub parameters: Vec<ParameterDecl>,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDecl {
    pub name: String,
    #[serde(default)]
    pub secret: bool,
    /// Default for plain parameters. Environment variables take precedence.
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifetimeDecl {
    Session,
    Persistent,
}

impl From<LifetimeDecl> for Lifetime {
    fn from(lifetime: LifetimeDecl) -> Self {
        match lifetime {
            LifetimeDecl::Session => Lifetime::Session,
            LifetimeDecl::Persistent => Lifetime::Persistent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ValueDecl {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Parameter { parameter: String },
    Output { resource: String, output: String },
}

impl From<ValueDecl> for ConfigValue {
    fn from(value: ValueDecl) -> Self {
        match value {
            ValueDecl::Text(text) => ConfigValue::Literal(text),
            ValueDecl::Integer(n) => ConfigValue::Literal(n.to_string()),
            ValueDecl::Float(n) => ConfigValue::Literal(n.to_string()),
            ValueDecl::Bool(b) => ConfigValue::Literal(b.to_string()),
            ValueDecl::Parameter { parameter } => ConfigValue::Parameter(parameter),
            ValueDecl::Output { resource, output } => ConfigValue::Output { resource, output },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeDecl {
    /// Named volume.
    pub source: Option<String>,
    pub host_path: Option<String>,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointDecl {
    pub name: String,
    pub target: u16,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    pub name: String,
    pub kind: String,
    pub parent: Option<String>,
    pub lifetime: Option<LifetimeDecl>,
    #[serde(default)]
    pub config: BTreeMap<String, ValueDecl>,
    #[serde(default)]
    pub args: Vec<ValueDecl>,
    #[serde(default)]
    pub env: BTreeMap<String, ValueDecl>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub wait_for: Vec<String>,
    #[serde(default, rename = "volume")]
    pub volumes: Vec<VolumeDecl>,
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointDecl>,
    pub readiness_timeout_secs: Option<f64>,
    pub probe_interval_ms: Option<u64>,
}

impl ResourceDecl {
    fn into_resource(self) -> Result<Resource, DeclarationError> {
        let mut resource = Resource::new(self.name, self.kind);
        if let Some(parent) = self.parent {
            resource = resource.with_parent(parent);
        }
        if let Some(lifetime) = self.lifetime {
            resource = resource.with_lifetime(lifetime.into());
        }
        for (key, value) in self.config {
            resource = resource.with_config(key, ConfigValue::from(value));
        }
        for value in self.args {
            resource = resource.with_arg(ConfigValue::from(value));
        }
        for (key, value) in self.env {
            resource = resource.with_env(key, ConfigValue::from(value));
        }
        for name in self.references {
            resource = resource.with_reference(name);
        }
        for name in self.wait_for {
            resource = resource.wait_for(name);
        }
        for volume in self.volumes {
            let source = match (volume.source, volume.host_path) {
                (Some(name), None) => VolumeSource::Named(name),
                (None, Some(path)) => VolumeSource::HostPath(path),
                _ => {
                    return Err(DeclarationError::VolumeSource {
                        resource: resource.name,
                    })
                }
            };
            resource = resource.with_volume(source, volume.target, volume.read_only);
        }
        for endpoint in self.endpoints {
            resource = resource.with_endpoint(endpoint.name, endpoint.target, endpoint.port);
        }
        if let Some(secs) = self.readiness_timeout_secs {
            resource = resource.with_readiness_timeout(Duration::from_secs_f64(secs.max(0.0)));
        }
        if let Some(ms) = self.probe_interval_ms {
            resource = resource.with_probe_interval(Duration::from_millis(ms));
        }
        Ok(resource)
    }
}

impl Declarations {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read declarations from {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid declarations in {}", path.display()))
    }

    /// Populate a registry. Plain parameter defaults are returned separately
    /// so they can be chained behind other value sources.
    pub fn into_registry(self) -> Result<(Registry, StaticValues), DeclarationError> {
        let mut registry = Registry::new();
        let mut defaults = StaticValues::new();

        for decl in self.parameters {
            let parameter = if decl.secret {
                if decl.value.is_some() {
                    return Err(DeclarationError::SecretValue(decl.name));
                }
                Parameter::secret(&decl.name)
            } else {
                if let Some(value) = decl.value {
                    defaults.insert(&decl.name, value);
                }
                Parameter::new(&decl.name)
            };
            registry.register_parameter(parameter)?;
        }

        for decl in self.resources {
            registry.register(decl.into_resource()?)?;
        }
        Ok((registry, defaults))
    }
}
