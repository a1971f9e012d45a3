//! # Resource Declarations
//!
//! Plain data describing what to start. A [`Resource`] is assembled once,
//! handed to the [`Registry`](crate::Registry), and never mutated again.

use std::collections::BTreeMap;
use std::fmt;

/// Whether an instance outlives the run that started it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Torn down when the run ends.
    #[default]
    Session,
    /// Left running; a later run attaches to it instead of starting it again.
    Persistent,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Session => write!(f, "session"),
            Lifetime::Persistent => write!(f, "persistent"),
        }
    }
}

/// A value in a resource's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Literal(String),
    /// Filled in by the parameter resolver.
    Parameter(String),
    /// An output published by another resource once it is ready.
    Output { resource: String, output: String },
}

impl ConfigValue {
    pub fn literal(value: impl Into<String>) -> Self {
        ConfigValue::Literal(value.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        ConfigValue::Parameter(name.into())
    }

    pub fn output(resource: impl Into<String>, output: impl Into<String>) -> Self {
        ConfigValue::Output {
            resource: resource.into(),
            output: output.into(),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Literal(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Literal(value)
    }
}

/// Where a volume's data lives on the host side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    HostPath(String),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: VolumeSource,
    pub target: String,
    pub read_only: bool,
}

/// A logical port mapping: `target` inside the resource, `port` exposed outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub target: u16,
    pub port: Option<u16>,
}

impl Endpoint {
    /// The port dependents should connect to.
    pub fn exposed_port(&self) -> u16 {
        self.port.unwrap_or(self.target)
    }
}

/// A declared unit of infrastructure.
///
/// Built with the `with_*` methods before registration:
///
/// ```
/// use apphost_engine::{ConfigValue, Lifetime, Resource};
///
/// let db = Resource::new("postgres", "process")
///     .with_lifetime(Lifetime::Persistent)
///     .with_config("password", ConfigValue::parameter("password"));
/// let app = Resource::new("myapp", "process")
///     .with_reference("postgres")
///     .wait_for("postgres");
/// assert_eq!(app.wait_for, vec!["postgres".to_string()]);
/// assert_eq!(db.lifetime, Some(Lifetime::Persistent));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub kind: String,
    pub parent: Option<String>,
    pub config: BTreeMap<String, ConfigValue>,
    pub args: Vec<ConfigValue>,
    pub env: BTreeMap<String, ConfigValue>,
    pub references: Vec<String>,
    pub wait_for: Vec<String>,
    /// `None` inherits from the parent, or falls back to `Session`.
    pub lifetime: Option<Lifetime>,
    pub volumes: Vec<VolumeMount>,
    pub endpoints: Vec<Endpoint>,
    pub readiness: ReadinessOverrides,
}

/// Per-resource overrides of the run-wide readiness settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadinessOverrides {
    pub timeout: Option<std::time::Duration>,
    pub interval: Option<std::time::Duration>,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            parent: None,
            config: BTreeMap::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            references: Vec::new(),
            wait_for: Vec::new(),
            lifetime: None,
            volumes: Vec::new(),
            endpoints: Vec::new(),
            readiness: ReadinessOverrides::default(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_arg(mut self, value: impl Into<ConfigValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_reference(mut self, name: impl Into<String>) -> Self {
        self.references.push(name.into());
        self
    }

    pub fn wait_for(mut self, name: impl Into<String>) -> Self {
        self.wait_for.push(name.into());
        self
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_volume(mut self, source: VolumeSource, target: impl Into<String>, read_only: bool) -> Self {
        self.volumes.push(VolumeMount {
            source,
            target: target.into(),
            read_only,
        });
        self
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, target: u16, port: Option<u16>) -> Self {
        self.endpoints.push(Endpoint {
            name: name.into(),
            target,
            port,
        });
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.readiness.timeout = Some(timeout);
        self
    }

    pub fn with_probe_interval(mut self, interval: std::time::Duration) -> Self {
        self.readiness.interval = Some(interval);
        self
    }

    /// Every config value this resource declares: config, args, then env.
    pub fn values(&self) -> impl Iterator<Item = &ConfigValue> {
        self.config
            .values()
            .chain(self.args.iter())
            .chain(self.env.values())
    }

    /// Resources whose outputs appear in this resource's values.
    pub fn output_sources(&self) -> impl Iterator<Item = &str> {
        self.values().filter_map(|value| match value {
            ConfigValue::Output { resource, .. } => Some(resource.as_str()),
            _ => None,
        })
    }

    /// Parameters named in this resource's values.
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.values().filter_map(|value| match value {
            ConfigValue::Parameter(name) => Some(name.as_str()),
            _ => None,
        })
    }
}
