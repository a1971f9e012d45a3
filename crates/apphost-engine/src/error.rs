//! # Error Types
//!
//! Build-time errors abort a run before anything starts. Resource errors are
//! scoped to one resource and whatever depends on it; the scheduler collects
//! them into a [`RunError`] instead of stopping at the first one.

use crate::report::RunReport;
use thiserror::Error;

/// Errors detected while registering declarations or building the graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("Resource declared twice: {0}")]
    DuplicateName(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Unknown resource '{name}' referenced by '{referenced_by}'")]
    UnknownReference { name: String, referenced_by: String },

    #[error("Unknown parameter '{name}' referenced by '{referenced_by}'")]
    UnknownParameter { name: String, referenced_by: String },

    #[error("No handler registered for kind '{kind}' (resource '{resource}')")]
    UnknownKind { kind: String, resource: String },

    #[error("Cyclic dependency: {}", render_cycle(.cycle))]
    CyclicDependency { cycle: Vec<String> },
}

fn render_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {}", cycle.join(" -> "), first),
        None => String::new(),
    }
}

/// Failure reported by a value source.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct SourceError(pub String);

/// Failure reported by a resource-kind handler.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        HandlerError(msg)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError(err.to_string())
    }
}

/// Why a single resource ended up `Failed`.
///
/// None of these variants ever carries a parameter value, only names.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResourceError {
    #[error("Missing value for parameter '{0}'")]
    MissingParameter(String),

    #[error("Could not resolve parameter '{parameter}': {source}")]
    Resolution {
        parameter: String,
        #[source]
        source: SourceError,
    },

    #[error("Not ready after {timeout_secs}s")]
    ReadinessTimeout { timeout_secs: f64 },

    #[error("Resource failed: {0}")]
    ResourceFailed(String),

    #[error("Dependency '{dependency}' failed")]
    DependencyFailed { dependency: String },

    #[error("Resource '{resource}' does not publish output '{output}'")]
    UnresolvedOutput { resource: String, output: String },

    #[error("Cancelled")]
    Cancelled,
}

impl From<HandlerError> for ResourceError {
    fn from(err: HandlerError) -> Self {
        ResourceError::ResourceFailed(err.0)
    }
}

/// Aggregate run failure. Carries every resource's terminal state.
#[derive(Debug, Clone, Error)]
#[error("{} of {} resources failed", .report.failed().count(), .report.len())]
pub struct RunError {
    pub report: RunReport,
}

/// Resources whose handler failed to stop them during teardown.
#[derive(Debug, Clone, Error)]
#[error("{} resources failed to stop", .failures.len())]
pub struct TeardownError {
    pub failures: Vec<(String, HandlerError)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = BuildError::CyclicDependency {
            cycle: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }

    #[test]
    fn timeout_message_uses_seconds() {
        let err = ResourceError::ReadinessTimeout { timeout_secs: 1.5 };
        assert_eq!(err.to_string(), "Not ready after 1.5s");
    }
}
