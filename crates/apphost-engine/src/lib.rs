//! # AppHost Engine
//!
//! Turns a declared set of resources (data stores, brokers, services, an
//! application process) and the dependencies between them into a concurrent,
//! correctly ordered, failure-aware startup.
//!
//! The engine never provisions anything itself. Concrete kinds are plugged in
//! through [`ResourceHandler`], and parameter values come from a
//! [`ValueSource`].
//!
//! ## Architecture Overview
//!
//! ```text
//! declarations ──▶ Registry ──▶ DependencyGraph ──▶ Orchestrator
//!                                                     │
//!                       ┌─────────────────────────────┼───────────────────┐
//!                       ▼                             ▼                   ▼
//!               ParameterResolver            LifecycleManager     ReadinessProber
//!               (ValueSource)                (ResourceHandler)    (ResourceHandler)
//! ```
//!
//! 1. **[`Registry`]** holds resources and parameters, keyed by name.
//! 2. **[`DependencyGraph`]** validates names and acyclicity and fixes a
//!    deterministic topological order.
//! 3. **[`Orchestrator`]** launches one task per resource as soon as its
//!    `WaitFor` dependencies are ready and aggregates the outcome into a
//!    [`RunReport`].
//!
//! ## Edges
//!
//! - **`WaitFor`**: the dependent does not start until the dependency is `Ready`.
//!   Declared with [`Resource::wait_for`] or implied by a parent.
//! - **`ReferenceOnly`**: the dependent may start concurrently. Reading one of
//!   the dependency's outputs suspends until the dependency is `Ready`.
//!
//! ## Example
//!
//! ```rust
//! use apphost_engine::mock::MockHandler;
//! use apphost_engine::{
//!     ConfigValue, HandlerRegistry, Orchestrator, ParameterResolver, Registry, Resource,
//!     RunSettings, StaticValues,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = Registry::new();
//!     registry.register(Resource::new("db", "mock")).unwrap();
//!     registry
//!         .register(
//!             Resource::new("api", "mock")
//!                 .wait_for("db")
//!                 .with_config("db_port", ConfigValue::output("db", "port")),
//!         )
//!         .unwrap();
//!
//!     let handler = Arc::new(MockHandler::new().with_output("db", "port", "5432"));
//!     let handlers = HandlerRegistry::new().with("mock", handler.clone());
//!     let resolver = ParameterResolver::new(registry.parameters(), Arc::new(StaticValues::new()));
//!
//!     let run = Orchestrator::new(registry, &handlers, resolver, RunSettings::default())
//!         .unwrap()
//!         .run()
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(handler.started_with("api").unwrap().config_str("db_port"), Some("5432"));
//!     run.shutdown().await.unwrap();
//! }
//! ```
//!
//! ## Testing
//!
//! The [`mock`] module provides scripted handlers and value sources that
//! record every call, so orderings and call counts can be asserted on.

pub mod board;
pub mod error;
pub mod graph;
pub mod handler;
pub mod lifecycle;
pub mod mock;
pub mod parameter;
pub mod prober;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod resource;
pub mod scheduler;
pub mod source;

pub use board::{Snapshot, StateBoard};
pub use error::{
    BuildError, HandlerError, ResourceError, RunError, SourceError, TeardownError,
};
pub use graph::{DependencyEdge, DependencyGraph, EdgeStrength};
pub use handler::{HandlerRegistry, Outputs, Readiness, ResourceHandler, StartSpec};
pub use lifecycle::{LifecycleManager, StartOutcome};
pub use parameter::{Parameter, ResolvedValue};
pub use prober::{ReadinessPolicy, ReadinessProber};
pub use registry::Registry;
pub use report::{ReportEntry, RunReport, RunState};
pub use resolver::ParameterResolver;
pub use resource::{ConfigValue, Endpoint, Lifetime, Resource, VolumeMount, VolumeSource};
pub use scheduler::{FailurePolicy, Orchestrator, RunHandle, RunSettings};
pub use source::{ChainedSource, StaticValues, ValueSource};
