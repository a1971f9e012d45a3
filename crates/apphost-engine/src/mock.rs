//! # Scripted Collaborators for Tests
//!
//! [`MockHandler`] and [`MockValueSource`] stand in for real resource-kind
//! handlers and value sources. They run entirely in memory, follow a script
//! per resource or parameter, and record every call so tests can assert on
//! ordering and call counts.
//!
//! ## Scripting a handler
//!
//! ```rust
//! use apphost_engine::mock::{Behavior, MockHandler};
//!
//! let handler = MockHandler::new()
//!     .script("db", Behavior::ReadyAfter(3))
//!     .script("cache", Behavior::NeverReady)
//!     .with_output("db", "port", "5432");
//! # let _ = handler;
//! ```
//!
//! Resources without a script become ready on the first probe.
//!
//! ## Cross-run state
//!
//! A `MockHandler` remembers which resources it has started and not yet
//! stopped. Sharing one handler between two orchestrations therefore models a
//! persistent instance surviving from the first run into the second.

use crate::error::{HandlerError, SourceError};
use crate::handler::{Outputs, Readiness, ResourceHandler, StartSpec};
use crate::parameter::ResolvedValue;
use crate::source::ValueSource;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How a scripted resource behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// Ready on the n-th readiness check.
    ReadyAfter(u32),
    /// `start` itself fails.
    FailStart(String),
    /// Every readiness check reports `Failed`.
    FailReadiness(String),
    /// Never becomes ready.
    NeverReady,
    /// An instance is already running; `find_running` says so.
    AlreadyRunning,
    /// `start` panics, like a buggy handler.
    PanicOnStart(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    FindRunning,
    Start,
    Probe,
    Stop,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub resource: String,
    pub kind: CallKind,
    pub at: Instant,
}

#[derive(Default)]
pub struct MockHandler {
    scripts: HashMap<String, Behavior>,
    outputs: HashMap<String, BTreeMap<String, String>>,
    start_delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
    running: Mutex<HashSet<String>>,
    crashed: Mutex<HashSet<String>>,
    specs: Mutex<HashMap<String, StartSpec>>,
}

impl MockHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, resource: impl Into<String>, behavior: Behavior) -> Self {
        self.scripts.insert(resource.into(), behavior);
        self
    }

    /// Publish `key = value` once `resource` is ready.
    pub fn with_output(
        mut self,
        resource: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.outputs
            .entry(resource.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Make every `start` take this long.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// From now on every readiness check for `resource` reports `Failed`.
    pub fn crash(&self, resource: &str) {
        lock(&self.crashed).insert(resource.to_string());
    }

    pub fn is_running(&self, resource: &str) -> bool {
        lock(&self.running).contains(resource)
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// When the first call of `kind` for `resource` was made.
    pub fn first_call(&self, resource: &str, kind: CallKind) -> Option<Instant> {
        lock(&self.calls)
            .iter()
            .find(|c| c.resource == resource && c.kind == kind)
            .map(|c| c.at)
    }

    pub fn start_count(&self, resource: &str) -> usize {
        self.count(resource, CallKind::Start)
    }

    pub fn probe_count(&self, resource: &str) -> usize {
        self.count(resource, CallKind::Probe)
    }

    pub fn stop_count(&self, resource: &str) -> usize {
        self.count(resource, CallKind::Stop)
    }

    /// The `StartSpec` that `resource` was last started with.
    pub fn started_with(&self, resource: &str) -> Option<StartSpec> {
        lock(&self.specs).get(resource).cloned()
    }

    fn count(&self, resource: &str, kind: CallKind) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.resource == resource && c.kind == kind)
            .count()
    }

    fn record(&self, resource: &str, kind: CallKind) {
        lock(&self.calls).push(Call {
            resource: resource.to_string(),
            kind,
            at: Instant::now(),
        });
    }

    fn behavior(&self, resource: &str) -> Behavior {
        self.scripts
            .get(resource)
            .cloned()
            .unwrap_or(Behavior::ReadyAfter(1))
    }
}

#[async_trait]
impl ResourceHandler for MockHandler {
    async fn find_running(&self, spec: &StartSpec) -> Result<bool, HandlerError> {
        self.record(&spec.name, CallKind::FindRunning);
        Ok(self.behavior(&spec.name) == Behavior::AlreadyRunning || self.is_running(&spec.name))
    }

    async fn start(&self, spec: &StartSpec) -> Result<(), HandlerError> {
        self.record(&spec.name, CallKind::Start);
        lock(&self.specs).insert(spec.name.clone(), spec.clone());
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        match self.behavior(&spec.name) {
            Behavior::FailStart(reason) => return Err(HandlerError(reason)),
            Behavior::PanicOnStart(message) => panic!("{message}"),
            _ => {}
        }
        lock(&self.running).insert(spec.name.clone());
        Ok(())
    }

    async fn check_ready(&self, spec: &StartSpec) -> Readiness {
        self.record(&spec.name, CallKind::Probe);
        if lock(&self.crashed).contains(&spec.name) {
            return Readiness::Failed("crashed".into());
        }
        match self.behavior(&spec.name) {
            Behavior::ReadyAfter(n) => {
                if self.probe_count(&spec.name) >= n as usize {
                    Readiness::Ready
                } else {
                    Readiness::NotReadyYet
                }
            }
            Behavior::FailReadiness(reason) => Readiness::Failed(reason),
            Behavior::NeverReady => Readiness::NotReadyYet,
            Behavior::AlreadyRunning | Behavior::FailStart(_) | Behavior::PanicOnStart(_) => {
                Readiness::Ready
            }
        }
    }

    async fn outputs(&self, spec: &StartSpec) -> Result<Outputs, HandlerError> {
        Ok(self
            .outputs
            .get(&spec.name)
            .map(|values| {
                values
                    .iter()
                    .map(|(k, v)| (k.clone(), ResolvedValue::new(v.as_str(), false)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn stop(&self, spec: &StartSpec) -> Result<(), HandlerError> {
        self.record(&spec.name, CallKind::Stop);
        lock(&self.running).remove(&spec.name);
        Ok(())
    }
}

/// In-memory value source that counts how often each name is queried.
#[derive(Default)]
pub struct MockValueSource {
    values: HashMap<String, String>,
    failure: Option<String>,
    delay: Option<Duration>,
    queries: Mutex<HashMap<String, usize>>,
}

impl MockValueSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Every fetch fails with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self, name: &str) -> usize {
        lock(&self.queries).get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ValueSource for MockValueSource {
    async fn fetch(&self, name: &str, _secret: bool) -> Result<Option<String>, SourceError> {
        *lock(&self.queries).entry(name.to_string()).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(SourceError(reason.clone()));
        }
        Ok(self.values.get(name).cloned())
    }
}
