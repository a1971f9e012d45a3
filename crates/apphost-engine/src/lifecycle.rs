//! # Lifecycle Manager
//!
//! Starts and stops individual resources through their kind's handler.
//!
//! Each resource gets one claim slot, created up front. `start` fills it
//! before delegating, so a resource is handed to its handler at most once per
//! run and teardown knows exactly which resources were delegated, including
//! ones whose start was interrupted. Only resources whose handler actually
//! received `start` are ever stopped; an attached persistent instance belongs
//! to whoever started it.

use crate::error::{BuildError, HandlerError, ResourceError};
use crate::handler::{HandlerRegistry, Outputs, ResourceHandler, StartSpec};
use crate::prober::{ReadinessPolicy, ReadinessProber};
use crate::registry::Registry;
use crate::resource::Lifetime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{info, instrument, warn};

/// How a resource reached `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Started by this run.
    Started,
    /// A persistent instance from an earlier run was reused.
    Attached,
}

struct Claim {
    handler: Arc<dyn ResourceHandler>,
    spec: OnceLock<Arc<StartSpec>>,
    launched: AtomicBool,
    stopped: AtomicBool,
}

pub struct LifecycleManager {
    claims: HashMap<String, Claim>,
}

impl LifecycleManager {
    pub fn new(registry: &Registry, handlers: &HandlerRegistry) -> Result<Self, BuildError> {
        let mut claims = HashMap::new();
        for resource in registry.resources() {
            let handler = handlers
                .get(&resource.kind)
                .ok_or_else(|| BuildError::UnknownKind {
                    kind: resource.kind.clone(),
                    resource: resource.name.clone(),
                })?;
            claims.insert(
                resource.name.clone(),
                Claim {
                    handler,
                    spec: OnceLock::new(),
                    launched: AtomicBool::new(false),
                    stopped: AtomicBool::new(false),
                },
            );
        }
        Ok(Self { claims })
    }

    pub fn handler(&self, name: &str) -> Option<&dyn ResourceHandler> {
        self.claims.get(name).map(|claim| claim.handler.as_ref())
    }

    /// Bring a resource to `Ready`: attach to a running persistent instance,
    /// or start it and wait for readiness. The policy's timeout covers the
    /// whole sequence, so a handler hanging in `find_running` or `start` times
    /// out like one that never reports ready.
    #[instrument(skip_all, fields(resource = %spec.name, kind = %spec.kind))]
    pub async fn start(
        &self,
        spec: StartSpec,
        policy: ReadinessPolicy,
    ) -> Result<StartOutcome, ResourceError> {
        let claim = self
            .claims
            .get(&spec.name)
            .ok_or_else(|| ResourceError::ResourceFailed(format!("no handler for '{}'", spec.name)))?;

        let spec = Arc::new(spec);
        if claim.spec.set(spec.clone()).is_err() {
            return Err(ResourceError::ResourceFailed(format!(
                "'{}' was already started in this run",
                spec.name
            )));
        }

        policy
            .within(async {
                if spec.lifetime == Lifetime::Persistent && claim.handler.find_running(&spec).await? {
                    info!("Attached to running instance");
                    return Ok(StartOutcome::Attached);
                }

                claim.launched.store(true, Ordering::SeqCst);
                claim.handler.start(&spec).await?;
                info!("Started, waiting for readiness");
                ReadinessProber::poll_until_ready(claim.handler.as_ref(), &spec, policy.interval).await?;
                Ok::<_, ResourceError>(StartOutcome::Started)
            })
            .await
    }

    /// The spec a resource was started with, if it was delegated this run.
    pub fn started_spec(&self, name: &str) -> Option<Arc<StartSpec>> {
        self.claims.get(name).and_then(|claim| claim.spec.get().cloned())
    }

    /// Outputs published by a resource that was started or attached this run.
    pub async fn outputs(&self, name: &str) -> Result<Outputs, HandlerError> {
        match (self.claims.get(name), self.started_spec(name)) {
            (Some(claim), Some(spec)) => claim.handler.outputs(&spec).await,
            _ => Ok(Outputs::new()),
        }
    }

    /// Stop a resource whose handler received `start`, once. Returns
    /// `Ok(false)` if it was never started, was attached, or has already been
    /// stopped.
    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> Result<bool, HandlerError> {
        let Some(claim) = self.claims.get(name) else {
            return Ok(false);
        };
        let Some(spec) = claim.spec.get() else {
            return Ok(false);
        };
        if !claim.launched.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if claim.stopped.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        match claim.handler.stop(spec).await {
            Ok(()) => {
                info!("Stopped");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Stop failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Behavior, MockHandler};
    use crate::resource::Resource;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn spec(name: &str, lifetime: Lifetime) -> StartSpec {
        StartSpec {
            name: name.into(),
            kind: "mock".into(),
            lifetime,
            config: BTreeMap::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    fn policy() -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(5),
        }
    }

    fn setup(handler: Arc<MockHandler>) -> LifecycleManager {
        let mut registry = Registry::new();
        registry.register(Resource::new("db", "mock")).unwrap();
        let handlers = HandlerRegistry::new().with("mock", handler);
        LifecycleManager::new(&registry, &handlers).unwrap()
    }

    #[tokio::test]
    async fn starts_at_most_once() {
        let handler = Arc::new(MockHandler::new());
        let lifecycle = setup(handler.clone());

        let outcome = lifecycle.start(spec("db", Lifetime::Session), policy()).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);

        let again = lifecycle.start(spec("db", Lifetime::Session), policy()).await;
        assert!(again.is_err());
        assert_eq!(handler.start_count("db"), 1);
    }

    #[tokio::test]
    async fn persistent_running_instance_is_attached() {
        let handler = Arc::new(MockHandler::new().script("db", Behavior::AlreadyRunning));
        let lifecycle = setup(handler.clone());

        let outcome = lifecycle
            .start(spec("db", Lifetime::Persistent), policy())
            .await
            .unwrap();
        assert_eq!(outcome, StartOutcome::Attached);
        assert_eq!(handler.start_count("db"), 0);
        assert_eq!(handler.probe_count("db"), 0);
    }

    #[tokio::test]
    async fn session_resource_ignores_running_instance() {
        let handler = Arc::new(MockHandler::new().script("db", Behavior::AlreadyRunning));
        let lifecycle = setup(handler.clone());

        let outcome = lifecycle.start(spec("db", Lifetime::Session), policy()).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(handler.start_count("db"), 1);
    }

    #[tokio::test]
    async fn stop_only_touches_delegated_resources() {
        let handler = Arc::new(MockHandler::new());
        let lifecycle = setup(handler.clone());

        assert!(!lifecycle.stop("db").await.unwrap());
        lifecycle.start(spec("db", Lifetime::Session), policy()).await.unwrap();
        assert!(lifecycle.stop("db").await.unwrap());
        assert!(!lifecycle.stop("db").await.unwrap());
        assert_eq!(handler.stop_count("db"), 1);
    }

    #[tokio::test]
    async fn attached_instance_is_never_stopped() {
        let handler = Arc::new(MockHandler::new().script("db", Behavior::AlreadyRunning));
        let lifecycle = setup(handler.clone());

        lifecycle
            .start(spec("db", Lifetime::Persistent), policy())
            .await
            .unwrap();
        assert!(!lifecycle.stop("db").await.unwrap());
        assert_eq!(handler.stop_count("db"), 0);
    }

    #[tokio::test]
    async fn hanging_start_times_out() {
        let handler = Arc::new(MockHandler::new().with_start_delay(Duration::from_secs(30)));
        let lifecycle = setup(handler.clone());

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            lifecycle.start(spec("db", Lifetime::Session), policy()),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert_eq!(err, ResourceError::ReadinessTimeout { timeout_secs: 0.2 });
        // The handler did receive `start`, so it is cleaned up.
        assert!(lifecycle.stop("db").await.unwrap());
    }

    #[test]
    fn unknown_kind_fails_construction() {
        let mut registry = Registry::new();
        registry.register(Resource::new("db", "postgres")).unwrap();
        let err = LifecycleManager::new(&registry, &HandlerRegistry::new())
            .err()
            .unwrap();
        assert_eq!(
            err,
            BuildError::UnknownKind {
                kind: "postgres".into(),
                resource: "db".into()
            }
        );
    }
}
