//! # Readiness Prober
//!
//! Applies a handler's readiness criterion on a fixed interval until it says
//! ready, says failed, or the resource's timeout runs out.

use crate::error::ResourceError;
use crate::handler::{Readiness, ResourceHandler, StartSpec};
use crate::resource::ReadinessOverrides;
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_millis(250),
        }
    }
}

impl ReadinessPolicy {
    /// Run-wide defaults with a resource's own overrides applied.
    pub fn with_overrides(self, overrides: &ReadinessOverrides) -> Self {
        Self {
            timeout: overrides.timeout.unwrap_or(self.timeout),
            interval: overrides.interval.unwrap_or(self.interval),
        }
    }

    /// Run `work` under this policy's timeout. Running out of time is
    /// `ReadinessTimeout`; `work` is dropped wherever it was.
    pub async fn within<T>(
        &self,
        work: impl Future<Output = Result<T, ResourceError>>,
    ) -> Result<T, ResourceError> {
        match time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(ResourceError::ReadinessTimeout {
                timeout_secs: self.timeout.as_secs_f64(),
            }),
        }
    }
}

pub struct ReadinessProber;

impl ReadinessProber {
    /// A single check.
    pub async fn probe(handler: &dyn ResourceHandler, spec: &StartSpec) -> Readiness {
        handler.check_ready(spec).await
    }

    /// Poll until ready, bounded by the policy's timeout.
    ///
    /// A `Failed` check is `ResourceFailed`; running out of time is
    /// `ReadinessTimeout`. Checks already in flight when the deadline passes
    /// are abandoned.
    pub async fn wait_until_ready(
        handler: &dyn ResourceHandler,
        spec: &StartSpec,
        policy: ReadinessPolicy,
    ) -> Result<(), ResourceError> {
        policy
            .within(Self::poll_until_ready(handler, spec, policy.interval))
            .await
    }

    /// Poll every `interval` with no deadline of its own.
    #[instrument(skip_all, fields(resource = %spec.name))]
    pub async fn poll_until_ready(
        handler: &dyn ResourceHandler,
        spec: &StartSpec,
        interval: Duration,
    ) -> Result<(), ResourceError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match Self::probe(handler, spec).await {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(reason) => return Err(ResourceError::ResourceFailed(reason)),
                Readiness::NotReadyYet => {
                    debug!(attempts, "Not ready yet");
                    time::sleep(interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Behavior, MockHandler};
    use crate::resource::Lifetime;
    use std::collections::BTreeMap;

    fn spec(name: &str) -> StartSpec {
        StartSpec {
            name: name.into(),
            kind: "mock".into(),
            lifetime: Lifetime::Session,
            config: BTreeMap::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    fn fast() -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn polls_until_ready() {
        let handler = MockHandler::new().script("db", Behavior::ReadyAfter(3));
        let spec = spec("db");
        handler.start(&spec).await.unwrap();

        ReadinessProber::wait_until_ready(&handler, &spec, fast()).await.unwrap();
        assert_eq!(handler.probe_count("db"), 3);
    }

    #[tokio::test]
    async fn never_ready_times_out() {
        let handler = MockHandler::new().script("db", Behavior::NeverReady);
        let spec = spec("db");
        handler.start(&spec).await.unwrap();

        let err = ReadinessProber::wait_until_ready(&handler, &spec, fast())
            .await
            .unwrap_err();
        assert_eq!(err, ResourceError::ReadinessTimeout { timeout_secs: 0.2 });
    }

    #[tokio::test]
    async fn failed_check_stops_polling() {
        let handler = MockHandler::new().script("db", Behavior::FailReadiness("exited with 1".into()));
        let spec = spec("db");
        handler.start(&spec).await.unwrap();

        let err = ReadinessProber::wait_until_ready(&handler, &spec, fast())
            .await
            .unwrap_err();
        assert_eq!(err, ResourceError::ResourceFailed("exited with 1".into()));
        assert_eq!(handler.probe_count("db"), 1);
    }

    #[tokio::test]
    async fn within_bounds_any_work() {
        let err = fast()
            .within(async {
                time::sleep(Duration::from_secs(30)).await;
                Ok::<_, ResourceError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err, ResourceError::ReadinessTimeout { timeout_secs: 0.2 });
    }

    #[test]
    fn overrides_replace_defaults() {
        let policy = ReadinessPolicy::default().with_overrides(&ReadinessOverrides {
            timeout: Some(Duration::from_secs(5)),
            interval: None,
        });
        assert_eq!(policy.timeout, Duration::from_secs(5));
        assert_eq!(policy.interval, ReadinessPolicy::default().interval);
    }
}
