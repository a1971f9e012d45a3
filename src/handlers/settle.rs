//! `settle`: ready a fixed delay after start.
//!
//! Useful for stand-in resources and for anything whose only readiness signal
//! is "give it a moment". The resource's config is published as its outputs.

use apphost_engine::{HandlerError, Outputs, Readiness, ResourceHandler, StartSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Default)]
pub struct SettleHandler {
    started: Mutex<HashMap<String, Instant>>,
}

impl SettleHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

fn settle_delay(spec: &StartSpec) -> Result<Duration, HandlerError> {
    match spec.config_str("settle_ms") {
        None => Ok(Duration::ZERO),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| HandlerError(format!("settle_ms must be a whole number, got '{raw}'"))),
    }
}

#[async_trait]
impl ResourceHandler for SettleHandler {
    async fn start(&self, spec: &StartSpec) -> Result<(), HandlerError> {
        settle_delay(spec)?;
        self.started
            .lock()
            .await
            .insert(spec.name.clone(), Instant::now());
        Ok(())
    }

    async fn check_ready(&self, spec: &StartSpec) -> Readiness {
        let delay = match settle_delay(spec) {
            Ok(delay) => delay,
            Err(e) => return Readiness::Failed(e.0),
        };
        match self.started.lock().await.get(&spec.name) {
            Some(at) if at.elapsed() >= delay => Readiness::Ready,
            Some(_) => Readiness::NotReadyYet,
            None => Readiness::Failed("not started".into()),
        }
    }

    async fn outputs(&self, spec: &StartSpec) -> Result<Outputs, HandlerError> {
        Ok(spec
            .config
            .iter()
            .filter(|(key, _)| key.as_str() != "settle_ms")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn stop(&self, spec: &StartSpec) -> Result<(), HandlerError> {
        self.started.lock().await.remove(&spec.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apphost_engine::{Lifetime, ResolvedValue};
    use std::collections::BTreeMap;

    fn spec(settle_ms: &str) -> StartSpec {
        let mut config = BTreeMap::new();
        config.insert("settle_ms".to_string(), ResolvedValue::new(settle_ms, false));
        config.insert("password".to_string(), ResolvedValue::new("s3cret", true));
        StartSpec {
            name: "cache".into(),
            kind: "settle".into(),
            lifetime: Lifetime::Session,
            config,
            args: Vec::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    #[tokio::test]
    async fn ready_after_delay() {
        let handler = SettleHandler::new();
        let spec = spec("200");
        handler.start(&spec).await.unwrap();
        assert_eq!(handler.check_ready(&spec).await, Readiness::NotReadyYet);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(handler.check_ready(&spec).await, Readiness::Ready);
    }

    #[tokio::test]
    async fn invalid_delay_fails_start() {
        let handler = SettleHandler::new();
        assert!(handler.start(&spec("soon")).await.is_err());
    }

    #[tokio::test]
    async fn outputs_keep_secrecy() {
        let handler = SettleHandler::new();
        let outputs = handler.outputs(&spec("0")).await.unwrap();
        assert!(outputs["password"].is_secret());
        assert!(!outputs.contains_key("settle_ms"));
    }
}
