//! `process`: a local command.
//!
//! Config keys: `command` (required), `working_dir`, `ready_pattern`. Args and
//! env come from the resource's `args` and `env`.
//!
//! Readiness, first match wins:
//! 1. the first endpoint's exposed port accepts a TCP connection,
//! 2. a stdout line contains `ready_pattern`,
//! 3. otherwise ready as soon as it is spawned.
//!
//! Exiting before any of that is a failure. A persistent process whose
//! endpoint already accepts connections is attached rather than spawned, and
//! persistent processes are not killed when the CLI exits. Their output goes
//! to the null device since nothing reads it once the CLI is gone, so they
//! cannot use `ready_pattern`. An attached instance stays ready while its
//! endpoint accepts connections.

use apphost_engine::{
    HandlerError, Lifetime, Outputs, Readiness, ResolvedValue, ResourceHandler, StartSpec,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const HOST: &str = "localhost";

struct Spawned {
    child: Child,
    pattern_seen: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct ProcessHandler {
    children: Mutex<HashMap<String, Spawned>>,
}

impl ProcessHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn accepts_connections(port: u16) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((HOST, port))).await,
        Ok(Ok(_))
    )
}

fn probe_port(spec: &StartSpec) -> Option<u16> {
    spec.endpoints.first().map(|endpoint| endpoint.exposed_port())
}

#[async_trait]
impl ResourceHandler for ProcessHandler {
    async fn find_running(&self, spec: &StartSpec) -> Result<bool, HandlerError> {
        Ok(match probe_port(spec) {
            Some(port) => accepts_connections(port).await,
            None => false,
        })
    }

    async fn start(&self, spec: &StartSpec) -> Result<(), HandlerError> {
        let program = spec
            .config_str("command")
            .ok_or_else(|| HandlerError("missing `command` in config".into()))?;

        let persistent = spec.lifetime == Lifetime::Persistent;
        let pattern = spec.config_str("ready_pattern").map(str::to_string);
        if persistent && pattern.is_some() {
            return Err(HandlerError(
                "`ready_pattern` is not supported on persistent processes; declare an endpoint".into(),
            ));
        }

        let mut command = Command::new(program);
        command
            .args(spec.args.iter().map(ResolvedValue::expose))
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.expose())))
            .stdin(Stdio::null())
            .kill_on_drop(!persistent);
        if persistent {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        } else {
            command.stdout(Stdio::piped());
        }
        if let Some(dir) = spec.config_str("working_dir") {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| HandlerError(format!("failed to spawn '{program}': {e}")))?;
        info!(resource = %spec.name, pid = child.id(), "Spawned");

        let pattern_seen = Arc::new(AtomicBool::new(false));
        if let Some(stdout) = child.stdout.take() {
            let seen = pattern_seen.clone();
            let name = spec.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(resource = %name, "{line}");
                    if pattern.as_deref().is_some_and(|p| line.contains(p)) {
                        seen.store(true, Ordering::SeqCst);
                    }
                }
            });
        }

        self.children.lock().await.insert(
            spec.name.clone(),
            Spawned {
                child,
                pattern_seen,
            },
        );
        Ok(())
    }

    async fn check_ready(&self, spec: &StartSpec) -> Readiness {
        let spawned_here = {
            let mut children = self.children.lock().await;
            match children.get_mut(&spec.name) {
                Some(spawned) => {
                    match spawned.child.try_wait() {
                        Ok(Some(status)) => return Readiness::Failed(format!("exited early ({status})")),
                        Ok(None) => {}
                        Err(e) => return Readiness::Failed(e.to_string()),
                    }
                    if probe_port(spec).is_none() {
                        return match spec.config_str("ready_pattern") {
                            Some(_) if !spawned.pattern_seen.load(Ordering::SeqCst) => {
                                Readiness::NotReadyYet
                            }
                            _ => Readiness::Ready,
                        };
                    }
                    true
                }
                None => false,
            }
        };

        match probe_port(spec) {
            Some(port) if accepts_connections(port).await => Readiness::Ready,
            Some(_) if spawned_here => Readiness::NotReadyYet,
            Some(port) => Readiness::Failed(format!("attached instance no longer accepts connections on port {port}")),
            None => Readiness::Failed("not started".into()),
        }
    }

    async fn outputs(&self, spec: &StartSpec) -> Result<Outputs, HandlerError> {
        let mut outputs = Outputs::new();
        for endpoint in &spec.endpoints {
            let port = endpoint.exposed_port();
            let plain = |value: String| ResolvedValue::new(value, false);
            outputs.insert(format!("{}.host", endpoint.name), plain(HOST.to_string()));
            outputs.insert(format!("{}.port", endpoint.name), plain(port.to_string()));
            outputs.insert(
                format!("{}.url", endpoint.name),
                plain(format!("http://{HOST}:{port}")),
            );
        }
        Ok(outputs)
    }

    async fn stop(&self, spec: &StartSpec) -> Result<(), HandlerError> {
        let Some(mut spawned) = self.children.lock().await.remove(&spec.name) else {
            return Ok(());
        };
        if let Ok(Some(status)) = spawned.child.try_wait() {
            debug!(resource = %spec.name, %status, "Already exited");
            return Ok(());
        }
        if let Err(e) = spawned.child.kill().await {
            warn!(resource = %spec.name, error = %e, "Kill failed");
            return Err(e.into());
        }
        Ok(())
    }
}
