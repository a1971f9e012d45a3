//! `apphost run`

use crate::cli::RunArgs;
use crate::declaration::Declarations;
use crate::handlers;
use crate::render;
use crate::sources::{EnvSource, PromptSource};
use crate::Exit;
use anyhow::Result;
use apphost_engine::{
    ChainedSource, HandlerRegistry, Orchestrator, ParameterResolver, RunSettings,
};
use std::future::Future;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn run(args: RunArgs) -> Exit {
    let interactive = !args.non_interactive && std::io::stdin().is_terminal();
    let orchestrator = match prepare(&args.file, interactive, args.settings(), &handlers::builtin()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Exit::Invalid;
        }
    };
    let hold = if args.once {
        None
    } else {
        Some(Duration::from_millis(args.supervise_interval_ms))
    };
    execute(orchestrator, hold, ctrl_c).await
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; never interrupt.
        std::future::pending::<()>().await;
    }
}

/// Load declarations and build a validated orchestration.
///
/// Plain parameters come from `APPHOST_PARAM_*` variables, then declared
/// defaults. Secrets only come from `APPHOST_PARAM_*`. Both fall back to a
/// prompt when `interactive`.
pub fn prepare(
    file: &Path,
    interactive: bool,
    settings: RunSettings,
    handlers: &HandlerRegistry,
) -> Result<Orchestrator> {
    let (registry, defaults) = Declarations::load(file)?.into_registry()?;

    let plain = ChainedSource::new()
        .push(Arc::new(EnvSource::default()))
        .push(Arc::new(defaults));
    let mut resolver = ParameterResolver::new(registry.parameters(), Arc::new(plain))
        .with_secrets(Arc::new(EnvSource::default()));
    if interactive {
        resolver = resolver.with_fallback(Arc::new(PromptSource));
    }

    Ok(Orchestrator::new(registry, handlers, resolver, settings)?)
}

/// Start everything. With `hold`, keep the stack up until `interrupt`
/// completes or a ready resource fails, re-checking at that interval. Then
/// tear down.
pub async fn execute<F, Fut>(orchestrator: Orchestrator, hold: Option<Duration>, interrupt: F) -> Exit
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send,
{
    let run = match orchestrator.run_until(interrupt()).await {
        Ok(run) => run,
        Err(e) => {
            eprint!("{}", render::failure_report(&e.report));
            return Exit::RunFailed;
        }
    };
    eprintln!("All resources ready:");
    eprint!("{}", render::status_lines(&run.report()));

    let mut exit = Exit::Success;
    if let Some(interval) = hold {
        info!("Press Ctrl-C to stop");
        tokio::select! {
            _ = interrupt() => info!("Interrupted"),
            e = run.supervise(interval) => {
                eprint!("{}", render::failure_report(&e.report));
                exit = Exit::RunFailed;
            }
        }
    }

    match run.shutdown().await {
        Ok(_) => exit,
        Err(e) => {
            eprintln!("{e}:");
            for (name, cause) in &e.failures {
                eprintln!("  {name}: {cause}");
            }
            Exit::RunFailed
        }
    }
}
