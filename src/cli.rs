use apphost_engine::{FailurePolicy, ReadinessPolicy, RunSettings};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "apphost")]
#[command(version)]
#[command(about = "Start declared resources in dependency order", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start every resource, keep them up until Ctrl-C, then tear down
    Run(RunArgs),

    /// Validate the declarations and print the start order
    Plan(PlanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Declaration file
    #[arg(short, long, env = "APPHOST_FILE", default_value = "apphost.toml")]
    pub file: PathBuf,

    /// Tear down as soon as everything is ready
    #[arg(long)]
    pub once: bool,

    /// Never prompt for missing parameters
    #[arg(long, env = "APPHOST_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Cancel everything still starting on the first failure
    #[arg(long, env = "APPHOST_FAIL_FAST")]
    pub fail_fast: bool,

    /// Readiness timeout for resources that don't set their own
    #[arg(long, env = "APPHOST_READINESS_TIMEOUT_SECS", default_value_t = 60)]
    pub readiness_timeout_secs: u64,

    /// Probe interval for resources that don't set their own
    #[arg(long, env = "APPHOST_PROBE_INTERVAL_MS", default_value_t = 250)]
    pub probe_interval_ms: u64,

    /// How often ready resources are re-checked while the stack is up
    #[arg(long, default_value_t = 2000)]
    pub supervise_interval_ms: u64,
}

impl RunArgs {
    pub fn settings(&self) -> RunSettings {
        RunSettings {
            readiness: ReadinessPolicy {
                timeout: Duration::from_secs(self.readiness_timeout_secs),
                interval: Duration::from_millis(self.probe_interval_ms),
            },
            failure_policy: if self.fail_fast {
                FailurePolicy::AbortAll
            } else {
                FailurePolicy::ContinueIndependent
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Declaration file
    #[arg(short, long, env = "APPHOST_FILE", default_value = "apphost.toml")]
    pub file: PathBuf,
}
