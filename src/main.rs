use apphost::cli::{Cli, Command};
use apphost::commands;
use apphost::tracing::setup_tracing;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let exit = match cli.command {
        Command::Run(args) => commands::run::run(args).await,
        Command::Plan(args) => commands::plan::run(args),
    };
    exit.into()
}
