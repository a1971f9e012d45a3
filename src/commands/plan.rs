//! `apphost plan`

use crate::cli::PlanArgs;
use crate::declaration::Declarations;
use crate::handlers;
use crate::render;
use crate::Exit;
use anyhow::Result;
use apphost_engine::{DependencyGraph, HandlerRegistry};
use std::path::Path;

pub fn run(args: PlanArgs) -> Exit {
    match plan(&args.file, &handlers::builtin()) {
        Ok(text) => {
            print!("{text}");
            Exit::Success
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            Exit::Invalid
        }
    }
}

/// The rendered start order, after the same validation a run does.
pub fn plan(file: &Path, handlers: &HandlerRegistry) -> Result<String> {
    let (registry, _) = Declarations::load(file)?.into_registry()?;
    handlers.check(&registry)?;
    let graph = DependencyGraph::build(&registry)?;
    Ok(render::plan(&graph))
}
