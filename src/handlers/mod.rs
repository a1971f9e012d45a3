//! Resource kinds shipped with the CLI.

pub mod process;
pub mod settle;

use apphost_engine::HandlerRegistry;
use std::sync::Arc;

pub use process::ProcessHandler;
pub use settle::SettleHandler;

/// `process` and `settle`.
pub fn builtin() -> HandlerRegistry {
    HandlerRegistry::new()
        .with("process", Arc::new(ProcessHandler::new()))
        .with("settle", Arc::new(SettleHandler::new()))
}
