//! # AppHost CLI
//!
//! Reads a TOML declaration file, wires the built-in resource kinds and
//! parameter sources into [`apphost_engine`], and runs the orchestration.
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | every resource reached ready (and, without `--once`, the stack was torn down cleanly) |
//! | 1 | a resource failed, a ready resource crashed, or teardown failed |
//! | 2 | the declarations could not be read or did not validate (cycle, unknown name or kind, ...) |
//!
//! ## Parameters
//!
//! `APPHOST_PARAM_<NAME>` supplies any parameter. Plain parameters may also
//! carry a `value` in the file. With a terminal attached and no
//! `--non-interactive`, missing values are prompted for; secret input is hidden.

pub mod cli;
pub mod commands;
pub mod declaration;
pub mod handlers;
pub mod render;
pub mod sources;
pub mod tracing;

use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    RunFailed,
    Invalid,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Success => ExitCode::SUCCESS,
            Exit::RunFailed => ExitCode::from(1),
            Exit::Invalid => ExitCode::from(2),
        }
    }
}
