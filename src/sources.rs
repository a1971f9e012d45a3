//! Value sources used by the CLI.
//!
//! - [`EnvSource`]: `APPHOST_PARAM_<NAME>`, used for plain and secret parameters.
//! - [`PromptSource`]: asks on the terminal, hiding input for secrets. Only
//!   installed as the fallback when the run is interactive.

use apphost_engine::{SourceError, ValueSource};
use async_trait::async_trait;
use dialoguer::{Input, Password};

pub const ENV_PREFIX: &str = "APPHOST_PARAM_";

/// Reads parameters from environment variables.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new(ENV_PREFIX)
    }
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `db-password` becomes `APPHOST_PARAM_DB_PASSWORD`.
    pub fn variable(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

#[async_trait]
impl ValueSource for EnvSource {
    async fn fetch(&self, name: &str, _secret: bool) -> Result<Option<String>, SourceError> {
        let variable = self.variable(name);
        match std::env::var(&variable) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => {
                Err(SourceError(format!("{variable} is not valid unicode")))
            }
        }
    }
}

/// Prompts for a value on the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptSource;

#[async_trait]
impl ValueSource for PromptSource {
    async fn fetch(&self, name: &str, secret: bool) -> Result<Option<String>, SourceError> {
        let prompt = format!("Value for parameter '{name}'");
        let answer = tokio::task::spawn_blocking(move || {
            if secret {
                Password::new().with_prompt(prompt).interact()
            } else {
                Input::<String>::new().with_prompt(prompt).interact_text()
            }
        })
        .await
        .map_err(|e| SourceError(format!("prompt task failed: {e}")))?;

        match answer {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(SourceError(format!("prompt failed: {e}"))),
        }
    }
}
