//! Value sources: where parameter values come from.

use crate::error::SourceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies parameter values.
///
/// `Ok(None)` means "not here"; the resolver then tries the next source or
/// reports a missing parameter. `Err` is a failure of the source itself.
#[async_trait]
pub trait ValueSource: Send + Sync {
    async fn fetch(&self, name: &str, secret: bool) -> Result<Option<String>, SourceError>;
}

/// Fixed values, e.g. from a declaration file.
#[derive(Debug, Clone, Default)]
pub struct StaticValues {
    values: HashMap<String, String>,
}

impl StaticValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}

#[async_trait]
impl ValueSource for StaticValues {
    async fn fetch(&self, name: &str, _secret: bool) -> Result<Option<String>, SourceError> {
        Ok(self.values.get(name).cloned())
    }
}

/// Tries each source in turn; the first one that has the value wins.
#[derive(Clone, Default)]
pub struct ChainedSource {
    sources: Vec<Arc<dyn ValueSource>>,
}

impl ChainedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, source: Arc<dyn ValueSource>) -> Self {
        self.sources.push(source);
        self
    }
}

#[async_trait]
impl ValueSource for ChainedSource {
    async fn fetch(&self, name: &str, secret: bool) -> Result<Option<String>, SourceError> {
        for source in &self.sources {
            if let Some(value) = source.fetch(name, secret).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
