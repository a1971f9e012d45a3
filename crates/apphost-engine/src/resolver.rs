//! # Parameter Resolver
//!
//! Resolves declared parameters against value sources, once per parameter
//! per run. Plain parameters read the plain source; secret parameters only
//! ever read the secret source, and with none configured they fail closed.
//! An optional fallback (typically an interactive prompt) is asked last.

use crate::error::ResourceError;
use crate::parameter::{Parameter, ResolvedValue};
use crate::source::ValueSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, instrument};

struct Slot {
    parameter: Parameter,
    value: OnceCell<ResolvedValue>,
}

pub struct ParameterResolver {
    slots: HashMap<String, Slot>,
    plain: Arc<dyn ValueSource>,
    secrets: Option<Arc<dyn ValueSource>>,
    fallback: Option<Arc<dyn ValueSource>>,
    // Prompts from concurrent resources must not interleave.
    fallback_lock: Mutex<()>,
}

impl ParameterResolver {
    pub fn new<'a>(
        parameters: impl IntoIterator<Item = &'a Parameter>,
        plain: Arc<dyn ValueSource>,
    ) -> Self {
        let slots = parameters
            .into_iter()
            .map(|p| {
                (
                    p.name.clone(),
                    Slot {
                        parameter: p.clone(),
                        value: OnceCell::new(),
                    },
                )
            })
            .collect();
        Self {
            slots,
            plain,
            secrets: None,
            fallback: None,
            fallback_lock: Mutex::new(()),
        }
    }

    pub fn with_secrets(mut self, source: Arc<dyn ValueSource>) -> Self {
        self.secrets = Some(source);
        self
    }

    pub fn with_fallback(mut self, source: Arc<dyn ValueSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    /// Resolve `name`. Concurrent and repeated calls share one lookup.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> Result<ResolvedValue, ResourceError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| ResourceError::MissingParameter(name.to_string()))?;

        slot.value
            .get_or_try_init(|| self.lookup(&slot.parameter))
            .await
            .cloned()
    }

    /// Resolved value if already fetched; never queries a source.
    pub fn cached(&self, name: &str) -> Option<ResolvedValue> {
        self.slots.get(name).and_then(|slot| slot.value.get().cloned())
    }

    async fn lookup(&self, parameter: &Parameter) -> Result<ResolvedValue, ResourceError> {
        let name = parameter.name.as_str();
        let wrap = |source| ResourceError::Resolution {
            parameter: name.to_string(),
            source,
        };

        let primary = if parameter.secret {
            self.secrets.as_ref()
        } else {
            Some(&self.plain)
        };

        if let Some(source) = primary {
            if let Some(value) = source.fetch(name, parameter.secret).await.map_err(wrap)? {
                debug!(parameter = name, secret = parameter.secret, "Resolved");
                return Ok(ResolvedValue::new(value, parameter.secret));
            }
        }

        if let Some(fallback) = &self.fallback {
            let _guard = self.fallback_lock.lock().await;
            if let Some(value) = fallback.fetch(name, parameter.secret).await.map_err(wrap)? {
                debug!(parameter = name, secret = parameter.secret, "Resolved by fallback");
                return Ok(ResolvedValue::new(value, parameter.secret));
            }
        }

        Err(ResourceError::MissingParameter(name.to_string()))
    }
}
