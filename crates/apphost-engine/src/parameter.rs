//! Named configuration values and the wrapper that keeps secrets out of logs.

use std::fmt;
use std::sync::Arc;

/// A declared parameter. Its value is fetched lazily by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub secret: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: false,
        }
    }

    pub fn secret(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: true,
        }
    }
}

/// A resolved value: a parameter, a literal from config, or a published
/// output. Secret values print as `[redacted]`.
///
/// Call [`ResolvedValue::expose`] only at the point where the plaintext is
/// handed to the thing that needs it.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    Plain(Arc<str>),
    Secret(Arc<str>),
}

impl ResolvedValue {
    pub fn new(value: impl Into<Arc<str>>, secret: bool) -> Self {
        if secret {
            ResolvedValue::Secret(value.into())
        } else {
            ResolvedValue::Plain(value.into())
        }
    }

    pub fn expose(&self) -> &str {
        match self {
            ResolvedValue::Plain(v) | ResolvedValue::Secret(v) => v,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, ResolvedValue::Secret(_))
    }
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Plain(v) => f.debug_tuple("Plain").field(v).finish(),
            ResolvedValue::Secret(_) => f.write_str("Secret([redacted])"),
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Plain(v) => f.write_str(v),
            ResolvedValue::Secret(_) => f.write_str("[redacted]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_values_never_format() {
        let value = ResolvedValue::new("hunter2", true);
        assert_eq!(value.to_string(), "[redacted]");
        assert!(!format!("{value:?}").contains("hunter2"));
        assert_eq!(value.expose(), "hunter2");
    }

    #[test]
    fn plain_values_format_as_is() {
        let value = ResolvedValue::new("admin", false);
        assert_eq!(value.to_string(), "admin");
        assert!(!value.is_secret());
    }
}
