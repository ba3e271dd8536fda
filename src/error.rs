use crate::classify::ClassifiedError;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "retry.backoff_factor")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "backend_executor")
    pub source: Option<String>,
    /// Free-form diagnostic values (command name, cache key, attempt, ...)
    pub values: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.field_path.is_none()
            && self.details.is_none()
            && self.source.is_none()
            && self.values.is_empty()
    }
}

/// Unified error type for the command cache.
///
/// Every variant is cheap to clone: one settled backend failure is handed to
/// all callers that joined the same in-flight request.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{0}")]
    Classified(ClassifiedError),

    #[error("Backend error: {message}{}", format_context(.context))]
    Backend {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    #[error("Config parse error: {0}")]
    Yaml(Arc<serde_yaml::Error>),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("In-flight request for '{key}' ended without a result")]
    InFlightDropped { key: String },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    for (k, v) in &ctx.values {
        parts.push(format!("{}: {}", k, v));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Opaque failure surfaced by the backend executor.
    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn backend_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Backend {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Backend { context, .. } | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The bare message without the variant prefix, used for pattern classification.
    pub fn message(&self) -> String {
        match self {
            Error::Classified(c) => c.message.clone(),
            Error::Backend { message, .. } | Error::Configuration { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

impl From<ClassifiedError> for Error {
    fn from(err: ClassifiedError) -> Self {
        Error::Classified(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}
