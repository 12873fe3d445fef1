//! Error types for application contexts

use sprout_metrics::StartupError;

/// Main context error type
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Caller passed an unusable argument
    #[error("{0}")]
    InvalidArgument(&'static str),

    /// A different component already uses the name
    #[error("component name {name:?} for {type_name} conflicts with existing {existing}")]
    DuplicateComponent {
        /// Contested name
        name: String,
        /// Type being registered
        type_name: String,
        /// Type already registered under the name
        existing: String,
    },

    /// `refresh` was called on a context that already refreshed
    #[error("context does not support multiple refresh attempts: just call 'refresh' once")]
    AlreadyRefreshed,

    /// Operation on a closed context
    #[error("context has been closed already")]
    Closed,

    /// Properties marked as required are missing from the environment
    #[error("required properties not found: {0:?}")]
    MissingRequiredProperties(Vec<String>),

    /// Operation the context type does not implement
    #[error("{context} does not support {operation}")]
    Unsupported {
        /// Context type
        context: &'static str,
        /// Rejected operation
        operation: &'static str,
    },

    /// Web operation needing a servlet context that was never set
    #[error("no servlet context available")]
    NoServletContext,

    /// Component catalog could not be read
    #[error("catalog i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Component catalog could not be decoded
    #[error("catalog is malformed: {0}")]
    Catalog(#[from] serde_json::Error),

    /// Startup instrumentation rejected a step
    #[error("startup instrumentation error: {0}")]
    Startup(#[from] StartupError),
}

impl ContextError {
    /// Check if the error stems from the context's lifecycle state
    #[inline]
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::AlreadyRefreshed | Self::Closed)
    }

    /// Check if the operation is unsupported by the context type
    #[inline]
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
