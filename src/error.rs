use std::fmt;
use thiserror::Error;

/// Error taxonomy for the scraper generation pipeline.
///
/// Only configuration-class errors are meant to cross the orchestrator
/// boundary; everything else is resolved into a structured result by the
/// component that observed it.
#[derive(Error, Debug, Clone)]
pub enum ForgeError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid configuration file {path}: {message}")]
    InvalidConfig { path: String, message: String },

    #[error("Template configuration error in '{template}': {message}")]
    TemplateConfiguration { template: String, message: String },

    // Input errors
    #[error("Invalid domain: {domain}")]
    InvalidDomain { domain: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Batch of {requested} domains exceeds the limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },

    // Network errors
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    #[error("Response from {url} exceeded {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },

    #[error("Too many redirects: {url}")]
    TooManyRedirects { url: String },

    // Browser errors
    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Invalid selector: {selector}")]
    InvalidSelector { selector: String },

    // System errors
    #[error("File system error at {path}: {message}")]
    FileSystem { path: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid pipeline transition: {from} -> {to}")]
    InvalidState { from: String, to: String },
}

impl ForgeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a template configuration error
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateConfiguration {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a browser error
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser { message: message.into() }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this error signals a packaging or programmer defect that must
    /// propagate instead of being folded into a per-domain result.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::InvalidConfig { .. } | Self::TemplateConfiguration { .. }
        )
    }

    /// Get error category for logging and audit
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::InvalidConfig { .. } => "configuration",
            Self::TemplateConfiguration { .. } => "template",
            Self::InvalidDomain { .. } | Self::InvalidInput { .. } | Self::BatchTooLarge { .. } => "input",
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::ResponseTooLarge { .. }
            | Self::TooManyRedirects { .. } => "network",
            Self::Browser { .. } | Self::InvalidSelector { .. } => "browser",
            Self::FileSystem { .. } | Self::Serialization { .. } => "system",
            Self::Internal { .. } | Self::Cancelled | Self::InvalidState { .. } => "internal",
        }
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { message: err.to_string() }
    }
}

/// Result type alias for the crate
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

/// Error context for enhanced debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub operation: String,
    pub component: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: Option<String>,
    pub additional_data: std::collections::BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            component: component.into(),
            timestamp: chrono::Utc::now(),
            request_id: None,
            additional_data: std::collections::BTreeMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }
}

/// Error paired with the component and operation that observed it
#[derive(Debug)]
pub struct ContextualError {
    pub error: ForgeError,
    pub context: ErrorContext,
}

impl ContextualError {
    pub fn new(error: ForgeError, context: ErrorContext) -> Self {
        Self { error, context }
    }
}

impl fmt::Display for ContextualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}::{}", self.error, self.context.component, self.context.operation)?;

        if !self.context.additional_data.is_empty() {
            let pairs: Vec<String> = self
                .context
                .additional_data
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " ({})", pairs.join(", "))?;
        }

        if let Some(request_id) = &self.context.request_id {
            write!(f, " [run: {}]", request_id)?;
        }

        Ok(())
    }
}

impl std::error::Error for ContextualError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
