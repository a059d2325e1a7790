//! Model client port
//!
//! The optimizer talks to two language models through this trait: the task
//! model that executes candidate instructions, and the reflection model that
//! rewrites them. Both are "submit text, receive text".

use async_trait::async_trait;

/// Error types for model calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Request timeout after {0}s")]
    Timeout(u64),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether the call may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimitExceeded(_) | Self::Timeout(_) | Self::Network(_) | Self::Unavailable(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured(_) | Self::Auth(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Port trait for text generation backends
///
/// Implementations must be `Send + Sync`; the run controller shares one
/// client across all iteration workers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier used in logs, e.g. the model name
    fn model_id(&self) -> &str;

    /// Generate a completion for `input` under the system-level `prompt`.
    ///
    /// # Errors
    /// - `ModelError::Timeout` - call exceeded its deadline
    /// - `ModelError::RateLimitExceeded` - caller may retry
    /// - `ModelError::Api` - non-success response from the backend
    async fn generate(&self, prompt: &str, input: &str) -> Result<String, ModelError>;
}
