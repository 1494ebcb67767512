//! Language-model capability errors.

use thiserror::Error;

/// Errors returned by a language-model provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// No credentials configured for the provider
    #[error("{provider}: not configured (no API key)")]
    NotConfigured { provider: String },

    /// 401 Unauthorized - key invalid or expired
    #[error("{provider}: unauthorized (401)")]
    Unauthorized { provider: String },

    /// 403 Forbidden - key lacks required permissions
    #[error("{provider}: forbidden (403) - insufficient permissions")]
    Forbidden { provider: String },

    /// 429 Rate Limited
    #[error("{provider}: rate limited{}", .retry_after_secs.map(|s| format!(" - retry after {s}s")).unwrap_or_default())]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Network, timeout or mid-stream transport error
    #[error("{provider}: network error - {message}")]
    Network { provider: String, message: String },

    /// Other HTTP errors
    #[error("{provider}: HTTP {status} - {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// The model answered, but not in the shape the caller asked for
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

impl LlmError {
    pub fn not_configured(provider: impl Into<String>) -> Self {
        LlmError::NotConfigured {
            provider: provider.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        LlmError::Network {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        LlmError::Http {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        LlmError::InvalidOutput(message.into())
    }

    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LlmError::Unauthorized { .. } | LlmError::Forbidden { .. }
        )
    }

    /// Whether the provider client should retry the call
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Network { .. } | LlmError::RateLimited { .. } => true,
            LlmError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
