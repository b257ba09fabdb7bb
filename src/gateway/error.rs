//! Error types for the AI capability gateway

use super::Capability;
use crate::error::{CastwaveErrorTrait, ErrorCategory};
use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Requested provider id has no entry in the provider table
    #[error("provider '{0}' is not configured")]
    ProviderUnavailable(String),

    /// Provider exists but lacks the capability
    #[error("provider '{provider}' does not support {capability}")]
    CapabilityUnsupported {
        provider: String,
        capability: Capability,
    },

    /// Provider answered with a non-success status or the request could not be sent
    #[error("provider '{provider}' request failed{}: {message}", status_suffix(.status))]
    RequestFailed {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("provider '{provider}' timed out")]
    Timeout { provider: String },

    /// Response arrived but could not be used
    #[error("provider '{provider}' returned an invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl GatewayError {
    pub fn unsupported(provider: impl Into<String>, capability: Capability) -> Self {
        Self::CapabilityUnsupported {
            provider: provider.into(),
            capability,
        }
    }

    pub fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Map a transport error from `reqwest` onto the gateway taxonomy
    pub fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
            }
        } else {
            Self::RequestFailed {
                provider: provider.to_string(),
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }

    /// Build the error for a non-success HTTP response
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        Self::RequestFailed {
            provider: provider.to_string(),
            status: Some(status.as_u16()),
            message: crate::utils::truncate_text(body.trim(), 300),
        }
    }

    /// Provider that produced the error, when known
    pub fn provider(&self) -> &str {
        match self {
            Self::ProviderUnavailable(p) => p,
            Self::CapabilityUnsupported { provider, .. }
            | Self::RequestFailed { provider, .. }
            | Self::Timeout { provider }
            | Self::InvalidResponse { provider, .. } => provider,
        }
    }

    /// Whether a configured fallback provider may be tried after this error.
    ///
    /// Configuration problems are never masked by falling back.
    pub fn allows_fallback(&self) -> bool {
        !matches!(
            self,
            Self::ProviderUnavailable(_) | Self::CapabilityUnsupported { .. }
        )
    }
}

impl CastwaveErrorTrait for GatewayError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_) | Self::CapabilityUnsupported { .. } => false,
            Self::RequestFailed { status, .. } => match status {
                // Client errors other than rate limiting will not improve on retry
                Some(code) => *code == 429 || *code == 408 || *code >= 500,
                None => true,
            },
            Self::Timeout { .. } => true,
            Self::InvalidResponse { .. } => true,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderUnavailable(_) | Self::CapabilityUnsupported { .. } => {
                ErrorCategory::Config
            }
            Self::RequestFailed { .. } | Self::Timeout { .. } => ErrorCategory::Network,
            Self::InvalidResponse { .. } => ErrorCategory::Llm,
        }
    }
}
