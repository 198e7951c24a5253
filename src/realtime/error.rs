//! Voice provider error types

use thiserror::Error;

/// Provider error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Connection, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Protocol, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn not_connected() -> Self {
        Self::new(ProviderErrorKind::NotConnected, "voice provider is not connected")
    }

    /// Classify an HTTP status from a provider REST call
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {status}: {body}");
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Self::auth(message)
        } else if status.is_server_error() {
            Self::connection(message)
        } else {
            Self::protocol(message)
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProviderError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::Http(response) => {
                let status = response.status();
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    Self::auth(format!("handshake rejected: HTTP {status}"))
                } else {
                    Self::connection(format!("handshake rejected: HTTP {status}"))
                }
            }
            other => Self::connection(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(e.to_string())
        } else {
            Self::connection(e.to_string())
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Socket or HTTP transport failure
    Connection,
    /// Unexpected or malformed provider message
    Protocol,
    /// Credentials rejected or missing
    Auth,
    /// Provider did not answer in time
    Timeout,
    /// Operation needs a live session
    NotConnected,
}

impl ProviderErrorKind {
    /// Whether a fresh `connect` could plausibly succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout | Self::NotConnected)
    }
}
