//! Errors surfaced to callers of the admin API

use thiserror::Error;

/// Every failure a caller can see from [`super::client::AdminClient::send`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 that survived the one-time replay after a token refresh
    #[error("401 Unauthorized for {path} even after token refresh")]
    AuthExpired { path: String },

    /// The refresh exchange failed; the session has been cleared
    #[error("Session expired ({reason}). Run 'shop-admin login'.")]
    AuthIrrecoverable { reason: String },

    /// No response was received (connect failure, timeout, reset)
    #[error("Request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// Backend answered with a non-401 error status
    #[error("HTTP {status} for {path}: {message}")]
    Http {
        status: u16,
        path: String,
        message: String,
        body: String,
    },

    /// Success body did not match the expected shape
    #[error("Failed to parse response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid client configuration: {0}")]
    Configuration(String),
}

impl ApiError {
    /// Build an `Http` error, preferring the backend's JSON `message` field.
    pub fn from_status(status: u16, path: &str, body: String) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("status {}", status)
                } else {
                    body.clone()
                }
            });

        Self::Http {
            status,
            path: path.to_string(),
            message,
            body,
        }
    }

    /// HTTP status, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExpired { .. } => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
