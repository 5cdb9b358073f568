//! Error types for the MAAS fleet gateway.
//!
//! [`GatewayError`] covers every way a call to the fleet controller can fail.
//! The orchestrator downgrades these to per-machine `failed` results during a
//! deployment, except while fetching the initial machine snapshot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The controller answered with a non-success HTTP status.
    #[error("MAAS API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure (DNS, refused connection, reqwest-level timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The call did not finish within the configured bound.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Missing URL or malformed API key.
    #[error("MAAS configuration error: {0}")]
    Config(String),

    #[error("invalid MAAS URL: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = GatewayError::Api {
            status: 409,
            message: "Machine cannot be deployed".into(),
        };
        assert_eq!(
            err.to_string(),
            "MAAS API error (status 409): Machine cannot be deployed"
        );
    }

    #[test]
    fn timeout_display() {
        assert_eq!(
            GatewayError::Timeout(30).to_string(),
            "request timed out after 30s"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GatewayError>();
    }
}
