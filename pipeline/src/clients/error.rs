//! Model client error types

use thiserror::Error;

/// Errors from the embedding and reasoning services
#[derive(Error, Debug)]
pub enum ClientError {
    /// Client construction failed
    #[error("Client configuration error: {0}")]
    Config(String),

    /// Transport-level failure (timeout, connection reset)
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status from the service
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Whether the failure is worth retrying at the stage level.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        assert!(
            ClientError::Status {
                status: 503,
                body: "unavailable".into()
            }
            .is_transient()
        );
        assert!(
            !ClientError::Status {
                status: 404,
                body: "not found".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_shape_errors_are_permanent() {
        assert!(!ClientError::UnexpectedResponse("no choices".into()).is_transient());
        assert!(!ClientError::Config("no url".into()).is_transient());
    }
}
