use thiserror::Error;

/// Unified error type for Gatekeeper.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Path not found")]
    PathNotFound,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Not authorized")]
    Unauthorized,

    #[error("No instance available for service: {0}")]
    NoInstance(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Backend request failed: {0}")]
    BackendTransport(String),

    #[error("Access decision failed: {0}")]
    AccessDecision(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::PathNotFound => 404,
            GatewayError::Unauthenticated => 401,
            GatewayError::Unauthorized => 403,
            GatewayError::NoInstance(_) => 404,
            GatewayError::UnsupportedMethod(_) => 404,
            GatewayError::AccessDecision(_) => 403,
            _ => 500,
        }
    }

    /// Standardized JSON error envelope, stamped with the request's trace id.
    pub fn to_json_body(&self, trace_id: &str) -> Vec<u8> {
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": self.status_code(),
            "traceId": trace_id,
        });
        serde_json::to_vec(&body).unwrap_or_default()
    }
}
