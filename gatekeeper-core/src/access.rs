use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Path on the policy service answering resource-access checks.
pub const ACCESS_TEST_PATH: &str = "/remote/path/resource/access-test";

/// Question put to the policy service: may `role_no` call `method url`?
/// An empty `role_no` denotes an anonymous caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecisionRequest {
    pub role_no: String,
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessDecisionResponse {
    pub valid: bool,
}

/// Standard response envelope used by internal services: either an
/// error code/message pair or a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Surface a populated error field as a failure; otherwise unwrap the
    /// payload.
    pub fn into_result(self) -> Result<T, GatewayError> {
        if let Some(code) = self.error_code {
            let msg = self.msg.unwrap_or_default();
            return Err(GatewayError::AccessDecision(format!("{code}: {msg}")));
        }
        self.data
            .ok_or_else(|| GatewayError::AccessDecision("empty response payload".into()))
    }
}
