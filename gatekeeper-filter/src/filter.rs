use crate::context::ProxyContext;
use async_trait::async_trait;
use gatekeeper_core::GatewayError;

/// A response authored by a filter that stopped the pipeline.
///
/// The connection layer writes it exactly once; a filter that rejects a
/// request either returns one of these or returns an error for the
/// standard dispatcher, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FilterResponse {
    /// A JSON response with the usual `{"error": ..., "status": ...}` body.
    pub fn json(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message, "status": status });
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(&body).unwrap_or_default(),
        }
    }
}

/// What a filter decided for the current request.
#[derive(Debug)]
pub enum FilterAction {
    /// Proceed to the next filter (and ultimately the forwarder).
    Continue,
    /// Stop the pipeline; the carried response is written to the caller.
    Respond(FilterResponse),
}

/// A pluggable pipeline stage with short-circuit authority over a single
/// request.
///
/// Filter objects are shared across worker threads; their futures run on
/// the thread owning the request.
#[async_trait(?Send)]
pub trait Filter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Inspect and mutate the context. Returning an error stops the
    /// pipeline and hands the error to the standard JSON dispatcher.
    async fn apply(&self, ctx: &mut ProxyContext) -> Result<FilterAction, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_response_has_content_type_and_body() {
        let resp = FilterResponse::json(403, "Not authorized");
        assert_eq!(resp.status, 403);
        assert_eq!(
            resp.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let parsed: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(parsed["error"], "Not authorized");
        assert_eq!(parsed["status"], 403);
    }
}
