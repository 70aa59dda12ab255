use crate::client::ServiceClient;
use crate::http::{encode_request_head, read_response_head};
use async_trait::async_trait;
use gatekeeper_core::GatewayError;
use gatekeeper_core::TraceContext;
use gatekeeper_core::access::{
    ACCESS_TEST_PATH, AccessDecisionRequest, AccessDecisionResponse, ApiResponse,
};
use gatekeeper_filter::AccessDecider;
use monoio::io::AsyncReadRent;
use tracing::debug;

/// Production policy-oracle client.
///
/// Posts the access question to the policy service, resolved through the
/// same discovery registry and pooled like any backend call, with the
/// request's trace headers attached.
pub struct RemoteAccessClient {
    client: ServiceClient,
    service: String,
}

impl RemoteAccessClient {
    pub fn new(client: ServiceClient, service: impl Into<String>) -> Self {
        Self {
            client,
            service: service.into(),
        }
    }
}

#[async_trait(?Send)]
impl AccessDecider for RemoteAccessClient {
    async fn test_resource_access(
        &self,
        trace: &TraceContext,
        req: AccessDecisionRequest,
    ) -> Result<AccessDecisionResponse, GatewayError> {
        let body = serde_json::to_vec(&req)?;

        let mut backend = self.client.acquire(&self.service).await?;

        let propagation = trace.propagation_headers();
        let mut headers: Vec<(&str, &str)> = vec![
            ("content-type", "application/json"),
            ("accept", "application/json"),
        ];
        for (k, v) in &propagation {
            headers.push((k.as_str(), v.as_str()));
        }

        let mut request = Vec::with_capacity(512 + body.len());
        encode_request_head(
            &mut request,
            "POST",
            ACCESS_TEST_PATH,
            &headers,
            Some(body.len()),
        );
        request.extend_from_slice(&body);

        self.client.send(&mut backend, request).await?;

        let (head, acc) = read_response_head(&mut backend.stream).await?;
        let mut payload = acc[head.head_len..].to_vec();

        match head.content_length {
            Some(len) => {
                let mut chunk = vec![0u8; 16 * 1024];
                while payload.len() < len {
                    let (res, returned) = backend.stream.read(chunk).await;
                    chunk = returned;
                    match res {
                        Ok(0) => {
                            return Err(GatewayError::BackendTransport(
                                "policy service closed mid-body".into(),
                            ));
                        }
                        Ok(n) => payload.extend_from_slice(&chunk[..n]),
                        Err(e) => return Err(GatewayError::BackendTransport(e.to_string())),
                    }
                }
            }
            None => {
                // close-delimited body
                let mut chunk = vec![0u8; 16 * 1024];
                loop {
                    let (res, returned) = backend.stream.read(chunk).await;
                    chunk = returned;
                    match res {
                        Ok(0) => break,
                        Ok(n) => payload.extend_from_slice(&chunk[..n]),
                        Err(e) => return Err(GatewayError::BackendTransport(e.to_string())),
                    }
                }
            }
        }

        // connections with a known body length stay reusable
        if head.keep_alive && head.content_length.is_some() {
            self.client.release(backend);
        }

        if !(200..300).contains(&head.status) {
            return Err(GatewayError::AccessDecision(format!(
                "policy service returned status {}",
                head.status
            )));
        }

        let envelope: ApiResponse<AccessDecisionResponse> = serde_json::from_slice(&payload)?;
        let decision = envelope.into_result()?;
        debug!(valid = decision.valid, url = %req.url, "Access decision");
        Ok(decision)
    }
}
