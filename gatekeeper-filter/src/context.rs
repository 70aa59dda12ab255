use async_trait::async_trait;
use gatekeeper_core::GatewayError;
use gatekeeper_core::ServicePath;
use gatekeeper_core::TraceContext;
use gatekeeper_core::User;
use gatekeeper_core::access::{AccessDecisionRequest, AccessDecisionResponse};
use std::rc::Rc;

/// Handle to the external policy oracle.
///
/// Carried on the context so filters running on any worker thread reach
/// that worker's pooled client; tests substitute a stub.
#[async_trait(?Send)]
pub trait AccessDecider {
    async fn test_resource_access(
        &self,
        trace: &TraceContext,
        req: AccessDecisionRequest,
    ) -> Result<AccessDecisionResponse, GatewayError>;
}

/// The inbound request as seen by filters and the forwarder.
///
/// Headers keep their original case, order, and duplicates; the
/// forwarder propagates them verbatim.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    pub raw_query: String,
    pub headers: Vec<(String, String)>,
}

impl InboundRequest {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header is present with a non-empty value.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some_and(|v| !v.is_empty())
    }
}

/// Per-request mutable carrier passed through the filter pipeline and
/// into the forwarder.
///
/// Owned by exactly one request task; never shared across requests. The
/// well-known attribute set is closed, so the attributes are typed
/// fields rather than a dynamic map.
pub struct ProxyContext {
    /// Tracing handle. Filters may replace it with a derived handle;
    /// later stages must read it from here, not from an earlier copy.
    pub trace: TraceContext,

    pub request: InboundRequest,

    pub access: Rc<dyn AccessDecider>,

    service_path: Option<ServicePath>,
    user: Option<User>,
}

impl ProxyContext {
    pub fn new(trace: TraceContext, request: InboundRequest, access: Rc<dyn AccessDecider>) -> Self {
        Self {
            trace,
            request,
            access,
            service_path: None,
            user: None,
        }
    }

    pub fn set_service_path(&mut self, sp: ServicePath) {
        self.service_path = Some(sp);
    }

    pub fn service_path(&self) -> Option<&ServicePath> {
        self.service_path.as_ref()
    }

    /// Record the authenticated caller. Overwrites any earlier value.
    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    /// The authenticated caller, if any. `None` = anonymous.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}
