/// Outbound trace id header.
pub const TRACE_ID_HEADER: &str = "x-b3-traceid";
/// Outbound span id header.
pub const SPAN_ID_HEADER: &str = "x-b3-spanid";

/// Annotation keys added by the trace enrichment filter.
pub const USER_ID_KEY: &str = "x-id";
pub const USERNAME_KEY: &str = "x-username";
pub const USER_NO_KEY: &str = "x-userno";
pub const ROLE_NO_KEY: &str = "x-roleno";

/// Per-request tracing handle.
///
/// The gateway is the trace origin: inbound trace headers are never
/// honored, a fresh root is created for every request. The handle is
/// value-like: annotating it produces a derived handle, and filters
/// replace the handle on the context rather than mutating it. Downstream
/// code must read the handle from the context, not retain an earlier copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: String,
    span_id: String,
    annotations: Vec<(String, String)>,
}

impl TraceContext {
    /// Start a new root trace.
    pub fn root() -> Self {
        Self {
            trace_id: short_id(),
            span_id: short_id(),
            annotations: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Derive a handle carrying additional key/value annotations.
    /// Existing annotations with the same key are overwritten.
    pub fn annotated<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut derived = self.clone();
        for (k, v) in pairs {
            let k = k.into();
            let v = v.into();
            match derived.annotations.iter_mut().find(|(ak, _)| *ak == k) {
                Some(entry) => entry.1 = v,
                None => derived.annotations.push((k, v)),
            }
        }
        derived
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Headers injected into every outbound request: trace/span ids plus
    /// all annotations.
    pub fn propagation_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(2 + self.annotations.len());
        headers.push((TRACE_ID_HEADER.to_string(), self.trace_id.clone()));
        headers.push((SPAN_ID_HEADER.to_string(), self.span_id.clone()));
        for (k, v) in &self.annotations {
            headers.push((k.clone(), v.clone()));
        }
        headers
    }

    /// Whether `name` is a header this gateway originates. Matching
    /// inbound headers are dropped before propagation so exactly one set
    /// of trace headers reaches the backend.
    pub fn is_propagation_header(&self, name: &str) -> bool {
        if name.eq_ignore_ascii_case(TRACE_ID_HEADER) || name.eq_ignore_ascii_case(SPAN_ID_HEADER) {
            return true;
        }
        self.annotations
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Compact hex id (uuid v4 without dashes).
fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
