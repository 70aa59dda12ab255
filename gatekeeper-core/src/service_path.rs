use crate::error::GatewayError;

/// The `{service, path}` decomposition of an inbound URL.
///
/// The first path segment names the backend service; the rest is the
/// backend-relative path. Parsed once per request, consumed by the
/// forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePath {
    pub service_name: String,
    pub path: String,
}

impl ServicePath {
    /// Parse a raw request path of the form `/<service>/<backend-path...>`.
    ///
    /// The backend path keeps its leading `/`. Nothing is normalized:
    /// case is preserved, duplicate slashes inside the backend path are
    /// kept, and the query string never reaches this function.
    pub fn parse(path: &str) -> Result<ServicePath, GatewayError> {
        let stripped = path.strip_prefix('/').unwrap_or(path);
        if stripped.is_empty() {
            return Err(GatewayError::PathNotFound);
        }

        // First '/' at char index >= 1 splits service name from path.
        // `//x` has it at index 0 and is rejected: the service name must
        // be non-empty.
        let split = stripped
            .char_indices()
            .find(|&(i, c)| c == '/' && i >= 1)
            .map(|(i, _)| i);

        match split {
            Some(i) => Ok(ServicePath {
                service_name: stripped[..i].to_string(),
                path: stripped[i..].to_string(),
            }),
            None => Err(GatewayError::PathNotFound),
        }
    }

    /// Backend-relative URL: the path plus the raw query, if any.
    pub fn relative_url(&self, raw_query: &str) -> String {
        if raw_query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, raw_query)
        }
    }
}
