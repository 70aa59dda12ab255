use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Process-wide gateway metrics.
///
/// The histogram label cardinality is bounded by the set of proxied
/// URLs; operators must keep path cardinality bounded (no per-entity
/// ids in the first two segments).
pub struct GatewayMetrics {
    registry: Registry,

    /// Request latency in milliseconds by request path.
    pub request_duration: HistogramVec,

    /// Total requests by path, method, and response status.
    pub requests_total: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "gatekeeper_request_duration",
                "Gateway request duration (milliseconds)",
            )
            .buckets(vec![
                1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
                10000.0,
            ]),
            &["url"],
        )?;

        let requests_total = IntCounterVec::new(
            Opts::new("gatekeeper_requests_total", "Total gateway requests"),
            &["url", "method", "status"],
        )?;

        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;

        Ok(Self {
            registry,
            request_duration,
            requests_total,
        })
    }

    /// Record a completed request.
    pub fn record_request(&self, url: &str, method: &str, status: u16, elapsed_ms: f64) {
        self.request_duration
            .with_label_values(&[url])
            .observe(elapsed_ms);
        self.requests_total
            .with_label_values(&[url, method, &status.to_string()])
            .inc();
    }

    /// Prometheus text exposition.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metrics = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metrics, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_request_observes_histogram_once() {
        let m = GatewayMetrics::new().unwrap();
        m.record_request("/user-svc/api/profile", "GET", 200, 12.5);

        let histogram = m
            .request_duration
            .with_label_values(&["/user-svc/api/profile"]);
        assert_eq!(histogram.get_sample_count(), 1);
        assert!((histogram.get_sample_sum() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn counter_splits_by_status() {
        let m = GatewayMetrics::new().unwrap();
        m.record_request("/a/b", "GET", 200, 1.0);
        m.record_request("/a/b", "GET", 200, 1.0);
        m.record_request("/a/b", "GET", 404, 1.0);

        assert_eq!(m.requests_total.with_label_values(&["/a/b", "GET", "200"]).get(), 2);
        assert_eq!(m.requests_total.with_label_values(&["/a/b", "GET", "404"]).get(), 1);
    }

    #[test]
    fn exposition_contains_metric_names() {
        let m = GatewayMetrics::new().unwrap();
        m.record_request("/a/b", "GET", 200, 3.0);
        let text = m.gather_text();
        assert!(text.contains("gatekeeper_request_duration"));
        assert!(text.contains("gatekeeper_requests_total"));
        assert!(text.contains(r#"url="/a/b""#));
    }

    #[test]
    fn label_is_the_request_path() {
        let m = GatewayMetrics::new().unwrap();
        m.record_request("/orders/create", "POST", 200, 8.0);
        let text = m.gather_text();
        assert!(text.contains(r#"url="/orders/create""#));
    }
}
