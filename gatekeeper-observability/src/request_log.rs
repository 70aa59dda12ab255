use gatekeeper_core::TraceContext;
use tracing::info;

/// Request-completion log line.
///
/// Reads the trace/span ids from the handle the pipeline ended with, so
/// an enriched trace is what the log shows. Health-check and metrics
/// paths never reach this function.
pub fn log_request(
    trace: &TraceContext,
    method: &str,
    path: &str,
    status: u16,
    elapsed_ms: f64,
    client_ip: &str,
) {
    info!(
        trace_id = %trace.trace_id(),
        span_id = %trace.span_id(),
        method = %method,
        path = %path,
        status = status,
        latency_ms = elapsed_ms,
        client_ip = %client_ip,
        "request"
    );
}
