pub mod metrics;
pub mod request_log;

pub use metrics::GatewayMetrics;
