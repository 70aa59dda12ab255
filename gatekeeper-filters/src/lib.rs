pub mod auth;
pub mod authz;
pub mod trace_enrich;

use gatekeeper_core::GatewayConfig;
use gatekeeper_core::GatewayError;
use gatekeeper_filter::FilterRegistry;
use std::sync::Arc;

/// Register the built-in filters in their pipeline order:
/// authentication → authorization → trace enrichment.
pub fn register_builtins(
    registry: &FilterRegistry,
    config: &GatewayConfig,
) -> Result<(), GatewayError> {
    registry.add(Arc::new(auth::AuthenticationFilter::new(&config.auth)?));
    registry.add(Arc::new(authz::AuthorizationFilter::new(
        &config.whitelist,
    )?));
    registry.add(Arc::new(trace_enrich::TraceEnricherFilter));
    Ok(())
}
