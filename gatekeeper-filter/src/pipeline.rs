use crate::context::ProxyContext;
use crate::filter::{Filter, FilterAction, FilterResponse};
use gatekeeper_core::GatewayError;
use std::sync::Arc;
use tracing::{debug, error};

/// How the pipeline ended for a request.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every filter passed; hand the request to the forwarder.
    Forward,
    /// A filter stopped the pipeline with its own response.
    Respond(FilterResponse),
    /// A filter failed; the caller dispatches the standard JSON error
    /// exactly once.
    Fail(GatewayError),
}

/// Run a registry snapshot in order against the context.
///
/// Each filter observes every mutation made by earlier filters in the
/// same request, including a replaced tracing handle. The first
/// non-`Continue` outcome wins; no later filter runs after it.
pub async fn run_filters(filters: &[Arc<dyn Filter>], ctx: &mut ProxyContext) -> PipelineOutcome {
    for filter in filters {
        debug!(filter = %filter.name(), "Executing filter");

        match filter.apply(ctx).await {
            Ok(FilterAction::Continue) => {}
            Ok(FilterAction::Respond(resp)) => {
                debug!(
                    filter = %filter.name(),
                    status = resp.status,
                    "Filter short-circuited with response"
                );
                return PipelineOutcome::Respond(resp);
            }
            Err(e) => {
                error!(filter = %filter.name(), error = %e, "Filter failed");
                return PipelineOutcome::Fail(e);
            }
        }
    }

    PipelineOutcome::Forward
}
