pub mod context;
pub mod filter;
pub mod pipeline;
pub mod registry;

pub use context::{AccessDecider, InboundRequest, ProxyContext};
pub use filter::{Filter, FilterAction, FilterResponse};
pub use pipeline::{PipelineOutcome, run_filters};
pub use registry::FilterRegistry;
