pub mod registry;

pub use registry::{DiscoveryError, ServiceRegistry, TableRegistry};
