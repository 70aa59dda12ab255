pub mod access;
pub mod config;
pub mod error;
pub mod service_path;
pub mod trace;
pub mod user;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use service_path::ServicePath;
pub use trace::TraceContext;
pub use user::User;
