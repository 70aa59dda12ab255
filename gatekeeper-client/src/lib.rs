pub mod access;
pub mod client;
pub mod conn;
pub mod http;
pub mod pool;

pub use access::RemoteAccessClient;
pub use client::{Backend, ServiceClient};
pub use http::ResponseHead;
pub use pool::ConnPool;
