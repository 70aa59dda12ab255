pub mod connection;
pub mod forward;
pub mod response;
pub mod worker;

pub use worker::{SharedState, spawn_workers};
