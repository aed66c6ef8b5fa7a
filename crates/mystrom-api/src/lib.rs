// mystrom-api: Async Rust client for the myStrom cloud API and device-local HTTP API

pub mod cloud;
pub mod error;
pub mod local;
pub mod payload;
pub mod transport;

pub use cloud::{CloudClient, CloudDevice};
pub use error::Error;
pub use local::LocalClient;
pub use transport::TransportConfig;
