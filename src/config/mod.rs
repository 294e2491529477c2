//! Configuration loading and validation.

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{Backends, Config, HealthConfig, RoutingConfig, ServerConfig, TransportConfig};
