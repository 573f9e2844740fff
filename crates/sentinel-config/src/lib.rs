//! Runtime configuration for Sentinel content deployment.
//!
//! Settings come from environment variables (optionally overridden by CLI
//! flags) and are validated once at startup into a [`DeployConfig`].

pub mod deploy;
pub mod error;

pub use deploy::{DeployConfig, RawConfig};
pub use error::{ConfigError, ConfigResult};
