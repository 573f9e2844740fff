//! Template discovery and sequential deployment runs.

pub mod orchestrator;

pub use orchestrator::{ContentDeployer, DeployEvent, DiscoveredTemplates, RunStats};
