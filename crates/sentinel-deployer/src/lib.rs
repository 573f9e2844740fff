//! Deployment backends for Sentinel content.
//!
//! Provides:
//! - Azure Resource Manager deployer (resource-group deployments)
//! - Token credentials for the management API

pub mod arm;
pub mod credential;

pub use arm::ArmDeployer;
pub use credential::{
    AccessToken, AzureCliCredential, ChainedTokenCredential, EnvironmentCredential,
    ManagedIdentityCredential, ManagedIdentitySource, TokenCredential, default_chain,
};
pub use sentinel_core::deployer::{
    DeploymentBackend, DeploymentMode, DeploymentOutcome, DeploymentRequest, ParameterValue,
};
