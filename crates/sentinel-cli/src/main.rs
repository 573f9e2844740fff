//! Sentinel content deployment CLI.

use clap::Parser;
use sentinel_config::{DeployConfig, RawConfig};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sentinel-deploy", version)]
#[command(
    about = "Deploy Microsoft Sentinel content from ARM templates",
    long_about = None
)]
struct Cli {
    /// Azure subscription ID
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    subscription_id: Option<String>,

    /// Resource group containing the Sentinel workspace
    #[arg(long, env = "AZURE_RESOURCE_GROUP")]
    resource_group: Option<String>,

    /// Name of the Sentinel (Log Analytics) workspace
    #[arg(long, env = "SENTINEL_WORKSPACE_NAME")]
    workspace_name: Option<String>,

    /// Directory containing analytics-rules/, workbooks/ and watchlists/
    #[arg(long, env = "TEMPLATES_DIR")]
    templates_dir: Option<String>,

    /// Azure Resource Manager endpoint
    #[arg(long, env = "AZURE_RESOURCE_MANAGER_ENDPOINT")]
    endpoint: Option<String>,
}

impl Cli {
    fn into_raw(self) -> RawConfig {
        RawConfig {
            subscription_id: self.subscription_id,
            resource_group: self.resource_group,
            workspace_name: self.workspace_name,
            templates_dir: self.templates_dir,
            endpoint: self.endpoint,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Diagnostics are opt-in through RUST_LOG; the console report is the
    // primary output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DeployConfig::from_raw(cli.into_raw())?;

    commands::deploy::run(config).await
}
