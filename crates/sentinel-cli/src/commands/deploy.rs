//! Deploy all templates found under the configured templates directory.

use anyhow::{Context, Result};
use sentinel_config::DeployConfig;
use sentinel_deployer::{ArmDeployer, default_chain};
use sentinel_orchestrator::{ContentDeployer, DeployEvent, RunStats};
use std::process::ExitCode;
use std::sync::Arc;

const RULE: &str =
    "================================================================================";

/// How a run ended, derived from its statistics.
#[derive(Debug, PartialEq, Eq)]
enum RunOutcome {
    Failed,
    NothingFound,
    AllSucceeded,
}

impl RunOutcome {
    fn from_stats(stats: &RunStats) -> Self {
        if stats.failed > 0 {
            RunOutcome::Failed
        } else if stats.total == 0 {
            RunOutcome::NothingFound
        } else {
            RunOutcome::AllSucceeded
        }
    }

    fn exit_code(&self) -> ExitCode {
        match self {
            RunOutcome::Failed => ExitCode::FAILURE,
            RunOutcome::NothingFound | RunOutcome::AllSucceeded => ExitCode::SUCCESS,
        }
    }
}

/// Run a full deployment and report progress on the console.
pub async fn run(config: DeployConfig) -> Result<ExitCode> {
    print_banner(&config);

    let credential = Arc::new(default_chain());
    let backend = Arc::new(ArmDeployer::new(&config, credential));
    let deployer = ContentDeployer::new(backend, config.workspace_name.clone());

    let (mut rx, handle) = deployer.deploy_all(config.templates_dir.clone());

    while let Some(event) = rx.recv().await {
        print_event(&event);
    }

    let stats = handle.await.context("Deployment run task failed")?;

    print_summary(&stats);

    let outcome = RunOutcome::from_stats(&stats);
    match outcome {
        RunOutcome::Failed => {}
        RunOutcome::NothingFound => println!("\nWarning: No templates found to deploy"),
        RunOutcome::AllSucceeded => println!("\n✓ All deployments completed successfully!"),
    }

    Ok(outcome.exit_code())
}

fn print_banner(config: &DeployConfig) {
    println!("{}", RULE);
    println!("Microsoft Sentinel Content Deployment");
    println!("{}", RULE);
    println!("Subscription ID: {}", config.subscription_id);
    println!("Resource Group: {}", config.resource_group);
    println!("Workspace Name: {}", config.workspace_name);
    println!("Templates Directory: {}", config.templates_dir.display());
    println!("{}", RULE);
    println!();
}

fn print_event(event: &DeployEvent) {
    match event {
        DeployEvent::DiscoveryStarted { templates_dir } => {
            println!("Discovering templates in {}...", templates_dir.display());
        }
        DeployEvent::NoTemplates { content_type } => {
            println!("No templates found for {}", content_type);
        }
        DeployEvent::ContentTypeStarted {
            content_type,
            count,
        } => {
            println!("\nDeploying {} {} template(s)...", count, content_type);
        }
        DeployEvent::TemplateStarted { path, .. } => {
            println!("Deploying {}...", path.display());
        }
        DeployEvent::ParameterUnbound { name, .. } => {
            println!("  Warning: Parameter '{}' has no default value", name);
        }
        DeployEvent::TemplateSucceeded {
            path,
            provisioning_state,
        } => {
            println!("✓ Successfully deployed {}", path.display());
            println!("  Deployment state: {}", provisioning_state);
        }
        DeployEvent::TemplateFailed { path, error } => {
            eprintln!("✗ Failed to deploy {}: {}", path.display(), error);
        }
        DeployEvent::RunCompleted { .. } => {}
    }
}

fn print_summary(stats: &RunStats) {
    println!("\n{}", RULE);
    println!("Deployment Summary");
    println!("{}", RULE);
    println!("Total templates: {}", stats.total);
    println!("Succeeded: {}", stats.succeeded);
    println!("Failed: {}", stats.failed);
    println!("{}", RULE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: usize, succeeded: usize, failed: usize) -> RunStats {
        RunStats {
            total,
            succeeded,
            failed,
        }
    }

    #[test]
    fn test_outcome_from_stats() {
        assert_eq!(RunOutcome::from_stats(&stats(0, 0, 0)), RunOutcome::NothingFound);
        assert_eq!(RunOutcome::from_stats(&stats(3, 3, 0)), RunOutcome::AllSucceeded);
        assert_eq!(RunOutcome::from_stats(&stats(3, 2, 1)), RunOutcome::Failed);
    }
}
