//! Content deployer - discovers templates and deploys them one at a time.

use sentinel_core::deployer::{DeploymentBackend, DeploymentOutcome, DeploymentRequest};
use sentinel_core::{ContentType, Result, Template};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Template files found for each content type.
pub type DiscoveredTemplates = BTreeMap<ContentType, Vec<PathBuf>>;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Event emitted during a deployment run.
#[derive(Debug, Clone)]
pub enum DeployEvent {
    DiscoveryStarted {
        templates_dir: PathBuf,
    },
    NoTemplates {
        content_type: ContentType,
    },
    ContentTypeStarted {
        content_type: ContentType,
        count: usize,
    },
    TemplateStarted {
        path: PathBuf,
        deployment_name: String,
    },
    ParameterUnbound {
        path: PathBuf,
        name: String,
    },
    TemplateSucceeded {
        path: PathBuf,
        provisioning_state: String,
    },
    TemplateFailed {
        path: PathBuf,
        error: String,
    },
    RunCompleted {
        stats: RunStats,
    },
}

/// Deploys Sentinel content templates through a [`DeploymentBackend`].
#[derive(Clone)]
pub struct ContentDeployer {
    backend: Arc<dyn DeploymentBackend>,
    workspace_name: String,
}

impl ContentDeployer {
    pub fn new(backend: Arc<dyn DeploymentBackend>, workspace_name: impl Into<String>) -> Self {
        Self {
            backend,
            workspace_name: workspace_name.into(),
        }
    }

    /// Find `*.json` files directly under `templates_dir/<content-type>/`.
    ///
    /// Missing or unreadable directories yield an empty list. Names starting
    /// with `.` are skipped and paths are sorted by file name. Every other
    /// matching entry is returned, so a broken one fails when loaded.
    pub fn discover(templates_dir: &Path) -> DiscoveredTemplates {
        ContentType::ALL
            .into_iter()
            .map(|content_type| {
                let dir = content_type.dir_in(templates_dir);
                (content_type, Self::list_json_files(&dir))
            })
            .collect()
    }

    fn list_json_files(dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Template directory not readable");
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let visible = path
                    .file_name()
                    .is_some_and(|n| !n.as_encoded_bytes().starts_with(b"."));
                let is_json = path.extension().is_some_and(|ext| ext == "json");
                visible && is_json
            })
            .collect();

        files.sort();
        files
    }

    /// Deploy one template file. Every error is reported as a
    /// [`DeployEvent::TemplateFailed`] and turned into `false`.
    pub async fn deploy(
        &self,
        path: &Path,
        deployment_name: &str,
        tx: &mpsc::Sender<DeployEvent>,
    ) -> bool {
        let _ = tx
            .send(DeployEvent::TemplateStarted {
                path: path.to_path_buf(),
                deployment_name: deployment_name.to_string(),
            })
            .await;

        match self.try_deploy(path, deployment_name, tx).await {
            Ok(outcome) => {
                info!(
                    deployment = %deployment_name,
                    state = %outcome.provisioning_state,
                    "Deployment completed"
                );
                let _ = tx
                    .send(DeployEvent::TemplateSucceeded {
                        path: path.to_path_buf(),
                        provisioning_state: outcome.provisioning_state,
                    })
                    .await;
                true
            }
            Err(e) => {
                error!(deployment = %deployment_name, error = %e, "Deployment failed");
                let _ = tx
                    .send(DeployEvent::TemplateFailed {
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    })
                    .await;
                false
            }
        }
    }

    async fn try_deploy(
        &self,
        path: &Path,
        deployment_name: &str,
        tx: &mpsc::Sender<DeployEvent>,
    ) -> Result<DeploymentOutcome> {
        let template = Template::load(path)?;
        let parameters = template.resolve_parameters(&self.workspace_name)?;

        for name in &parameters.unbound {
            warn!(template = %path.display(), parameter = %name, "Parameter has no default value");
            let _ = tx
                .send(DeployEvent::ParameterUnbound {
                    path: path.to_path_buf(),
                    name: name.clone(),
                })
                .await;
        }

        let request = DeploymentRequest::incremental(deployment_name, template, parameters);
        self.backend.deploy(request).await
    }

    /// Deploy every discovered template, returning a channel of events and a
    /// handle resolving to the run statistics.
    pub fn deploy_all(
        &self,
        templates_dir: PathBuf,
    ) -> (
        mpsc::Receiver<DeployEvent>,
        tokio::task::JoinHandle<RunStats>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let deployer = self.clone();

        let handle = tokio::spawn(async move { deployer.run(&templates_dir, &tx).await });

        (rx, handle)
    }

    /// Sequential run loop behind [`deploy_all`](Self::deploy_all).
    pub async fn run(&self, templates_dir: &Path, tx: &mpsc::Sender<DeployEvent>) -> RunStats {
        let mut stats = RunStats::default();

        info!(
            templates_dir = %templates_dir.display(),
            backend = self.backend.name(),
            "Discovering templates"
        );
        let _ = tx
            .send(DeployEvent::DiscoveryStarted {
                templates_dir: templates_dir.to_path_buf(),
            })
            .await;

        for (content_type, files) in Self::discover(templates_dir) {
            if files.is_empty() {
                let _ = tx.send(DeployEvent::NoTemplates { content_type }).await;
                continue;
            }

            let _ = tx
                .send(DeployEvent::ContentTypeStarted {
                    content_type,
                    count: files.len(),
                })
                .await;

            for file in &files {
                let deployment_name = content_type.deployment_name(file);
                let success = self.deploy(file, &deployment_name, tx).await;
                stats.record(success);
            }
        }

        let _ = tx.send(DeployEvent::RunCompleted { stats }).await;
        stats
    }
}
