//! Azure Resource Manager deployer implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use sentinel_config::DeployConfig;
use sentinel_core::deployer::*;
use sentinel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::credential::{AccessToken, TokenCredential};

/// Resources API version used for deployments.
pub const API_VERSION: &str = "2021-04-01";

/// Poll interval when the service does not send `Retry-After`.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Resource-group deployments through the ARM REST API.
pub struct ArmDeployer {
    client: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: Url,
    subscription_id: String,
    resource_group: String,
    token: Mutex<Option<AccessToken>>,
    poll_interval: Duration,
}

#[derive(Serialize)]
struct DeploymentBody<'a> {
    properties: DeploymentProperties<'a>,
}

#[derive(Serialize)]
struct DeploymentProperties<'a> {
    mode: DeploymentMode,
    template: &'a Value,
    parameters: &'a BTreeMap<String, ParameterValue>,
}

#[derive(Debug, Deserialize)]
struct ArmDeployment {
    id: Option<String>,
    #[serde(default)]
    properties: ArmDeploymentProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmDeploymentProperties {
    provisioning_state: Option<String>,
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorResponse {
    error: ArmErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    details: Vec<ArmErrorDetail>,
}

impl std::fmt::Display for ArmErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{}: {}", code, message)?,
            (Some(code), None) => write!(f, "{}", code)?,
            (None, Some(message)) => write!(f, "{}", message)?,
            (None, None) => write!(f, "unknown error")?,
        }
        for detail in &self.details {
            write!(f, "; {}", detail)?;
        }
        Ok(())
    }
}

/// Provisioning state of a deployment.
enum ProvisioningState<'a> {
    Succeeded,
    Failed(&'a str),
    InProgress,
}

impl<'a> ProvisioningState<'a> {
    fn classify(state: &'a str) -> Self {
        if state.eq_ignore_ascii_case("Succeeded") {
            ProvisioningState::Succeeded
        } else if state.eq_ignore_ascii_case("Failed") || state.eq_ignore_ascii_case("Canceled") {
            ProvisioningState::Failed(state)
        } else {
            ProvisioningState::InProgress
        }
    }
}

impl ArmDeployer {
    pub fn new(config: &DeployConfig, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential,
            endpoint: config.endpoint.clone(),
            subscription_id: config.subscription_id.clone(),
            resource_group: config.resource_group.clone(),
            token: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the fallback poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn deployment_url(&self, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}?api-version={}",
            self.endpoint.as_str().trim_end_matches('/'),
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(&self.resource_group),
            urlencoding::encode(name),
            API_VERSION
        )
    }

    /// Bearer token for the management endpoint, cached until near expiry.
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.token.clone());
        }

        let token = self.credential.get_token(self.endpoint.as_str()).await?;
        debug!(expires_on = %token.expires_on, "Refreshed management API token");
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Send a request and decode the deployment resource in the response.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(ArmDeployment, Option<Duration>)> {
        let token = self.bearer_token().await?;
        let response = request
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status, &text));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let deployment = response
            .json()
            .await
            .map_err(|e| Error::Request(format!("failed to parse deployment response: {}", e)))?;

        Ok((deployment, retry_after))
    }
}

fn api_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ArmErrorResponse>(body)
        .map(|r| r.error.to_string())
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl DeploymentBackend for ArmDeployer {
    fn name(&self) -> &'static str {
        "azure-resource-manager"
    }

    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentOutcome> {
        let url = self.deployment_url(&request.name);
        let body = DeploymentBody {
            properties: DeploymentProperties {
                mode: request.mode,
                template: &request.template,
                parameters: &request.parameters,
            },
        };

        info!(deployment = %request.name, resource_group = %self.resource_group, "Submitting deployment");
        let (mut deployment, mut retry_after) =
            self.execute(self.client.put(&url).json(&body)).await?;

        loop {
            let state = deployment
                .properties
                .provisioning_state
                .as_deref()
                .unwrap_or("Accepted");

            match ProvisioningState::classify(state) {
                ProvisioningState::Succeeded => {
                    return Ok(DeploymentOutcome {
                        provisioning_state: state.to_string(),
                        deployment_id: deployment.id,
                    });
                }
                ProvisioningState::Failed(state) => {
                    let reason = deployment
                        .properties
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no error details reported".to_string());
                    return Err(Error::DeploymentFailed(format!(
                        "provisioning state {}: {}",
                        state, reason
                    )));
                }
                ProvisioningState::InProgress => {
                    debug!(deployment = %request.name, state, "Deployment in progress");
                }
            }

            tokio::time::sleep(retry_after.unwrap_or(self.poll_interval)).await;
            (deployment, retry_after) = self.execute(self.client.get(&url)).await?;
        }
    }
}
