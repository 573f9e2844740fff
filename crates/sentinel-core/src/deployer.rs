//! Deployment backend trait and deployment types.
//!
//! A backend submits one ARM template as a resource-group deployment and
//! waits for the remote operation to finish.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Result;
use crate::template::{ResolvedParameters, Template};

/// ARM deployment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Add or update declared resources, leave everything else untouched.
    #[default]
    Incremental,
}

/// A parameter value as ARM expects it: `{"value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub value: Value,
}

impl ParameterValue {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

/// Everything needed to submit one deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    /// Name of the deployment resource. Reusing a name overwrites it.
    pub name: String,
    pub mode: DeploymentMode,
    /// Raw template body.
    pub template: Value,
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl DeploymentRequest {
    /// Build an incremental deployment from a loaded template.
    pub fn incremental(
        name: impl Into<String>,
        template: Template,
        parameters: ResolvedParameters,
    ) -> Self {
        Self {
            name: name.into(),
            mode: DeploymentMode::Incremental,
            template: template.into_value(),
            parameters: parameters.values,
        }
    }
}

/// Result of a completed deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentOutcome {
    /// Provisioning state reported by the remote side, e.g. `Succeeded`.
    pub provisioning_state: String,
    /// Resource id of the deployment, when reported.
    pub deployment_id: Option<String>,
}

/// Trait for deployment backends.
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Submit a deployment and wait until it reaches a terminal state.
    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_incremental_request_carries_template_and_parameters() {
        let template = Template::from_value(json!({
            "parameters": { "workspace": { "type": "string" } },
            "resources": []
        }))
        .unwrap();
        let parameters = template.resolve_parameters("ws").unwrap();

        let request = DeploymentRequest::incremental("sentinel-workbooks-x", template, parameters);

        assert_eq!(request.mode, DeploymentMode::Incremental);
        assert_eq!(request.name, "sentinel-workbooks-x");
        assert_eq!(request.template["resources"], json!([]));
        assert_eq!(request.parameters["workspace"].value, json!("ws"));
    }

    #[test]
    fn test_mode_serializes_as_arm_expects() {
        assert_eq!(
            serde_json::to_value(DeploymentMode::Incremental).unwrap(),
            json!("Incremental")
        );
        assert_eq!(
            serde_json::to_value(ParameterValue::new(json!(3))).unwrap(),
            json!({ "value": 3 })
        );
    }
}
