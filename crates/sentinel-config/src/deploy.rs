//! Deployment configuration.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;
use url::Url;

pub const SUBSCRIPTION_ID_VAR: &str = "AZURE_SUBSCRIPTION_ID";
pub const RESOURCE_GROUP_VAR: &str = "AZURE_RESOURCE_GROUP";
pub const WORKSPACE_NAME_VAR: &str = "SENTINEL_WORKSPACE_NAME";
pub const TEMPLATES_DIR_VAR: &str = "TEMPLATES_DIR";
pub const ENDPOINT_VAR: &str = "AZURE_RESOURCE_MANAGER_ENDPOINT";

pub const DEFAULT_TEMPLATES_DIR: &str = "templates";
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Unvalidated settings as read from the environment or command line.
/// Names of the backing environment variables are the `*_VAR` constants.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub workspace_name: Option<String>,
    pub templates_dir: Option<String>,
    pub endpoint: Option<String>,
}

/// Validated configuration, built once at startup and passed to the deployer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace_name: String,
    pub templates_dir: PathBuf,
    /// Azure Resource Manager endpoint.
    pub endpoint: Url,
}

impl DeployConfig {
    /// Validate raw settings. Required values are checked in a fixed order
    /// and the first missing one is reported. Empty strings count as missing.
    pub fn from_raw(raw: RawConfig) -> ConfigResult<Self> {
        let subscription_id = required(raw.subscription_id, SUBSCRIPTION_ID_VAR)?;
        let resource_group = required(raw.resource_group, RESOURCE_GROUP_VAR)?;
        let workspace_name = required(raw.workspace_name, WORKSPACE_NAME_VAR)?;

        let templates_dir = non_empty(raw.templates_dir)
            .unwrap_or_else(|| DEFAULT_TEMPLATES_DIR.to_string())
            .into();

        let endpoint = non_empty(raw.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint).map_err(|e| ConfigError::InvalidValue {
            field: ENDPOINT_VAR,
            message: e.to_string(),
        })?;

        Ok(Self {
            subscription_id,
            resource_group,
            workspace_name,
            templates_dir,
            endpoint,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn required(value: Option<String>, var: &'static str) -> ConfigResult<String> {
    non_empty(value).ok_or(ConfigError::MissingVar(var))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> RawConfig {
        RawConfig {
            subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
            resource_group: Some("rg-sentinel".to_string()),
            workspace_name: Some("law-sentinel".to_string()),
            templates_dir: None,
            endpoint: None,
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = DeployConfig::from_raw(full()).unwrap();
        assert_eq!(config.templates_dir, PathBuf::from("templates"));
        assert_eq!(config.endpoint.as_str(), "https://management.azure.com/");
        assert_eq!(config.workspace_name, "law-sentinel");
    }

    #[test]
    fn test_overrides_applied() {
        let raw = RawConfig {
            templates_dir: Some("content".to_string()),
            endpoint: Some("https://management.usgovcloudapi.net".to_string()),
            ..full()
        };
        let config = DeployConfig::from_raw(raw).unwrap();
        assert_eq!(config.templates_dir, PathBuf::from("content"));
        assert_eq!(config.endpoint.host_str(), Some("management.usgovcloudapi.net"));
    }

    #[test]
    fn test_missing_required_reported_in_order() {
        let raw = RawConfig {
            subscription_id: None,
            resource_group: None,
            ..full()
        };
        assert!(matches!(
            DeployConfig::from_raw(raw),
            Err(ConfigError::MissingVar("AZURE_SUBSCRIPTION_ID"))
        ));

        let raw = RawConfig {
            workspace_name: None,
            ..full()
        };
        assert!(matches!(
            DeployConfig::from_raw(raw),
            Err(ConfigError::MissingVar("SENTINEL_WORKSPACE_NAME"))
        ));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let raw = RawConfig {
            resource_group: Some(String::new()),
            ..full()
        };
        let err = DeployConfig::from_raw(raw).unwrap_err();
        assert_eq!(
            err.to_string(),
            "AZURE_RESOURCE_GROUP environment variable is required"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        let raw = RawConfig {
            endpoint: Some("not a url".to_string()),
            ..full()
        };
        assert!(matches!(
            DeployConfig::from_raw(raw),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
