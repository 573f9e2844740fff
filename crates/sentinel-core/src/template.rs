//! ARM template loading and parameter resolution.

use crate::TemplateError;
use crate::deployer::ParameterValue;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Parameter names that are always bound to the configured workspace.
const WORKSPACE_PARAMETER_NAMES: [&str; 2] = ["workspace", "workspacename"];

/// A parsed ARM template. The body is kept as raw JSON and submitted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    body: Map<String, Value>,
}

/// Outcome of binding a template's declared parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters {
    /// Bound parameters, wrapped as `{"value": ...}`.
    pub values: BTreeMap<String, ParameterValue>,
    /// Declared parameters with neither a workspace binding nor a default.
    pub unbound: Vec<String>,
}

impl Template {
    /// Read and parse a template file.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let value: Value =
            serde_json::from_str(&content).map_err(|source| TemplateError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        match value {
            Value::Object(body) => {
                debug!(path = %path.display(), "Loaded template");
                Ok(Self { body })
            }
            _ => Err(TemplateError::NotAnObject(path.to_path_buf())),
        }
    }

    /// Build a template from an in-memory JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(body) => Some(Self { body }),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    /// Bind every declared parameter.
    ///
    /// Workspace parameters (matched case-insensitively) always take
    /// `workspace_name`, even when a default exists. Other parameters take
    /// their `defaultValue` when one is declared. Anything else is reported
    /// in `unbound` and left for the remote side to validate.
    pub fn resolve_parameters(
        &self,
        workspace_name: &str,
    ) -> Result<ResolvedParameters, TemplateError> {
        let mut resolved = ResolvedParameters::default();

        let Some(parameters) = self.body.get("parameters") else {
            return Ok(resolved);
        };
        let parameters = parameters.as_object().ok_or_else(|| {
            TemplateError::InvalidParameters("'parameters' must be an object".to_string())
        })?;

        for (name, definition) in parameters {
            let definition = definition.as_object().ok_or_else(|| {
                TemplateError::InvalidParameters(format!(
                    "definition of parameter '{}' must be an object",
                    name
                ))
            })?;

            if is_workspace_parameter(name) {
                resolved.values.insert(
                    name.clone(),
                    ParameterValue::new(Value::String(workspace_name.to_string())),
                );
            } else if let Some(default) = definition.get("defaultValue") {
                resolved
                    .values
                    .insert(name.clone(), ParameterValue::new(default.clone()));
            } else {
                resolved.unbound.push(name.clone());
            }
        }

        Ok(resolved)
    }
}

fn is_workspace_parameter(name: &str) -> bool {
    let lower = name.to_lowercase();
    WORKSPACE_PARAMETER_NAMES.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn template(value: Value) -> Template {
        Template::from_value(value).unwrap()
    }

    #[test]
    fn test_workspace_parameter_overrides_default() {
        let t = template(json!({
            "parameters": {
                "WorkspaceName": { "type": "string", "defaultValue": "other" },
                "WORKSPACE": { "type": "string" }
            }
        }));

        let resolved = t.resolve_parameters("sentinel-ws").unwrap();
        assert_eq!(resolved.values["WorkspaceName"].value, json!("sentinel-ws"));
        assert_eq!(resolved.values["WORKSPACE"].value, json!("sentinel-ws"));
        assert!(resolved.unbound.is_empty());
    }

    #[test]
    fn test_default_values_are_bound() {
        let t = template(json!({
            "parameters": {
                "severity": { "type": "string", "defaultValue": "High" },
                "enabled": { "type": "bool", "defaultValue": false },
                "tags": { "type": "object", "defaultValue": null }
            }
        }));

        let resolved = t.resolve_parameters("ws").unwrap();
        assert_eq!(resolved.values["severity"].value, json!("High"));
        assert_eq!(resolved.values["enabled"].value, json!(false));
        assert_eq!(resolved.values["tags"].value, Value::Null);
    }

    #[test]
    fn test_parameter_without_default_is_unbound() {
        let t = template(json!({
            "parameters": {
                "ruleId": { "type": "string" },
                "workspace": { "type": "string" }
            }
        }));

        let resolved = t.resolve_parameters("ws").unwrap();
        assert_eq!(resolved.unbound, vec!["ruleId".to_string()]);
        assert!(!resolved.values.contains_key("ruleId"));
        assert!(resolved.values.contains_key("workspace"));
    }

    #[test]
    fn test_workspace_match_is_exact_ignoring_case() {
        let t = template(json!({
            "parameters": {
                "workspaceId": { "type": "string" }
            }
        }));

        let resolved = t.resolve_parameters("ws").unwrap();
        assert_eq!(resolved.unbound, vec!["workspaceId".to_string()]);
    }

    #[test]
    fn test_no_parameters_section() {
        let t = template(json!({ "resources": [] }));
        let resolved = t.resolve_parameters("ws").unwrap();
        assert!(resolved.values.is_empty());
        assert!(resolved.unbound.is_empty());
    }

    #[test]
    fn test_malformed_parameters_section() {
        let t = template(json!({ "parameters": ["workspace"] }));
        assert!(matches!(
            t.resolve_parameters("ws"),
            Err(TemplateError::InvalidParameters(_))
        ));

        let t = template(json!({ "parameters": { "workspace": "string" } }));
        assert!(matches!(
            t.resolve_parameters("ws"),
            Err(TemplateError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_load_valid_template() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"$schema": "x", "resources": []}}"#).unwrap();

        let t = Template::load(file.path()).unwrap();
        assert_eq!(t.into_value()["$schema"], json!("x"));
    }

    #[test]
    fn test_load_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let result = Template::load(file.path());
        assert!(matches!(result, Err(TemplateError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Template::load(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(TemplateError::Io { .. })));
    }

    #[test]
    fn test_load_non_object_root() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();

        let result = Template::load(file.path());
        assert!(matches!(result, Err(TemplateError::NotAnObject(_))));
    }
}
