//! Token credentials for the Azure management API.
//!
//! Tokens come from whatever identity the environment already provides:
//! a service principal in environment variables, a managed identity, or a
//! logged-in Azure CLI. [`default_chain`] tries them in that order.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use sentinel_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Managed identity endpoints are tried on machines that may not have one.
const IDENTITY_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
const IDENTITY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// A bearer token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Whether the token is still usable, with a refresh margin.
    pub fn is_fresh(&self) -> bool {
        self.expires_on - Duration::minutes(EXPIRY_MARGIN_MINUTES) > Utc::now()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Trait for token sources.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Name of this credential, used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Get a token for `resource`, e.g. `https://management.azure.com/`.
    async fn get_token(&self, resource: &str) -> Result<AccessToken>;
}

/// The `.default` scope for a resource URI.
fn default_scope(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

fn unauthorized(source: &str, message: impl std::fmt::Display) -> Error {
    Error::Unauthorized(format!("{}: {}", source, message))
}

/// Interpret an `expires_on` value given as epoch seconds (number or string).
fn parse_epoch(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

/// Service principal credential using the client-credentials grant.
///
/// Reads `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and
/// optionally `AZURE_AUTHORITY_HOST`.
pub struct EnvironmentCredential {
    client: reqwest::Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
    expires_in: u64,
}

impl EnvironmentCredential {
    pub fn from_env() -> Option<Self> {
        let tenant_id = std::env::var("AZURE_TENANT_ID").ok()?;
        let client_id = std::env::var("AZURE_CLIENT_ID").ok()?;
        let client_secret = std::env::var("AZURE_CLIENT_SECRET").ok()?;
        let authority_host = std::env::var("AZURE_AUTHORITY_HOST")
            .unwrap_or_else(|_| DEFAULT_AUTHORITY_HOST.to_string());

        Some(Self {
            client: reqwest::Client::new(),
            authority_host,
            tenant_id,
            client_id,
            client_secret,
        })
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &'static str {
        "EnvironmentCredential"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        let scope = default_scope(resource);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| unauthorized(self.name(), e))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(unauthorized(self.name(), format!("token request failed: {}", text)));
        }

        let token: ClientCredentialsResponse = response
            .json()
            .await
            .map_err(|e| unauthorized(self.name(), e))?;

        Ok(AccessToken::new(
            token.access_token,
            Utc::now() + Duration::seconds(token.expires_in as i64),
        ))
    }
}

/// Managed identity credential.
///
/// Uses the App Service identity endpoint when `IDENTITY_ENDPOINT` and
/// `IDENTITY_HEADER` are set, the VM instance metadata service otherwise.
/// `AZURE_CLIENT_ID` selects a user-assigned identity.
pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    client_id: Option<String>,
    source: ManagedIdentitySource,
}

/// Where managed identity tokens are requested from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentitySource {
    /// VM instance metadata service.
    Imds { endpoint: String },
    /// App Service / Functions identity endpoint.
    AppService { endpoint: String, header: String },
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityResponse {
    access_token: String,
    expires_on: Value,
}

impl ManagedIdentityCredential {
    pub fn new(source: ManagedIdentitySource, client_id: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(IDENTITY_CONNECT_TIMEOUT)
            .timeout(IDENTITY_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            client_id,
            source,
        }
    }

    pub fn from_env() -> Self {
        let source = match (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            (Ok(endpoint), Ok(header)) => ManagedIdentitySource::AppService { endpoint, header },
            _ => ManagedIdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };

        Self::new(source, std::env::var("AZURE_CLIENT_ID").ok())
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken> {
        let mut query = vec![("resource", resource.to_string())];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.clone()));
        }

        let request = match &self.source {
            ManagedIdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION.to_string()));
                self.client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
            }
            ManagedIdentitySource::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION.to_string()));
                self.client.get(endpoint).header("Metadata", "true")
            }
        };

        let response = request
            .query(&query)
            .send()
            .await
            .map_err(|e| unauthorized(self.name(), format!("endpoint unavailable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(unauthorized(
                self.name(),
                format!("token request failed ({}): {}", status, text),
            ));
        }

        let token: ManagedIdentityResponse = response
            .json()
            .await
            .map_err(|e| unauthorized(self.name(), e))?;
        let expires_on = parse_epoch(&token.expires_on)
            .ok_or_else(|| unauthorized(self.name(), "unrecognized expires_on"))?;

        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

/// Credential backed by `az account get-access-token`.
#[derive(Debug)]
pub struct AzureCliCredential {
    program: PathBuf,
}

impl AzureCliCredential {
    /// Use a specific `az` executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::with_program(if cfg!(windows) { "az.cmd" } else { "az" })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    /// Local time, `%Y-%m-%d %H:%M:%S%.f`.
    expires_on: Option<String>,
    /// Epoch seconds, reported by newer CLI versions.
    #[serde(rename = "expires_on")]
    expires_on_epoch: Option<Value>,
}

impl CliTokenResponse {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        if let Some(epoch) = self.expires_on_epoch.as_ref().and_then(parse_epoch) {
            return Some(epoch);
        }
        let local = self.expires_on.as_deref()?;
        NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()?
            .and_local_timezone(Local)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken> {
        let output = tokio::process::Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(resource)
            .output()
            .await
            .map_err(|e| unauthorized(self.name(), format!("failed to run az: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unauthorized(self.name(), stderr.trim()));
        }

        let token: CliTokenResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| unauthorized(self.name(), e))?;
        let expires_on = token
            .expiry()
            .ok_or_else(|| unauthorized(self.name(), "unrecognized token expiry"))?;

        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

/// Tries each credential in order. The first one that succeeds is used for
/// all later requests.
pub struct ChainedTokenCredential {
    sources: Vec<Box<dyn TokenCredential>>,
    selected: Mutex<Option<usize>>,
}

impl ChainedTokenCredential {
    pub fn new(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            selected: Mutex::new(None),
        }
    }

    fn selected(&self) -> Option<usize> {
        self.selected.lock().ok().and_then(|s| *s)
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    fn name(&self) -> &'static str {
        "ChainedTokenCredential"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken> {
        if let Some(index) = self.selected() {
            return self.sources[index].get_token(resource).await;
        }

        let mut failures = Vec::new();
        for (index, source) in self.sources.iter().enumerate() {
            match source.get_token(resource).await {
                Ok(token) => {
                    info!(credential = source.name(), "Acquired management API token");
                    if let Ok(mut selected) = self.selected.lock() {
                        *selected = Some(index);
                    }
                    return Ok(token);
                }
                Err(e) => {
                    debug!(credential = source.name(), error = %e, "Credential unavailable");
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::Unauthorized(format!(
            "no credential in the chain produced a token: [{}]",
            failures.join("; ")
        )))
    }
}

/// Environment service principal, then managed identity, then Azure CLI.
pub fn default_chain() -> ChainedTokenCredential {
    let mut sources: Vec<Box<dyn TokenCredential>> = Vec::new();
    if let Some(env) = EnvironmentCredential::from_env() {
        sources.push(Box::new(env));
    }
    sources.push(Box::new(ManagedIdentityCredential::from_env()));
    sources.push(Box::new(AzureCliCredential::default()));
    ChainedTokenCredential::new(sources)
}
