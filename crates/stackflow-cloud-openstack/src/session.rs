//! Keystone v3 session and service catalog

use crate::clouds::CloudConfig;
use crate::error::{OpenStackError, Result};
use reqwest::header::HeaderValue;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

const TOKEN_HEADER: &str = "x-auth-token";
const SUBJECT_TOKEN_HEADER: &str = "x-subject-token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl Endpoint {
    fn in_region(&self, region: Option<&str>) -> bool {
        match region {
            None => true,
            Some(region) => {
                self.region.as_deref() == Some(region) || self.region_id.as_deref() == Some(region)
            }
        }
    }
}

/// Client-side limits applied to every API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Whole request, body included
    pub request: Duration,
    pub connect: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(60),
            connect: Duration::from_secs(10),
        }
    }
}

/// Authenticated OpenStack session
///
/// Clones share the token, which is renewed when a service rejects it.
#[derive(Debug, Clone)]
pub struct OpenStackSession {
    client: reqwest::Client,
    cloud: CloudConfig,
    token: Arc<RwLock<String>>,
    catalog: Vec<CatalogEntry>,
    region: Option<String>,
    interface: String,
}

impl OpenStackSession {
    /// Obtains a project-scoped token for `cloud`
    pub async fn authenticate(cloud: &CloudConfig) -> Result<Self> {
        Self::authenticate_with(cloud, HttpTimeouts::default()).await
    }

    pub async fn authenticate_with(cloud: &CloudConfig, timeouts: HttpTimeouts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeouts.request)
            .connect_timeout(timeouts.connect)
            .build()?;

        let (token, catalog) = issue_token(&client, cloud).await?;
        if catalog.is_empty() {
            return Err(OpenStackError::Authentication(
                "token has an empty service catalog (is the project scope set?)".to_string(),
            ));
        }

        tracing::info!(services = catalog.len(), "Authenticated with Keystone");
        Ok(Self {
            client,
            cloud: cloud.clone(),
            token: Arc::new(RwLock::new(token)),
            catalog,
            region: cloud.region_name.clone(),
            interface: cloud.interface().to_string(),
        })
    }

    fn token(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetches a fresh token once the current one has expired
    async fn reauthenticate(&self) -> Result<String> {
        let (token, _) = issue_token(&self.client, &self.cloud).await?;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.clone();
        tracing::info!("Renewed Keystone token");
        Ok(token)
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Endpoint URL of the first catalog entry of `service_type`, without a
    /// trailing `/`
    pub fn endpoint(&self, service_type: &str) -> Result<String> {
        self.catalog
            .iter()
            .filter(|entry| entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|ep| ep.interface == self.interface && ep.in_region(self.region()))
            .map(|ep| ep.url.trim_end_matches('/').to_string())
            .ok_or_else(|| OpenStackError::MissingEndpoint {
                service_type: service_type.to_string(),
            })
    }

    /// First of several service types that has an endpoint
    pub fn endpoint_any(&self, service_types: &[&str]) -> Result<String> {
        service_types
            .iter()
            .find_map(|service_type| self.endpoint(service_type).ok())
            .ok_or_else(|| OpenStackError::MissingEndpoint {
                service_type: service_types.join("|"),
            })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(TOKEN_HEADER, self.token())
    }

    /// Sends a request, turning non-2xx responses into `Http` errors
    ///
    /// A 401 renews the token and sends the request once more.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let retry = request.try_clone();
        let mut response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(retry) = retry {
                tracing::debug!(url = %response.url(), "Token rejected, authenticating again");
                let token = HeaderValue::from_str(&self.reauthenticate().await?).map_err(|_| {
                    OpenStackError::Authentication("token is not a valid header value".to_string())
                })?;
                let mut retry = retry.build()?;
                retry.headers_mut().insert(TOKEN_HEADER, token);
                response = self.client.execute(retry).await?;
            }
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            message
        };
        Err(OpenStackError::Http {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.send(request).await?.json().await?)
    }
}

/// Requests a token; returns it with the service catalog
async fn issue_token(client: &reqwest::Client, cloud: &CloudConfig) -> Result<(String, Vec<CatalogEntry>)> {
    let url = format!("{}/auth/tokens", identity_v3(cloud.auth_url()?));

    tracing::debug!(url = %url, "Requesting Keystone token");
    let response = client.post(&url).json(&auth_body(cloud)?).send().await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = error_message(&response.text().await.unwrap_or_default());
        return Err(OpenStackError::Authentication(format!("HTTP {}: {}", status, message)));
    }

    let token = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            OpenStackError::Authentication(format!("response has no {} header", SUBJECT_TOKEN_HEADER))
        })?;
    let body: TokenResponse = response.json().await?;
    Ok((token, body.token.catalog))
}

/// `https://keystone:5000` and `https://keystone:5000/v3/` both become
/// `https://keystone:5000/v3`
fn identity_v3(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        base.to_string()
    } else {
        format!("{}/v3", base)
    }
}

fn auth_body(cloud: &CloudConfig) -> Result<Value> {
    let auth = &cloud.auth;

    if cloud.uses_application_credential() {
        let (Some(id), Some(secret)) = (
            auth.application_credential_id.as_deref(),
            auth.application_credential_secret.as_deref(),
        ) else {
            return Err(OpenStackError::InvalidCloud(
                "application credentials need application_credential_id and application_credential_secret"
                    .to_string(),
            ));
        };
        return Ok(json!({
            "auth": {
                "identity": {
                    "methods": ["application_credential"],
                    "application_credential": { "id": id, "secret": secret }
                }
            }
        }));
    }

    let password = auth
        .password
        .as_deref()
        .ok_or_else(|| OpenStackError::InvalidCloud("auth.password is not set (nor OS_PASSWORD)".to_string()))?;

    let user = match (&auth.user_id, &auth.username) {
        (Some(id), _) => json!({ "id": id, "password": password }),
        (None, Some(name)) => json!({
            "name": name,
            "domain": domain(auth.user_domain_id.as_deref(), auth.user_domain_name.as_deref()),
            "password": password
        }),
        (None, None) => {
            return Err(OpenStackError::InvalidCloud(
                "auth.username or auth.user_id is required".to_string(),
            ));
        }
    };

    let project = match (&auth.project_id, &auth.project_name) {
        (Some(id), _) => json!({ "id": id }),
        (None, Some(name)) => json!({
            "name": name,
            "domain": domain(auth.project_domain_id.as_deref(), auth.project_domain_name.as_deref())
        }),
        (None, None) => {
            return Err(OpenStackError::InvalidCloud(
                "auth.project_name or auth.project_id is required".to_string(),
            ));
        }
    };

    Ok(json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": { "user": user }
            },
            "scope": { "project": project }
        }
    }))
}

fn domain(id: Option<&str>, name: Option<&str>) -> Value {
    match (id, name) {
        (Some(id), _) => json!({ "id": id }),
        (None, Some(name)) => json!({ "name": name }),
        (None, None) => json!({ "name": "Default" }),
    }
}

/// Pulls the human-readable message out of an OpenStack error body
///
/// Services disagree on the shape: `{"error": {"message"}}` (Keystone, Heat),
/// `{"NeutronError": {"message"}}`, `{"itemNotFound": {"message"}}` (Nova,
/// Cinder), or plain text (Swift).
pub(crate) fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    if let Some(message) = value.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    if let Some(object) = value.as_object() {
        for inner in object.values() {
            if let Some(message) = inner.get("message").and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    if let Some(explanation) = value.get("explanation").and_then(Value::as_str) {
        return explanation.to_string();
    }
    body.trim().to_string()
}
