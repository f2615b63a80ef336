//! OAuth provider: client-credentials token acquisition per service.
//!
//! Services are configured in a TOML file keyed `[oauth.<service>]` and
//! reloaded when its modification time changes. Tokens are cached per
//! service and refreshed once they fall inside the expiry buffer, so a
//! caller never receives a token likely to expire mid-use.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::error::{ErrorKind, ProviderError};
use crate::reference::Reference;
use crate::secret::Secret;

use super::{matches_namespace, Provider};

/// How client credentials travel in the token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// HTTP Basic authorization header plus a form body.
    Basic,
    /// Credentials embedded in the form body.
    Body,
    /// Credentials embedded in a JSON body.
    Json,
}

impl Default for AuthMethod {
    fn default() -> Self {
        Self::Basic
    }
}

/// One service's token-endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// The token endpoint URL. Required.
    pub token_url: Option<String>,

    /// OAuth client ID. Required.
    pub client_id: Option<String>,

    /// OAuth client secret.
    pub client_secret: Option<String>,

    /// Grant type; defaults to `client_credentials`.
    #[serde(default = "default_grant_type")]
    pub grant_type: String,

    /// Space-separated scope string.
    pub scope: Option<String>,

    /// Credential-transmission strategy.
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Override for the request content type (form strategies only).
    pub content_type: Option<String>,

    /// Audience parameter, forwarded when set.
    pub audience: Option<String>,

    /// Comma-separated `Key:Value` pairs attached to the token request.
    pub custom_headers: Option<String>,
}

fn default_grant_type() -> String {
    "client_credentials".to_string()
}

impl ServiceConfig {
    /// Check for fatal misconfiguration, as opposed to transient failures.
    fn validate(&self, service: &str) -> Result<(&str, &str), ProviderError> {
        let token_url = self.token_url.as_deref().filter(|s| !s.is_empty());
        let client_id = self.client_id.as_deref().filter(|s| !s.is_empty());
        match (token_url, client_id) {
            (Some(url), Some(id)) => Ok((url, id)),
            (None, _) => Err(ProviderError::config_missing(format!(
                "service '{}' has no token_url",
                service
            ))),
            (_, None) => Err(ProviderError::config_missing(format!(
                "service '{}' has no client_id",
                service
            ))),
        }
    }

    /// Parse `custom_headers` into pairs, skipping malformed entries.
    fn header_pairs(&self) -> Vec<(String, String)> {
        let Some(raw) = self.custom_headers.as_deref() else {
            return Vec::new();
        };
        raw.split(',')
            .filter_map(|pair| {
                let (name, value) = pair.split_once(':')?;
                let (name, value) = (name.trim(), value.trim());
                if name.is_empty() {
                    None
                } else {
                    Some((name.to_string(), value.to_string()))
                }
            })
            .collect()
    }
}

/// Shape of the services file: a single `[oauth]` table of service sections.
#[derive(Debug, Default, Deserialize)]
struct ServicesFile {
    #[serde(default)]
    oauth: HashMap<String, ServiceConfig>,
}

/// Parsed services file keyed to a modification time.
#[derive(Debug, Default)]
struct ServicesState {
    mtime: Option<SystemTime>,
    services: HashMap<String, ServiceConfig>,
}

/// A cached access token for one service.
#[derive(Debug, Clone)]
pub struct OAuthTokenRecord {
    /// The access token value.
    pub access_token: Secret,

    /// Token type as reported by the endpoint (usually `Bearer`).
    pub token_type: String,

    /// When the token expires; `None` when the endpoint reported no lifetime.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the token was acquired.
    pub acquired_at: DateTime<Utc>,
}

impl OAuthTokenRecord {
    /// Whether the token is due for refresh given the expiry buffer.
    ///
    /// A token with no known expiry never goes stale.
    pub fn is_stale(&self, buffer: chrono::Duration) -> bool {
        self.expires_at
            .map(|exp| exp < Utc::now() + buffer)
            .unwrap_or(false)
    }
}

/// Wire shape of a token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Resolves `{{oauth:service}}` references to fresh access tokens.
pub struct OAuthProvider {
    services_file: PathBuf,
    expiry_buffer: chrono::Duration,
    http: reqwest::Client,
    services: Mutex<ServicesState>,
    tokens: Mutex<HashMap<String, OAuthTokenRecord>>,
}

impl OAuthProvider {
    /// Create an OAuth provider from its config section.
    pub fn new(config: &OAuthConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            services_file: config.services_file.clone(),
            expiry_buffer: chrono::Duration::seconds(config.expiry_buffer_secs as i64),
            http,
            services: Mutex::new(ServicesState::default()),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Reload the services file if it changed on disk.
    fn refresh_services(&self) -> Result<(), ProviderError> {
        let mut state = self.services.lock();
        let mtime = std::fs::metadata(&self.services_file)
            .and_then(|m| m.modified())
            .ok();

        if mtime.is_some() && mtime == state.mtime {
            return Ok(());
        }

        state.mtime = mtime;
        state.services = match std::fs::read_to_string(&self.services_file) {
            Ok(contents) => {
                let parsed: ServicesFile = toml::from_str(&contents).map_err(|e| {
                    ProviderError::config_missing(format!(
                        "failed to parse {}: {}",
                        self.services_file.display(),
                        e
                    ))
                })?;
                debug!(
                    file = %self.services_file.display(),
                    services = parsed.oauth.len(),
                    "reloaded OAuth services file"
                );
                parsed.oauth
            }
            // Absence is not an error; resolves fail per service instead.
            Err(_) => HashMap::new(),
        };
        Ok(())
    }

    fn service_config(&self, service: &str) -> Option<ServiceConfig> {
        self.services.lock().services.get(service).cloned()
    }

    fn cached_token(&self, service: &str) -> Option<OAuthTokenRecord> {
        let tokens = self.tokens.lock();
        let record = tokens.get(service)?;
        if record.is_stale(self.expiry_buffer) {
            None
        } else {
            Some(record.clone())
        }
    }

    /// Perform the client-credentials request for one service.
    async fn request_token(
        &self,
        service: &str,
        config: &ServiceConfig,
    ) -> Result<OAuthTokenRecord, ProviderError> {
        let (token_url, client_id) = config.validate(service)?;
        let client_secret = config.client_secret.as_deref().unwrap_or_default();

        let mut request = self.http.post(token_url);

        for (name, value) in config.header_pairs() {
            request = request.header(name, value);
        }

        let mut params: Vec<(&str, &str)> = vec![("grant_type", &config.grant_type)];
        if let Some(scope) = config.scope.as_deref() {
            params.push(("scope", scope));
        }
        if let Some(audience) = config.audience.as_deref() {
            params.push(("audience", audience));
        }

        request = match config.auth_method {
            AuthMethod::Basic => {
                let req = request.basic_auth(client_id, Some(client_secret));
                match config.content_type.as_deref() {
                    Some(ct) => req.header(reqwest::header::CONTENT_TYPE, ct).form(&params),
                    None => req.form(&params),
                }
            }
            AuthMethod::Body => {
                params.push(("client_id", client_id));
                params.push(("client_secret", client_secret));
                match config.content_type.as_deref() {
                    Some(ct) => request
                        .header(reqwest::header::CONTENT_TYPE, ct)
                        .form(&params),
                    None => request.form(&params),
                }
            }
            AuthMethod::Json => {
                let mut body = serde_json::Map::new();
                for (key, value) in &params {
                    body.insert((*key).to_string(), serde_json::Value::from(*value));
                }
                body.insert("client_id".to_string(), serde_json::Value::from(client_id));
                body.insert(
                    "client_secret".to_string(),
                    serde_json::Value::from(client_secret),
                );
                request.json(&serde_json::Value::Object(body))
            }
        };

        debug!(service, token_url, "requesting access token");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::new(
                    ErrorKind::NetworkTimeout,
                    format!("token request for '{}' timed out", service),
                )
            } else {
                ProviderError::other(format!("token request for '{}' failed: {}", service, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let kind = if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                ErrorKind::AuthFailure
            } else {
                ErrorKind::Other(format!("token endpoint returned {}", status))
            };
            warn!(service, %status, "token endpoint rejected the request");
            return Err(ProviderError::new(
                kind,
                format!("token endpoint for '{}' returned {}", service, status),
            ));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::other(format!(
                "malformed token response for '{}': {}",
                service, e
            ))
        })?;

        let now = Utc::now();
        let record = OAuthTokenRecord {
            access_token: Secret::new(parsed.access_token),
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: parsed
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
            acquired_at: now,
        };
        info!(
            service,
            expires_at = ?record.expires_at,
            "acquired access token"
        );
        Ok(record)
    }
}

#[async_trait]
impl Provider for OAuthProvider {
    fn name(&self) -> &str {
        "oauth"
    }

    fn can_handle(&self, reference: &Reference) -> bool {
        matches_namespace(reference, "oauth")
    }

    async fn resolve(&self, identifier: &str) -> Result<Secret, ProviderError> {
        let service = identifier.trim();
        if service.is_empty() {
            return Err(ProviderError::new(
                ErrorKind::InvalidIdentifier,
                "empty OAuth service name",
            ));
        }

        self.refresh_services()?;

        if let Some(record) = self.cached_token(service) {
            debug!(service, "using cached access token");
            return Ok(record.access_token);
        }

        let config = self.service_config(service).ok_or_else(|| {
            ProviderError::config_missing(format!(
                "no [oauth.{}] section in {}",
                service,
                self.services_file.display()
            ))
        })?;

        let record = self.request_token(service, &config).await?;
        let token = record.access_token.clone();
        self.tokens.lock().insert(service.to_string(), record);
        Ok(token)
    }

    async fn load_config(&self) -> Result<(), ProviderError> {
        self.refresh_services()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn services_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file.flush().unwrap();
        file
    }

    fn provider_for(file: &tempfile::NamedTempFile) -> OAuthProvider {
        OAuthProvider::new(&OAuthConfig {
            services_file: file.path().to_path_buf(),
            expiry_buffer_secs: 300,
            request_timeout_secs: 2,
        })
    }

    fn token_body(token: &str, expires_in: i64) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": expires_in,
        })
    }

    #[test]
    fn test_token_record_staleness() {
        let fresh = OAuthTokenRecord {
            access_token: Secret::new("t"),
            token_type: "Bearer".to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            acquired_at: Utc::now(),
        };
        assert!(!fresh.is_stale(chrono::Duration::seconds(300)));
        // Inside the buffer counts as stale even though not yet expired.
        assert!(fresh.is_stale(chrono::Duration::hours(2)));

        let unbounded = OAuthTokenRecord {
            expires_at: None,
            ..fresh.clone()
        };
        assert!(!unbounded.is_stale(chrono::Duration::seconds(300)));
    }

    #[test]
    fn test_header_pairs_parsing() {
        let config = ServiceConfig {
            token_url: None,
            client_id: None,
            client_secret: None,
            grant_type: default_grant_type(),
            scope: None,
            auth_method: AuthMethod::Basic,
            content_type: None,
            audience: None,
            custom_headers: Some("X-Tenant: acme, X-Trace:1,malformed".to_string()),
        };
        let pairs = config.header_pairs();
        assert_eq!(
            pairs,
            vec![
                ("X-Tenant".to_string(), "acme".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_service_is_config_missing() {
        let file = services_file("");
        let provider = provider_for(&file);

        let err = provider.resolve("unknown").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigMissing);
    }

    #[tokio::test]
    async fn test_missing_required_fields_is_fatal() {
        let file = services_file("[oauth.partial]\nclient_id = \"id\"\n");
        let provider = provider_for(&file);

        let err = provider.resolve("partial").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigMissing);
    }

    #[tokio::test]
    async fn test_basic_auth_token_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("authorization", "Basic aWQ6c2VjcmV0"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("abc123", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\nclient_secret = \"secret\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        let token = provider.resolve("svc").await.unwrap();
        assert_eq!(token.expose(), "abc123");
    }

    #[tokio::test]
    async fn test_body_auth_includes_credentials_in_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("client_id=id"))
            .and(body_string_contains("client_secret=secret"))
            .and(body_string_contains("scope=read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\nclient_secret = \"secret\"\nauth_method = \"body\"\nscope = \"read\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        assert_eq!(provider.resolve("svc").await.unwrap().expose(), "tok");
    }

    #[tokio::test]
    async fn test_json_auth_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/json"))
            .and(body_string_contains("\"client_id\":\"id\""))
            .and(body_string_contains("\"audience\":\"https://api\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\nclient_secret = \"secret\"\nauth_method = \"json\"\naudience = \"https://api\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        assert_eq!(provider.resolve("svc").await.unwrap().expose(), "tok");
    }

    #[tokio::test]
    async fn test_custom_headers_attached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("x-tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\ncustom_headers = \"X-Tenant: acme\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        assert_eq!(provider.resolve("svc").await.unwrap().expose(), "tok");
    }

    #[tokio::test]
    async fn test_second_resolve_within_validity_hits_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("once", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\nclient_secret = \"s\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        assert_eq!(provider.resolve("svc").await.unwrap().expose(), "once");
        assert_eq!(provider.resolve("svc").await.unwrap().expose(), "once");
    }

    #[tokio::test]
    async fn test_token_inside_buffer_triggers_refresh() {
        let server = MockServer::start().await;
        // expires_in shorter than the buffer, so every resolve refreshes.
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("short", 60)))
            .expect(2)
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\nclient_secret = \"s\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        provider.resolve("svc").await.unwrap();
        provider.resolve("svc").await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\nclient_secret = \"s\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        let err = provider.resolve("svc").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailure);
    }

    #[tokio::test]
    async fn test_malformed_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let file = services_file(&format!(
            "[oauth.svc]\ntoken_url = \"{}/token\"\nclient_id = \"id\"\nclient_secret = \"s\"\n",
            server.uri()
        ));
        let provider = provider_for(&file);

        let err = provider.resolve("svc").await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Other(_)));
    }
}
