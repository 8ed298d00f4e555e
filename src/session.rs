//! Authenticated HTTP session against the CMS.
//!
//! A [`Session`] resolves path placeholders, attaches the right credentials
//! for the configured mode and retries a request exactly once after a 401
//! by forcing re-authentication. Services never deal with tokens directly.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{parse_cms_url, AuthManager, TokenCache};
use crate::config::{AuthMode, SessionContext, Settings};
use crate::error::{ApiError, AuthError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("delphi-sync/", env!("CARGO_PKG_VERSION"));

/// Session-token lifetime assumed when the server does not state one.
const DEFAULT_SESSION_LIFETIME_SECS: u64 = 3600;

const BODY_EXCERPT_LEN: usize = 1000;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct SessionTokenState {
    token: Option<String>,
    expiry: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionTokenResponse {
    session_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug)]
enum SessionAuth {
    /// Portal-code flow delegating token lifecycle to [`AuthManager`].
    Cached(Mutex<AuthManager>),
    /// API-key exchange for a wall-clock session token.
    Traditional {
        api_key: String,
        nt_account: String,
        acl: Vec<String>,
        state: Mutex<SessionTokenState>,
    },
}

/// One authenticated connection to a tenant/project/ACL scope.
#[derive(Debug)]
pub struct Session {
    http: reqwest::Client,
    base_url: String,
    context: SessionContext,
    auth: SessionAuth,
}

impl Session {
    /// Build a session from merged settings.
    ///
    /// Tenant, project and ACL may come from dedicated variables or be
    /// parsed out of the composite CMS URL; explicit values win. Whatever
    /// is still missing is reported in a single configuration error.
    pub fn from_settings(settings: &Settings) -> Result<Self, AuthError> {
        let mut tenant = settings.tenant.clone();
        let mut project = settings.project_id.clone();
        let mut acl_entry = settings.acl.first().cloned();

        if let Some(cms_url) = &settings.cms_url {
            match parse_cms_url(cms_url) {
                Ok((url_tenant, url_project, url_acl)) => {
                    tenant = tenant.or(Some(url_tenant));
                    project = project.or(Some(url_project));
                    acl_entry = acl_entry.or(Some(url_acl));
                }
                Err(err) => {
                    warn!(error = %err, "CMS URL set but unparseable, relying on explicit variables");
                }
            }
        }

        let mut missing = Vec::new();
        if tenant.is_none() {
            missing.push("ASKDELPHI_TENANT (or ASKDELPHI_CMS_URL)");
        }
        if project.is_none() {
            missing.push("ASKDELPHI_PROJECT_ID (or ASKDELPHI_CMS_URL)");
        }
        if acl_entry.is_none() {
            missing.push("ASKDELPHI_ACL (or ASKDELPHI_CMS_URL)");
        }
        if settings.base_url.is_none() {
            missing.push("ASKDELPHI_BASE_URL");
        }
        if settings.auth_mode == AuthMode::Traditional && settings.api_key.is_none() {
            missing.push("ASKDELPHI_API_KEY");
        }
        if !missing.is_empty() {
            return Err(AuthError::Configuration {
                missing: missing.join(", "),
                sources: "environment variables or the .env file".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        let context = SessionContext {
            tenant_id: tenant.unwrap_or_default(),
            project_id: project.unwrap_or_default(),
            acl_entry_id: acl_entry.unwrap_or_default(),
        };

        let auth = match settings.auth_mode {
            AuthMode::Cached => {
                let cache = TokenCache::new(&settings.token_cache_file);
                let mut manager = AuthManager::new(cache, settings.portal_code.clone())?;
                if let Some(portal_server) = &settings.portal_server {
                    manager = manager.with_portal_server(portal_server);
                }
                SessionAuth::Cached(Mutex::new(manager))
            }
            AuthMode::Traditional => SessionAuth::Traditional {
                api_key: settings.api_key.clone().unwrap_or_default(),
                nt_account: settings.nt_account.clone().unwrap_or_default(),
                acl: settings.acl.clone(),
                state: Mutex::new(SessionTokenState::default()),
            },
        };

        info!(
            tenant = %context.tenant_id,
            project = %context.project_id,
            acl = %context.acl_entry_id,
            mode = ?settings.auth_mode,
            "session configured"
        );

        Ok(Self {
            http,
            base_url: settings.base_url.clone().unwrap_or_default(),
            context,
            auth,
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    fn resolve_url(&self, path: &str) -> String {
        let resolved = path
            .replace("{tenantId}", &self.context.tenant_id)
            .replace("{projectId}", &self.context.project_id)
            .replace("{aclEntryId}", &self.context.acl_entry_id);
        format!("{}/{}", self.base_url.trim_end_matches('/'), resolved)
    }

    async fn bearer_token(&self) -> Result<String, ApiError> {
        match &self.auth {
            SessionAuth::Cached(manager) => {
                let mut manager = manager.lock().await;
                Ok(manager.get_api_token().await?)
            }
            SessionAuth::Traditional { state, .. } => {
                {
                    let state = state.lock().await;
                    if let Some(token) = &state.token {
                        if now_secs() < state.expiry {
                            return Ok(token.clone());
                        }
                    }
                }
                self.refresh_session_token().await
            }
        }
    }

    /// Exchange the API key for a fresh session token.
    async fn refresh_session_token(&self) -> Result<String, ApiError> {
        let (api_key, nt_account, acl, state) = match &self.auth {
            SessionAuth::Traditional { api_key, nt_account, acl, state } => {
                (api_key, nt_account, acl, state)
            }
            SessionAuth::Cached(_) => {
                return Err(ApiError::Credentials(AuthError::Configuration {
                    missing: "session token exchange".to_string(),
                    sources: "only available in traditional auth mode".to_string(),
                }))
            }
        };

        let url = format!("{}/auth/session", self.base_url.trim_end_matches('/'));
        debug!(url = %url, "requesting session token");
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "apiKey": api_key,
                "tenant": self.context.tenant_id,
                "ntAccount": nt_account,
                "acl": acl,
                "projectId": self.context.project_id,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth {
                status: status.as_u16(),
                url,
                body: excerpt(&body),
            });
        }

        let token_response: SessionTokenResponse = response.json().await?;
        let expiry =
            now_secs() + token_response.expires_in.unwrap_or(DEFAULT_SESSION_LIFETIME_SECS);
        let mut state = state.lock().await;
        state.token = Some(token_response.session_token.clone());
        state.expiry = expiry;
        info!(expires_at = expiry, "session token acquired");
        Ok(token_response.session_token)
    }

    /// Throw away the current credentials and obtain fresh ones.
    async fn force_reauthentication(&self) -> Result<(), ApiError> {
        match &self.auth {
            SessionAuth::Cached(manager) => {
                let mut manager = manager.lock().await;
                manager.cache.api_token = None;
                manager.cache.api_token_expiry = 0;
                manager.authenticate(None).await?;
                Ok(())
            }
            SessionAuth::Traditional { state, .. } => {
                {
                    let mut state = state.lock().await;
                    state.token = None;
                    state.expiry = 0;
                }
                self.refresh_session_token().await?;
                Ok(())
            }
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let token = self.bearer_token().await?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let SessionAuth::Traditional { api_key, .. } = &self.auth {
            request = request.header("X-API-Key", api_key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Perform an authenticated request with placeholder substitution.
    ///
    /// A 401 triggers exactly one forced re-authentication and resend; a
    /// second 401 surfaces as [`ApiError::Auth`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.resolve_url(path);
        let mut response = self.send(&method, &url, body).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!(url = %url, "401 received, re-authenticating and retrying once");
            self.force_reauthentication().await?;
            response = self.send(&method, &url, body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let excerpt = excerpt(&body_text);
            return Err(if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                ApiError::Auth { status: status.as_u16(), url, body: excerpt }
            } else {
                ApiError::Status { status: status.as_u16(), url, body: excerpt }
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, path, None).await
    }
}

fn excerpt(body: &str) -> String {
    if body.len() > BODY_EXCERPT_LEN {
        let mut end = BODY_EXCERPT_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            base_url: Some("https://api.example.com/".to_string()),
            api_key: Some("key".to_string()),
            tenant: Some("t-1".to_string()),
            nt_account: Some("svc".to_string()),
            acl: vec!["a-1".to_string()],
            project_id: Some("p-1".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn resolves_placeholders_and_joins_base() {
        let session = Session::from_settings(&test_settings()).expect("session");
        let url = session.resolve_url("v4/tenant/{tenantId}/project/{projectId}/acl/{aclEntryId}/topic");
        assert_eq!(url, "https://api.example.com/v4/tenant/t-1/project/p-1/acl/a-1/topic");
    }

    #[test]
    fn cms_url_fills_missing_context() {
        let settings = Settings {
            base_url: Some("https://api.example.com".to_string()),
            api_key: Some("key".to_string()),
            cms_url: Some(
                "https://x.askdelphi.com/cms/tenant/t-9/project/p-9/acl/a-9/home".to_string(),
            ),
            ..Settings::default()
        };
        let session = Session::from_settings(&settings).expect("session");
        assert_eq!(session.context().tenant_id, "t-9");
        assert_eq!(session.context().project_id, "p-9");
        assert_eq!(session.context().acl_entry_id, "a-9");
    }

    #[test]
    fn explicit_variables_win_over_cms_url() {
        let mut settings = test_settings();
        settings.cms_url =
            Some("https://x.askdelphi.com/cms/tenant/other/project/other/acl/other/".to_string());
        let session = Session::from_settings(&settings).expect("session");
        assert_eq!(session.context().tenant_id, "t-1");
    }

    #[test]
    fn missing_configuration_names_every_gap() {
        let err = Session::from_settings(&Settings::default());
        match err {
            Err(AuthError::Configuration { missing, .. }) => {
                assert!(missing.contains("ASKDELPHI_TENANT"));
                assert!(missing.contains("ASKDELPHI_BASE_URL"));
                assert!(missing.contains("ASKDELPHI_API_KEY"));
            }
            other => panic!("expected Configuration error, got {other:?}"),
        }
    }
}
