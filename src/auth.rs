//! Credential store and token authority.
//!
//! [`TokenCache`] persists access/refresh tokens to a local file and tracks
//! the decoded expiry of the short-lived editing API token. [`AuthManager`]
//! owns the token lifecycle: cached tokens first, portal-code exchange when
//! the cache is unusable, silent refresh before hard expiry, and validation
//! of everything the portal hands back.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{remediation_hint, AuthError};

/// Production portal host used for the one-time code exchange.
pub const PORTAL_SERVER: &str = "https://portal.askdelphi.com";

/// A token is treated as expired this many seconds before its real expiry,
/// so refresh happens proactively rather than mid-request.
pub const TOKEN_VALIDITY_BUFFER_SECS: u64 = 300;

/// Lifetime assumed for tokens whose payload cannot be decoded.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Signed JWTs are base64url-encoded JSON, which always starts with this.
const SIGNED_TOKEN_PREFIX: &str = "eyJ";

const USER_AGENT: &str = concat!("delphi-sync/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const BODY_EXCERPT_LEN: usize = 1000;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

static CMS_URL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn cms_url_pattern() -> &'static Regex {
    CMS_URL_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)/tenant/([^/]+)/project/([^/]+)/acl/([^/]+)")
            .expect("literal pattern compiles")
    })
}

/// Extract `(tenant_id, project_id, acl_entry_id)` from a CMS URL.
///
/// The path keywords are matched case-insensitively. A URL without the
/// `/tenant/.../project/.../acl/...` segment is a parse error.
pub fn parse_cms_url(url: &str) -> Result<(String, String, String), AuthError> {
    let captures = cms_url_pattern()
        .captures(url)
        .ok_or_else(|| AuthError::CmsUrl { url: url.to_string() })?;
    Ok((
        captures[1].to_string(),
        captures[2].to_string(),
        captures[3].to_string(),
    ))
}

/// Reduce a full URL to its origin (scheme + host, keeping any explicit port).
fn base_origin(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

fn truncate_body(body: &str) -> String {
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

fn hex_prefix(bytes: &[u8], limit: usize) -> String {
    bytes.iter().take(limit).map(|b| format!("{b:02x}")).collect()
}

/// Decode a response body as JSON: direct decode, then manual UTF-8, then
/// Latin-1 (which accepts any byte). The portal occasionally emits
/// byte-ambiguous encodings under compression; all three failing means the
/// body is not JSON at all.
fn decode_json_lossy(
    bytes: &[u8],
    content_type: &str,
    content_encoding: &str,
) -> Result<Value, AuthError> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Ok(value);
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return Ok(value);
        }
    }
    let latin1: String = bytes.iter().map(|&b| b as char).collect();
    if let Ok(value) = serde_json::from_str::<Value>(&latin1) {
        debug!("response body parsed via latin-1 fallback");
        return Ok(value);
    }
    Err(AuthError::ResponseParse {
        content_type: content_type.to_string(),
        content_encoding: content_encoding.to_string(),
        raw_prefix_hex: hex_prefix(bytes, 50),
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
    publication_url: Option<String>,
    saved_at: Option<u64>,
}

/// Holds access/refresh/API tokens and their expiry, persisted to a file.
#[derive(Debug)]
pub struct TokenCache {
    cache_file: PathBuf,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub publication_url: Option<String>,
    pub api_token: Option<String>,
    pub api_token_expiry: u64,
}

impl TokenCache {
    pub fn new(cache_file: impl AsRef<Path>) -> Self {
        Self {
            cache_file: cache_file.as_ref().to_path_buf(),
            access_token: None,
            refresh_token: None,
            publication_url: None,
            api_token: None,
            api_token_expiry: 0,
        }
    }

    /// Load persisted tokens. A missing or malformed file is not an error,
    /// it just means there are no cached credentials.
    pub fn load(&mut self) -> bool {
        let raw = match std::fs::read_to_string(&self.cache_file) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(file = %self.cache_file.display(), error = %err, "no cached tokens loaded");
                return false;
            }
        };
        match serde_json::from_str::<PersistedTokens>(&raw) {
            Ok(persisted) => {
                self.access_token = persisted.access_token;
                self.refresh_token = persisted.refresh_token;
                self.publication_url = persisted.publication_url;
                info!(file = %self.cache_file.display(), "cached tokens loaded");
                true
            }
            Err(err) => {
                debug!(file = %self.cache_file.display(), error = %err, "token cache file unreadable, ignoring");
                false
            }
        }
    }

    /// Persist the current tokens. Failure is logged and otherwise ignored;
    /// the credentials simply won't survive a process restart.
    pub fn save(&self) {
        let persisted = PersistedTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            publication_url: self.publication_url.clone(),
            saved_at: Some(now_secs()),
        };
        let serialised = match serde_json::to_string_pretty(&persisted) {
            Ok(serialised) => serialised,
            Err(err) => {
                warn!(error = %err, "could not serialise token cache");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.cache_file, serialised) {
            warn!(file = %self.cache_file.display(), error = %err, "could not save token cache");
        } else {
            debug!(file = %self.cache_file.display(), "tokens saved");
        }
    }

    /// True while the API token exists and `now < expiry - buffer`.
    pub fn is_api_token_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }

    fn is_valid_at(&self, now: u64) -> bool {
        self.api_token.is_some()
            && now < self.api_token_expiry.saturating_sub(TOKEN_VALIDITY_BUFFER_SECS)
    }

    /// Store an API token and derive its expiry from the JWT `exp` claim.
    /// Any decode failure falls back to a fixed default lifetime; token
    /// validity must never block on parse correctness.
    pub fn set_api_token(&mut self, token: &str) {
        self.api_token = Some(token.to_string());
        match decode_jwt_exp(token) {
            Some(exp) => {
                debug!(expires_at = exp, "token expiry decoded from JWT payload");
                self.api_token_expiry = exp;
            }
            None => {
                warn!("could not parse JWT expiry, assuming default lifetime");
                self.api_token_expiry = now_secs() + DEFAULT_TOKEN_LIFETIME_SECS;
            }
        }
    }
}

fn decode_jwt_exp(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let padded = match payload.len() % 4 {
        0 => payload.to_string(),
        n => format!("{payload}{}", "=".repeat(4 - n)),
    };
    let bytes = URL_SAFE.decode(padded).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_u64()
}

/// Produces a currently-valid editing API token on demand, transparently
/// exchanging a one-time portal code or refreshing as needed.
#[derive(Debug)]
pub struct AuthManager {
    http: reqwest::Client,
    portal_server: String,
    portal_code: Option<String>,
    pub cache: TokenCache,
}

impl AuthManager {
    pub fn new(mut cache: TokenCache, portal_code: Option<String>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        cache.load();
        Ok(Self {
            http,
            portal_server: PORTAL_SERVER.to_string(),
            portal_code,
            cache,
        })
    }

    /// Point the manager at a different portal host. Used by tests.
    pub fn with_portal_server(mut self, url: impl Into<String>) -> Self {
        self.portal_server = url.into();
        self
    }

    /// Authenticate against the portal.
    ///
    /// Cached tokens are tried first; if they are unusable the one-time
    /// portal code is exchanged for fresh tokens. The code is resolved as
    /// explicit argument > constructor value > environment (already merged
    /// into settings by `load_config`).
    pub async fn authenticate(&mut self, portal_code: Option<&str>) -> Result<(), AuthError> {
        if self.cache.access_token.is_some() && self.cache.publication_url.is_some() {
            info!("cached tokens found, trying them first");
            match self.fetch_editing_token().await {
                Ok(()) => {
                    info!("authenticated with cached tokens");
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "cached tokens rejected, falling back to portal code");
                }
            }
        }

        let code = portal_code
            .map(str::to_string)
            .or_else(|| self.portal_code.clone())
            .ok_or_else(|| AuthError::Configuration {
                missing: "portal code".to_string(),
                sources: "argument to authenticate(), Settings::portal_code, \
                          or ASKDELPHI_PORTAL_CODE in the .env file"
                    .to_string(),
            })?;

        self.exchange_portal_code(&code).await?;
        self.fetch_editing_token().await?;
        info!("authentication successful");
        Ok(())
    }

    /// Return a valid editing API token, refreshing or re-fetching as needed.
    pub async fn get_api_token(&mut self) -> Result<String, AuthError> {
        if self.cache.is_api_token_valid() {
            if let Some(token) = &self.cache.api_token {
                debug!("using cached API token (still valid)");
                return Ok(token.clone());
            }
        }

        if self.cache.refresh_token.is_some() {
            debug!("API token expired or expiring soon, attempting refresh");
            if let Err(err) = self.refresh_tokens().await {
                warn!(error = %err, "token refresh failed, fetching a fresh editing token");
            }
        }

        self.fetch_editing_token().await?;
        self.cache.api_token.clone().ok_or_else(|| AuthError::Configuration {
            missing: "editing API token".to_string(),
            sources: "call authenticate() before requesting an API token".to_string(),
        })
    }

    async fn exchange_portal_code(&mut self, code: &str) -> Result<(), AuthError> {
        info!("exchanging portal code for tokens");
        let url = format!(
            "{}/api/session/registration?sessionCode={}",
            self.portal_server, code
        );
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let content_type = header_value(&response, reqwest::header::CONTENT_TYPE);
        let content_encoding = header_value(&response, reqwest::header::CONTENT_ENCODING);
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(AuthError::Exchange {
                context: "portal code exchange",
                status: status.as_u16(),
                url,
                content_type,
                body: truncate_body(&String::from_utf8_lossy(&bytes)),
                hint: remediation_hint(status.as_u16()),
            });
        }

        let data = decode_json_lossy(&bytes, &content_type, &content_encoding)?;

        let access_token = data.get("accessToken").and_then(Value::as_str);
        let full_url = data.get("url").and_then(Value::as_str).unwrap_or("");
        // The portal returns a full publication URL with a deep path; only
        // the origin is usable as an API base.
        let publication_url = base_origin(full_url);

        if access_token.is_none() || publication_url.is_none() {
            return Err(AuthError::Exchange {
                context: "portal code exchange",
                status: status.as_u16(),
                url,
                content_type,
                body: truncate_body(&data.to_string()),
                hint: "the portal response did not include an accessToken and url; \
                       the code may already have been consumed (portal codes are single-use)",
            });
        }

        self.cache.access_token = access_token.map(str::to_string);
        self.cache.refresh_token = data
            .get("refreshToken")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.cache.publication_url = publication_url;
        info!(
            publication_url = self.cache.publication_url.as_deref().unwrap_or(""),
            "portal code exchanged, tokens received"
        );
        self.cache.save();
        Ok(())
    }

    async fn fetch_editing_token(&mut self) -> Result<(), AuthError> {
        let (access_token, publication_url) =
            match (&self.cache.access_token, &self.cache.publication_url) {
                (Some(access), Some(publication)) => (access.clone(), publication.clone()),
                _ => {
                    return Err(AuthError::Configuration {
                        missing: "access token and publication URL".to_string(),
                        sources: "call authenticate() first".to_string(),
                    })
                }
            };

        let url = format!("{publication_url}/api/token/EditingApiToken");
        debug!(url = %url, "fetching editing API token");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let content_type = header_value(&response, reqwest::header::CONTENT_TYPE);
        let content_encoding = header_value(&response, reqwest::header::CONTENT_ENCODING);
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(AuthError::Exchange {
                context: "editing token fetch",
                status: status.as_u16(),
                url,
                content_type,
                body: truncate_body(&String::from_utf8_lossy(&bytes)),
                hint: remediation_hint(status.as_u16()),
            });
        }

        // HTML here means the publication URL points at a page, not the API.
        if content_type.to_lowercase().contains("html") {
            return Err(AuthError::WrongEndpoint {
                url,
                content_type,
                publication_url,
            });
        }

        let token = match decode_json_lossy(&bytes, &content_type, &content_encoding) {
            Ok(Value::String(token)) => token,
            Ok(Value::Object(fields)) => fields
                .get("token")
                .or_else(|| fields.get("accessToken"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(fields.clone()).to_string()),
            Ok(other) => other.to_string(),
            Err(_) => String::from_utf8_lossy(&bytes).trim().trim_matches('"').to_string(),
        };

        if !token.starts_with(SIGNED_TOKEN_PREFIX) {
            return Err(AuthError::InvalidTokenFormat {
                prefix: token.chars().take(50).collect(),
            });
        }

        info!("editing API token received");
        self.cache.set_api_token(&token);
        Ok(())
    }

    async fn refresh_tokens(&mut self) -> Result<(), AuthError> {
        let (refresh_token, publication_url) =
            match (&self.cache.refresh_token, &self.cache.publication_url) {
                (Some(refresh), Some(publication)) => (refresh.clone(), publication.clone()),
                _ => {
                    return Err(AuthError::Configuration {
                        missing: "refresh token".to_string(),
                        sources: "authenticate() stores one after a portal code exchange".to_string(),
                    })
                }
            };
        let access_token = self.cache.access_token.clone().unwrap_or_default();

        let url = format!(
            "{publication_url}/api/token/refresh?token={access_token}&refreshToken={refresh_token}"
        );
        debug!("refreshing tokens");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let content_type = header_value(&response, reqwest::header::CONTENT_TYPE);
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(AuthError::Exchange {
                context: "token refresh",
                status: status.as_u16(),
                url,
                content_type,
                body: truncate_body(&String::from_utf8_lossy(&bytes)),
                hint: remediation_hint(status.as_u16()),
            });
        }

        let data = decode_json_lossy(&bytes, &content_type, "")?;
        if let Some(access) = data
            .get("token")
            .or_else(|| data.get("accessToken"))
            .and_then(Value::as_str)
        {
            self.cache.access_token = Some(access.to_string());
        }
        if let Some(refresh) = data
            .get("refresh")
            .or_else(|| data.get("refreshToken"))
            .and_then(Value::as_str)
        {
            self.cache.refresh_token = Some(refresh.to_string());
        }
        self.cache.save();
        info!("tokens refreshed");
        Ok(())
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}
