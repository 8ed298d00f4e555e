//! Explicit configuration threaded into each component constructor.
//!
//! No component reads ambient global state; everything a `Session`,
//! `Mapper` or `Importer` needs arrives through these values.

use std::path::PathBuf;

/// Default location of the persisted token cache.
pub const DEFAULT_TOKEN_CACHE_FILE: &str = ".askdelphi_tokens.json";

/// Default content language for created topics.
pub const DEFAULT_LANGUAGE: &str = "nl-NL";

/// How the session authenticates against the CMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Portal-code exchange with a persisted token cache and a decoded-JWT
    /// expiry (editing API token).
    Cached,
    /// Long-lived API key exchanged for a session token with a wall-clock
    /// expiry, sent alongside an `X-API-Key` header.
    Traditional,
}

/// Path context required by every CMS call.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub tenant_id: String,
    pub project_id: String,
    pub acl_entry_id: String,
}

/// Merged settings for a run. Built from the environment by
/// [`crate::load_config::load_settings`], or constructed directly in tests.
#[derive(Debug, Clone)]
pub struct Settings {
    /// CMS API base URL.
    pub base_url: Option<String>,
    /// API key for traditional-mode authentication.
    pub api_key: Option<String>,
    pub tenant: Option<String>,
    pub nt_account: Option<String>,
    pub acl: Vec<String>,
    pub project_id: Option<String>,
    /// Composite CMS URL carrying tenant/project/acl in its path.
    pub cms_url: Option<String>,
    /// One-time portal code for cached-mode authentication.
    pub portal_code: Option<String>,
    /// Portal server override; defaults to the production portal.
    pub portal_server: Option<String>,
    pub auth_mode: AuthMode,
    /// Bypass the checkout/checkin bracket (mock backends only).
    pub skip_checkout_checkin: bool,
    pub token_cache_file: PathBuf,
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            tenant: None,
            nt_account: None,
            acl: Vec::new(),
            project_id: None,
            cms_url: None,
            portal_code: None,
            portal_server: None,
            auth_mode: AuthMode::Traditional,
            skip_checkout_checkin: true,
            token_cache_file: PathBuf::from(DEFAULT_TOKEN_CACHE_FILE),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}
