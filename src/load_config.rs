//! Builds [`Settings`] from environment variables.
//!
//! Secrets and connection parameters come from the environment (usually a
//! `.env` file loaded by the binary). Nothing is required at this stage;
//! mode-dependent validation happens when the session is constructed, so
//! the error can name exactly what is missing for the selected mode.

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{AuthMode, Settings, DEFAULT_LANGUAGE, DEFAULT_TOKEN_CACHE_FILE};

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_bool(name: &str, default: bool) -> bool {
    match get_env(name) {
        Some(raw) => raw.eq_ignore_ascii_case("true"),
        None => default,
    }
}

/// Read all `ASKDELPHI_*` settings from the environment.
pub fn load_settings() -> Settings {
    let auth_mode = match get_env("ASKDELPHI_AUTH_MODE").as_deref() {
        Some(raw) if raw.eq_ignore_ascii_case("cache") => AuthMode::Cached,
        Some(raw) if raw.eq_ignore_ascii_case("traditional") => AuthMode::Traditional,
        Some(other) => {
            warn!(mode = %other, "unknown ASKDELPHI_AUTH_MODE, defaulting to traditional");
            AuthMode::Traditional
        }
        None => AuthMode::Traditional,
    };

    let acl = get_env("ASKDELPHI_ACL")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let settings = Settings {
        base_url: get_env("ASKDELPHI_BASE_URL"),
        api_key: get_env("ASKDELPHI_API_KEY"),
        tenant: get_env("ASKDELPHI_TENANT"),
        nt_account: get_env("ASKDELPHI_NT_ACCOUNT"),
        acl,
        project_id: get_env("ASKDELPHI_PROJECT_ID"),
        cms_url: get_env("ASKDELPHI_CMS_URL"),
        portal_code: get_env("ASKDELPHI_PORTAL_CODE"),
        portal_server: get_env("ASKDELPHI_PORTAL_SERVER"),
        auth_mode,
        skip_checkout_checkin: get_env_bool("SKIP_CHECKOUT_CHECKIN", true),
        token_cache_file: get_env("ASKDELPHI_TOKEN_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_CACHE_FILE)),
        language: get_env("ASKDELPHI_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
    };

    info!(
        auth_mode = ?settings.auth_mode,
        base_url = settings.base_url.as_deref().unwrap_or("<unset>"),
        skip_checkout_checkin = settings.skip_checkout_checkin,
        "settings loaded from environment"
    );

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "ASKDELPHI_BASE_URL",
            "ASKDELPHI_API_KEY",
            "ASKDELPHI_TENANT",
            "ASKDELPHI_NT_ACCOUNT",
            "ASKDELPHI_ACL",
            "ASKDELPHI_PROJECT_ID",
            "ASKDELPHI_CMS_URL",
            "ASKDELPHI_PORTAL_CODE",
            "ASKDELPHI_PORTAL_SERVER",
            "ASKDELPHI_AUTH_MODE",
            "SKIP_CHECKOUT_CHECKIN",
            "ASKDELPHI_TOKEN_CACHE",
            "ASKDELPHI_LANGUAGE",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn defaults_when_environment_is_empty() {
        clear_env();
        let settings = load_settings();
        assert_eq!(settings.auth_mode, AuthMode::Traditional);
        assert!(settings.skip_checkout_checkin);
        assert!(settings.base_url.is_none());
        assert_eq!(settings.language, DEFAULT_LANGUAGE);
        assert_eq!(
            settings.token_cache_file,
            PathBuf::from(DEFAULT_TOKEN_CACHE_FILE)
        );
    }

    #[test]
    #[serial]
    fn parses_acl_list_and_auth_mode() {
        clear_env();
        std::env::set_var("ASKDELPHI_AUTH_MODE", "cache");
        std::env::set_var("ASKDELPHI_ACL", "acl-1, acl-2 ,,acl-3");
        std::env::set_var("SKIP_CHECKOUT_CHECKIN", "false");
        let settings = load_settings();
        assert_eq!(settings.auth_mode, AuthMode::Cached);
        assert_eq!(settings.acl, vec!["acl-1", "acl-2", "acl-3"]);
        assert!(!settings.skip_checkout_checkin);
        clear_env();
    }
}
