//! Error taxonomy for authentication and CMS API calls.
//!
//! Authentication and topic-mutation errors propagate and abort the run;
//! enrichment errors (relations, tags) and per-child cascade failures are
//! logged at the call site and never surface through these types.

use thiserror::Error;

/// Errors raised by the credential store and token authority.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required configuration value is absent. The message names every
    /// source the caller may supply it from, so it is actionable before
    /// any network call is made.
    #[error("missing required configuration: {missing}. Provide it via: {sources}")]
    Configuration { missing: String, sources: String },

    /// A CMS URL did not match the `/tenant/{{T}}/project/{{P}}/acl/{{A}}` grammar.
    #[error(
        "could not parse CMS URL: {url}\n\
         expected format: https://xxx.askdelphi.com/cms/tenant/{{TENANT_ID}}/project/{{PROJECT_ID}}/acl/{{ACL_ENTRY_ID}}/..."
    )]
    CmsUrl { url: String },

    /// The portal or publication server rejected a token request.
    #[error(
        "{context} failed: HTTP {status} at {url} (content-type: {content_type})\n\
         {body}\n{hint}"
    )]
    Exchange {
        context: &'static str,
        status: u16,
        url: String,
        content_type: String,
        body: String,
        hint: &'static str,
    },

    /// The response body could not be parsed as JSON after the
    /// UTF-8/Latin-1 decode cascade.
    #[error(
        "failed to parse JSON response (content-type: {content_type}, content-encoding: {content_encoding}); \
         raw bytes: {raw_prefix_hex}"
    )]
    ResponseParse {
        content_type: String,
        content_encoding: String,
        raw_prefix_hex: String,
    },

    /// The editing-token endpoint answered with HTML, which signals a
    /// misconfigured publication URL rather than a token.
    #[error(
        "received HTML instead of JSON from {url} (content-type: {content_type}); \
         the publication URL is likely wrong, it must be the bare origin \
         (e.g. https://company.askdelphi.com), current value: {publication_url}"
    )]
    WrongEndpoint {
        url: String,
        content_type: String,
        publication_url: String,
    },

    /// The extracted token does not start with the signed-JWT prefix.
    #[error(
        "editing API token does not look like a signed JWT (starts with {prefix:?}); \
         the server may have returned an error page instead of a token"
    )]
    InvalidTokenFormat { prefix: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Map an HTTP status to a remediation hint for token-exchange failures.
pub(crate) fn remediation_hint(status: u16) -> &'static str {
    match status {
        401 => {
            "401 Unauthorized: the portal code may be invalid, expired or already consumed. \
             Portal codes are single-use; fetch a fresh one from the Mobile tab."
        }
        403 => "403 Forbidden: access denied, check your permissions.",
        404 => {
            "404 Not Found: the endpoint does not exist at this URL; \
             verify the portal server address (https://portal.askdelphi.com)."
        }
        500.. => "5xx server error: the server is having trouble, retry later.",
        _ => "",
    }
}

/// Errors raised by the API session and domain services.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authorization failure that survived the one-shot re-authentication retry.
    #[error("authorization failed: HTTP {status} at {url} after one re-authentication retry: {body}")]
    Auth { status: u16, url: String, body: String },

    /// Any other non-2xx CMS response.
    #[error("CMS API error: HTTP {status} at {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("failed to decode CMS response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Failure inside the credential layer while resolving a bearer token.
    #[error(transparent)]
    Credentials(#[from] AuthError),
}
