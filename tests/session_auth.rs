//! Session and authentication behaviour against a mock HTTP server.

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use delphi_sync::auth::{AuthManager, TokenCache};
use delphi_sync::config::{AuthMode, Settings};
use delphi_sync::error::{ApiError, AuthError};
use delphi_sync::session::Session;

fn traditional_settings(server: &MockServer, cache_dir: &tempfile::TempDir) -> Settings {
    Settings {
        base_url: Some(server.uri()),
        api_key: Some("key-1".to_string()),
        tenant: Some("t-1".to_string()),
        nt_account: Some("svc".to_string()),
        acl: vec!["a-1".to_string()],
        project_id: Some("p-1".to_string()),
        token_cache_file: cache_dir.path().join("tokens.json"),
        ..Settings::default()
    }
}

const TOPIC_PATH: &str = "v1/tenant/{tenantId}/project/{projectId}/acl/{aclEntryId}/topic/topic-9";

fn session_token_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(serde_json::json!({ "sessionToken": token, "expiresIn": 3600 }))
}

#[tokio::test]
async fn traditional_mode_exchanges_api_key_and_substitutes_placeholders() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("POST"))
        .and(path("/auth/session"))
        .respond_with(session_token_response("tok-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tenant/t-1/project/p-1/acl/a-1/topic/topic-9"))
        .and(header("Authorization", "Bearer tok-1"))
        .and(header("X-API-Key", "key-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "topicId": "topic-9",
            "topicTitle": "A topic"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::from_settings(&traditional_settings(&server, &cache_dir))
        .expect("session should build");
    let value = session.get(TOPIC_PATH).await.expect("request should succeed");
    assert_eq!(value["topicId"], "topic-9");
}

#[tokio::test]
async fn a_401_triggers_exactly_one_reauthentication_and_retry() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");

    // First exchange yields tok-1, the forced re-authentication yields tok-2.
    Mock::given(method("POST"))
        .and(path("/auth/session"))
        .respond_with(session_token_response("tok-1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/session"))
        .respond_with(session_token_response("tok-2"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/tenant/t-1/project/p-1/acl/a-1/topic/topic-9"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tenant/t-1/project/p-1/acl/a-1/topic/topic-9"))
        .and(header("Authorization", "Bearer tok-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "topicId": "topic-9" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::from_settings(&traditional_settings(&server, &cache_dir))
        .expect("session should build");
    let value = session.get(TOPIC_PATH).await.expect("retry should succeed");
    assert_eq!(value["topicId"], "topic-9");
}

#[tokio::test]
async fn a_second_401_surfaces_without_a_third_attempt() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("POST"))
        .and(path("/auth/session"))
        .respond_with(session_token_response("tok"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tenant/t-1/project/p-1/acl/a-1/topic/topic-9"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .expect(2)
        .mount(&server)
        .await;

    let session = Session::from_settings(&traditional_settings(&server, &cache_dir))
        .expect("session should build");
    let err = session.get(TOPIC_PATH).await.expect_err("second 401 must fail");
    match err {
        ApiError::Auth { status, .. } => assert_eq!(status, 401),
        other => panic!("expected ApiError::Auth, got {other:?}"),
    }
}

#[tokio::test]
async fn cached_mode_exchanges_portal_code_and_fetches_editing_token() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");

    // The registration response carries a deep publication URL; only its
    // origin may be used as the API base afterwards.
    Mock::given(method("GET"))
        .and(path("/api/session/registration"))
        .and(query_param("sessionCode", "CODE-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "eyJacc",
            "refreshToken": "refresh-1",
            "url": format!("{}/nl-NL/Project/page", server.uri()),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token/EditingApiToken"))
        .and(header("Authorization", "Bearer eyJacc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!("eyJedit.tok.sig")))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCache::new(cache_dir.path().join("tokens.json"));
    let mut manager = AuthManager::new(cache, Some("CODE-1".to_string()))
        .expect("manager should build")
        .with_portal_server(server.uri());
    manager.authenticate(None).await.expect("authentication should succeed");

    let token = manager.get_api_token().await.expect("token should be cached");
    assert_eq!(token, "eyJedit.tok.sig");
    assert_eq!(
        manager.cache.publication_url.as_deref(),
        Some(server.uri().as_str())
    );
    assert_eq!(manager.cache.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn expired_api_token_is_refreshed_before_reuse() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/api/token/refresh"))
        .and(query_param("token", "eyJold-access"))
        .and(query_param("refreshToken", "refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "eyJnew-access",
            "refresh": "refresh-2",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token/EditingApiToken"))
        .and(header("Authorization", "Bearer eyJnew-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!("eyJedit.2.sig")))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCache::new(cache_dir.path().join("tokens.json"));
    let mut manager = AuthManager::new(cache, None)
        .expect("manager should build")
        .with_portal_server(server.uri());
    manager.cache.access_token = Some("eyJold-access".to_string());
    manager.cache.refresh_token = Some("refresh-1".to_string());
    manager.cache.publication_url = Some(server.uri());
    manager.cache.api_token = Some("eyJstale".to_string());
    manager.cache.api_token_expiry = 0;

    let token = manager.get_api_token().await.expect("refresh should succeed");
    assert_eq!(token, "eyJedit.2.sig");
    assert_eq!(manager.cache.access_token.as_deref(), Some("eyJnew-access"));
    assert_eq!(manager.cache.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn html_from_the_token_endpoint_is_a_wrong_endpoint_error() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/api/session/registration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "eyJacc",
            "refreshToken": "refresh-1",
            "url": format!("{}/portal/home", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token/EditingApiToken"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body>login</body></html>",
            "text/html; charset=utf-8",
        ))
        .mount(&server)
        .await;

    let cache = TokenCache::new(cache_dir.path().join("tokens.json"));
    let mut manager = AuthManager::new(cache, Some("CODE-1".to_string()))
        .expect("manager should build")
        .with_portal_server(server.uri());
    let err = manager.authenticate(None).await.expect_err("HTML must be rejected");
    assert!(matches!(err, AuthError::WrongEndpoint { .. }), "got {err:?}");
}

#[tokio::test]
async fn consumed_portal_code_reports_the_status_and_hint() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");

    Mock::given(method("GET"))
        .and(path("/api/session/registration"))
        .respond_with(ResponseTemplate::new(401).set_body_string("code already used"))
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCache::new(cache_dir.path().join("tokens.json"));
    let mut manager = AuthManager::new(cache, Some("USED-CODE".to_string()))
        .expect("manager should build")
        .with_portal_server(server.uri());
    let err = manager.authenticate(None).await.expect_err("consumed code must fail");
    match err {
        AuthError::Exchange { status, body, .. } => {
            assert_eq!(status, 401);
            assert!(body.contains("code already used"));
        }
        other => panic!("expected Exchange error, got {other:?}"),
    }
}

#[tokio::test]
async fn cached_mode_without_a_code_is_a_configuration_error() {
    let cache_dir = tempfile::tempdir().expect("tempdir");
    let cache = TokenCache::new(cache_dir.path().join("tokens.json"));
    let mut manager = AuthManager::new(cache, None).expect("manager should build");
    let err = manager.authenticate(None).await.expect_err("no code must fail");
    match err {
        AuthError::Configuration { missing, .. } => assert!(missing.contains("portal code")),
        other => panic!("expected Configuration error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_api_key_blocks_traditional_sessions() {
    let settings = Settings {
        base_url: Some("http://localhost".to_string()),
        tenant: Some("t".to_string()),
        project_id: Some("p".to_string()),
        acl: vec!["a".to_string()],
        auth_mode: AuthMode::Traditional,
        ..Settings::default()
    };
    let err = Session::from_settings(&settings).expect_err("api key is required");
    assert!(matches!(err, AuthError::Configuration { .. }));
}
