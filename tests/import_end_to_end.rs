//! Full import flow over HTTP: document in, CMS calls out.

use std::sync::Arc;

use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use delphi_sync::client::DelphiClient;
use delphi_sync::config::Settings;
use delphi_sync::importer::Importer;
use delphi_sync::mapper::{Mapper, ProcessDocument};
use delphi_sync::session::Session;
use delphi_sync::topic_types::TypeCatalog;

const DOCUMENT: &str = r#"{
    "process": {
        "id": "proc-1",
        "title": "Onboarding",
        "tasks": [
            {
                "id": "task-1",
                "title": "Account aanmaken",
                "steps": [
                    {
                        "id": "step-1",
                        "title": "Formulier invullen",
                        "instructions": [
                            {
                                "id": "instr-1",
                                "title": "Open de pagina",
                                "content": "X",
                                "relations": {"rel-see-also": ["task-1"]}
                            }
                        ]
                    }
                ]
            }
        ]
    }
}"#;

fn settings(server: &MockServer, cache_dir: &tempfile::TempDir) -> Settings {
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

async fn mount_session_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sessionToken": "tok-1",
            "expiresIn": 3600
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn imports_a_nested_document_with_content_and_relations() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");
    mount_session_token(&server).await;

    // The task must be created as a child of the homepage.
    Mock::given(method("POST"))
        .and(path("/v4/tenant/t-1/project/p-1/acl/a-1/topic"))
        .and(body_partial_json(serde_json::json!({
            "topicId": "task-1",
            "parentTopicId": "proc-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "topicVersionId": "v-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Remaining topics: homepage, step, instruction.
    Mock::given(method("POST"))
        .and(path("/v4/tenant/t-1/project/p-1/acl/a-1/topic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "topicVersionId": "v-1"
        })))
        .expect(3)
        .mount(&server)
        .await;

    // Only the instruction carries content.
    Mock::given(method("PUT"))
        .and(path(
            "/v2/tenant/t-1/project/p-1/acl/a-1/topic/instr-1/topicVersion/v-1/part/contentPart",
        ))
        .and(body_json(serde_json::json!({
            "name": "contentPart",
            "content": { "text": "X" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(
            "/v2/tenant/t-1/project/p-1/acl/a-1/topic/instr-1/topicVersion/v-1/relation",
        ))
        .and(body_json(serde_json::json!({
            "relationTypeId": "rel-see-also",
            "sourceTopicId": "instr-1",
            "targetTopicIds": ["task-1"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings(&server, &cache_dir);
    let session = Arc::new(Session::from_settings(&settings).expect("session"));
    let client = DelphiClient::new(session);

    let document: ProcessDocument = serde_json::from_str(DOCUMENT).expect("document");
    let tree = Mapper::new(TypeCatalog::digital_coach()).map(&document.process);

    let importer = Importer::new(client, true, "nl-NL");
    importer.import_topics(&tree).await.expect("import should succeed");
}

#[tokio::test]
async fn bracket_mode_checks_out_and_in_around_the_content_write() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");
    mount_session_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/v4/tenant/t-1/project/p-1/acl/a-1/topic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "topicVersionId": "v-created"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/tenant/t-1/project/p-1/acl/a-1/topic/proc-1/workflowstate"))
        .and(body_json(serde_json::json!({ "action": "CheckOut" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "topicVersionId": "v-editable"
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Metadata lands on the checked-out version, not the created one.
    Mock::given(method("PUT"))
        .and(path(
            "/v2/tenant/t-1/project/p-1/acl/a-1/topic/proc-1/topicVersion/v-editable/topicversionmetadata",
        ))
        .and(body_json(serde_json::json!({
            "data": { "description": "Alles over onboarding" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(
            "/v4/tenant/t-1/project/p-1/acl/a-1/topic/proc-1/topicVersion/v-editable/workflowstate",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let document: ProcessDocument = serde_json::from_str(
        r#"{"process": {"id": "proc-1", "title": "Onboarding", "description": "Alles over onboarding"}}"#,
    )
    .expect("document");
    let tree = Mapper::new(TypeCatalog::digital_coach()).map(&document.process);

    let settings = settings(&server, &cache_dir);
    let session = Arc::new(Session::from_settings(&settings).expect("session"));
    let importer = Importer::new(DelphiClient::new(session), false, "nl-NL");
    importer.import_topics(&tree).await.expect("import should succeed");
}

#[tokio::test]
async fn parts_can_be_listed_and_created_on_a_version() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");
    mount_session_token(&server).await;

    Mock::given(method("GET"))
        .and(path(
            "/v2/tenant/t-1/project/p-1/acl/a-1/topic/step-1/topicVersion/v-1/part",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "name": "contentPart" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(
            "/v2/tenant/t-1/project/p-1/acl/a-1/topic/step-1/topicVersion/v-1/part",
        ))
        .and(body_json(serde_json::json!({
            "name": "notesPart",
            "content": { "text": "remember" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings(&server, &cache_dir);
    let session = Arc::new(Session::from_settings(&settings).expect("session"));
    let client = DelphiClient::new(session);

    use delphi_sync::client::CmsClient;
    let parts = client.get_parts("step-1", "v-1").await.expect("list should succeed");
    assert_eq!(parts[0]["name"], "contentPart");
    client
        .create_part("step-1", "v-1", "notesPart", &serde_json::json!({ "text": "remember" }))
        .await
        .expect("create should succeed");
}

#[tokio::test]
async fn export_returns_the_full_project_document() {
    let server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("tempdir");
    mount_session_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/tenant/t-1/project/p-1/acl/a-1/export"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "topics": [{ "topicId": "proc-1" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings(&server, &cache_dir);
    let session = Arc::new(Session::from_settings(&settings).expect("session"));
    let client = DelphiClient::new(session);

    use delphi_sync::client::CmsClient;
    let export = client.export().await.expect("export should succeed");
    assert_eq!(export["topics"][0]["topicId"], "proc-1");
}
