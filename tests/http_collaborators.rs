//! HTTP collaborators against mock servers.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, header, method, path},
};

use lead_responder::bootstrap::{Collaborators, build_processor};
use lead_responder::config::AppConfig;
use lead_responder::crm::{PyrusClient, PyrusConfig};
use lead_responder::error::{CrmError, MessengerError};
use lead_responder::messenger::{GreenApiClient, GreenApiConfig};
use lead_responder::pipeline::{
    CrmField, CrmSink, MessageDelivery, MessageSink, Outcome, ProcessResult, Stats,
};

fn pyrus(server: &MockServer) -> PyrusClient {
    PyrusClient::new(PyrusConfig {
        login: "bot@srubim.ru".into(),
        security_key: SecretString::from("secret"),
        form_id: 321,
        base_url: server.uri(),
    })
    .unwrap()
}

fn green_api(server: &MockServer) -> GreenApiClient {
    GreenApiClient::new(GreenApiConfig {
        instance_id: "1101".into(),
        api_token: SecretString::from("tok"),
        base_url: server.uri(),
    })
    .unwrap()
}

fn fields() -> Vec<CrmField> {
    vec![CrmField::new("Телефон", "+7 900 123-45-67")]
}

// ── Pyrus ───────────────────────────────────────────────────────────

#[tokio::test]
async fn pyrus_authenticates_then_creates_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .and(body_json(json!({"login": "bot@srubim.ru", "security_key": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({
            "form_id": 321,
            "fields": [{"name": "Телефон", "value": "+7 900 123-45-67"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task": {"id": 12345}})))
        .expect(2)
        .mount(&server)
        .await;

    let client = pyrus(&server);
    assert!(!client.is_connected().await);

    assert_eq!(client.create_task(321, &fields()).await.unwrap(), "12345");
    assert!(client.is_connected().await);
    // Token is reused for the second task.
    assert_eq!(client.create_task(321, &fields()).await.unwrap(), "12345");
}

#[tokio::test]
async fn pyrus_reauthenticates_once_after_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-2"})))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks"))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task": {"id": 77}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = pyrus(&server);
    assert_eq!(client.create_task(321, &fields()).await.unwrap(), "77");
}

#[tokio::test]
async fn pyrus_gives_up_after_second_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(2)
        .mount(&server)
        .await;

    let client = pyrus(&server);
    let err = client.create_task(321, &fields()).await.unwrap_err();
    assert!(matches!(err, CrmError::UnexpectedStatus { status: 401, .. }));
}

#[tokio::test]
async fn pyrus_auth_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = pyrus(&server);
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, CrmError::AuthFailed { status: 403 }));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn pyrus_task_without_id_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "bad form"})))
        .mount(&server)
        .await;

    let err = pyrus(&server).create_task(321, &fields()).await.unwrap_err();
    assert!(matches!(err, CrmError::InvalidResponse(_)));
}

// ── Green API ───────────────────────────────────────────────────────

#[tokio::test]
async fn green_api_sends_to_normalised_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/waInstance1101/sendMessage/tok"))
        .and(body_json(json!({"chatId": "79001234567@c.us", "message": "Здравствуйте!"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"idMessage": "BAE5F4"})))
        .expect(1)
        .mount(&server)
        .await;

    green_api(&server)
        .send_message("8 (900) 123-45-67", "Здравствуйте!")
        .await
        .unwrap();
}

#[tokio::test]
async fn green_api_without_message_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/waInstance1101/sendMessage/tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = green_api(&server)
        .send_message("+79001234567", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::Rejected(_)));
}

#[tokio::test]
async fn green_api_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/waInstance1101/sendMessage/tok"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = green_api(&server)
        .send_message("+79001234567", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::UnexpectedStatus { status: 500, .. }));
}

#[tokio::test]
async fn green_api_state_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/waInstance1101/getStateInstance/tok"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"stateInstance": "authorized"})),
        )
        .mount(&server)
        .await;

    assert!(green_api(&server).is_authorized().await);
}

#[tokio::test]
async fn green_api_not_authorized_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/waInstance1101/getStateInstance/tok"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"stateInstance": "notAuthorized"})),
        )
        .mount(&server)
        .await;

    let client = green_api(&server);
    assert_eq!(client.state().await.unwrap(), "notAuthorized");
    assert!(!client.is_authorized().await);
}

// ── Full wiring ─────────────────────────────────────────────────────

#[tokio::test]
async fn configured_bot_files_task_and_replies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pyrus/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pyrus/tasks"))
        .and(body_partial_json(json!({"form_id": 555})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task": {"id": 42}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/green/waInstance9/sendMessage/gtok"))
        .and(body_partial_json(json!({"chatId": "79001234567@c.us"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"idMessage": "X1"})))
        .expect(1)
        .mount(&server)
        .await;

    let vars: HashMap<&str, String> = HashMap::from([
        ("TELEGRAM_BOT_TOKEN", "t".to_string()),
        ("PYRUS_LOGIN", "bot".to_string()),
        ("PYRUS_SECURITY_KEY", "key".to_string()),
        ("PYRUS_FORM_ID", "555".to_string()),
        ("PYRUS_BASE_URL", format!("{}/pyrus", server.uri())),
        ("GREEN_API_INSTANCE_ID", "9".to_string()),
        ("GREEN_API_TOKEN", "gtok".to_string()),
        ("GREEN_API_BASE_URL", format!("{}/green", server.uri())),
    ]);
    let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let collaborators = Collaborators::from_config(&config).unwrap();
    collaborators.probe().await;
    let stats = Arc::new(Stats::new());
    let processor = build_processor(&config, &collaborators, Arc::clone(&stats)).unwrap();

    let text = "Новая заявка № 500\nДанные формы:\nТелефон: 8 900 123 45 67\nХочу баню 6х4";
    match processor.handle_text("telegram", text).await {
        ProcessResult::Dispatched { record, report } => {
            assert_eq!(report.outcome, Outcome::Success);
            assert_eq!(report.score, 3);
            assert_eq!(report.delivery, MessageDelivery::Sent);
            assert_eq!(record.crm_task_id(), Some("42"));
            assert_eq!(record.object_description, "баня");
        }
        other => panic!("Expected Dispatched, got {:?}", other),
    }

    let s = stats.snapshot();
    assert_eq!(s.created_crm_tasks, 1);
    assert_eq!(s.sent_whatsapp, 1);
    assert_eq!(s.processed_applications, 1);
}
