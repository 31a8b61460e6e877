use cua_runner::cua::{ModelTransport, ResponsesRequest, Truncation};
use cua_runner::{ConversationItem, CuaClient, CuaConfig};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matcher asserting that JSON body carries the given `previous_response_id`.
struct PrevId(&'static str);

impl Match for PrevId {
    fn matches(&self, req: &Request) -> bool {
        serde_json::from_slice::<Value>(&req.body)
            .map(|v| v.get("previous_response_id").and_then(Value::as_str) == Some(self.0))
            .unwrap_or(false)
    }
}

fn client(server: &MockServer) -> CuaClient {
    CuaClient::new(CuaConfig {
        api_base: format!("{}/v1", server.uri()),
        api_key: "sk-test".into(),
        organization: Some("org-test".into()),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn request(previous: Option<&str>) -> ResponsesRequest {
    ResponsesRequest {
        model: "computer-use-preview".into(),
        input: vec![ConversationItem::user_text("hello")],
        tools: vec![],
        truncation: Truncation::Auto,
        previous_response_id: previous.map(str::to_string),
    }
}

#[tokio::test]
async fn posts_to_responses_with_auth_and_continuation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("openai-organization", "org-test"))
        .and(PrevId("resp_0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "resp_1",
            "output": [{
                "type": "message",
                "id": "msg_1",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "hi"}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server).create_response(&request(Some("resp_0"))).await.unwrap();

    assert_eq!(resp.id.as_deref(), Some("resp_1"));
    let output = resp.output.unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0].is_assistant_message());
}

#[tokio::test]
async fn error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = client(&server).create_response(&request(None)).await.unwrap_err();

    match err {
        cua_runner::cua::TransportError::Status { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_output_is_left_to_the_agent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "resp_1"})))
        .mount(&server)
        .await;

    let resp = client(&server).create_response(&request(None)).await.unwrap();
    assert!(resp.output.is_none());
}
