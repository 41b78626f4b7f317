use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;

use trip_planner::config::OpenAiConfig;
use trip_planner::error::TripPlannerError;
use trip_planner::interfaces::providers::{LlmProvider, ProviderFactory};
use trip_planner::providers::openai::OpenAiProviderFactory;

fn factory(server: &MockServer) -> OpenAiProviderFactory {
    OpenAiProviderFactory::new(OpenAiConfig {
        base_url: Some(server.base_url()),
        ..Default::default()
    })
}

#[tokio::test]
async fn tool_calls_are_parsed_from_chat_completion() {
    let server = MockServer::start_async().await;
    let chat_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_includes("\"model\":\"gpt-4o-mini\"")
                .body_includes("\"max_completion_tokens\":1500")
                .body_includes("\"name\":\"web_search\"");
            then.status(200).json_body(json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "created": 1,
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "web_search",
                                "arguments": "{\"query\":\"Goa events December\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            }));
        })
        .await;

    let provider = factory(&server).create("sk-test").unwrap();
    let response = provider
        .generate_with_tools(
            "Find events",
            "You are Local Tourist Guide.",
            vec![json!({
                "type": "function",
                "name": "web_search",
                "description": "search",
                "parameters": {"type": "object", "properties": {"query": {"type": "string"}}}
            })],
        )
        .await
        .unwrap();

    chat_mock.assert_calls(1);
    assert!(response.text.is_empty());
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "web_search");
    assert_eq!(
        response.tool_calls[0].arguments,
        json!({"query": "Goa events December"})
    );
}

#[tokio::test]
async fn plain_text_completion() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "id": "chatcmpl-test",
                "object": "chat.completion",
                "created": 1,
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Visit Baga beach."},
                    "finish_reason": "stop"
                }]
            }));
        })
        .await;

    let provider = factory(&server).create("sk-test").unwrap();
    let text = provider.generate_text("Plan", "").await.unwrap();
    assert_eq!(text, "Visit Baga beach.");
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start_async().await;
    let chat_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401)
                .json_body(json!({"error": {"message": "Incorrect API key provided"}}));
        })
        .await;

    let provider = factory(&server).create("sk-wrong").unwrap();
    let err = provider.generate_text("Plan", "").await.unwrap_err();
    chat_mock.assert_calls(1);
    match err {
        TripPlannerError::Http(message) => {
            assert!(message.contains("401"));
            assert!(message.contains("Incorrect API key provided"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn blank_key_is_rejected_before_any_request() {
    let factory = OpenAiProviderFactory::default();
    assert!(matches!(
        factory.create("  "),
        Err(TripPlannerError::Config(_))
    ));
}
