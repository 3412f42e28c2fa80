use docrag::backing::llm::HttpLlmService;
use docrag::backing::{LlmService, LlmToken};
use docrag::query::assembler::PromptMessage;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_message(content: &str) -> Vec<PromptMessage> {
    vec![PromptMessage { role: "user", content: content.to_string() }]
}

#[tokio::test]
async fn decodes_a_streamed_chat_completion() {
    let server = MockServer::start().await;

    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"))
        .mount(&server)
        .await;

    let service = HttpLlmService::new(server.uri(), "test-model".to_string(), 4);
    let mut rx = service.chat_stream(user_message("hi"), 0.0).await.unwrap();

    let mut deltas = Vec::new();
    loop {
        match rx.recv().await {
            Some(Ok(LlmToken::Delta(text))) => deltas.push(text),
            Some(Ok(LlmToken::Done)) => break,
            Some(Err(e)) => panic!("unexpected stream error: {e}"),
            None => break,
        }
    }

    assert_eq!(deltas.join(""), "Hello");
}

#[tokio::test]
async fn chat_once_returns_the_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "the answer"}}]
        })))
        .mount(&server)
        .await;

    let service = HttpLlmService::new(server.uri(), "test-model".to_string(), 4);
    let reply = service.chat_once(user_message("question"), 0.0).await.unwrap();

    assert_eq!(reply, "the answer");
}
