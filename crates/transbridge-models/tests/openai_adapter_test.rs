//! Integration tests for `OpenAITranslator` against a mock HTTP server.

use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};
use transbridge_models::{OpenAITranslator, RetryPolicy};

fn translator(url: &str, api_key: &str) -> OpenAITranslator {
    OpenAITranslator::new(
        BackendIdentity::new("openai", "gpt-4o-mini", format!("{}/v1/chat/completions", url)),
        api_key,
        Duration::from_secs(5),
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)))
}

#[tokio::test]
async fn test_translate_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({"model": "gpt-4o-mini", "max_tokens": 2000})),
            Matcher::Regex("professional translator".to_string()),
            Matcher::Regex("Translate Hello".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Bonjour"}}]}"#)
        .expect(1)
        .create_async()
        .await;

    let result = translator(&server.url(), "test-key").translate("Translate Hello").await;

    assert_eq!(result.unwrap(), "Bonjour");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_no_authorization_header_without_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hallo"}}]}"#)
        .create_async()
        .await;

    let result = translator(&server.url(), "").translate("Hello").await;

    assert_eq!(result.unwrap(), "Hallo");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .with_body("upstream exploded")
        .expect(3)
        .create_async()
        .await;

    let result = translator(&server.url(), "test-key").translate("Hello").await;

    assert_eq!(
        result,
        Err(TranslatorError::Status { status: 500, body: "upstream exploded".to_string() })
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_choices_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let result = translator(&server.url(), "test-key").translate("Hello").await;

    assert_eq!(result, Err(TranslatorError::EmptyResult));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_body_is_serialization_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let result = translator(&server.url(), "test-key").translate("Hello").await;

    assert!(matches!(result, Err(TranslatorError::Serialization(_))));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_request_error() {
    let t = OpenAITranslator::new(
        BackendIdentity::new("openai", "gpt-4o-mini", "http://127.0.0.1:1/v1/chat/completions"),
        "",
        Duration::from_secs(2),
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::new(0, Duration::ZERO));

    let result = t.translate("Hello").await;

    assert!(matches!(result, Err(TranslatorError::Request(_))));
}

#[tokio::test]
async fn test_dropped_connections_are_retried() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepts);
    let server = tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else { break };
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });

    let result = translator(&format!("http://{}", addr), "test-key").translate("Hello").await;

    assert!(matches!(result, Err(TranslatorError::Request(_))));
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
    server.abort();
}
