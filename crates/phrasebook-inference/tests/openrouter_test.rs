//! OpenAI-compatible backend against a mock HTTP server.

use phrasebook_core::{Error, GenerationBackend, GenerationRequest, Settings};
use phrasebook_inference::openai::{OpenAIBackend, OpenAIConfig};
use phrasebook_inference::{
    categorization_request, parse_category, parse_generated_phrase, suggestion_request, Category,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, referer: Option<&str>, title: Option<&str>) -> OpenAIBackend {
    OpenAIBackend::new(OpenAIConfig {
        base_url: server.uri(),
        timeout_seconds: 5,
        http_referer: referer.map(String::from),
        x_title: title.map(String::from),
    })
    .expect("Failed to create backend")
}

fn settings() -> Settings {
    Settings {
        api_key: Some("sk-or-test".to_string()),
        preferred_model: None,
        updated_at: None,
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "gen-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_categorization_call_shape_and_parse() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-or-test"))
        .and(body_partial_json(json!({
            "model": "x-ai/grok-4.1-fast:free",
            "max_tokens": 20,
            "messages": [
                { "role": "system" },
                { "role": "user", "content": "Refactor relentlessly" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(" Technical\n")))
        .expect(1)
        .mount(&server)
        .await;

    let request = categorization_request(&settings(), "Refactor relentlessly").unwrap();
    let reply = backend(&server, None, None).generate(&request).await.unwrap();

    assert_eq!(parse_category(&reply), Some(Category::Technical));
}

#[tokio::test]
async fn test_openrouter_headers_sent_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("HTTP-Referer", "https://phrasebook.local"))
        .and(header("X-Title", "Phrasebook"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Creative")))
        .expect(1)
        .mount(&server)
        .await;

    let request = categorization_request(&settings(), "Paint outside the lines").unwrap();
    let result = backend(&server, Some("https://phrasebook.local"), Some("Phrasebook"))
        .generate(&request)
        .await;

    assert!(result.is_ok(), "Request should succeed: {:?}", result.err());
}

#[tokio::test]
async fn test_suggestion_requests_json_object() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"text": "Small steps every day", "source": "Unknown"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let request = suggestion_request(&settings()).unwrap();
    let reply = backend(&server, None, None).generate(&request).await.unwrap();
    let phrase = parse_generated_phrase(&reply).unwrap();

    assert_eq!(phrase.text, "Small steps every day");
    assert_eq!(phrase.source, "Unknown");
}

#[tokio::test]
async fn test_unauthorized_maps_to_config_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "No auth credentials found", "code": 401 }
        })))
        .mount(&server)
        .await;

    let request = categorization_request(&settings(), "x").unwrap();
    let err = backend(&server, None, None)
        .generate(&request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)), "got {:?}", err);
    assert!(err.to_string().contains("No auth credentials found"));
}

#[tokio::test]
async fn test_server_error_without_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let request = categorization_request(&settings(), "x").unwrap();
    let err = backend(&server, None, None)
        .generate(&request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Inference(_)));
}

#[tokio::test]
async fn test_empty_content_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "" } }]
        })))
        .mount(&server)
        .await;

    let request = GenerationRequest {
        api_key: "k".to_string(),
        model: "m".to_string(),
        system: String::new(),
        prompt: "hi".to_string(),
        max_tokens: None,
        json_object: false,
    };
    let err = backend(&server, None, None)
        .generate(&request)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("No content generated"));
}

#[tokio::test]
async fn test_unreachable_provider_is_inference_error() {
    let backend = OpenAIBackend::new(OpenAIConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_seconds: 2,
        http_referer: None,
        x_title: None,
    })
    .unwrap();

    let request = categorization_request(&settings(), "x").unwrap();
    let err = backend.generate(&request).await.unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}
