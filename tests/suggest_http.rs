//! Suggestion generator against a mocked chat-completions endpoint.

use a11y_relay::error::SuggestError;
use a11y_relay::suggest::{LlmSettings, RetryPolicy, SuggestionGenerator};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/openai/v1/chat/completions";

fn settings(server: &MockServer, backoff: Duration) -> LlmSettings {
    LlmSettings {
        api_url: format!("{}{ENDPOINT}", server.uri()),
        api_key: "test-key".into(),
        model: "test-model".into(),
        retry: RetryPolicy {
            max_attempts: 5,
            initial_backoff: backoff,
        },
        max_violations: 5,
        timeout: Some(Duration::from_secs(10)),
    }
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    }))
}

fn results(n: usize) -> Value {
    let violations: Vec<Value> = (0..n)
        .map(|i| json!({ "id": format!("rule-{i}"), "impact": "serious", "nodes": [] }))
        .collect();
    json!({ "violations": violations })
}

const ONE_SUGGESTION: &str = r#"{
  "issue": "Images must have alternate text",
  "summary": {"problem": "img without alt", "impact": "critical", "affectedUsers": "Screen reader users"},
  "whyMatters": {"userImpact": "Content is invisible", "assistiveTechAffected": "Screen readers"},
  "howToFix": {"step1": "Add alt text", "codeExample": "<img src='a.png' alt='Logo'>"},
  "testingInstructions": {"verify": "Inspect the img", "tools": "axe DevTools"},
  "priorityLevel": {"urgency": "high", "wcagLevel": "A"}
}"#;

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[tokio::test]
async fn fenced_single_object_becomes_one_suggestion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(chat_reply(&format!("```json\n{ONE_SUGGESTION}\n```")))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    let items = generator.generate(&results(1)).await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].issue, "Images must have alternate text");
    assert_eq!(items[0].summary.affected_users, "Screen reader users");
    assert_eq!(items[0].how_to_fix.code_example, "<img src='a.png' alt='Logo'>");
    assert_eq!(items[0].priority_level.wcag_level, "A");
}

#[tokio::test]
async fn request_carries_bearer_token_and_chat_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(chat_reply(&format!("[{ONE_SUGGESTION}]")))
        .expect(1)
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    generator.generate(&results(1)).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["messages"][0]["role"], "user");
}

#[tokio::test]
async fn rate_limited_twice_then_succeeds_after_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(chat_reply(&format!("[{ONE_SUGGESTION}]")))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_secs(1)));
    let started = Instant::now();
    let items = generator.generate(&results(1)).await.unwrap();

    assert_eq!(items.len(), 1);
    assert!(started.elapsed() >= Duration::from_secs(3), "{:?}", started.elapsed());
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn persistent_rate_limit_gives_up_after_five_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    let err = generator.generate(&results(1)).await.unwrap_err();

    assert!(err.is_rate_limited(), "{err:?}");
    assert!(err.to_string().contains("rate limited after retries"));
    assert_eq!(request_count(&server).await, 5);
}

#[tokio::test]
async fn other_statuses_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    match generator.generate(&results(1)).await.unwrap_err() {
        SuggestError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let server = MockServer::start().await;
    let mut cfg = settings(&server, Duration::from_millis(10));
    cfg.api_key = String::new();

    let err = SuggestionGenerator::new(cfg)
        .generate(&results(1))
        .await
        .unwrap_err();

    assert!(matches!(err, SuggestError::Config(_)), "{err:?}");
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn prompt_embeds_only_first_five_violations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(chat_reply(&format!("[{ONE_SUGGESTION}]")))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    generator.generate(&results(8)).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    for i in 0..5 {
        assert!(prompt.contains(&format!("\"rule-{i}\"")), "missing rule-{i}");
    }
    for i in 5..8 {
        assert!(!prompt.contains(&format!("\"rule-{i}\"")), "leaked rule-{i}");
    }
}

#[tokio::test]
async fn trailing_comma_is_repaired() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(chat_reply(&format!("[{ONE_SUGGESTION},]")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(chat_reply(&format!("[{ONE_SUGGESTION}]")))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    let repaired = generator.generate(&results(1)).await.unwrap();
    let clean = generator.generate(&results(1)).await.unwrap();

    assert_eq!(repaired, clean);
}

#[tokio::test]
async fn empty_array_is_a_soft_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(chat_reply("[]"))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    let err = generator.generate(&results(1)).await.unwrap_err();
    assert!(matches!(err, SuggestError::Empty), "{err:?}");
}

#[tokio::test]
async fn unparseable_reply_keeps_raw_text() {
    let server = MockServer::start().await;
    let raw = "I'm sorry, I can only help with accessibility questions.";
    Mock::given(method("POST"))
        .respond_with(chat_reply(raw))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    match generator.generate(&results(1)).await.unwrap_err() {
        SuggestError::Unparseable { raw: kept } => assert_eq!(kept, raw),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn missing_choices_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let generator = SuggestionGenerator::new(settings(&server, Duration::from_millis(10)));
    let err = generator.generate(&results(1)).await.unwrap_err();
    assert!(matches!(err, SuggestError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn slow_endpoint_times_out_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            chat_reply(&format!("[{ONE_SUGGESTION}]")).set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let mut cfg = settings(&server, Duration::from_millis(10));
    cfg.timeout = Some(Duration::from_millis(100));
    let err = SuggestionGenerator::new(cfg)
        .generate(&results(1))
        .await
        .unwrap_err();

    match err {
        SuggestError::TimedOut(limit) => assert_eq!(limit, Duration::from_millis(100)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(request_count(&server).await, 1);
}
