use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use docit_functions::backend::{
    GeminiBackend, GenerateRequest, GenerationConfig, GenerationError, GenerativeBackend,
};
use docit_functions::orchestrator::{Orchestrator, SYSTEM_PROMPT};
use docit_functions::store::{Collection, Document, MemoryStore};
use docit_functions::tools::{DataTools, Toolset};
use docit_functions::{ToolCollection, ToolError};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    api_key: Option<String>,
    body: Value,
}

/// Scripted stand-in for the `generateContent` endpoint. The last reply is
/// repeated once the script runs out.
#[derive(Clone, Default)]
struct MockGemini {
    requests: Arc<Mutex<Vec<Captured>>>,
    replies: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
}

impl MockGemini {
    fn new(replies: impl IntoIterator<Item = (StatusCode, Value)>) -> Self {
        Self {
            requests: Arc::default(),
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
        }
    }

    fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    async fn start(self) -> String {
        let app = Router::new()
            .route("/models/{call}", post(generate))
            .with_state(self);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }
}

async fn generate(
    State(mock): State<MockGemini>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.requests.lock().unwrap().push(Captured {
        path: call,
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body,
    });

    let mut replies = mock.replies.lock().unwrap();
    let reply = if replies.len() > 1 {
        replies.pop_front()
    } else {
        replies.front().cloned()
    };
    let (status, body) = reply.unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({})));
    (status, Json(body))
}

fn text_reply(parts: Value) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": parts},
                "finishReason": "STOP"
            }]
        }),
    )
}

fn call_reply(name: &str, args: Value) -> (StatusCode, Value) {
    text_reply(json!([{"functionCall": {"name": name, "args": args}}]))
}

fn request(prompt: &str) -> GenerateRequest {
    GenerateRequest {
        system: SYSTEM_PROMPT.to_owned(),
        prompt: prompt.to_owned(),
        config: GenerationConfig::default(),
    }
}

fn backend(base_url: &str) -> GeminiBackend {
    GeminiBackend::new(reqwest::Client::new(), "test-key").with_base_url(base_url)
}

fn data_tools() -> DataTools {
    let store = MemoryStore::new().with_document(
        Collection::Items,
        Document::new("i1")
            .with_field("createdBy", "u1")
            .with_field("name", "Run")
            .with_field("count", 5_i64)
            .with_field("dateCreated", Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()),
    );
    DataTools::new(Arc::new(store))
}

fn item_tools() -> ToolCollection {
    data_tools().collection(Toolset::All, "u1").unwrap()
}

#[tokio::test]
async fn runs_requested_tools_and_returns_final_text() {
    let mock = MockGemini::new([
        call_reply("fetch_items", json!({"userId": "u1"})),
        text_reply(json!([{"text": "You have one item: Run."}])),
    ]);
    let base_url = mock.clone().start().await;
    let orchestrator =
        Orchestrator::new(Arc::new(backend(&base_url)), data_tools(), Toolset::All);

    let text = orchestrator.generate("Summarize my items", "u1").await.unwrap();
    assert_eq!(text, "You have one item: Run.");

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);

    let first = &requests[0];
    assert_eq!(first.path, "gemini-1.5-flash:generateContent");
    assert_eq!(first.api_key.as_deref(), Some("test-key"));
    assert_eq!(first.body["systemInstruction"]["parts"][0]["text"], SYSTEM_PROMPT);
    assert!(
        first.body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("My userId is u1.")
    );
    assert_eq!(first.body["generationConfig"]["maxOutputTokens"], 400);
    assert_eq!(first.body["generationConfig"]["topP"], json!(0.4));
    assert_eq!(first.body["generationConfig"]["topK"], 50);
    assert_eq!(first.body["generationConfig"]["stopSequences"], json!(["<end>", "<fin>"]));

    let names: Vec<&str> = first.body["tools"][0]["functionDeclarations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|decl| decl["name"].as_str())
        .collect();
    assert_eq!(names, vec!["fetch_folders", "fetch_items", "fetch_lists"]);
    let user_id = &first.body["tools"][0]["functionDeclarations"][0]["parameters"]["properties"]
        ["userId"];
    assert_eq!(user_id["type"], "string");
    assert_eq!(user_id["nullable"], true);

    let contents = requests[1].body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "fetch_items");
    let response = &contents[2]["parts"][0]["functionResponse"];
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(response["name"], "fetch_items");
    assert_eq!(response["response"]["value"][0]["id"], "i1");
    assert_eq!(response["response"]["value"][0]["description"], "");
}

#[tokio::test]
async fn joins_text_parts_and_skips_thoughts() {
    let mock = MockGemini::new([text_reply(json!([
        {"text": "planning...", "thought": true},
        {"text": "Hello "},
        {"text": "there"}
    ]))]);
    let base_url = mock.clone().start().await;

    let text = backend(&base_url)
        .generate(&request("hi"), &ToolCollection::new())
        .await
        .unwrap();
    assert_eq!(text, "Hello there");
    assert!(mock.requests()[0].body.get("tools").is_none());
}

#[tokio::test]
async fn api_errors_keep_status_and_message() {
    let mock = MockGemini::new([(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}),
    )]);
    let base_url = mock.clone().start().await;

    let err = backend(&base_url)
        .generate(&request("hi"), &ToolCollection::new())
        .await
        .unwrap_err();
    match err {
        GenerationError::Api { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "Quota exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn blocked_prompt_is_reported() {
    let mock = MockGemini::new([(
        StatusCode::OK,
        json!({"promptFeedback": {"blockReason": "SAFETY"}}),
    )]);
    let base_url = mock.clone().start().await;

    let err = backend(&base_url)
        .generate(&request("hi"), &ToolCollection::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Blocked(reason) if reason == "SAFETY"));
}

#[tokio::test]
async fn endless_tool_calls_hit_the_turn_limit() {
    let mock = MockGemini::new([call_reply("fetch_items", json!({"userId": "u1"}))]);
    let base_url = mock.clone().start().await;

    let err = backend(&base_url)
        .with_max_turns(2)
        .generate(&request("loop"), &item_tools())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::TurnLimit(2)));
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test]
async fn unknown_tool_fails_the_generation() {
    let mock = MockGemini::new([call_reply("delete_everything", json!({}))]);
    let base_url = mock.clone().start().await;

    let err = backend(&base_url)
        .generate(&request("hi"), &item_tools())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::Tool(ToolError::FunctionNotFound { .. })
    ));
}

#[tokio::test]
async fn null_arguments_are_treated_as_empty() {
    let mock = MockGemini::new([
        text_reply(json!([{"functionCall": {"name": "fetch_lists"}}])),
        text_reply(json!([{"text": "Nothing to report."}])),
    ]);
    let base_url = mock.clone().start().await;

    let text = backend(&base_url)
        .generate(&request("hi"), &item_tools())
        .await
        .unwrap();
    assert_eq!(text, "Nothing to report.");

    let contents = mock.requests()[1].body["contents"].clone();
    assert_eq!(contents[2]["parts"][0]["functionResponse"]["response"]["value"], json!([]));
}

#[tokio::test]
async fn empty_text_on_normal_finish_is_returned_as_is() {
    let mock = MockGemini::new([text_reply(json!([]))]);
    let base_url = mock.clone().start().await;

    let text = backend(&base_url)
        .generate(&request("hi"), &ToolCollection::new())
        .await
        .unwrap();
    assert_eq!(text, "");
}

#[tokio::test]
async fn empty_text_on_safety_finish_is_blocked() {
    let mock = MockGemini::new([(
        StatusCode::OK,
        json!({"candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "SAFETY"}]}),
    )]);
    let base_url = mock.clone().start().await;

    let err = backend(&base_url)
        .generate(&request("hi"), &ToolCollection::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Blocked(reason) if reason == "SAFETY"));
}
