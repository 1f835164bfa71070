//! HTTP integration tests for the Aidvise REST API
//!
//! The inference API and Supabase are replaced by wiremock servers; requests
//! go through the full router via `oneshot`. Call-count expectations on the
//! mocks are verified when each `MockServer` drops.

use std::sync::Arc;
use std::time::Duration;

use aidvise_core::{
    ChatConfig, HealthLogJournal, OpenAiChatClient, PostgrestLogStore, Secret, SupabaseClient,
    SymptomAnalyzer, SYSTEM_PROMPT,
};
use aidvise_server::http::{build_router, HttpState, GENERIC_ERROR};
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{any, body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OPENAI_KEY: &str = "sk-live-test-key-0001";
const SERVICE_KEY: &str = "service-role-secret";
const ANON_KEY: &str = "anon-public-key";

struct Harness {
    openai: MockServer,
    supabase: MockServer,
    state: Arc<HttpState>,
}

async fn harness() -> Harness {
    let openai = MockServer::start().await;
    let supabase = MockServer::start().await;

    let inference = OpenAiChatClient::with_base_url(
        ChatConfig {
            api_key: Secret::new(OPENAI_KEY),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.5,
            timeout: Duration::from_secs(5),
        },
        openai.uri(),
    )
    .expect("inference client");

    let service_client =
        SupabaseClient::new(&supabase.uri(), Secret::new(SERVICE_KEY), Duration::from_secs(5))
            .expect("service client");
    let store = PostgrestLogStore::new(
        service_client,
        Secret::new(SERVICE_KEY),
        "symptom_logs".to_string(),
    );

    let anon_client =
        SupabaseClient::new(&supabase.uri(), Secret::new(ANON_KEY), Duration::from_secs(5))
            .expect("anon client");
    let journal = HealthLogJournal::new(anon_client, "health_logs".to_string());

    let state = Arc::new(HttpState {
        analyzer: SymptomAnalyzer::new(Arc::new(inference), Arc::new(store), 3),
        journal: Some(journal),
        pool: None,
    });

    Harness {
        openai,
        supabase,
        state,
    }
}

fn completion(content: Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
}

fn analysis_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/symptom-analysis")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(resp: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn read_json(resp: Response<Body>) -> Value {
    serde_json::from_slice(&read_body(resp).await).unwrap()
}

async fn expect_no_calls(server: &MockServer) {
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

// ===========================================================================
// Symptom analysis
// ===========================================================================

#[tokio::test]
async fn test_preflight_returns_204_with_cors_headers_and_no_body() {
    let h = harness().await;
    expect_no_calls(&h.openai).await;
    expect_no_calls(&h.supabase).await;

    // The body is not JSON: a pre-flight must never reach body parsing.
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/symptom-analysis")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .body(Body::from("not json"))
        .unwrap();

    let resp = build_router(h.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let headers = resp.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type, Authorization");
    assert!(read_body(resp).await.is_empty());
}

#[tokio::test]
async fn test_scenario_headache_mild_fever() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", format!("Bearer {}", OPENAI_KEY).as_str()))
        .and(body_json(json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": "Symptoms: headache, mild fever" }
            ],
            "temperature": 0.5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("Rest and hydrate."))))
        .expect(1)
        .mount(&h.openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/symptom_logs"))
        .and(header("apikey", SERVICE_KEY))
        .and(body_json(json!([
            { "symptoms": "headache, mild fever", "ai_response": "Rest and hydrate." }
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(analysis_request(r#"{"symptoms":"headache, mild fever"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(read_json(resp).await, json!({ "result": "Rest and hydrate." }));
}

#[tokio::test]
async fn test_short_or_empty_symptoms_rejected_without_outbound_calls() {
    let h = harness().await;
    expect_no_calls(&h.openai).await;
    expect_no_calls(&h.supabase).await;

    for body in [
        r#"{"symptoms":""}"#,
        r#"{"symptoms":"hi"}"#,
        r#"{"symptoms":"    "}"#,
        r#"{}"#,
    ] {
        let resp = build_router(h.state.clone())
            .oneshot(analysis_request(body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {}", body);
        assert_eq!(read_json(resp).await, json!({ "error": "Invalid symptoms" }));
    }
}

#[tokio::test]
async fn test_missing_completion_content_returns_fallback() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .expect(1)
        .mount(&h.openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/symptom_logs"))
        .and(body_json(json!([
            { "symptoms": "stomach cramps", "ai_response": "No response." }
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(analysis_request(r#"{"symptoms":"stomach cramps"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_json(resp).await, json!({ "result": "No response." }));
}

#[tokio::test]
async fn test_persistence_failure_still_returns_result() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("See a doctor if it persists."))))
        .mount(&h.openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/symptom_logs"))
        .respond_with(ResponseTemplate::new(503).set_body_string("database offline"))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(analysis_request(r#"{"symptoms":"ringing in ears"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        read_json(resp).await,
        json!({ "result": "See a doctor if it persists." })
    );
}

#[tokio::test]
async fn test_inference_failure_is_generic_500_without_leaks() {
    let h = harness().await;
    expect_no_calls(&h.supabase).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": format!("Incorrect API key provided: {}", OPENAI_KEY),
                "type": "invalid_request_error",
                "code": "invalid_api_key"
            }
        })))
        .expect(1)
        .mount(&h.openai)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(analysis_request(r#"{"symptoms":"chest tightness"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let raw = String::from_utf8(read_body(resp).await).unwrap();
    assert!(!raw.contains(OPENAI_KEY));
    assert!(!raw.contains("Incorrect API key"));
    assert_eq!(
        serde_json::from_str::<Value>(&raw).unwrap(),
        json!({ "error": GENERIC_ERROR })
    );
}

#[tokio::test]
async fn test_malformed_body_is_generic_500() {
    let h = harness().await;
    expect_no_calls(&h.openai).await;
    expect_no_calls(&h.supabase).await;

    let resp = build_router(h.state.clone())
        .oneshot(analysis_request("{ this is not json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json(resp).await, json!({ "error": GENERIC_ERROR }));
}

fn assert_json_content_type(resp: &Response<Body>) {
    let ct = resp.headers()["content-type"].to_str().unwrap();
    assert!(ct.starts_with("application/json"), "content-type {}", ct);
}

#[tokio::test]
async fn test_wrong_method_on_analysis_route_is_json() {
    let h = harness().await;
    expect_no_calls(&h.openai).await;
    expect_no_calls(&h.supabase).await;

    for verb in ["GET", "PUT", "DELETE"] {
        let req = Request::builder()
            .method(verb)
            .uri("/symptom-analysis")
            .body(Body::empty())
            .unwrap();

        let resp = build_router(h.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "method {}", verb);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert_json_content_type(&resp);
        assert_eq!(read_json(resp).await, json!({ "error": "Method not allowed" }));
    }
}

#[tokio::test]
async fn test_oversized_body_is_generic_json_500() {
    let h = harness().await;
    expect_no_calls(&h.openai).await;
    expect_no_calls(&h.supabase).await;

    let body = json!({ "symptoms": "a".repeat(3 * 1024 * 1024) }).to_string();
    let resp = build_router(h.state.clone())
        .oneshot(analysis_request(&body))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_json_content_type(&resp);
    assert_eq!(read_json(resp).await, json!({ "error": GENERIC_ERROR }));
}

#[tokio::test]
async fn test_completion_whitespace_is_returned_and_logged_verbatim() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("\nDrink water.\n"))))
        .mount(&h.openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/symptom_logs"))
        .and(body_json(json!([
            { "symptoms": "dry mouth", "ai_response": "\nDrink water.\n" }
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(analysis_request(r#"{"symptoms":"dry mouth"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_json(resp).await, json!({ "result": "\nDrink water.\n" }));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let h = harness().await;

    let resp = build_router(h.state.clone())
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_json_content_type(&resp);
    assert_eq!(read_json(resp).await, json!({ "error": "Not found" }));
}

// ===========================================================================
// Health logs
// ===========================================================================

fn log_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

async fn mount_user(server: &MockServer, user_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer user-jwt"))
        .and(header("apikey", ANON_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": user_id })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_logs_require_bearer_token() {
    let h = harness().await;
    expect_no_calls(&h.supabase).await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request("GET", "/health-logs", None, None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(resp).await["error"], "Missing bearer token");
}

#[tokio::test]
async fn test_health_logs_list_for_caller() {
    let h = harness().await;
    let user_id = Uuid::new_v4();
    mount_user(&h.supabase, user_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/health_logs"))
        .and(query_param("user_id", format!("eq.{}", user_id)))
        .and(query_param("order", "date.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 2, "user_id": user_id, "date": "2024-06-15", "symptoms": "Mild headache",
              "mood": "Good", "sleep_hours": 7, "pain_level": 3 },
            { "id": 1, "user_id": user_id, "date": "2024-06-14", "symptoms": "Sore throat",
              "mood": "Fair", "sleep_hours": 6, "pain_level": 2 }
        ])))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request("GET", "/health-logs", Some("user-jwt"), None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["access-control-allow-methods"],
        "GET, POST, PUT, DELETE, OPTIONS"
    );
    let body = read_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["date"], "2024-06-15");
}

#[tokio::test]
async fn test_health_log_out_of_range_rejected_before_write() {
    let h = harness().await;
    expect_no_calls(&h.supabase).await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request(
            "POST",
            "/health-logs",
            Some("user-jwt"),
            Some(json!({
                "date": "2024-06-16",
                "symptoms": "tired",
                "mood": "okay",
                "sleep_hours": 30,
                "pain_level": 2
            })),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(resp).await["error"],
        "Sleep hours must be between 0 and 24"
    );
}

#[tokio::test]
async fn test_health_log_create_returns_201() {
    let h = harness().await;
    let user_id = Uuid::new_v4();
    mount_user(&h.supabase, user_id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/health_logs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "id": 11, "user_id": user_id, "date": "2024-06-16", "symptoms": "tired",
              "mood": "okay", "sleep_hours": 5.5, "pain_level": 1 }
        ])))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request(
            "POST",
            "/health-logs",
            Some("user-jwt"),
            Some(json!({
                "date": "2024-06-16",
                "symptoms": "tired",
                "mood": "okay",
                "sleep_hours": 5.5,
                "pain_level": 1
            })),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(read_json(resp).await["id"], 11);
}

#[tokio::test]
async fn test_health_log_update_missing_row_is_404() {
    let h = harness().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/health_logs"))
        .and(query_param("id", "eq.42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request(
            "PUT",
            "/health-logs/42",
            Some("user-jwt"),
            Some(json!({
                "date": "2024-06-16",
                "sleep_hours": 8,
                "pain_level": 0
            })),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_log_delete_is_bodiless_204() {
    let h = harness().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/health_logs"))
        .and(query_param("id", "eq.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 5, "date": "2024-06-10", "sleep_hours": 7, "pain_level": 0 }
        ])))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request("DELETE", "/health-logs/5", Some("user-jwt"), None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(read_body(resp).await.is_empty());
}

#[tokio::test]
async fn test_health_logs_preflight() {
    let h = harness().await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request("OPTIONS", "/health-logs/5", None, None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers()["access-control-allow-methods"],
        "GET, POST, PUT, DELETE, OPTIONS"
    );
}

#[tokio::test]
async fn test_health_log_bad_id_and_method_are_json() {
    let h = harness().await;
    expect_no_calls(&h.supabase).await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request("DELETE", "/health-logs/abc", Some("user-jwt"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_json_content_type(&resp);
    assert!(read_json(resp).await["error"].is_string());

    let resp = build_router(h.state.clone())
        .oneshot(log_request("PATCH", "/health-logs/5", Some("user-jwt"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        resp.headers()["access-control-allow-methods"],
        "GET, POST, PUT, DELETE, OPTIONS"
    );
    assert_eq!(read_json(resp).await, json!({ "error": "Method not allowed" }));
}

#[tokio::test]
async fn test_health_logs_accept_lowercase_bearer_scheme() {
    let h = harness().await;
    let user_id = Uuid::new_v4();
    mount_user(&h.supabase, user_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/health_logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let req = Request::builder()
        .method("GET")
        .uri("/health-logs")
        .header("authorization", "bearer user-jwt")
        .body(Body::empty())
        .unwrap();

    let resp = build_router(h.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_json(resp).await, json!([]));
}

#[tokio::test]
async fn test_health_log_fractional_pain_is_accepted() {
    let h = harness().await;
    let user_id = Uuid::new_v4();
    mount_user(&h.supabase, user_id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/health_logs"))
        .and(body_partial_json(json!([{ "pain_level": 5.5 }])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "id": 12, "user_id": user_id, "date": "2024-06-17", "sleep_hours": 7, "pain_level": 5.5 }
        ])))
        .expect(1)
        .mount(&h.supabase)
        .await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request(
            "POST",
            "/health-logs",
            Some("user-jwt"),
            Some(json!({ "date": "2024-06-17", "sleep_hours": 7, "pain_level": 5.5 })),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(read_json(resp).await["pain_level"], 5.5);
}

// ===========================================================================
// Service endpoints
// ===========================================================================

#[tokio::test]
async fn test_version_and_health_endpoints() {
    let h = harness().await;

    let resp = build_router(h.state.clone())
        .oneshot(log_request("GET", "/version", None, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_json(resp).await["service"], "aidvise");

    let resp = build_router(h.state.clone())
        .oneshot(log_request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "postgrest");
    assert_eq!(body["inference_model"], "gpt-3.5-turbo");
    assert_eq!(body["journal"], true);
}
