//! Rate-limit and auth middleware through the full request path

mod harness;

use std::time::{SystemTime, UNIX_EPOCH};

use harness::config::{base_config, config_with_auth, config_with_rate_limit, issue_token, registry_single};
use harness::mock_provider::MockProvider;
use harness::server::TestServer;

/// S3: the third request in a ten-second burst is denied, with a
/// retry-after pointing at the minute window
#[tokio::test]
async fn minute_cap_denies_with_retry_after() {
    let provider = MockProvider::start().await.unwrap();
    let server = TestServer::start(config_with_rate_limit(2, 1000), registry_single(&provider.base_url()))
        .await
        .unwrap();

    for _ in 0..2 {
        let response = server
            .client()
            .post(server.url("/chat"))
            .header("x-tenant-id", "t1")
            .json(&serde_json::json!({"message": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let denied = server
        .client()
        .post(server.url("/chat"))
        .header("x-tenant-id", "t1")
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(denied.status(), 429);

    let retry_after: u64 = denied
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("retry-after header");
    assert!((50..=60).contains(&retry_after), "retry_after was {retry_after}");

    let body: serde_json::Value = denied.json().await.unwrap();
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["retry_after"], serde_json::json!(retry_after));

    // The denied request performed no provider I/O
    assert_eq!(provider.completion_count(), 2);
}

/// S4: admitted responses carry the rate-limit headers
#[tokio::test]
async fn admitted_response_carries_rate_limit_headers() {
    let provider = MockProvider::start().await.unwrap();
    let server = TestServer::start(config_with_rate_limit(60, 1000), registry_single(&provider.base_url()))
        .await
        .unwrap();

    let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let response = server
        .client()
        .post(server.url("/chat"))
        .header("x-tenant-id", "t1")
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    let after = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();

    assert_eq!(response.status(), 200);

    let header = |name: &str| -> u64 {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| panic!("missing header {name}"))
    };

    assert_eq!(header("x-ratelimit-limit"), 60);
    assert_eq!(header("x-ratelimit-remaining"), 59);
    let reset = header("x-ratelimit-reset");
    assert!(reset >= before + 60 && reset <= after + 61, "reset was {reset}");
}

/// Distinct identities do not share a budget
#[tokio::test]
async fn identities_are_limited_independently() {
    let provider = MockProvider::start().await.unwrap();
    let server = TestServer::start(config_with_rate_limit(1, 1000), registry_single(&provider.base_url()))
        .await
        .unwrap();

    let send = |tenant: &'static str| {
        let client = server.client().clone();
        let url = server.url("/chat");
        async move {
            client
                .post(url)
                .header("x-tenant-id", tenant)
                .json(&serde_json::json!({"message": "hi"}))
                .send()
                .await
                .unwrap()
                .status()
        }
    };

    assert_eq!(send("t1").await, 200);
    assert_eq!(send("t1").await, 429);
    assert_eq!(send("t2").await, 200);
}

/// Missing bearer token yields 401 with the challenge header
#[tokio::test]
async fn missing_token_is_challenged() {
    let provider = MockProvider::start().await.unwrap();
    let server = TestServer::start(config_with_auth("test-secret"), registry_single(&provider.base_url()))
        .await
        .unwrap();

    let response = server
        .client()
        .post(server.url("/chat"))
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(
        response.headers().get("www-authenticate").and_then(|v| v.to_str().ok()),
        Some("Bearer")
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(provider.completion_count(), 0);
}

/// A valid token passes and reaches the provider
#[tokio::test]
async fn valid_token_is_accepted() {
    let provider = MockProvider::start().await.unwrap();
    let server = TestServer::start(config_with_auth("test-secret"), registry_single(&provider.base_url()))
        .await
        .unwrap();

    let token = issue_token("test-secret", "acme");
    let response = server
        .client()
        .post(server.url("/chat"))
        .bearer_auth(token)
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(provider.completion_count(), 1);
}

/// A token signed with the wrong secret is rejected
#[tokio::test]
async fn forged_token_is_rejected() {
    let provider = MockProvider::start().await.unwrap();
    let server = TestServer::start(config_with_auth("test-secret"), registry_single(&provider.base_url()))
        .await
        .unwrap();

    let token = issue_token("some-other-secret", "acme");
    let response = server
        .client()
        .post(server.url("/chat"))
        .bearer_auth(token)
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(provider.completion_count(), 0);
}

/// Health stays reachable without a token and without consuming budget
#[tokio::test]
async fn health_bypasses_auth_and_rate_limit() {
    let provider = MockProvider::start().await.unwrap();
    let mut config = config_with_auth("test-secret");
    config.rate_limit.per_minute = 1;
    let server = TestServer::start(config, registry_single(&provider.base_url()))
        .await
        .unwrap();

    // Many unauthenticated health polls, none metered
    for _ in 0..5 {
        let response = server.client().get(server.url("/health")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }

    // The single-token budget is still intact for a real request
    let token = issue_token("test-secret", "acme");
    let response = server
        .client()
        .post(server.url("/chat"))
        .bearer_auth(token)
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

/// With auth disabled the demo identity owns created sessions
#[tokio::test]
async fn demo_identity_applies_when_auth_disabled() {
    let provider = MockProvider::start().await.unwrap();
    let server = TestServer::start(base_config(), registry_single(&provider.base_url()))
        .await
        .unwrap();

    let response = server
        .client()
        .post(server.url("/chat"))
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let session_id = body["session_id"].as_str().unwrap();

    let session = server
        .client()
        .get(server.url(&format!("/sessions/{session_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(session.status(), 200);
    let blob: serde_json::Value = session.json().await.unwrap();
    assert_eq!(blob["tenant_id"], "demo-tenant");
}
