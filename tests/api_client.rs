use std::time::Duration;

use httpmock::MockServer;
use serde_json::json;
use tds_admin::application::repos::{ApiError, TdsApi};
use tds_admin::config::ApiSettings;
use tds_admin::infra::rest::ApiClient;
use tds_api_types::{
    AlertSeverity, AlertsQuery, BreakerState, DeadLetterQuery, HealthState, SyncRunStatus, SyncRunsQuery,
    TriggerSyncRequest,
};
use url::Url;

fn client(server: &MockServer, token: Option<&str>) -> ApiClient {
    client_at(&server.base_url(), token)
}

fn client_at(base_url: &str, token: Option<&str>) -> ApiClient {
    ApiClient::new(&ApiSettings {
        base_url: Url::parse(base_url).expect("base url"),
        token: token.map(str::to_string),
        request_timeout: Duration::from_secs(5),
    })
    .expect("client")
}

#[tokio::test]
async fn alerts_sends_filters_and_bearer_token() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/api/tds/alerts")
                .query_param("severity", "critical")
                .query_param("is_active", "true")
                .header("authorization", "Bearer secret");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"items":[{"id":4,"severity":"critical","title":"Backlog","is_active":true,"created_at":"2024-05-01T10:00:00Z"}],"total":1,"page":1,"per_page":20}"#,
                );
        })
        .await;

    let page = client(&server, Some("secret"))
        .alerts(&AlertsQuery {
            severity: Some(AlertSeverity::Critical),
            is_active: Some(true),
            ..AlertsQuery::default()
        })
        .await
        .expect("alerts");

    mock.assert_async().await;
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, 4);
}

#[tokio::test]
async fn sync_runs_and_dead_letter_use_their_paths() {
    let server = MockServer::start_async().await;
    let runs = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/api/tds/sync-runs")
                .query_param("page", "2")
                .query_param("status", "failed");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"items":[],"total":0}"#);
        })
        .await;
    let dead_letter = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/api/tds/dead-letter")
                .query_param("status", "pending");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"items":[],"total":0,"page":1,"per_page":50}"#);
        })
        .await;
    let api = client(&server, None);

    let page = api
        .sync_runs(&SyncRunsQuery {
            page: Some(2),
            status: Some(SyncRunStatus::Failed),
            ..SyncRunsQuery::default()
        })
        .await
        .expect("sync runs");
    let items = api
        .dead_letter(&DeadLetterQuery {
            status: Some("pending".to_string()),
            ..DeadLetterQuery::default()
        })
        .await
        .expect("dead letter");

    runs.assert_async().await;
    dead_letter.assert_async().await;
    assert_eq!(page.page, 1);
    assert_eq!(page.per_page, 20);
    assert_eq!(items.per_page, 50);
}

#[tokio::test]
async fn reset_breaker_posts_to_named_path() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/api/tds/circuit-breakers/erp-api/reset");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"name":"erp-api","state":"closed","failure_count":0}"#);
        })
        .await;

    let breaker = client(&server, Some("secret"))
        .reset_circuit_breaker("erp-api")
        .await
        .expect("reset");

    mock.assert_async().await;
    assert_eq!(breaker.state, BreakerState::Closed);
}

#[tokio::test]
async fn trigger_sync_sends_json_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/api/tds/sync/trigger")
                .json_body(json!({"source": "erp"}));
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"id":12,"source":"erp","status":"pending","started_at":"2024-05-01T10:00:00Z"}"#,
                );
        })
        .await;

    let run = client(&server, None)
        .trigger_sync(&TriggerSyncRequest {
            source: Some("erp".to_string()),
        })
        .await
        .expect("trigger");

    mock.assert_async().await;
    assert_eq!(run.id, 12);
    assert_eq!(run.status, SyncRunStatus::Pending);
}

#[tokio::test]
async fn non_success_status_keeps_body_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/tds/alerts/99/acknowledge");
            then.status(404).body("alert 99 not found");
        })
        .await;

    let err = client(&server, None)
        .acknowledge_alert(99)
        .await
        .expect_err("missing alert");

    assert_eq!(err.status_code(), Some(404));
    assert!(matches!(err, ApiError::Status { ref body, .. } if body == "alert 99 not found"));
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/tds/health");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"status":"sideways"}"#);
        })
        .await;

    let err = client(&server, None)
        .health()
        .await
        .expect_err("invalid health payload");

    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn requests_stay_under_base_path_prefix() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET").path("/backend/api/tds/health");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"status":"healthy","components":[],"checked_at":"2024-05-01T10:00:00Z"}"#);
        })
        .await;

    let health = client_at(&server.url("/backend"), None)
        .health()
        .await
        .expect("health under prefix");

    mock.assert_async().await;
    assert_eq!(health.status, HealthState::Healthy);
}
