//! Client tests against an in-process mock backend

use axum::{
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{stream, StreamExt};
use pipedash_client::{ApiClient, ClientTimeouts, StatusEvent, SubmitOutcome};
use pipedash_core::{Error, ModelDetails, RunState};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str) -> ApiClient {
    ApiClient::new(
        base_url,
        ClientTimeouts {
            health: Duration::from_millis(300),
            submit: Duration::from_secs(2),
            request: Duration::from_secs(2),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_health_ok() {
    let router = Router::new().route(
        "/health",
        get(|| async { Json(json!({"status": "healthy", "pipeline_running": false})) }),
    );
    let url = spawn_backend(router).await;

    let health = client(&url).health().await.unwrap();
    assert_eq!(health.status.as_deref(), Some("healthy"));
    assert_eq!(health.pipeline_running, Some(false));
}

#[tokio::test]
async fn test_health_non_success_is_error() {
    let router = Router::new().route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let url = spawn_backend(router).await;

    assert!(client(&url).health().await.is_err());
}

#[tokio::test]
async fn test_health_timeout() {
    let router = Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"status": "healthy"}))
        }),
    );
    let url = spawn_backend(router).await;

    let err = client(&url).health().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    // bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}", addr)).submit("query").await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_submit_accepted_and_rejected() {
    let router = Router::new().route(
        "/api/analyze",
        post(|Json(body): Json<Value>| async move {
            if body["query"] == "bad" {
                (StatusCode::BAD_REQUEST, Json(json!({"detail": "invalid query"})))
            } else {
                (
                    StatusCode::OK,
                    Json(json!({"status": "started", "message": "ok", "task_id": "analysis_1"})),
                )
            }
        }),
    );
    let url = spawn_backend(router).await;
    let api = client(&url);

    match api.submit("Cricket trends in 2025").await.unwrap() {
        SubmitOutcome::Accepted(body) => assert_eq!(body.task_id.as_deref(), Some("analysis_1")),
        other => panic!("expected acceptance, got {other:?}"),
    }

    match api.submit("bad").await.unwrap() {
        SubmitOutcome::Rejected { status, detail } => {
            assert_eq!(status, 400);
            assert_eq!(detail, "invalid query");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_status_and_results() {
    let router = Router::new()
        .route(
            "/api/status",
            get(|| async {
                Json(json!({
                    "status": "completed",
                    "current_agent": "report_agent",
                    "progress": 100,
                    "error": null,
                    "timestamp": 1735689600.0,
                    "is_running": false
                }))
            }),
        )
        .route(
            "/api/results",
            get(|| async {
                Json(json!({
                    "query": "Cricket trends in 2025",
                    "scrape_results": "Title: A\nURL: x",
                    "eda_output": "eda",
                    "model_info": "RandomForest",
                    "final_answer": "answer",
                    "processing_time": 12.5
                }))
            }),
        );
    let url = spawn_backend(router).await;
    let api = client(&url);

    let status = api.status().await.unwrap();
    assert_eq!(status.status, RunState::Completed);

    let results = api.results().await.unwrap();
    assert_eq!(results.query, "Cricket trends in 2025");
    assert_eq!(results.processing_time, Some(12.5));
    assert!(matches!(results.model_info, Some(ModelDetails::Summary(_))));
}

#[tokio::test]
async fn test_results_before_completion_is_error() {
    let router = Router::new().route(
        "/api/results",
        get(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": "Analysis not completed yet"})),
            )
        }),
    );
    let url = spawn_backend(router).await;

    let err = client(&url).results().await.unwrap_err();
    assert!(err.to_string().contains("Analysis not completed yet"));
}

#[tokio::test]
async fn test_stream_yields_snapshots() {
    let router = Router::new().route(
        "/api/stream",
        get(|| async {
            let events = vec![
                json!({"status": "running", "current_agent": "scraper_agent", "progress": 20}),
                json!({"status": "running", "current_agent": "eda_agent", "progress": 60}),
                json!({"status": "completed", "current_agent": "report_agent", "progress": 100}),
            ];
            Sse::new(stream::iter(
                events
                    .into_iter()
                    .map(|e| Ok::<_, Infallible>(Event::default().data(e.to_string()))),
            ))
        }),
    );
    let url = spawn_backend(router).await;

    let events: Vec<_> = client(&url).open_stream().await.unwrap().collect().await;
    let snapshots: Vec<StatusEvent> = events
        .iter()
        .map(|e| StatusEvent::parse(e.as_ref().unwrap()).unwrap())
        .collect();

    let progress: Vec<u8> = snapshots.iter().map(|s| s.status.progress).collect();
    assert_eq!(progress, vec![20, 60, 100]);
    assert_eq!(snapshots[2].status.status, RunState::Completed);
}

#[tokio::test]
async fn test_stream_non_success_is_stream_error() {
    let router = Router::new().route("/api/stream", get(|| async { StatusCode::NOT_FOUND }));
    let url = spawn_backend(router).await;

    match client(&url).open_stream().await {
        Err(Error::Stream(msg)) => assert!(msg.contains("404")),
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("expected stream error"),
    }
}

fn quick_client(base_url: &str) -> ApiClient {
    ApiClient::new(
        base_url,
        ClientTimeouts {
            health: Duration::from_millis(200),
            submit: Duration::from_secs(2),
            request: Duration::from_millis(200),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_stream_slow_headers_time_out() {
    let router = Router::new().route(
        "/api/stream",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Sse::new(stream::empty::<Result<Event, Infallible>>())
        }),
    );
    let url = spawn_backend(router).await;

    let started = std::time::Instant::now();
    match quick_client(&url).open_stream().await {
        Err(Error::Timeout(_)) => {}
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("expected timeout"),
    }
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_stream_body_outlives_request_timeout() {
    let router = Router::new().route(
        "/api/stream",
        get(|| async {
            let late = stream::once(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let snapshot = json!({"status": "completed", "progress": 100});
                Ok::<_, Infallible>(Event::default().data(snapshot.to_string()))
            });
            Sse::new(late)
        }),
    );
    let url = spawn_backend(router).await;

    let mut events = quick_client(&url).open_stream().await.unwrap();
    let event = events.next().await.unwrap().unwrap();
    let snapshot = StatusEvent::parse(&event).unwrap();
    assert_eq!(snapshot.status.status, RunState::Completed);
}
