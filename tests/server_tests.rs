use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use portscan_rs::server::{router, AppState, ScanPhase, Status};
use portscan_rs::types::{PortState, ScanReport};
use tokio::net::TcpListener;
use tower::ServiceExt;

async fn send(state: &AppState, req: Request<Body>) -> Response {
    router(state.clone()).oneshot(req).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_scan(body: serde_json::Value) -> Request<Body> {
    Request::post("/api/scan")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn idle_status_and_no_results() {
    let state = AppState::default();

    let resp = send(&state, get("/api/status")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    let status: Status = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(status, Status::default());
    assert_eq!(status.state, ScanPhase::Idle);

    let resp = send(&state, get("/api/results")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn invalid_port_spec_is_bad_request() {
    let state = AppState::default();
    let resp = send(
        &state,
        post_scan(serde_json::json!({"target": "127.0.0.1", "ports": "80-22"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = String::from_utf8(body_bytes(resp).await).unwrap();
    assert_eq!(body, "Range start > end: '80-22'");
}

#[tokio::test]
async fn invalid_timeout_is_bad_request() {
    let state = AppState::default();
    let resp = send(
        &state,
        post_scan(serde_json::json!({"target": "127.0.0.1", "ports": "80", "timeout_secs": 0.0})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scan_runs_to_completion() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let state = AppState::default();

    let resp = send(
        &state,
        post_scan(serde_json::json!({
            "target": "127.0.0.1",
            "ports": open.to_string(),
            "timeout_secs": 2.0,
        })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let status: Status = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(status.state, ScanPhase::Running);
    assert_eq!(status.total, 1);

    let mut done = false;
    for _ in 0..100 {
        let resp = send(&state, get("/api/status")).await;
        let status: Status = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        if status.state == ScanPhase::Done {
            assert_eq!(status.scanned, 1);
            assert_eq!(status.open, 1);
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(done, "scan did not finish in time");

    let resp = send(&state, get("/api/results")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let report: ScanReport = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(report.target, "127.0.0.1");
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].port, open);
    assert_eq!(report.outcomes[0].state, PortState::Open);
    drop(listener);
}
