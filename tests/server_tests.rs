mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use common::{finite_body, serve};
use secops_console::config::ConsoleConfig;
use secops_console::history::HistoryStore;
use secops_console::server::{build_router, AppState};
use secops_console::ScanConsole;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn router_for(backend_url: &str, history_path: &Path) -> Router {
    let console = ScanConsole::new(ConsoleConfig::for_backend(backend_url)).unwrap();
    let state = Arc::new(AppState::new(console, HistoryStore::new(history_path)));
    build_router(state, Path::new("frontend"))
}

fn offline_router() -> Router {
    router_for("http://127.0.0.1:1", Path::new("/nonexistent/secops/history.json"))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn call_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = call(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn write_history(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("secops-server-{}-{}.json", name, std::process::id()));
    let records = json!([{
        "id": "SC-1025",
        "target": "dev-api.internal",
        "started_at": "2024-02-09T10:42:00Z",
        "duration": "8m 12s",
        "scan_type": "API Security Scan",
        "status": "Completed",
        "findings": {"critical": 1, "medium": 2, "low": 5},
        "full_log": "443/tcp open https\n"
    }]);
    std::fs::write(&path, records.to_string()).unwrap();
    path
}

#[tokio::test]
async fn health_and_catalog() {
    let app = offline_router();

    let (status, body) = call(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, modules) = call_json(&app, Method::GET, "/api/modules", None).await;
    assert_eq!(status, StatusCode::OK);
    let modules = modules.as_array().unwrap();
    assert_eq!(modules.len(), 20);
    assert_eq!(modules[0]["id"], "host_discovery");
    assert_eq!(modules[0]["estimated_secs"], 15);
}

#[tokio::test]
async fn estimate_sums_enabled_modules() {
    let app = offline_router();
    let (status, estimate) = call_json(
        &app,
        Method::POST,
        "/api/estimate",
        Some(json!({"options": {"host_discovery": true, "nikto": false}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(estimate, json!({"seconds": 20, "display": "~20 sec"}));

    let (status, _) = call(&app, Method::POST, "/api/estimate", Some(json!({"options": {"teleport": true}}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn idle_session_endpoints() {
    let app = offline_router();

    let (status, snapshot) = call_json(&app, Method::GET, "/api/scan", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["status"], "IDLE");
    assert_eq!(snapshot["task"], "Ready...");
    assert_eq!(snapshot["charts"]["severity"], json!([0, 0, 0, 0]));
    assert_eq!(snapshot["charts"]["protocol"], json!([0, 0, 0, 0]));

    let (_, input) = call_json(&app, Method::POST, "/api/scan/input", Some(json!({"input": "y"}))).await;
    assert_eq!(input, json!({"dispatched": false}));

    let (_, cancel) = call_json(&app, Method::POST, "/api/scan/cancel", None).await;
    assert_eq!(cancel, json!({"cancelled": false}));
}

#[tokio::test]
async fn scan_without_consent_is_forbidden() {
    let app = offline_router();
    let request = json!({
        "target_ip": "10.0.0.5",
        "target_network": "10.0.0.0/24",
        "consent": {"user_confirmation": false}
    });
    let (status, body) = call_json(&app, Method::POST, "/api/scan", Some(request)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "ACCESS DENIED: You must authorize this scan.");
}

#[tokio::test]
async fn empty_summary_request_is_rejected() {
    let app = offline_router();
    let (status, body) = call_json(&app, Method::POST, "/api/summarize", Some(json!({"report": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no report content to summarize");

    // idle session log is empty too
    let (status, _) = call(&app, Method::POST, "/api/summarize", Some(json!({"local": true}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn report_download_is_plain_text_attachment() {
    let app = offline_router();
    let response = app
        .clone()
        .oneshot(Request::get("/api/scan/report").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"security_report_"));
    assert!(disposition.ends_with(".txt\""));
}

#[tokio::test]
async fn history_lists_and_summarizes_records() {
    let backend = Router::new().route(
        "/summarize",
        post(|axum::Json(body): axum::Json<Value>| async move {
            let report = body["report"].as_str().unwrap_or_default().to_string();
            axum::Json(json!({"summary": format!("summarized {} bytes", report.len())}))
        }),
    );
    let url = serve(backend).await;
    let path = write_history("history");
    let app = router_for(&url, &path);

    let (status, entries) = call_json(&app, Method::GET, "/api/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries[0]["id"], "SC-1025");
    assert_eq!(entries[0]["has_log"], true);
    assert!(entries[0].get("full_log").is_none());

    let (status, summary) = call_json(&app, Method::POST, "/api/history/SC-1025/summarize?local=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["summary"], "summarized 19 bytes");
    assert_eq!(summary["failed"], false);

    let (status, _) = call(&app, Method::POST, "/api/history/SC-9999/summarize", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn scan_runs_through_the_api() {
    let backend = Router::new().route(
        "/run",
        post(|| async { finite_body(&["Executing: nmap -sS 10.0.0.5\n", "80/tcp open http\n"]) }),
    );
    let url = serve(backend).await;
    let app = router_for(&url, Path::new("/nonexistent/secops/history.json"));

    let request = json!({
        "target_ip": "10.0.0.5",
        "target_network": "10.0.0.0/24",
        "options": {"basic_tcp": true},
        "consent": {"user_confirmation": true},
        "local_llm": true
    });
    let (status, started) = call_json(&app, Method::POST, "/api/scan", Some(request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(started["status"], "started");
    assert_eq!(started["estimate"]["display"], "~35 sec");

    let mut snapshot = Value::Null;
    for _ in 0..200 {
        let (_, current) = call_json(&app, Method::GET, "/api/scan", None).await;
        snapshot = current;
        if snapshot["status"] == "COMPLETE" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(snapshot["status"], "COMPLETE");
    assert_eq!(snapshot["log"], "Executing: nmap -sS 10.0.0.5\n80/tcp open http\n");
    assert_eq!(snapshot["metrics"]["ports"], 1);
    assert_eq!(snapshot["metrics"]["http"], 1);
    assert_eq!(snapshot["task"], "Scan finished.");
    assert_eq!(snapshot["charts"]["severity"], json!([0, 1, 0, 0]));
    assert_eq!(snapshot["charts"]["protocol"], json!([1, 0, 1, 1]));

    let (status, body) = call(&app, Method::GET, "/api/scan/report", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Executing: nmap -sS 10.0.0.5\n80/tcp open http\n");
}
