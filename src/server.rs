//! Web server - Axum dashboard API with a WebSocket feed of the live scan

use crate::config::ConsoleConfig;
use crate::console::ScanConsole;
use crate::error::ConsoleError;
use crate::history::{HistoryEntry, HistoryStore};
use crate::modules::{catalog, ModuleInfo, ModuleSet, ScanEstimate};
use crate::report;
use crate::request::ScanRequest;
use crate::session::ScanSession;
use crate::summarizer::Summary;
use anyhow::Context;
use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// Application state
pub struct AppState {
    pub console: ScanConsole,
    pub history: HistoryStore,
}

impl AppState {
    pub fn new(console: ScanConsole, history: HistoryStore) -> Self {
        Self { console, history }
    }
}

/// Run the web server
pub async fn run(config: ConsoleConfig) -> anyhow::Result<()> {
    let console = ScanConsole::new(config.clone())?;
    let history = HistoryStore::new(&config.history_path);
    let state = Arc::new(AppState::new(console, history));

    tracing::info!("Scan backend: {}", config.backend_url);
    if !config.frontend_dir.exists() {
        tracing::warn!(
            "Frontend directory {} not found, serving API only",
            config.frontend_dir.display()
        );
    }

    let app = build_router(state, &config.frontend_dir);

    tracing::info!("🛡️ SecOps console running at http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

pub fn build_router(state: Arc<AppState>, frontend_dir: &FsPath) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/modules", get(get_modules))
        .route("/api/estimate", post(estimate_handler))
        .route("/api/scan", post(start_scan_handler).get(get_scan))
        .route("/api/scan/ws", get(scan_ws_handler))
        .route("/api/scan/input", post(input_handler))
        .route("/api/scan/cancel", post(cancel_handler))
        .route("/api/scan/report", get(report_handler))
        .route("/api/summarize", post(summarize_handler))
        .route("/api/history", get(get_history))
        .route("/api/history/:id/summarize", post(summarize_history_handler))
        // Static files (frontend)
        .fallback_service(ServeDir::new(frontend_dir).append_index_html_on_directories(true))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

// ============================================
// HANDLERS
// ============================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// JSON `{"error": ...}` with a status code.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<ConsoleError> for ApiError {
    fn from(err: ConsoleError) -> Self {
        let status = match &err {
            ConsoleError::ConsentDenied => StatusCode::FORBIDDEN,
            ConsoleError::ScanInProgress => StatusCode::CONFLICT,
            ConsoleError::EmptyReport => StatusCode::BAD_REQUEST,
            ConsoleError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConsoleError::BackendUnavailable(_)
            | ConsoleError::StreamFault(_)
            | ConsoleError::InputDeliveryFailure(_)
            | ConsoleError::SummarizationFailure(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_modules() -> Json<Vec<ModuleInfo>> {
    Json(catalog())
}

#[derive(Deserialize)]
struct EstimateRequest {
    #[serde(default)]
    options: ModuleSet,
}

async fn estimate_handler(Json(req): Json<EstimateRequest>) -> Json<ScanEstimate> {
    Json(req.options.estimate())
}

#[derive(Serialize)]
struct ScanStartedResponse {
    status: &'static str,
    target_ip: String,
    estimate: ScanEstimate,
}

async fn start_scan_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Result<(StatusCode, Json<ScanStartedResponse>), ApiError> {
    let target_ip = request.target_ip.clone();
    let estimate = request.estimate();

    // The task runs to completion on its own; its result lands in the session.
    let _task = state.console.start_scan(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ScanStartedResponse {
            status: "started",
            target_ip,
            estimate,
        }),
    ))
}

/// Session record plus the chart series the dashboard plots.
#[derive(Serialize)]
struct SessionView {
    #[serde(flatten)]
    session: ScanSession,
    charts: ChartSeries,
}

#[derive(Serialize)]
struct ChartSeries {
    severity: [u64; 4],
    protocol: [u64; 4],
}

impl From<ScanSession> for SessionView {
    fn from(session: ScanSession) -> Self {
        let charts = ChartSeries {
            severity: session.metrics.severity_series(),
            protocol: session.metrics.protocol_series(),
        };
        Self { session, charts }
    }
}

async fn get_scan(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.console.snapshot().await.into())
}

/// Full-state frame on the live feed; sent first and after a lag.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FeedFrame {
    Snapshot { session: SessionView },
}

impl FeedFrame {
    fn snapshot(session: ScanSession) -> Self {
        FeedFrame::Snapshot {
            session: session.into(),
        }
    }
}

async fn scan_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_session(socket, state))
}

async fn stream_session(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    pump_feed(sender, receiver, &state.console).await;
}

/// Snapshot, then every session event in order until either side goes away.
async fn pump_feed<S, R, E>(mut sender: S, mut receiver: R, console: &ScanConsole)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    let (snapshot, rx) = console.subscribe_with_snapshot().await;
    if !send_json(&mut sender, &FeedFrame::snapshot(snapshot)).await {
        return;
    }
    let mut events = BroadcastStream::new(rx);

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if !send_json(&mut sender, &event).await {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    tracing::warn!("Live feed subscriber lagged by {} events, resyncing", missed);
                    let (snapshot, rx) = console.subscribe_with_snapshot().await;
                    if !send_json(&mut sender, &FeedFrame::snapshot(snapshot)).await {
                        break;
                    }
                    events = BroadcastStream::new(rx);
                }
                None => break,
            },
        }
    }
}

/// Returns `false` once the client is gone.
async fn send_json<S, T>(sender: &mut S, value: &T) -> bool
where
    S: Sink<Message> + Unpin,
    T: Serialize,
{
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to encode live feed frame: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}

#[derive(Deserialize)]
struct InputRequest {
    input: String,
}

#[derive(Serialize)]
struct InputResponse {
    dispatched: bool,
}

async fn input_handler(State(state): State<Arc<AppState>>, Json(req): Json<InputRequest>) -> Json<InputResponse> {
    Json(InputResponse {
        dispatched: state.console.send_input(req.input).await,
    })
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn cancel_handler(State(state): State<Arc<AppState>>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.console.cancel().await,
    })
}

async fn report_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let log = state.console.session().log().await;
    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
        (header::CONTENT_DISPOSITION, report::content_disposition(chrono::Utc::now())),
    ];
    (headers, log)
}

#[derive(Deserialize)]
struct SummarizeRequest {
    report: Option<String>,
    local: Option<bool>,
}

#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
    failed: bool,
    provider: &'static str,
}

impl From<Summary> for SummaryResponse {
    fn from(summary: Summary) -> Self {
        Self {
            summary: summary.text,
            failed: summary.failed,
            provider: summary.provider,
        }
    }
}

async fn summarize_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = state.console.summarize(req.report, req.local).await?;
    Ok(Json(summary.into()))
}

async fn get_history(State(state): State<Arc<AppState>>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    state.history.list().map(Json).map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load history: {}", e),
        )
    })
}

#[derive(Deserialize)]
struct HistorySummarizeQuery {
    local: Option<bool>,
}

async fn summarize_history_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistorySummarizeQuery>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let record = state
        .history
        .get(&id)
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load history: {}", e),
            )
        })?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("No scan record {}", id)))?;

    let summary = state.console.summarize(Some(record.full_log), query.local).await?;
    Ok(Json(summary.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FINISHED_LABEL;
    use futures::channel::mpsc;
    use serde_json::Value;
    use std::convert::Infallible;

    fn offline_console(event_capacity: usize) -> ScanConsole {
        let mut config = ConsoleConfig::for_backend("http://127.0.0.1:1");
        config.event_capacity = event_capacity;
        ScanConsole::new(config).unwrap()
    }

    fn spawn_feed(console: &ScanConsole) -> (mpsc::UnboundedReceiver<Message>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded();
        let console = console.clone();
        let task = tokio::spawn(async move {
            pump_feed(tx, futures::stream::pending::<Result<Message, Infallible>>(), &console).await;
        });
        (rx, task)
    }

    async fn next_frame(frames: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        match frames.next().await {
            Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    async fn push_lines(console: &ScanConsole, lines: std::ops::Range<usize>) {
        console
            .session()
            .update(|s| {
                let events = lines
                    .map(|i| {
                        let text = format!("22/tcp open ssh line {}\n", i);
                        s.apply_chunk(&text);
                        s.chunk_event(text)
                    })
                    .collect();
                ((), events)
            })
            .await;
    }

    async fn begin(console: &ScanConsole) {
        console
            .session()
            .update(|s| {
                let started = s.begin();
                ((), vec![started])
            })
            .await;
    }

    async fn finish(console: &ScanConsole) {
        console
            .session()
            .update(|s| ((), s.finish(FINISHED_LABEL, None).into_iter().collect()))
            .await;
    }

    #[tokio::test]
    async fn feed_opens_with_a_snapshot_then_follows_events() {
        let console = offline_console(64);
        let (mut frames, task) = spawn_feed(&console);

        let first = next_frame(&mut frames).await;
        assert_eq!(first["type"], "snapshot");
        assert_eq!(first["session"]["status"], "IDLE");
        assert_eq!(first["session"]["charts"]["severity"], serde_json::json!([0, 0, 0, 0]));

        begin(&console).await;
        push_lines(&console, 0..2).await;
        finish(&console).await;

        assert_eq!(next_frame(&mut frames).await["type"], "started");
        let mut text = String::new();
        for _ in 0..2 {
            let chunk = next_frame(&mut frames).await;
            assert_eq!(chunk["type"], "chunk");
            text.push_str(chunk["text"].as_str().unwrap());
        }
        assert_eq!(text, "22/tcp open ssh line 0\n22/tcp open ssh line 1\n");
        let finished = next_frame(&mut frames).await;
        assert_eq!(finished["type"], "finished");
        assert_eq!(finished["status"], "COMPLETE");

        task.abort();
    }

    #[tokio::test]
    async fn lagging_feed_resyncs_from_a_fresh_snapshot() {
        let console = offline_console(1);
        let (mut frames, task) = spawn_feed(&console);
        assert_eq!(next_frame(&mut frames).await["session"]["status"], "IDLE");

        // one update overruns the single-slot buffer before the feed can read
        console
            .session()
            .update(|s| {
                let mut events = vec![s.begin()];
                for i in 0..20 {
                    let text = format!("line {}\n", i);
                    s.apply_chunk(&text);
                    events.push(s.chunk_event(text));
                }
                ((), events)
            })
            .await;

        let resync = next_frame(&mut frames).await;
        assert_eq!(resync["type"], "snapshot");
        assert_eq!(resync["session"]["status"], "RUNNING");
        let log = resync["session"]["log"].as_str().unwrap();
        assert!(log.starts_with("line 0\n"));
        assert!(log.ends_with("line 19\n"));

        push_lines(&console, 20..21).await;
        let chunk = next_frame(&mut frames).await;
        assert_eq!(chunk["type"], "chunk");
        assert_eq!(chunk["text"], "22/tcp open ssh line 20\n");

        finish(&console).await;
        assert_eq!(next_frame(&mut frames).await["type"], "finished");

        task.abort();
    }

    #[tokio::test]
    async fn closed_client_ends_the_feed() {
        let console = offline_console(8);
        let (tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);
        pump_feed(tx, futures::stream::pending::<Result<Message, Infallible>>(), &console).await;
    }

    #[test]
    fn session_view_carries_chart_series() {
        let mut session = ScanSession::default();
        session.begin();
        session.apply_chunk("Executing: nmap -sS 10.0.0.5\n80/tcp open http\n");

        let view = serde_json::to_value(SessionView::from(session)).unwrap();
        assert_eq!(view["status"], "RUNNING");
        assert_eq!(view["charts"]["severity"], serde_json::json!([0, 1, 0, 0]));
        assert_eq!(view["charts"]["protocol"], serde_json::json!([1, 0, 1, 1]));
    }
}
