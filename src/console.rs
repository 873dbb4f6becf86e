//! Scan console - owns the single active session and everything that acts on it
//!
//! Submitting a scan, forwarding operator input, cancelling and summarizing
//! all go through `ScanConsole`. Only one session exists; starting a new scan
//! resets it.

use crate::backend::BackendClient;
use crate::config::ConsoleConfig;
use crate::consumer::{
    consume_stream, idle_timeout_message, record_cancelled, record_failure, ConsumeOptions, StreamEnd,
};
use crate::error::ConsoleError;
use crate::request::ScanRequest;
use crate::session::{ScanSession, SessionEvent, SessionHandle, SessionStatus};
use crate::summarizer::{
    summarize_report, ChatCompletionSummarizer, LocalSummarizer, Summarizer, Summary, TokenSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to the running scan task. Resolves once the session is `COMPLETE`.
pub type ScanTask = JoinHandle<Result<StreamEnd, ConsoleError>>;

#[derive(Clone)]
pub struct ScanConsole {
    inner: Arc<ConsoleInner>,
}

struct ConsoleInner {
    config: ConsoleConfig,
    backend: BackendClient,
    session: SessionHandle,
    /// Token of the most recent scan; held while a scan is being started
    active: Mutex<Option<CancellationToken>>,
    /// `local_llm` flag of the last submitted request
    local_llm: AtomicBool,
}

impl ScanConsole {
    pub fn new(config: ConsoleConfig) -> Result<Self, ConsoleError> {
        let backend = BackendClient::new(&config.backend_url, config.cancel_path.clone())?;
        let session = SessionHandle::new(config.max_log_bytes, config.event_capacity);

        Ok(Self {
            inner: Arc::new(ConsoleInner {
                config,
                backend,
                session,
                active: Mutex::new(None),
                local_llm: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.inner.session
    }

    pub async fn snapshot(&self) -> ScanSession {
        self.inner.session.snapshot().await
    }

    pub async fn subscribe_with_snapshot(&self) -> (ScanSession, broadcast::Receiver<SessionEvent>) {
        self.inner.session.subscribe_with_snapshot().await
    }

    /// Submit a scan and start consuming its output in the background.
    ///
    /// Refused without any network traffic when consent is missing or a scan
    /// is still running.
    pub async fn start_scan(&self, request: ScanRequest) -> Result<ScanTask, ConsoleError> {
        if !request.is_consented() {
            tracing::warn!("Scan of {} refused: consent not given", request.target_ip);
            return Err(ConsoleError::ConsentDenied);
        }

        let mut active = self.inner.active.lock().await;
        self.inner
            .session
            .update(|s| {
                if s.is_running() {
                    (Err(ConsoleError::ScanInProgress), Vec::new())
                } else {
                    let started = s.begin();
                    (Ok(()), vec![started])
                }
            })
            .await?;

        let token = CancellationToken::new();
        *active = Some(token.clone());
        drop(active);

        self.inner.local_llm.store(request.local_llm, Ordering::Relaxed);
        tracing::info!(
            "Starting scan of {} / {} ({} modules, {})",
            request.target_ip,
            request.target_network,
            request.options.enabled().count(),
            request.estimate().display
        );

        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move { inner.run_scan(request, token).await }))
    }

    /// Forward a line to the running task without waiting for the backend.
    ///
    /// Returns whether a send was dispatched. Empty input, or input while no
    /// scan is running, makes no network call.
    pub async fn send_input(&self, line: String) -> bool {
        if line.is_empty() {
            return false;
        }
        if self.inner.session.status().await != SessionStatus::Running {
            tracing::debug!("Input dropped: no scan running");
            return false;
        }

        let backend = self.inner.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.send_input(&line).await {
                tracing::warn!("{}", e);
            }
        });
        true
    }

    /// Stop reading the active scan. Returns `false` when nothing is running.
    pub async fn cancel(&self) -> bool {
        let active = self.inner.active.lock().await;
        if self.inner.session.status().await != SessionStatus::Running {
            return false;
        }
        let Some(token) = active.as_ref() else {
            return false;
        };
        token.cancel();
        drop(active);

        tracing::info!("Scan cancellation requested");
        let backend = self.inner.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.notify_cancel().await {
                tracing::warn!("{}", e);
            }
        });
        true
    }

    /// Summarize `report`, or the current session log when it is `None`.
    ///
    /// `local` defaults to the choice made in the last scan request.
    pub async fn summarize(&self, report: Option<String>, local: Option<bool>) -> Result<Summary, ConsoleError> {
        let report = match report {
            Some(report) => report,
            None => self.inner.session.log().await,
        };
        let local = local.unwrap_or_else(|| self.inner.local_llm.load(Ordering::Relaxed));
        let mut ignore = |_: &str| {};
        self.summarize_streaming(&report, local, &mut ignore).await
    }

    /// Like [`ScanConsole::summarize`], feeding partial output to `on_token`.
    pub async fn summarize_streaming(
        &self,
        report: &str,
        local: bool,
        on_token: TokenSink<'_>,
    ) -> Result<Summary, ConsoleError> {
        if report.trim().is_empty() {
            return Err(ConsoleError::EmptyReport);
        }

        let summarizer: Box<dyn Summarizer> = if local {
            Box::new(LocalSummarizer::new(self.inner.backend.url("/summarize")))
        } else {
            match ChatCompletionSummarizer::from_config(&self.inner.config.remote) {
                Ok(remote) => Box::new(remote),
                Err(e) => {
                    tracing::warn!("Remote summarizer unavailable: {}", e);
                    return Ok(Summary {
                        provider: "remote",
                        text: e.to_string(),
                        failed: true,
                    });
                }
            }
        };

        summarize_report(summarizer.as_ref(), self.inner.backend.http(), report, on_token).await
    }
}

impl ConsoleInner {
    async fn run_scan(&self, request: ScanRequest, token: CancellationToken) -> Result<StreamEnd, ConsoleError> {
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                record_cancelled(&self.session).await;
                return Ok(StreamEnd::Cancelled);
            }
            response = self.open_scan(&request) => response,
        };

        match response {
            Ok(response) => {
                let options = ConsumeOptions {
                    idle_timeout: self.config.idle_timeout,
                };
                consume_stream(response.bytes_stream(), &self.session, &token, options).await
            }
            Err(err) => {
                record_failure(&self.session, &err).await;
                Err(err)
            }
        }
    }

    /// POST `/run`, giving up if no response arrives within the idle window.
    async fn open_scan(&self, request: &ScanRequest) -> Result<reqwest::Response, ConsoleError> {
        let opening = self.backend.start_scan(request);
        match self.config.idle_timeout {
            Some(window) => tokio::time::timeout(window, opening)
                .await
                .unwrap_or_else(|_| Err(ConsoleError::StreamFault(idle_timeout_message(window)))),
            None => opening.await,
        }
    }
}
