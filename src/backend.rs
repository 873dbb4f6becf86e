//! HTTP client for the scan-execution backend

use crate::error::ConsoleError;
use crate::request::ScanRequest;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INPUT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Thin wrapper over the backend's `/run` and `/input` endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    cancel_path: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, cancel_path: Option<String>) -> Result<Self, ConsoleError> {
        // No request timeout: a scan body can legitimately stream for an hour.
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ConsoleError::Config(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cancel_path,
        })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST the request to `/run` and hand back the still-streaming response.
    pub async fn start_scan(&self, request: &ScanRequest) -> Result<Response, ConsoleError> {
        let response = self
            .http
            .post(self.url("/run"))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                ConsoleError::BackendUnavailable(format!("Backend busy or error (connection failed: {})", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(status, response).await;
            return Err(ConsoleError::BackendUnavailable(format!(
                "Backend busy or error ({})",
                detail
            )));
        }

        tracing::info!("Backend accepted scan of {} ({})", request.target_ip, status);
        Ok(response)
    }

    /// Forward one line of operator input to the running task.
    pub async fn send_input(&self, line: &str) -> Result<(), ConsoleError> {
        let response = self
            .http
            .post(self.url("/input"))
            .timeout(INPUT_TIMEOUT)
            .json(&serde_json::json!({ "input": line }))
            .send()
            .await
            .map_err(|e| ConsoleError::InputDeliveryFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(status, response).await;
            return Err(ConsoleError::InputDeliveryFailure(detail));
        }
        Ok(())
    }

    /// Tell the backend a scan was abandoned, if it exposes an endpoint for it.
    pub async fn notify_cancel(&self) -> Result<(), ConsoleError> {
        let Some(path) = self.cancel_path.as_deref() else {
            return Ok(());
        };

        let response = self
            .http
            .post(self.url(path))
            .timeout(INPUT_TIMEOUT)
            .send()
            .await
            .map_err(|e| ConsoleError::BackendUnavailable(format!("cancel notification failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(status, response).await;
            return Err(ConsoleError::BackendUnavailable(format!(
                "cancel notification failed ({})",
                detail
            )));
        }
        Ok(())
    }
}

/// `HTTP <code>: <reason>` using the backend's JSON `error` field when present.
async fn error_detail(status: StatusCode, response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    format!("HTTP {}: {}", status.as_u16(), error_message(&body))
}

fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_field_is_preferred() {
        assert_eq!(
            error_message(r#"{"error": "Scan already in progress"}"#),
            "Scan already in progress"
        );
        assert_eq!(error_message("  plain failure \n"), "plain failure");
        assert_eq!(error_message(""), "empty response");
    }

    #[test]
    fn urls_join_cleanly() {
        let client = BackendClient::new("http://localhost:5001/", None).unwrap();
        assert_eq!(client.url("/run"), "http://localhost:5001/run");
        assert_eq!(client.url("input"), "http://localhost:5001/input");
    }
}
