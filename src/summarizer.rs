//! LLM bridge for scan-log summaries.
//!
//! Two interchangeable providers share one contract: submit log text, get
//! text back (optionally token by token). The local provider talks to the
//! scan backend's `/summarize` endpoint; the remote one calls a hosted
//! chat-completion API directly.

use crate::config::RemoteSummarizerConfig;
use crate::decode::Utf8ChunkDecoder;
use crate::error::ConsoleError;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

const SSE_DATA_PREFIX: &str = "data: ";
const ERROR_PREFIX: &str = "[ERROR]";
const REMOTE_MAX_TOKENS: u32 = 2000;

pub type SummaryFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ConsoleError>> + Send + 'a>>;

/// Receives summary text as it is produced.
pub type TokenSink<'a> = &'a mut (dyn FnMut(&str) + Send);

pub trait Summarizer: Send + Sync {
    fn provider_id(&self) -> &'static str;

    /// Summarize `report`, feeding partial output to `on_token` as it arrives.
    /// Returns the full text.
    fn summarize<'a>(&'a self, client: &'a Client, report: &'a str, on_token: TokenSink<'a>) -> SummaryFuture<'a>;
}

/// Result shown to the operator. On failure `text` is the error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub provider: &'static str,
    pub text: String,
    pub failed: bool,
}

/// Summarize a report, turning provider failures into displayable text.
///
/// Only an empty report is refused, locally and without any request.
pub async fn summarize_report(
    summarizer: &dyn Summarizer,
    client: &Client,
    report: &str,
    on_token: TokenSink<'_>,
) -> Result<Summary, ConsoleError> {
    if report.trim().is_empty() {
        return Err(ConsoleError::EmptyReport);
    }

    let provider = summarizer.provider_id();
    tracing::info!("Summarizing {} bytes of scan log via {}", report.len(), provider);

    match summarizer.summarize(client, report, on_token).await {
        Ok(text) => Ok(Summary {
            provider,
            text,
            failed: false,
        }),
        Err(e) => {
            tracing::warn!("Summary via {} failed: {}", provider, e);
            Ok(Summary {
                provider,
                text: e.to_string(),
                failed: true,
            })
        }
    }
}

// ============================================
// LOCAL (scan backend /summarize)
// ============================================

/// Backend-hosted model. Answers with `{summary}` JSON or an SSE token stream.
#[derive(Debug, Clone)]
pub struct LocalSummarizer {
    url: String,
}

impl LocalSummarizer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn run(&self, client: &Client, report: &str, on_token: TokenSink<'_>) -> Result<String, ConsoleError> {
        let response = client
            .post(&self.url)
            .json(&serde_json::json!({ "report": report }))
            .send()
            .await
            .map_err(|e| ConsoleError::SummarizationFailure(format!("Failed to connect to AI service: {}", e)))?;

        let status = response.status();
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = json_field(&body, "error").unwrap_or(body);
            return Err(ConsoleError::SummarizationFailure(format!(
                "Server error {}: {}",
                status.as_u16(),
                message.trim()
            )));
        }

        if is_sse {
            return read_sse(response, on_token).await;
        }

        let body = response
            .text()
            .await
            .map_err(|e| ConsoleError::SummarizationFailure(e.to_string()))?;
        if let Some(error) = json_field(&body, "error") {
            return Err(ConsoleError::SummarizationFailure(error));
        }
        let summary = json_field(&body, "summary").ok_or_else(|| {
            ConsoleError::SummarizationFailure("response missing summary field".to_string())
        })?;
        on_token(&summary);
        Ok(summary)
    }
}

impl Summarizer for LocalSummarizer {
    fn provider_id(&self) -> &'static str {
        "local"
    }

    fn summarize<'a>(&'a self, client: &'a Client, report: &'a str, on_token: TokenSink<'a>) -> SummaryFuture<'a> {
        Box::pin(self.run(client, report, on_token))
    }
}

async fn read_sse(response: reqwest::Response, on_token: TokenSink<'_>) -> Result<String, ConsoleError> {
    let mut body = response.bytes_stream();
    let mut decoder = Utf8ChunkDecoder::new();
    let mut lines = SseLineBuffer::default();
    let mut summary = String::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ConsoleError::SummarizationFailure(format!("stream interrupted: {}", e)))?;
        let text = decoder.decode(&chunk);
        for line in lines.push(&text) {
            apply_sse_line(&line, &mut summary, on_token)?;
        }
    }

    let tail = decoder.finish();
    for line in lines.push(&tail).into_iter().chain(lines.finish()) {
        apply_sse_line(&line, &mut summary, on_token)?;
    }

    Ok(summary)
}

fn apply_sse_line(line: &str, summary: &mut String, on_token: TokenSink<'_>) -> Result<(), ConsoleError> {
    let Some(content) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return Ok(());
    };
    if content.starts_with(ERROR_PREFIX) {
        return Err(ConsoleError::SummarizationFailure(content.to_string()));
    }
    summary.push_str(content);
    on_token(content);
    Ok(())
}

/// Reassembles SSE lines that arrive split across chunks.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    partial: String,
}

impl SseLineBuffer {
    /// Feed decoded text, get back every line it completed.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect()
    }

    /// Whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        let rest = rest.trim_end_matches('\r');
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

fn json_field(body: &str, field: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get(field)?
        .as_str()
        .map(str::to_string)
}

// ============================================
// REMOTE (hosted chat-completion API)
// ============================================

#[derive(Debug, Clone)]
pub struct ChatCompletionSummarizer {
    api_key: String,
    model: String,
    version: String,
    url: String,
    max_prefix_chars: usize,
}

impl ChatCompletionSummarizer {
    pub fn from_config(config: &RemoteSummarizerConfig) -> Result<Self, ConsoleError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConsoleError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            version: config.version.clone(),
            url: config.api_url.clone(),
            max_prefix_chars: config.max_prefix_chars,
        })
    }

    async fn run(&self, client: &Client, report: &str, on_token: TokenSink<'_>) -> Result<String, ConsoleError> {
        let user = format!("Report:\n{}", bounded_prefix(report, self.max_prefix_chars));
        let payload = serde_json::json!({
            "model": self.model,
            "max_tokens": REMOTE_MAX_TOKENS,
            "temperature": 0.2,
            "system": summary_prompt(),
            "messages": [
                {"role": "user", "content": user}
            ]
        });

        let response = client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ConsoleError::SummarizationFailure(format!("Failed to connect to AI service: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ConsoleError::SummarizationFailure(e.to_string()))?;
        if !status.is_success() {
            return Err(ConsoleError::SummarizationFailure(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ConsoleError::SummarizationFailure(format!("invalid API response: {}", e)))?;
        let summary = extract_text_from_response(&value)?;
        on_token(&summary);
        Ok(summary)
    }
}

impl Summarizer for ChatCompletionSummarizer {
    fn provider_id(&self) -> &'static str {
        "remote"
    }

    fn summarize<'a>(&'a self, client: &'a Client, report: &'a str, on_token: TokenSink<'a>) -> SummaryFuture<'a> {
        Box::pin(self.run(client, report, on_token))
    }
}

fn extract_text_from_response(value: &Value) -> Result<String, ConsoleError> {
    let content = value
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ConsoleError::SummarizationFailure("unexpected API response: missing content array".into()))?;

    let mut out = String::new();
    for block in content {
        if block.get("type").and_then(|v| v.as_str()) == Some("text") {
            if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                out.push_str(text);
            }
        }
    }

    if out.trim().is_empty() {
        return Err(ConsoleError::SummarizationFailure(
            "API response contained no text blocks".into(),
        ));
    }

    Ok(out)
}

/// At most `max_chars` characters from the start of the log.
pub fn bounded_prefix(report: &str, max_chars: usize) -> &str {
    match report.char_indices().nth(max_chars) {
        Some((end, _)) => &report[..end],
        None => report,
    }
}

fn summary_prompt() -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a network security analyst reviewing raw penetration-test tool output.\n");
    prompt.push_str("Summarize the given network penetration testing report.\n");
    prompt.push_str("Rules:\n");
    prompt.push_str("- Highlight critical vulnerabilities first, citing CVE ids when present.\n");
    prompt.push_str("- List open ports and the services behind them.\n");
    prompt.push_str("- Suggest concrete remediation steps.\n");
    prompt.push_str("- The report may be truncated; do not speculate about missing output.\n");
    prompt
}
