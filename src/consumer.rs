//! Stream consumer - applies streamed scan output to the session, chunk by chunk

use crate::decode::Utf8ChunkDecoder;
use crate::error::ConsoleError;
use crate::session::{SessionHandle, CANCELLED_LABEL, FINISHED_LABEL};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a stream that did not fault came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Backend closed the body.
    Exhausted,
    /// Operator cancelled between reads.
    Cancelled,
}

/// Per-run knobs for the consumption loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumeOptions {
    /// Fault the session if no chunk arrives within this window.
    pub idle_timeout: Option<Duration>,
}

/// Drive a running session from a chunked body until it ends.
///
/// Each chunk is decoded, applied to the session and published before the
/// next one is requested. The session is always left `COMPLETE`.
pub async fn consume_stream<S, B, E>(
    stream: S,
    session: &SessionHandle,
    cancel: &CancellationToken,
    options: ConsumeOptions,
) -> Result<StreamEnd, ConsoleError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    match read_loop(stream, session, cancel, options).await {
        Ok(StreamEnd::Exhausted) => {
            tracing::info!("Scan stream closed by backend");
            finish(session, FINISHED_LABEL, None).await;
            Ok(StreamEnd::Exhausted)
        }
        Ok(StreamEnd::Cancelled) => {
            tracing::info!("Scan stream cancelled");
            finish(session, CANCELLED_LABEL, None).await;
            Ok(StreamEnd::Cancelled)
        }
        Err(Fault::InBand(message)) => {
            let err = ConsoleError::StreamFault(message);
            fail(session, &err, false).await;
            Err(err)
        }
        Err(Fault::Transport(message)) => {
            let err = ConsoleError::StreamFault(message);
            fail(session, &err, true).await;
            Err(err)
        }
    }
}

/// Why the read loop stopped early.
enum Fault {
    /// `[ERROR]` line from the backend, already visible in the log
    InBand(String),
    /// Broken body or idle timeout, nothing in the log yet
    Transport(String),
}

async fn read_loop<S, B, E>(
    stream: S,
    session: &SessionHandle,
    cancel: &CancellationToken,
    options: ConsumeOptions,
) -> Result<StreamEnd, Fault>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = Utf8ChunkDecoder::new();
    let mut chunks = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            next = next_chunk(&mut stream, options.idle_timeout) => next,
        };

        let bytes = match next {
            Ok(Some(Ok(bytes))) => bytes,
            Ok(Some(Err(e))) => {
                return Err(Fault::Transport(format!("stream read failed: {}", e)));
            }
            Ok(None) => break,
            Err(idle) => return Err(Fault::Transport(idle_timeout_message(idle))),
        };

        let text = decoder.decode(bytes.as_ref());
        if text.is_empty() {
            continue;
        }
        chunks += 1;
        tracing::debug!("chunk #{}: {} bytes", chunks, text.len());
        apply_text(session, text).await?;
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        tracing::debug!("stream closed inside a multi-byte character");
        apply_text(session, tail).await?;
    }

    Ok(StreamEnd::Exhausted)
}

/// Fault message for a backend that stayed silent for a whole idle window.
pub fn idle_timeout_message(window: Duration) -> String {
    format!("idle timeout: no output from backend for {:?}", window)
}

/// Next item, or the idle window that elapsed waiting for it.
async fn next_chunk<T>(stream: &mut T, idle_timeout: Option<Duration>) -> Result<Option<T::Item>, Duration>
where
    T: Stream + Unpin,
{
    match idle_timeout {
        Some(window) => tokio::time::timeout(window, stream.next())
            .await
            .map_err(|_| window),
        None => Ok(stream.next().await),
    }
}

async fn apply_text(session: &SessionHandle, text: String) -> Result<(), Fault> {
    let fault = session
        .update(|s| {
            let effect = s.apply_chunk(&text);
            (effect.fault, vec![s.chunk_event(text)])
        })
        .await;

    match fault {
        Some(message) => Err(Fault::InBand(message)),
        None => Ok(()),
    }
}

async fn finish(session: &SessionHandle, label: &str, error: Option<String>) {
    session
        .update(|s| ((), s.finish(label, error).into_iter().collect()))
        .await;
}

/// End the session for a scan cancelled before its stream was opened.
pub async fn record_cancelled(session: &SessionHandle) {
    tracing::info!("Scan cancelled before the backend answered");
    finish(session, CANCELLED_LABEL, None).await;
}

/// End the session on an error raised outside the stream, such as a refused `/run`.
pub async fn record_failure(session: &SessionHandle, err: &ConsoleError) {
    fail(session, err, true).await;
}

async fn fail(session: &SessionHandle, err: &ConsoleError, diagnostic: bool) {
    tracing::error!("Scan session failed: {}", err);
    let message = err.to_string();
    session
        .update(|s| {
            let mut events = Vec::new();
            if diagnostic {
                let line = s.append_diagnostic(&message);
                events.push(s.chunk_event(line));
            }
            events.extend(s.finish(FINISHED_LABEL, Some(message)));
            ((), events)
        })
        .await;
}
