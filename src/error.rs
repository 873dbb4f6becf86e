//! Error types for the scan console
//!
//! Session-fatal conditions (`BackendUnavailable`, `StreamFault`) end the
//! active scan. Side-operation failures (`InputDeliveryFailure`,
//! `SummarizationFailure`) are isolated and never touch session state.

/// Main console error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    /// Scan submitted without operator authorization; never reaches the network
    #[error("ACCESS DENIED: You must authorize this scan.")]
    ConsentDenied,

    /// Another scan session is still running
    #[error("a scan is already in progress")]
    ScanInProgress,

    /// Initial `/run` request failed or was refused
    #[error("{0}")]
    BackendUnavailable(String),

    /// In-band `[ERROR]` marker, idle timeout, or a broken body stream
    #[error("stream fault: {0}")]
    StreamFault(String),

    /// Interactive input could not be forwarded
    #[error("failed to send input: {0}")]
    InputDeliveryFailure(String),

    /// Summarization backend failed or streamed an error payload
    #[error("summarization failed: {0}")]
    SummarizationFailure(String),

    /// Nothing to summarize
    #[error("no report content to summarize")]
    EmptyReport,

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}
