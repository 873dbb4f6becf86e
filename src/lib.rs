//! SecOps console - drives a remote scan backend and streams its output to a dashboard
//!
//! The core is the streaming consumer: chunked process output is decoded,
//! appended to a single session log and scanned for progress markers and
//! metric keywords, one whole chunk at a time.

pub mod backend;
pub mod config;
pub mod console;
pub mod consumer;
pub mod decode;
pub mod error;
pub mod history;
pub mod metrics;
pub mod modules;
pub mod report;
pub mod request;
pub mod server;
pub mod session;
pub mod summarizer;

pub use console::ScanConsole;
pub use error::ConsoleError;
pub use request::ScanRequest;
pub use session::{ScanSession, SessionEvent, SessionStatus};
