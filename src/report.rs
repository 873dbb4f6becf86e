//! Plain-text report download

use chrono::{DateTime, Utc};

/// `security_report_2024-02-09T10:42:00.txt`
pub fn report_filename(at: DateTime<Utc>) -> String {
    format!("security_report_{}.txt", at.format("%Y-%m-%dT%H:%M:%S"))
}

/// `Content-Disposition` value for downloading the log as an attachment.
pub fn content_disposition(at: DateTime<Utc>) -> String {
    format!("attachment; filename=\"{}\"", report_filename(at))
}
