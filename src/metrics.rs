//! Live metrics derived from scan output
//!
//! Counts are taken per chunk against a fixed, case-insensitive vocabulary
//! and accumulated. Nothing is ever recounted from the full log, so a keyword
//! that straddles two chunks is not seen by either.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::LazyLock;

struct Vocabulary {
    ports: Regex,
    warnings: Regex,
    vulns: Regex,
    info: Regex,
    tcp: Regex,
    udp: Regex,
    http: Regex,
}

static VOCABULARY: LazyLock<Vocabulary> = LazyLock::new(|| Vocabulary {
    ports: keyword("open"),
    warnings: keyword("warning|danger|filtered"),
    vulns: keyword("cve-|vulnerable|exploit"),
    info: keyword("info|discover"),
    tcp: keyword("tcp"),
    udp: keyword("udp"),
    http: keyword("http"),
});

/// ASCII-only case folding: `K` (Kelvin) and `ſ` must not count as letters.
fn keyword(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .unicode(false)
        .build()
        .expect("metric vocabulary pattern is valid")
}

/// Running counters for one scan session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub ports: u64,
    pub vulns: u64,
    pub info: u64,
    pub warnings: u64,
    pub tcp: u64,
    pub udp: u64,
    pub http: u64,
}

impl MetricSnapshot {
    /// Non-overlapping match counts for a single decoded chunk.
    pub fn from_chunk(text: &str) -> Self {
        let vocab = &*VOCABULARY;
        let count = |re: &Regex| re.find_iter(text).count() as u64;
        Self {
            ports: count(&vocab.ports),
            vulns: count(&vocab.vulns),
            info: count(&vocab.info),
            warnings: count(&vocab.warnings),
            tcp: count(&vocab.tcp),
            udp: count(&vocab.udp),
            http: count(&vocab.http),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Doughnut series: info, open ports, warnings, critical.
    pub fn severity_series(&self) -> [u64; 4] {
        [self.info, self.ports, self.warnings, self.vulns]
    }

    /// Bar series: tcp, udp, services (open ports), web.
    pub fn protocol_series(&self) -> [u64; 4] {
        [self.tcp, self.udp, self.ports, self.http]
    }
}

impl AddAssign for MetricSnapshot {
    fn add_assign(&mut self, delta: Self) {
        self.ports = self.ports.saturating_add(delta.ports);
        self.vulns = self.vulns.saturating_add(delta.vulns);
        self.info = self.info.saturating_add(delta.info);
        self.warnings = self.warnings.saturating_add(delta.warnings);
        self.tcp = self.tcp.saturating_add(delta.tcp);
        self.udp = self.udp.saturating_add(delta.udp);
        self.http = self.http.saturating_add(delta.http);
    }
}
