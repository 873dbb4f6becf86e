//! Scan submission payload for the backend `/run` endpoint

use crate::modules::{ModuleSet, ScanEstimate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_IP: &str = "127.0.0.1";
pub const DEFAULT_TARGET_NETWORK: &str = "192.168.1.0/24";

/// Operator authorization for the scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub user_confirmation: bool,
}

/// A scan configuration, sent verbatim as the `/run` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub target_ip: String,
    /// CIDR notation, e.g. `192.168.1.0/24`
    pub target_network: String,
    #[serde(default)]
    pub options: ModuleSet,
    #[serde(default)]
    pub consent: Consent,
    /// Summarize with the backend's local model instead of the remote API.
    #[serde(default)]
    pub local_llm: bool,
}

impl ScanRequest {
    pub fn new(target_ip: impl Into<String>, target_network: impl Into<String>) -> Self {
        Self {
            target_ip: target_ip.into(),
            target_network: target_network.into(),
            options: ModuleSet::default(),
            consent: Consent::default(),
            local_llm: false,
        }
    }

    pub fn with_options(mut self, options: ModuleSet) -> Self {
        self.options = options;
        self
    }

    pub fn with_consent(mut self, confirmed: bool) -> Self {
        self.consent.user_confirmation = confirmed;
        self
    }

    pub fn with_local_llm(mut self, local: bool) -> Self {
        self.local_llm = local;
        self
    }

    pub fn is_consented(&self) -> bool {
        self.consent.user_confirmation
    }

    pub fn estimate(&self) -> ScanEstimate {
        self.options.estimate()
    }
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_IP, DEFAULT_TARGET_NETWORK)
    }
}
