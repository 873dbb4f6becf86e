//! Scan module catalog and selection

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed per-scan overhead added to every estimate.
const BASE_OVERHEAD_SECS: u64 = 5;

const MODULE_COUNT: usize = 20;

/// An independently toggleable scan capability understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanModule {
    HostDiscovery,
    OsDetect,
    ServiceDetect,
    BasicTcp,
    FullTcp,
    UdpScan,
    Aggressive,
    Nikto,
    WebEnum,
    SslScan,
    VulnScan,
    AuthChecks,
    PrivEsc,
    Persistence,
    DosCheck,
    NetworkStack,
    Container,
    PasswordPolicy,
    ListeningServices,
    Firewall,
}

impl ScanModule {
    pub const ALL: [ScanModule; MODULE_COUNT] = [
        ScanModule::HostDiscovery,
        ScanModule::OsDetect,
        ScanModule::ServiceDetect,
        ScanModule::BasicTcp,
        ScanModule::FullTcp,
        ScanModule::UdpScan,
        ScanModule::Aggressive,
        ScanModule::Nikto,
        ScanModule::WebEnum,
        ScanModule::SslScan,
        ScanModule::VulnScan,
        ScanModule::AuthChecks,
        ScanModule::PrivEsc,
        ScanModule::Persistence,
        ScanModule::DosCheck,
        ScanModule::NetworkStack,
        ScanModule::Container,
        ScanModule::PasswordPolicy,
        ScanModule::ListeningServices,
        ScanModule::Firewall,
    ];

    /// Wire identifier, as sent in the `options` map.
    pub fn id(self) -> &'static str {
        match self {
            ScanModule::HostDiscovery => "host_discovery",
            ScanModule::OsDetect => "os_detect",
            ScanModule::ServiceDetect => "service_detect",
            ScanModule::BasicTcp => "basic_tcp",
            ScanModule::FullTcp => "full_tcp",
            ScanModule::UdpScan => "udp_scan",
            ScanModule::Aggressive => "aggressive",
            ScanModule::Nikto => "nikto",
            ScanModule::WebEnum => "web_enum",
            ScanModule::SslScan => "ssl_scan",
            ScanModule::VulnScan => "vuln_scan",
            ScanModule::AuthChecks => "auth_checks",
            ScanModule::PrivEsc => "priv_esc",
            ScanModule::Persistence => "persistence",
            ScanModule::DosCheck => "dos_check",
            ScanModule::NetworkStack => "network_stack",
            ScanModule::Container => "container",
            ScanModule::PasswordPolicy => "password_policy",
            ScanModule::ListeningServices => "listening_services",
            ScanModule::Firewall => "firewall",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScanModule::HostDiscovery => "Host Discovery",
            ScanModule::OsDetect => "OS Fingerprint",
            ScanModule::ServiceDetect => "Service Detect",
            ScanModule::BasicTcp => "Basic TCP",
            ScanModule::FullTcp => "Full TCP (1-65535)",
            ScanModule::UdpScan => "UDP Top 100",
            ScanModule::Aggressive => "Aggressive (-A)",
            ScanModule::Nikto => "Nikto Scanner",
            ScanModule::WebEnum => "Web Enumeration",
            ScanModule::SslScan => "SSL/TLS Audit",
            ScanModule::VulnScan => "Vuln Scripts",
            ScanModule::AuthChecks => "Weak Auth",
            ScanModule::PrivEsc => "Priv Escalation",
            ScanModule::Persistence => "Persistence",
            ScanModule::DosCheck => "DoS Exposure",
            ScanModule::NetworkStack => "Network Stack",
            ScanModule::Container => "Containers",
            ScanModule::PasswordPolicy => "Password Policy",
            ScanModule::ListeningServices => "Listening Services",
            ScanModule::Firewall => "Firewall (ACK)",
        }
    }

    /// Rough wall-clock cost of the module on a single host.
    pub fn estimated_secs(self) -> u64 {
        match self {
            ScanModule::HostDiscovery => 15,
            ScanModule::OsDetect => 30,
            ScanModule::ServiceDetect => 45,
            ScanModule::BasicTcp => 30,
            ScanModule::FullTcp => 600,
            ScanModule::UdpScan => 300,
            ScanModule::Aggressive => 180,
            ScanModule::Nikto => 600,
            ScanModule::WebEnum => 60,
            ScanModule::SslScan => 45,
            ScanModule::VulnScan => 120,
            ScanModule::AuthChecks => 60,
            ScanModule::PrivEsc => 5,
            ScanModule::Persistence => 5,
            ScanModule::DosCheck => 30,
            ScanModule::NetworkStack => 2,
            ScanModule::Container => 2,
            ScanModule::PasswordPolicy => 2,
            ScanModule::ListeningServices => 2,
            ScanModule::Firewall => 20,
        }
    }
}

/// Catalog entry served to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub id: ScanModule,
    pub label: &'static str,
    pub estimated_secs: u64,
}

/// List every known module for the UI.
pub fn catalog() -> Vec<ModuleInfo> {
    ScanModule::ALL
        .iter()
        .map(|&module| ModuleInfo {
            id: module,
            label: module.label(),
            estimated_secs: module.estimated_secs(),
        })
        .collect()
}

/// Enabled-state of every module.
///
/// Serializes as `{ "full_tcp": true, "nikto": false, ... }` with all modules
/// present. Deserializing rejects unknown module names; modules missing from
/// the input are treated as disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ScanModule, bool>", into = "BTreeMap<ScanModule, bool>")]
pub struct ModuleSet {
    enabled: [bool; MODULE_COUNT],
}

impl ModuleSet {
    pub fn all() -> Self {
        Self {
            enabled: [true; MODULE_COUNT],
        }
    }

    pub fn none() -> Self {
        Self {
            enabled: [false; MODULE_COUNT],
        }
    }

    pub fn is_enabled(&self, module: ScanModule) -> bool {
        self.enabled[module as usize]
    }

    pub fn set(&mut self, module: ScanModule, on: bool) {
        self.enabled[module as usize] = on;
    }

    pub fn toggle(&mut self, module: ScanModule) {
        let slot = &mut self.enabled[module as usize];
        *slot = !*slot;
    }

    /// Enable everything, unless everything is already enabled, in which case clear.
    pub fn toggle_all(&mut self) {
        let target = !self.enabled.iter().all(|&on| on);
        self.enabled = [target; MODULE_COUNT];
    }

    pub fn enabled(&self) -> impl Iterator<Item = ScanModule> + '_ {
        ScanModule::ALL
            .into_iter()
            .filter(move |&module| self.is_enabled(module))
    }

    pub fn estimate(&self) -> ScanEstimate {
        let seconds = self.enabled().map(ScanModule::estimated_secs).sum::<u64>() + BASE_OVERHEAD_SECS;
        ScanEstimate::from_secs(seconds)
    }
}

impl Default for ModuleSet {
    fn default() -> Self {
        Self::all()
    }
}

impl From<BTreeMap<ScanModule, bool>> for ModuleSet {
    fn from(map: BTreeMap<ScanModule, bool>) -> Self {
        let mut set = ModuleSet::none();
        for (module, on) in map {
            set.set(module, on);
        }
        set
    }
}

impl From<ModuleSet> for BTreeMap<ScanModule, bool> {
    fn from(set: ModuleSet) -> Self {
        ScanModule::ALL
            .into_iter()
            .map(|module| (module, set.is_enabled(module)))
            .collect()
    }
}

/// Expected duration of a scan, with the short form shown in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEstimate {
    pub seconds: u64,
    pub display: String,
}

impl ScanEstimate {
    pub fn from_secs(seconds: u64) -> Self {
        let display = if seconds < 60 {
            format!("~{} sec", seconds)
        } else {
            format!("~{} min", seconds.div_ceil(60))
        };
        Self { seconds, display }
    }
}
