use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Event log channels in the order they are scanned and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Channel {
    System,
    Application,
    Security,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::System, Channel::Application, Channel::Security];

    pub const fn as_str(self) -> &'static str {
        match self {
            Channel::System => "System",
            Channel::Application => "Application",
            Channel::Security => "Security",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Channel::System),
            "application" => Ok(Channel::Application),
            "security" => Ok(Channel::Security),
            other => Err(format!(
                "unknown event log channel '{other}' (expected System, Application or Security)"
            )),
        }
    }
}

impl TryFrom<String> for Channel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuInfo {
    pub name: Option<String>,
    pub core_count: Option<u32>,
    pub thread_count: Option<u32>,
    pub max_clock_mhz: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryModule {
    pub capacity_gb: Option<f64>,
    pub speed_mhz: Option<u32>,
    pub manufacturer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskDrive {
    pub display_name: Option<String>,
    pub size_gb: Option<f64>,
    pub interface_type: Option<String>,
    pub model: Option<String>,
}

/// Only physical adapters that report a MAC address are ever constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkAdapter {
    pub name: Option<String>,
    pub adapter_type: Option<String>,
    pub mac_address: String,
    pub speed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mainboard {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub source: String,
    pub severity: Severity,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub event_id: u32,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HardwareSection {
    pub cpus: Vec<CpuInfo>,
    pub memory_modules: Vec<MemoryModule>,
    pub disks: Vec<DiskDrive>,
    pub network_adapters: Vec<NetworkAdapter>,
    pub mainboard: Option<Mainboard>,
}

#[derive(Debug, Clone, Default)]
pub struct EventLogSection {
    pub logs: BTreeMap<Channel, Vec<EventRecord>>,
    pub failures: BTreeMap<Channel, String>,
    pub skipped: BTreeMap<Channel, u64>,
}

#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub generated_at: String,
    pub host_name: Option<String>,
    pub window_days: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub generated_at: String,
    pub host_name: Option<String>,
    pub window_days: u64,
    #[serde(rename = "cpu")]
    pub cpus: Vec<CpuInfo>,
    #[serde(rename = "memory")]
    pub memory_modules: Vec<MemoryModule>,
    pub disks: Vec<DiskDrive>,
    #[serde(rename = "network")]
    pub network_adapters: Vec<NetworkAdapter>,
    #[serde(rename = "motherboard")]
    pub mainboard: Option<Mainboard>,
    pub event_logs: BTreeMap<Channel, Vec<EventRecord>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub event_log_errors: BTreeMap<Channel, String>,
}

impl SystemSnapshot {
    pub fn assemble(
        meta: SnapshotMeta,
        hardware: HardwareSection,
        events: EventLogSection,
    ) -> Self {
        Self {
            generated_at: meta.generated_at,
            host_name: meta.host_name,
            window_days: meta.window_days,
            cpus: hardware.cpus,
            memory_modules: hardware.memory_modules,
            disks: hardware.disks,
            network_adapters: hardware.network_adapters,
            mainboard: hardware.mainboard,
            event_logs: events.logs,
            event_log_errors: events.failures,
        }
    }

    pub fn total_memory_gb(&self) -> f64 {
        self.memory_modules
            .iter()
            .filter_map(|m| m.capacity_gb)
            .sum()
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }
}
