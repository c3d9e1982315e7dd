pub mod events;
pub mod hardware;
pub mod host;
pub mod windows;

use crate::snapshot::Channel;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("query for {class} failed: {message}")]
    Query { class: &'static str, message: String },
    #[error("reading the {channel} log failed: {message}")]
    ChannelRead { channel: Channel, message: String },
    #[error("provider returned malformed data: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProcessor {
    pub name: Option<String>,
    pub number_of_cores: Option<u32>,
    pub number_of_logical_processors: Option<u32>,
    pub max_clock_speed: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMemoryModule {
    pub capacity_bytes: Option<u64>,
    pub speed: Option<u32>,
    pub manufacturer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDiskDrive {
    pub caption: Option<String>,
    pub size_bytes: Option<u64>,
    pub interface_type: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawNetworkAdapter {
    pub name: Option<String>,
    pub adapter_type: Option<String>,
    pub mac_address: Option<String>,
    pub speed: Option<u64>,
    pub physical_adapter: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBaseboard {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// Device-class enumeration backing the hardware collector.
pub trait HardwareProvider: Send + Sync {
    fn processors(&self) -> Result<Vec<RawProcessor>, ProviderError>;
    fn memory_modules(&self) -> Result<Vec<RawMemoryModule>, ProviderError>;
    fn disk_drives(&self) -> Result<Vec<RawDiskDrive>, ProviderError>;
    fn network_adapters(&self) -> Result<Vec<RawNetworkAdapter>, ProviderError>;
    fn baseboards(&self) -> Result<Vec<RawBaseboard>, ProviderError>;
}

pub const EVENT_TYPE_ERROR: u16 = 0x0001;
pub const EVENT_TYPE_WARNING: u16 = 0x0002;
pub const EVENT_TYPE_INFORMATION: u16 = 0x0004;
pub const EVENT_TYPE_AUDIT_SUCCESS: u16 = 0x0008;
pub const EVENT_TYPE_AUDIT_FAILURE: u16 = 0x0010;

#[derive(Debug, Clone, PartialEq)]
pub struct RawEventRecord {
    pub source: String,
    pub event_type: u16,
    pub time_generated: String,
    pub event_id: u32,
    pub inserts: Vec<String>,
}

/// Backward, sequential reader over one channel. Batches arrive newest first.
pub trait EventCursor: Send {
    /// An empty batch marks the end of the log.
    fn read_batch(&mut self) -> Result<Vec<RawEventRecord>, ProviderError>;
    fn close(&mut self);
}

pub trait EventLogProvider: Send + Sync {
    fn open(&self, channel: Channel) -> Result<Box<dyn EventCursor>, ProviderError>;
}

/// Stand-in for hosts without an event log service.
#[derive(Debug, Clone, Default)]
pub struct UnsupportedEventLog;

impl EventLogProvider for UnsupportedEventLog {
    fn open(&self, channel: Channel) -> Result<Box<dyn EventCursor>, ProviderError> {
        Err(ProviderError::Unavailable(format!(
            "no event log backend for the {channel} channel on {}",
            std::env::consts::OS
        )))
    }
}

pub(crate) fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| {
            c.is_ascii_digit()
                || *c == '.'
                || *c == ','
                || *c == 'e'
                || *c == 'E'
                || *c == '-'
                || *c == '+'
        })
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}

pub(crate) fn parse_u64_loose(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<u64>() {
        return Some(v);
    }
    parse_f64_loose(trimmed).map(|v| if v < 0.0 { 0 } else { v as u64 })
}

pub(crate) fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
