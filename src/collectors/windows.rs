use crate::collectors::{
    clean_text, parse_u64_loose, EventCursor, EventLogProvider, HardwareProvider, ProviderError,
    RawBaseboard, RawDiskDrive, RawEventRecord, RawMemoryModule, RawNetworkAdapter, RawProcessor,
    EVENT_TYPE_AUDIT_FAILURE, EVENT_TYPE_AUDIT_SUCCESS, EVENT_TYPE_ERROR, EVENT_TYPE_INFORMATION,
    EVENT_TYPE_WARNING,
};
use crate::snapshot::Channel;
use serde_json::Value;
#[cfg(target_os = "windows")]
use std::process::Command;
use tracing::debug;

const KEYWORD_AUDIT_FAILURE: u64 = 0x0010_0000_0000_0000;
const KEYWORD_AUDIT_SUCCESS: u64 = 0x0020_0000_0000_0000;

/// Hardware inventory through `Get-CimInstance`.
#[derive(Debug, Clone, Default)]
pub struct CimHardwareProvider;

impl CimHardwareProvider {
    fn query(&self, class: &'static str, properties: &str) -> Result<Vec<Value>, ProviderError> {
        let script = format!(
            "try {{ Get-CimInstance -ClassName {class} -ErrorAction Stop | Select-Object {properties} | ConvertTo-Json -Compress }} catch {{ [Console]::Error.WriteLine($_.Exception.Message); exit 1 }}"
        );
        let stdout =
            run_powershell(&script).map_err(|message| ProviderError::Query { class, message })?;
        let records = json_records(&stdout)?;
        debug!(class, records = records.len(), "cim query finished");
        Ok(records)
    }
}

impl HardwareProvider for CimHardwareProvider {
    fn processors(&self) -> Result<Vec<RawProcessor>, ProviderError> {
        let records = self.query(
            "Win32_Processor",
            "Name,NumberOfCores,NumberOfLogicalProcessors,MaxClockSpeed",
        )?;
        Ok(records.iter().map(parse_processor).collect())
    }

    fn memory_modules(&self) -> Result<Vec<RawMemoryModule>, ProviderError> {
        let records = self.query("Win32_PhysicalMemory", "Capacity,Speed,Manufacturer")?;
        Ok(records.iter().map(parse_memory_module).collect())
    }

    fn disk_drives(&self) -> Result<Vec<RawDiskDrive>, ProviderError> {
        let records = self.query("Win32_DiskDrive", "Caption,Size,InterfaceType,Model")?;
        Ok(records.iter().map(parse_disk_drive).collect())
    }

    fn network_adapters(&self) -> Result<Vec<RawNetworkAdapter>, ProviderError> {
        let records = self.query(
            "Win32_NetworkAdapter",
            "Name,AdapterType,MACAddress,Speed,PhysicalAdapter",
        )?;
        Ok(records.iter().map(parse_network_adapter).collect())
    }

    fn baseboards(&self) -> Result<Vec<RawBaseboard>, ProviderError> {
        let records = self.query("Win32_BaseBoard", "Manufacturer,Product,SerialNumber")?;
        Ok(records.iter().map(parse_baseboard).collect())
    }
}

fn parse_processor(v: &Value) -> RawProcessor {
    RawProcessor {
        name: field_str(v, "Name"),
        number_of_cores: field_u32(v, "NumberOfCores"),
        number_of_logical_processors: field_u32(v, "NumberOfLogicalProcessors"),
        max_clock_speed: field_u32(v, "MaxClockSpeed"),
    }
}

fn parse_memory_module(v: &Value) -> RawMemoryModule {
    RawMemoryModule {
        capacity_bytes: field_u64(v, "Capacity"),
        speed: field_u32(v, "Speed"),
        manufacturer: field_str(v, "Manufacturer"),
    }
}

fn parse_disk_drive(v: &Value) -> RawDiskDrive {
    RawDiskDrive {
        caption: field_str(v, "Caption"),
        size_bytes: field_u64(v, "Size"),
        interface_type: field_str(v, "InterfaceType"),
        model: field_str(v, "Model"),
    }
}

fn parse_network_adapter(v: &Value) -> RawNetworkAdapter {
    RawNetworkAdapter {
        name: field_str(v, "Name"),
        adapter_type: field_str(v, "AdapterType"),
        mac_address: field_str(v, "MACAddress"),
        speed: field_u64(v, "Speed"),
        physical_adapter: field_bool(v, "PhysicalAdapter"),
    }
}

fn parse_baseboard(v: &Value) -> RawBaseboard {
    RawBaseboard {
        manufacturer: field_str(v, "Manufacturer"),
        product: field_str(v, "Product"),
        serial_number: field_str(v, "SerialNumber"),
    }
}

/// Event log access through `Get-WinEvent`, newest first.
#[derive(Debug, Clone)]
pub struct WinEventProvider {
    batch_size: usize,
}

impl WinEventProvider {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl EventLogProvider for WinEventProvider {
    fn open(&self, channel: Channel) -> Result<Box<dyn EventCursor>, ProviderError> {
        if !cfg!(target_os = "windows") {
            return Err(ProviderError::Unavailable(
                "Get-WinEvent requires Windows".to_string(),
            ));
        }
        debug!(channel = %channel, batch_size = self.batch_size, "opening event log cursor");
        Ok(Box::new(WinEventCursor {
            channel,
            batch_size: self.batch_size,
            before_record_id: None,
            exhausted: false,
        }))
    }
}

struct WinEventCursor {
    channel: Channel,
    batch_size: usize,
    before_record_id: Option<u64>,
    exhausted: bool,
}

impl WinEventCursor {
    fn script(&self) -> String {
        let filter = match self.before_record_id {
            Some(id) => format!(" -FilterXPath '*[System[EventRecordID < {id}]]'"),
            None => String::new(),
        };
        format!(
            "try {{ $events = Get-WinEvent -LogName '{channel}' -MaxEvents {max}{filter} -ErrorAction Stop }} catch {{ if ($_.FullyQualifiedErrorId -like 'NoMatchingEventsFound*') {{ exit 0 }}; [Console]::Error.WriteLine($_.Exception.Message); exit 1 }}; $events | ForEach-Object {{ [pscustomobject]@{{ RecordId=$_.RecordId; ProviderName=$_.ProviderName; Level=[int]$_.Level; Keywords=$_.Keywords; TimeCreated=$_.TimeCreated.ToString('yyyy-MM-dd HH:mm:ss', [Globalization.CultureInfo]::InvariantCulture); Id=$_.Id; Properties=@($_.Properties | ForEach-Object {{ [string]$_.Value }}) }} }} | ConvertTo-Json -Compress -Depth 3",
            channel = self.channel.as_str(),
            max = self.batch_size,
        )
    }
}

impl EventCursor for WinEventCursor {
    fn read_batch(&mut self) -> Result<Vec<RawEventRecord>, ProviderError> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let stdout = run_powershell(&self.script()).map_err(|message| ProviderError::ChannelRead {
            channel: self.channel,
            message,
        })?;
        let batch = parse_win_events(&stdout)?;

        match batch.iter().filter_map(|(id, _)| *id).min() {
            Some(lowest) => self.before_record_id = Some(lowest),
            None => self.exhausted = true,
        }
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }

        Ok(batch.into_iter().map(|(_, record)| record).collect())
    }

    fn close(&mut self) {
        self.exhausted = true;
        debug!(channel = %self.channel, "event log cursor closed");
    }
}

fn parse_win_events(raw: &str) -> Result<Vec<(Option<u64>, RawEventRecord)>, ProviderError> {
    let records = json_records(raw)?;
    Ok(records
        .iter()
        .map(|v| {
            let record_id = field_u64(v, "RecordId");
            let event_type = classic_event_type(field_u64(v, "Level"), field_i64(v, "Keywords"));
            let inserts = v
                .get("Properties")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| match item {
                            Value::String(s) => Some(s.clone()),
                            Value::Null => None,
                            other => Some(other.to_string()),
                        })
                        .collect()
                })
                .unwrap_or_default();

            let record = RawEventRecord {
                source: field_str(v, "ProviderName").unwrap_or_default(),
                event_type,
                time_generated: field_str(v, "TimeCreated").unwrap_or_default(),
                event_id: field_u32(v, "Id").unwrap_or_default(),
                inserts,
            };
            (record_id, record)
        })
        .collect())
}

/// Maps `Get-WinEvent` level and keywords onto classic event type codes.
fn classic_event_type(level: Option<u64>, keywords: Option<i64>) -> u16 {
    let keywords = keywords.map(|k| k as u64).unwrap_or(0);
    if keywords & KEYWORD_AUDIT_FAILURE != 0 {
        return EVENT_TYPE_AUDIT_FAILURE;
    }
    if keywords & KEYWORD_AUDIT_SUCCESS != 0 {
        return EVENT_TYPE_AUDIT_SUCCESS;
    }
    match level {
        Some(1) | Some(2) => EVENT_TYPE_ERROR,
        Some(3) => EVENT_TYPE_WARNING,
        _ => EVENT_TYPE_INFORMATION,
    }
}

fn json_records(raw: &str) -> Result<Vec<Value>, ProviderError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|err| ProviderError::Malformed(format!("invalid JSON from PowerShell: {err}")))?;
    Ok(match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    })
}

fn field_str(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_u64(v: &Value, key: &str) -> Option<u64> {
    match v.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => parse_u64_loose(s),
        _ => None,
    }
}

fn field_i64(v: &Value, key: &str) -> Option<i64> {
    match v.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_u64().map(|u| u as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn field_u32(v: &Value, key: &str) -> Option<u32> {
    field_u64(v, key).and_then(|n| u32::try_from(n).ok())
}

fn field_bool(v: &Value, key: &str) -> Option<bool> {
    match v.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }

    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let mut u16buf = Vec::with_capacity(bytes.len() / 2);
        let mut i = 0;
        while i + 1 < bytes.len() {
            u16buf.push(u16::from_le_bytes([bytes[i], bytes[i + 1]]));
            i += 2;
        }
        if let Ok(s) = String::from_utf16(&u16buf) {
            return s;
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

#[cfg(target_os = "windows")]
fn run_powershell(script: &str) -> Result<String, String> {
    let wrapped_script = format!(
        "[Console]::OutputEncoding=[System.Text.UTF8Encoding]::new($false); $OutputEncoding=[System.Text.UTF8Encoding]::new($false); {script}"
    );
    let output = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &wrapped_script])
        .output()
        .or_else(|_| {
            Command::new(r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe")
                .args(["-NoProfile", "-NonInteractive", "-Command", &wrapped_script])
                .output()
        })
        .map_err(|err| format!("failed to start PowerShell: {err}"))?;

    if !output.status.success() {
        let stderr = decode_cmd_stdout(&output.stderr);
        let stderr = stderr.trim();
        return Err(if stderr.is_empty() {
            format!("PowerShell exited with {}", output.status)
        } else {
            stderr.to_string()
        });
    }

    Ok(decode_cmd_stdout(&output.stdout))
}

#[cfg(not(target_os = "windows"))]
fn run_powershell(_script: &str) -> Result<String, String> {
    Err(format!(
        "CIM queries are not available on {}",
        std::env::consts::OS
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_object_and_array_payloads() {
        let single = r#"{"Name":"Intel(R) Core(TM) i7-9700K","NumberOfCores":8,"NumberOfLogicalProcessors":8,"MaxClockSpeed":3600}"#;
        let records = json_records(single).expect("single object");
        assert_eq!(records.len(), 1);
        let cpu = parse_processor(&records[0]);
        assert_eq!(cpu.name.as_deref(), Some("Intel(R) Core(TM) i7-9700K"));
        assert_eq!(cpu.max_clock_speed, Some(3600));

        let many = r#"[{"Capacity":17179869184,"Speed":3200,"Manufacturer":"Kingston"},{"Capacity":"8589934592","Speed":null,"Manufacturer":" "}]"#;
        let modules: Vec<_> = json_records(many)
            .expect("array")
            .iter()
            .map(parse_memory_module)
            .collect();
        assert_eq!(modules[0].capacity_bytes, Some(17_179_869_184));
        assert_eq!(modules[1].capacity_bytes, Some(8_589_934_592));
        assert_eq!(modules[1].speed, None);
        assert_eq!(modules[1].manufacturer, None);

        assert!(json_records("  ").expect("empty output").is_empty());
        assert!(matches!(
            json_records("{oops"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn parses_network_adapter_flags() {
        let raw = r#"[{"Name":"Intel(R) Ethernet I219-V","AdapterType":"Ethernet 802.3","MACAddress":"AA:BB:CC:DD:EE:FF","Speed":1000000000,"PhysicalAdapter":true},{"Name":"WAN Miniport (IP)","AdapterType":null,"MACAddress":null,"Speed":null,"PhysicalAdapter":false}]"#;
        let adapters: Vec<_> = json_records(raw)
            .expect("array")
            .iter()
            .map(parse_network_adapter)
            .collect();
        assert_eq!(adapters[0].physical_adapter, Some(true));
        assert_eq!(adapters[0].speed, Some(1_000_000_000));
        assert_eq!(adapters[1].mac_address, None);
        assert_eq!(adapters[1].physical_adapter, Some(false));
    }

    #[test]
    fn maps_levels_and_audit_keywords() {
        assert_eq!(classic_event_type(Some(1), None), EVENT_TYPE_ERROR);
        assert_eq!(classic_event_type(Some(2), Some(0)), EVENT_TYPE_ERROR);
        assert_eq!(classic_event_type(Some(3), None), EVENT_TYPE_WARNING);
        assert_eq!(classic_event_type(Some(4), None), EVENT_TYPE_INFORMATION);
        assert_eq!(classic_event_type(None, None), EVENT_TYPE_INFORMATION);
        assert_eq!(
            classic_event_type(Some(0), Some(0x8020_0000_0000_0000_u64 as i64)),
            EVENT_TYPE_AUDIT_SUCCESS
        );
        assert_eq!(
            classic_event_type(Some(0), Some(0x8010_0000_0000_0000_u64 as i64)),
            EVENT_TYPE_AUDIT_FAILURE
        );
    }

    #[test]
    fn parses_win_event_batch() {
        let raw = r#"[{"RecordId":5012,"ProviderName":"disk","Level":2,"Keywords":36028797018963968,"TimeCreated":"2024-03-08 10:15:00","Id":7,"Properties":["\\Device\\Harddisk0\\DR0",null,3]},{"RecordId":5011,"ProviderName":"Microsoft-Windows-Security-Auditing","Level":0,"Keywords":-9214364837600034816,"TimeCreated":"2024-03-08 10:14:00","Id":4624,"Properties":[]}]"#;
        let batch = parse_win_events(raw).expect("batch parsed");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].0, Some(5012));
        assert_eq!(batch[0].1.event_type, EVENT_TYPE_ERROR);
        assert_eq!(batch[0].1.inserts, vec!["\\Device\\Harddisk0\\DR0", "3"]);
        assert_eq!(batch[0].1.time_generated, "2024-03-08 10:15:00");
        assert_eq!(batch[1].1.event_type, EVENT_TYPE_AUDIT_SUCCESS);
        assert_eq!(batch[1].1.event_id, 4624);
    }

    #[test]
    fn cursor_script_pages_by_record_id() {
        let mut cursor = WinEventCursor {
            channel: Channel::Application,
            batch_size: 100,
            before_record_id: None,
            exhausted: false,
        };
        let first = cursor.script();
        assert!(first.contains("-LogName 'Application' -MaxEvents 100"));
        assert!(!first.contains("FilterXPath"));
        assert!(first.contains(
            "TimeCreated.ToString('yyyy-MM-dd HH:mm:ss', [Globalization.CultureInfo]::InvariantCulture)"
        ));

        cursor.before_record_id = Some(4200);
        assert!(cursor
            .script()
            .contains("-FilterXPath '*[System[EventRecordID < 4200]]'"));
    }

    #[test]
    fn closed_cursor_returns_empty_batches() {
        let mut cursor = WinEventCursor {
            channel: Channel::System,
            batch_size: 10,
            before_record_id: None,
            exhausted: false,
        };
        cursor.close();
        assert!(cursor.read_batch().expect("no process spawned").is_empty());
    }

    #[test]
    fn decodes_utf16_output() {
        let utf16: Vec<u8> = "héllo"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        assert_eq!(decode_cmd_stdout(&utf16), "héllo");
        assert_eq!(decode_cmd_stdout(b"plain"), "plain");
    }
}
