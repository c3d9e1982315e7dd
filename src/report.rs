use crate::snapshot::{EventRecord, Severity, SystemSnapshot, TIMESTAMP_FORMAT};
use std::fmt::Display;
use thiserror::Error;

const MOST_RECENT_ERRORS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("hardware inventory contains no CPU record, nothing to summarize")]
    EmptyHardwareInventory,
}

/// Renders the text summary. Only the first CPU is described.
pub fn render(snapshot: &SystemSnapshot) -> Result<String, ReportError> {
    let cpu = snapshot
        .cpus
        .first()
        .ok_or(ReportError::EmptyHardwareInventory)?;

    let mut report = Vec::new();
    report.push("=== Hardware Summary ===".to_string());

    report.push(format!("\nCPU: {}", or_unknown(cpu.name.as_deref())));
    report.push(format!(
        "Cores/Threads: {}/{}",
        or_unknown(cpu.core_count),
        or_unknown(cpu.thread_count)
    ));

    report.push(format!("\nTotal Memory: {:.2} GB", snapshot.total_memory_gb()));

    report.push("\nStorage Devices:".to_string());
    for disk in &snapshot.disks {
        let size = match disk.size_gb {
            Some(gb) => format!("{gb:.2} GB"),
            None => "unknown size".to_string(),
        };
        report.push(format!(
            "- {}: {} ({})",
            or_unknown(disk.model.as_deref()),
            size,
            or_unknown(disk.interface_type.as_deref())
        ));
    }

    report.push("\nNetwork Adapters:".to_string());
    for nic in &snapshot.network_adapters {
        report.push(format!(
            "- {} ({})",
            or_unknown(nic.name.as_deref()),
            nic.mac_address
        ));
    }

    // The label stays fixed whatever window was configured.
    report.push("\n=== Event Log Summary (Last 7 Days) ===".to_string());
    for (channel, events) in &snapshot.event_logs {
        let error_count = count_severity(events, Severity::Error);
        let warning_count = count_severity(events, Severity::Warning);
        report.push(format!("\n{channel} Log:"));
        report.push(format!("- Errors: {error_count}"));
        report.push(format!("- Warnings: {warning_count}"));

        if error_count > 0 {
            report.push("\nMost Recent Errors:".to_string());
            for error in most_recent_errors(events) {
                report.push(format!(
                    "- {}: {} - Event ID: {}",
                    error.timestamp.format(TIMESTAMP_FORMAT),
                    error.source,
                    error.event_id
                ));
            }
        }
    }

    Ok(report.join("\n"))
}

fn count_severity(events: &[EventRecord], severity: Severity) -> usize {
    events.iter().filter(|e| e.severity == severity).count()
}

/// Newest first; equal timestamps keep collection order.
fn most_recent_errors(events: &[EventRecord]) -> Vec<&EventRecord> {
    let mut errors: Vec<&EventRecord> = events
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .collect();
    errors.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    errors.truncate(MOST_RECENT_ERRORS);
    errors
}

fn or_unknown<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
