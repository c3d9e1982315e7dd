use crate::collectors::{
    EventCursor, EventLogProvider, ProviderError, RawEventRecord, EVENT_TYPE_ERROR,
    EVENT_TYPE_WARNING,
};
use crate::snapshot::{parse_timestamp, Channel, EventLogSection, EventRecord, Severity};
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trailing interval `[start, now]` that bounds which records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub now: NaiveDateTime,
    pub start: NaiveDateTime,
}

impl ScanWindow {
    pub fn trailing(now: NaiveDateTime, days: u64) -> Self {
        let start = now
            .checked_sub_signed(Duration::days(days as i64))
            .unwrap_or(NaiveDateTime::MIN);
        Self { now, start }
    }

    pub fn is_before_window(&self, timestamp: NaiveDateTime) -> bool {
        timestamp < self.start
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelScan {
    pub records: Vec<EventRecord>,
    pub skipped_malformed: u64,
    pub reached_window_start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutcome {
    pub scan: ChannelScan,
    pub error: Option<ProviderError>,
}

struct CursorGuard {
    cursor: Box<dyn EventCursor>,
}

impl CursorGuard {
    fn read_batch(&mut self) -> Result<Vec<RawEventRecord>, ProviderError> {
        self.cursor.read_batch()
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

pub fn severity_of(event_type: u16) -> Option<Severity> {
    match event_type {
        EVENT_TYPE_ERROR => Some(Severity::Error),
        EVENT_TYPE_WARNING => Some(Severity::Warning),
        _ => None,
    }
}

/// Scans one channel newest-first until the log ends or a record predates the
/// window. Records gathered before a read failure are kept.
pub fn scan_channel(
    provider: &dyn EventLogProvider,
    channel: Channel,
    window: &ScanWindow,
) -> ChannelOutcome {
    let mut scan = ChannelScan::default();
    let error = read_channel(provider, channel, window, &mut scan).err();
    if scan.skipped_malformed > 0 {
        warn!(
            channel = %channel,
            skipped = scan.skipped_malformed,
            "skipped malformed event records"
        );
    }
    ChannelOutcome { scan, error }
}

fn read_channel(
    provider: &dyn EventLogProvider,
    channel: Channel,
    window: &ScanWindow,
    scan: &mut ChannelScan,
) -> Result<(), ProviderError> {
    let mut cursor = CursorGuard {
        cursor: provider.open(channel)?,
    };

    loop {
        let batch = cursor.read_batch()?;
        if batch.is_empty() {
            return Ok(());
        }

        for raw in batch {
            let Some(timestamp) = parse_timestamp(&raw.time_generated) else {
                debug!(
                    channel = %channel,
                    event_id = raw.event_id,
                    time_generated = %raw.time_generated,
                    "unparseable event timestamp"
                );
                scan.skipped_malformed += 1;
                continue;
            };

            if window.is_before_window(timestamp) {
                scan.reached_window_start = true;
                return Ok(());
            }

            let Some(severity) = severity_of(raw.event_type) else {
                continue;
            };

            scan.records.push(EventRecord {
                source: raw.source,
                severity,
                timestamp,
                event_id: raw.event_id,
                description: raw.inserts.join("; "),
            });
        }
    }
}

/// Fixed reporting order with duplicates removed.
pub fn ordered_channels(channels: &[Channel]) -> Vec<Channel> {
    channels
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn collect_events(
    provider: &dyn EventLogProvider,
    channels: &[Channel],
    window: &ScanWindow,
) -> EventLogSection {
    let mut section = EventLogSection::default();
    for channel in ordered_channels(channels) {
        let outcome = scan_channel(provider, channel, window);
        record_outcome(&mut section, channel, outcome);
    }
    section
}

/// Scans every channel on its own blocking task and merges in channel order.
pub async fn collect_events_concurrently(
    provider: Arc<dyn EventLogProvider>,
    channels: &[Channel],
    window: ScanWindow,
) -> EventLogSection {
    let tasks: Vec<_> = ordered_channels(channels)
        .into_iter()
        .map(|channel| {
            let provider = provider.clone();
            let task = tokio::task::spawn_blocking(move || {
                scan_channel(provider.as_ref(), channel, &window)
            });
            (channel, task)
        })
        .collect();

    let mut section = EventLogSection::default();
    for (channel, task) in tasks {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => ChannelOutcome {
                scan: ChannelScan::default(),
                error: Some(ProviderError::ChannelRead {
                    channel,
                    message: format!("scan task failed: {err}"),
                }),
            },
        };
        record_outcome(&mut section, channel, outcome);
    }
    section
}

fn record_outcome(section: &mut EventLogSection, channel: Channel, outcome: ChannelOutcome) {
    let ChannelOutcome { scan, error } = outcome;
    match &error {
        Some(err) => warn!(
            channel = %channel,
            kept = scan.records.len(),
            error = %err,
            "event log channel collection failed"
        ),
        None => info!(
            channel = %channel,
            kept = scan.records.len(),
            reached_window_start = scan.reached_window_start,
            "event log channel collected"
        ),
    }

    if let Some(err) = error {
        section.failures.insert(channel, err.to_string());
    }
    if scan.skipped_malformed > 0 {
        section.skipped.insert(channel, scan.skipped_malformed);
    }
    section.logs.insert(channel, scan.records);
}
