mod collectors;
mod config;
mod persist;
mod report;
mod snapshot;

use chrono::NaiveDateTime;
use clap::Parser;
use collectors::events::{collect_events_concurrently, ScanWindow};
use collectors::hardware::collect_hardware;
use collectors::host::{host_name, SysinfoHardwareProvider};
use collectors::windows::{CimHardwareProvider, WinEventProvider};
use collectors::{EventLogProvider, HardwareProvider, ProviderError, UnsupportedEventLog};
use config::{Config, ConfigError, HardwareBackend};
use persist::{persist, Destination, PersistError, PersistedFiles};
use report::{render, ReportError};
use snapshot::{Channel, SnapshotMeta, SystemSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "sysanalyzer")]
#[command(version)]
#[command(about = "Point-in-time hardware and event log inventory of this host")]
struct Cli {
    /// YAML config file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Trailing event log window in days.
    #[arg(long)]
    days: Option<u64>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Event log channel to scan; repeat to scan several.
    #[arg(long = "channel")]
    channels: Vec<Channel>,
    #[arg(long, value_enum)]
    hardware_backend: Option<HardwareBackend>,
}

#[derive(Debug, Error)]
enum PipelineError {
    #[error("hardware collection failed: {0}")]
    Hardware(#[source] ProviderError),
    #[error("report rendering failed: {0}")]
    Render(#[source] ReportError),
    #[error("persisting artifacts failed: {0}")]
    Persist(#[source] PersistError),
}

impl PipelineError {
    fn stage(&self) -> &'static str {
        match self {
            PipelineError::Hardware(_) => "hardware",
            PipelineError::Render(_) => "report",
            PipelineError::Persist(_) => "persist",
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Hardware(_) => 10,
            PipelineError::Render(_) => 11,
            PipelineError::Persist(_) => 12,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match resolve_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(stage = "config", error = %err, "failed to load configuration");
            std::process::exit(EXIT_CONFIG);
        }
    };

    info!(
        output_dir = %cfg.output_dir.display(),
        window_days = cfg.window_days,
        channels = ?cfg.channels,
        backend = ?cfg.hardware_backend,
        "starting sysanalyzer"
    );

    let hardware = hardware_provider(cfg.hardware_backend);
    let events = event_log_provider(cfg.event_batch_size);
    let now = chrono::Local::now().naive_local();
    let meta = SnapshotMeta {
        generated_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
        host_name: host_name(),
        window_days: cfg.window_days,
    };

    match run_pipeline(hardware, events, &cfg, now, meta).await {
        Ok(files) => {
            println!("System data written to {}", files.data.display());
            println!("Report written to {}", files.report.display());
        }
        Err(err) => {
            error!(stage = err.stage(), error = %err, "analysis aborted");
            std::process::exit(err.exit_code());
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if let Some(days) = cli.days {
        cfg.window_days = days;
    }
    if let Some(dir) = &cli.output_dir {
        cfg.output_dir = dir.clone();
    }
    if !cli.channels.is_empty() {
        cfg.channels = cli.channels.clone();
    }
    if let Some(backend) = cli.hardware_backend {
        cfg.hardware_backend = backend;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn hardware_provider(backend: HardwareBackend) -> Arc<dyn HardwareProvider> {
    match backend {
        HardwareBackend::Cim => Arc::new(CimHardwareProvider),
        HardwareBackend::Sysinfo => Arc::new(SysinfoHardwareProvider::default()),
        HardwareBackend::Auto if cfg!(target_os = "windows") => Arc::new(CimHardwareProvider),
        HardwareBackend::Auto => Arc::new(SysinfoHardwareProvider::default()),
    }
}

fn event_log_provider(batch_size: usize) -> Arc<dyn EventLogProvider> {
    if cfg!(target_os = "windows") {
        Arc::new(WinEventProvider::new(batch_size))
    } else {
        Arc::new(UnsupportedEventLog)
    }
}

/// Hardware, then event logs, then render, then persist. Channel failures
/// are carried in the snapshot and never abort the run.
async fn run_pipeline(
    hardware: Arc<dyn HardwareProvider>,
    events: Arc<dyn EventLogProvider>,
    cfg: &Config,
    now: NaiveDateTime,
    meta: SnapshotMeta,
) -> Result<PersistedFiles, PipelineError> {
    let started = Instant::now();
    info!("collecting hardware inventory");
    let hardware_section = tokio::task::spawn_blocking(move || collect_hardware(hardware.as_ref()))
        .await
        .map_err(|err| {
            PipelineError::Hardware(ProviderError::Unavailable(format!(
                "hardware task failed: {err}"
            )))
        })?
        .map_err(PipelineError::Hardware)?;
    info!(
        cpus = hardware_section.cpus.len(),
        memory_modules = hardware_section.memory_modules.len(),
        disks = hardware_section.disks.len(),
        network_adapters = hardware_section.network_adapters.len(),
        elapsed = %humantime::format_duration(started.elapsed()),
        "hardware inventory collected"
    );

    let started = Instant::now();
    let window = ScanWindow::trailing(now, cfg.window_days);
    info!(start = %window.start, end = %window.now, "scanning event logs");
    let event_section = collect_events_concurrently(events, &cfg.channels, window).await;
    info!(
        records = event_section.logs.values().map(Vec::len).sum::<usize>(),
        failed_channels = event_section.failures.len(),
        skipped = event_section.skipped.values().sum::<u64>(),
        elapsed = %humantime::format_duration(started.elapsed()),
        "event logs collected"
    );

    let snapshot = SystemSnapshot::assemble(meta, hardware_section, event_section);
    let text = render(&snapshot).map_err(PipelineError::Render)?;

    let destination = Destination {
        dir: cfg.output_dir.clone(),
        data_file: cfg.data_file.clone(),
        report_file: cfg.report_file.clone(),
    };
    let files = persist(&snapshot, &text, &destination).map_err(PipelineError::Persist)?;
    info!(
        data = %files.data.display(),
        report = %files.report.display(),
        "artifacts written"
    );
    Ok(files)
}
