use crate::collectors::{
    HardwareProvider, ProviderError, RawBaseboard, RawDiskDrive, RawMemoryModule,
    RawNetworkAdapter, RawProcessor,
};
#[cfg(any(test, target_os = "linux"))]
use crate::collectors::{clean_text, parse_u64_loose};
#[cfg(any(test, target_os = "linux"))]
use std::fs;
use std::path::PathBuf;
#[cfg(any(test, target_os = "linux"))]
use std::path::Path;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

/// Portable inventory built on `sysinfo`, enriched from sysfs on Linux.
///
/// Memory is reported as a single module holding the total installed RAM,
/// since per-DIMM data needs privileged SMBIOS access.
#[derive(Debug, Clone)]
pub struct SysinfoHardwareProvider {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    sysfs_root: PathBuf,
}

impl Default for SysinfoHardwareProvider {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
        }
    }
}

pub fn host_name() -> Option<String> {
    System::new().host_name()
}

impl HardwareProvider for SysinfoHardwareProvider {
    fn processors(&self) -> Result<Vec<RawProcessor>, ProviderError> {
        let mut system = System::new();
        system.refresh_cpu();
        let Some(first) = system.cpus().first() else {
            return Ok(Vec::new());
        };

        let name = first.brand().trim().to_string();
        let current_mhz = u32::try_from(first.frequency()).ok().filter(|v| *v > 0);
        Ok(vec![RawProcessor {
            name: if name.is_empty() { None } else { Some(name) },
            number_of_cores: system
                .physical_core_count()
                .and_then(|v| u32::try_from(v).ok()),
            number_of_logical_processors: u32::try_from(system.cpus().len()).ok(),
            max_clock_speed: self.max_clock_mhz().or(current_mhz),
        }])
    }

    fn memory_modules(&self) -> Result<Vec<RawMemoryModule>, ProviderError> {
        let mut system = System::new();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![RawMemoryModule {
            capacity_bytes: Some(total),
            speed: None,
            manufacturer: None,
        }])
    }

    fn disk_drives(&self) -> Result<Vec<RawDiskDrive>, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            let drives = read_block_devices(&self.sysfs_root);
            if !drives.is_empty() {
                return Ok(drives);
            }
            debug!("no block devices in sysfs, falling back to mounted disks");
        }

        let mut system = System::new();
        system.refresh_disks_list();
        Ok(system
            .disks()
            .iter()
            .map(|d| RawDiskDrive {
                caption: Some(d.name().to_string_lossy().to_string()),
                size_bytes: Some(d.total_space()),
                interface_type: Some(format!("{:?}", d.kind())),
                model: None,
            })
            .collect())
    }

    fn network_adapters(&self) -> Result<Vec<RawNetworkAdapter>, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            Ok(read_net_adapters(&self.sysfs_root))
        }
        #[cfg(not(target_os = "linux"))]
        {
            debug!("adapter physicality is unknown on this platform");
            Ok(Vec::new())
        }
    }

    fn baseboards(&self) -> Result<Vec<RawBaseboard>, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            Ok(read_dmi_board(&self.sysfs_root).into_iter().collect())
        }
        #[cfg(not(target_os = "linux"))]
        {
            Ok(Vec::new())
        }
    }
}

impl SysinfoHardwareProvider {
    #[cfg(target_os = "linux")]
    fn max_clock_mhz(&self) -> Option<u32> {
        let path = self
            .sysfs_root
            .join("devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq");
        let khz = read_u64(&path)?;
        u32::try_from(khz / 1000).ok().filter(|v| *v > 0)
    }

    #[cfg(not(target_os = "linux"))]
    fn max_clock_mhz(&self) -> Option<u32> {
        None
    }
}

#[cfg(any(test, target_os = "linux"))]
fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().and_then(|s| clean_text(&s))
}

#[cfg(any(test, target_os = "linux"))]
fn read_u64(path: &Path) -> Option<u64> {
    read_trimmed(path).and_then(|s| parse_u64_loose(&s))
}

#[cfg(any(test, target_os = "linux"))]
fn sorted_entries(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            Some((name, e.path()))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[cfg(any(test, target_os = "linux"))]
fn read_block_devices(sysfs_root: &Path) -> Vec<RawDiskDrive> {
    const VIRTUAL_PREFIXES: [&str; 5] = ["loop", "ram", "zram", "dm-", "md"];

    sorted_entries(&sysfs_root.join("block"))
        .into_iter()
        .filter(|(name, _)| !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)))
        .map(|(name, path)| {
            let size_bytes =
                read_u64(&path.join("size")).map(|sectors| sectors.saturating_mul(512));
            RawDiskDrive {
                caption: Some(format!("/dev/{name}")),
                size_bytes,
                interface_type: block_interface(&name).map(ToString::to_string),
                model: read_trimmed(&path.join("device/model")),
            }
        })
        .collect()
}

#[cfg(any(test, target_os = "linux"))]
fn block_interface(name: &str) -> Option<&'static str> {
    if name.starts_with("nvme") {
        Some("NVMe")
    } else if name.starts_with("sd") {
        Some("SCSI")
    } else if name.starts_with("mmcblk") {
        Some("MMC")
    } else if name.starts_with("vd") {
        Some("VirtIO")
    } else if name.starts_with("hd") {
        Some("IDE")
    } else {
        None
    }
}

#[cfg(any(test, target_os = "linux"))]
fn read_net_adapters(sysfs_root: &Path) -> Vec<RawNetworkAdapter> {
    sorted_entries(&sysfs_root.join("class/net"))
        .into_iter()
        .map(|(name, path)| {
            let mac_address =
                read_trimmed(&path.join("address")).filter(|mac| mac != "00:00:00:00:00:00");
            let adapter_type = if path.join("wireless").exists() {
                Some("Wireless".to_string())
            } else {
                match read_u64(&path.join("type")) {
                    Some(1) => Some("Ethernet".to_string()),
                    Some(772) => Some("Loopback".to_string()),
                    Some(other) => Some(format!("ARPHRD {other}")),
                    None => None,
                }
            };
            // sysfs reports Mb/s; -1 or an unreadable file means the link is down.
            let speed = read_trimmed(&path.join("speed"))
                .and_then(|s| s.parse::<i64>().ok())
                .filter(|mbps| *mbps > 0)
                .map(|mbps| (mbps as u64).saturating_mul(1_000_000));

            RawNetworkAdapter {
                name: Some(name),
                adapter_type,
                mac_address,
                speed,
                physical_adapter: Some(path.join("device").exists()),
            }
        })
        .collect()
}

#[cfg(any(test, target_os = "linux"))]
fn read_dmi_board(sysfs_root: &Path) -> Option<RawBaseboard> {
    let dmi = sysfs_root.join("class/dmi/id");
    let board = RawBaseboard {
        manufacturer: read_trimmed(&dmi.join("board_vendor")),
        product: read_trimmed(&dmi.join("board_name")),
        serial_number: read_trimmed(&dmi.join("board_serial")),
    };
    if board == RawBaseboard::default() {
        None
    } else {
        Some(board)
    }
}
