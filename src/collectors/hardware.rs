use crate::collectors::{
    HardwareProvider, ProviderError, RawBaseboard, RawDiskDrive, RawMemoryModule,
    RawNetworkAdapter, RawProcessor,
};
use crate::snapshot::{CpuInfo, DiskDrive, HardwareSection, Mainboard, MemoryModule, NetworkAdapter};
use tracing::debug;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Queries every device class and returns the normalized section. Nothing is
/// returned unless all five queries succeed.
pub fn collect_hardware(provider: &dyn HardwareProvider) -> Result<HardwareSection, ProviderError> {
    let cpus: Vec<CpuInfo> = provider.processors()?.into_iter().map(map_processor).collect();

    let memory_modules: Vec<MemoryModule> = provider
        .memory_modules()?
        .into_iter()
        .map(map_memory_module)
        .collect();

    let disks: Vec<DiskDrive> = provider
        .disk_drives()?
        .into_iter()
        .map(map_disk_drive)
        .collect();

    let raw_adapters = provider.network_adapters()?;
    let raw_adapter_count = raw_adapters.len();
    let network_adapters: Vec<NetworkAdapter> =
        raw_adapters.into_iter().filter_map(map_network_adapter).collect();

    let mainboard = provider
        .baseboards()?
        .into_iter()
        .map(map_baseboard)
        .last();

    debug!(
        cpus = cpus.len(),
        memory_modules = memory_modules.len(),
        disks = disks.len(),
        network_adapters = network_adapters.len(),
        skipped_adapters = raw_adapter_count - network_adapters.len(),
        mainboard = mainboard.is_some(),
        "hardware inventory normalized"
    );

    Ok(HardwareSection {
        cpus,
        memory_modules,
        disks,
        network_adapters,
        mainboard,
    })
}

/// Bytes to GiB, rounded half away from zero to two decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    let gib = bytes as f64 / BYTES_PER_GIB;
    (gib * 100.0).round() / 100.0
}

/// A logical processor count below the core count is dropped as unknown.
fn map_processor(raw: RawProcessor) -> CpuInfo {
    let thread_count = match (raw.number_of_cores, raw.number_of_logical_processors) {
        (Some(cores), Some(threads)) if threads < cores => {
            debug!(cores, threads, "discarding thread count below core count");
            None
        }
        (_, threads) => threads,
    };
    CpuInfo {
        name: raw.name,
        core_count: raw.number_of_cores,
        thread_count,
        max_clock_mhz: raw.max_clock_speed,
    }
}

fn map_memory_module(raw: RawMemoryModule) -> MemoryModule {
    MemoryModule {
        capacity_gb: raw.capacity_bytes.map(bytes_to_gb),
        speed_mhz: raw.speed,
        manufacturer: raw.manufacturer,
    }
}

fn map_disk_drive(raw: RawDiskDrive) -> DiskDrive {
    DiskDrive {
        display_name: raw.caption,
        size_gb: raw.size_bytes.map(bytes_to_gb),
        interface_type: raw.interface_type,
        model: raw.model,
    }
}

fn map_network_adapter(raw: RawNetworkAdapter) -> Option<NetworkAdapter> {
    if raw.physical_adapter != Some(true) {
        return None;
    }
    let mac_address = raw.mac_address?;
    Some(NetworkAdapter {
        name: raw.name,
        adapter_type: raw.adapter_type,
        mac_address,
        speed: raw.speed,
    })
}

fn map_baseboard(raw: RawBaseboard) -> Mainboard {
    Mainboard {
        manufacturer: raw.manufacturer,
        product: raw.product,
        serial_number: raw.serial_number,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    const GIB: u64 = 1024 * 1024 * 1024;

    #[derive(Default)]
    pub(crate) struct FakeHardware {
        pub processors: Vec<RawProcessor>,
        pub memory: Vec<RawMemoryModule>,
        pub disks: Vec<RawDiskDrive>,
        pub adapters: Vec<RawNetworkAdapter>,
        pub boards: Vec<RawBaseboard>,
        pub fail_disks: bool,
        pub boards_queried: AtomicBool,
    }

    impl HardwareProvider for FakeHardware {
        fn processors(&self) -> Result<Vec<RawProcessor>, ProviderError> {
            Ok(self.processors.clone())
        }

        fn memory_modules(&self) -> Result<Vec<RawMemoryModule>, ProviderError> {
            Ok(self.memory.clone())
        }

        fn disk_drives(&self) -> Result<Vec<RawDiskDrive>, ProviderError> {
            if self.fail_disks {
                return Err(ProviderError::Query {
                    class: "Win32_DiskDrive",
                    message: "access denied".to_string(),
                });
            }
            Ok(self.disks.clone())
        }

        fn network_adapters(&self) -> Result<Vec<RawNetworkAdapter>, ProviderError> {
            Ok(self.adapters.clone())
        }

        fn baseboards(&self) -> Result<Vec<RawBaseboard>, ProviderError> {
            self.boards_queried.store(true, Ordering::SeqCst);
            Ok(self.boards.clone())
        }
    }

    fn adapter(name: &str, mac: Option<&str>, physical: Option<bool>) -> RawNetworkAdapter {
        RawNetworkAdapter {
            name: Some(name.to_string()),
            adapter_type: Some("Ethernet 802.3".to_string()),
            mac_address: mac.map(ToString::to_string),
            speed: Some(1_000_000_000),
            physical_adapter: physical,
        }
    }

    #[test]
    fn converts_bytes_to_rounded_gib() {
        assert_eq!(bytes_to_gb(8 * GIB), 8.0);
        assert_eq!(bytes_to_gb(0), 0.0);
        // 1.125 GiB is exact in binary, so this is a true half-way case.
        assert_eq!(bytes_to_gb(GIB + GIB / 8), 1.13);
        assert_eq!(bytes_to_gb(GIB + GIB / 8 - 1), 1.12);
        assert_eq!(bytes_to_gb(500_107_862_016), 465.76);
    }

    #[test]
    fn keeps_only_physical_adapters_with_mac() {
        let provider = FakeHardware {
            adapters: vec![
                adapter("Intel I219-V", Some("AA:BB:CC:DD:EE:01"), Some(true)),
                adapter("Hyper-V Virtual Ethernet", Some("00:15:5D:00:00:01"), Some(false)),
                adapter("Bluetooth PAN", None, Some(true)),
                adapter("WAN Miniport", Some("AA:BB:CC:DD:EE:02"), None),
                adapter("Realtek 8125", Some("AA:BB:CC:DD:EE:03"), Some(true)),
            ],
            ..FakeHardware::default()
        };

        let section = collect_hardware(&provider).expect("hardware collected");
        let names: Vec<_> = section
            .network_adapters
            .iter()
            .map(|a| a.name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["Intel I219-V", "Realtek 8125"]);
        assert!(section.network_adapters.iter().all(|a| !a.mac_address.is_empty()));
    }

    #[test]
    fn last_baseboard_wins() {
        let provider = FakeHardware {
            boards: vec![
                RawBaseboard {
                    manufacturer: Some("First".to_string()),
                    product: None,
                    serial_number: None,
                },
                RawBaseboard {
                    manufacturer: Some("ASUSTeK".to_string()),
                    product: Some("PRIME B550".to_string()),
                    serial_number: None,
                },
            ],
            ..FakeHardware::default()
        };

        let section = collect_hardware(&provider).expect("hardware collected");
        let board = section.mainboard.expect("mainboard present");
        assert_eq!(board.manufacturer.as_deref(), Some("ASUSTeK"));
        assert_eq!(board.serial_number, None);
    }

    #[test]
    fn missing_attributes_stay_absent() {
        let provider = FakeHardware {
            processors: vec![RawProcessor {
                name: Some("AMD Ryzen 7 5800X".to_string()),
                number_of_cores: Some(8),
                number_of_logical_processors: Some(16),
                max_clock_speed: None,
            }],
            memory: vec![RawMemoryModule {
                capacity_bytes: None,
                speed: None,
                manufacturer: None,
            }],
            ..FakeHardware::default()
        };

        let section = collect_hardware(&provider).expect("hardware collected");
        assert_eq!(section.cpus[0].max_clock_mhz, None);
        assert_eq!(section.cpus[0].thread_count, Some(16));
        assert_eq!(section.memory_modules[0].capacity_gb, None);
        assert!(section.mainboard.is_none());
    }

    #[test]
    fn query_failure_aborts_collection() {
        let provider = FakeHardware {
            processors: vec![RawProcessor::default()],
            fail_disks: true,
            ..FakeHardware::default()
        };

        let err = collect_hardware(&provider).expect_err("disk query fails");
        assert!(matches!(err, ProviderError::Query { class: "Win32_DiskDrive", .. }));
        assert!(!provider.boards_queried.load(Ordering::SeqCst));
    }

    #[test]
    fn memory_capacities_are_converted() {
        let provider = FakeHardware {
            memory: vec![
                RawMemoryModule {
                    capacity_bytes: Some(8 * GIB),
                    speed: Some(3200),
                    manufacturer: Some("Kingston".to_string()),
                },
                RawMemoryModule {
                    capacity_bytes: Some(16 * GIB),
                    speed: Some(3200),
                    manufacturer: Some("Samsung".to_string()),
                },
            ],
            ..FakeHardware::default()
        };

        let section = collect_hardware(&provider).expect("hardware collected");
        let caps: Vec<_> = section
            .memory_modules
            .iter()
            .map(|m| m.capacity_gb)
            .collect();
        assert_eq!(caps, vec![Some(8.0), Some(16.0)]);
    }

    #[test]
    fn thread_count_below_core_count_is_unknown() {
        let cpu = |cores, threads| RawProcessor {
            name: Some("Test CPU".to_string()),
            number_of_cores: cores,
            number_of_logical_processors: threads,
            max_clock_speed: None,
        };
        let provider = FakeHardware {
            processors: vec![
                cpu(Some(8), Some(4)),
                cpu(Some(8), Some(8)),
                cpu(Some(6), Some(12)),
                cpu(None, Some(4)),
            ],
            ..FakeHardware::default()
        };

        let section = collect_hardware(&provider).expect("hardware collected");
        let counts: Vec<_> = section
            .cpus
            .iter()
            .map(|c| (c.core_count, c.thread_count))
            .collect();
        assert_eq!(
            counts,
            vec![
                (Some(8), None),
                (Some(8), Some(8)),
                (Some(6), Some(12)),
                (None, Some(4)),
            ]
        );
    }
}
