//! Host metric sampling.
//!
//! Produces one immutable [`ClusterSnapshot`] per tick:
//! - per-core and aggregate CPU load
//! - CPU temperature (primary sensor, absent if the platform exposes none)
//! - memory totals
//! - per-interface network throughput
//! - per-volume storage usage and aggregate disk I/O throughput
//! - uptime
//!
//! Every source is queried independently and best-effort: a failing or
//! absent source yields `None`/empty for its field only, never a skipped
//! tick. The sampler keeps its `sysinfo` handles alive between ticks so CPU
//! usage and network/disk counters have a previous refresh to diff against.

mod diskstats;

use diskstats::DiskCounters;
use serde::Serialize;
use std::time::Instant;
use sysinfo::{Components, Disks, Networks, System};
use tracing::debug;

/// One fully-formed reading of all host metrics at a single instant.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterSnapshot {
    pub cpu: CpuLoad,
    /// Primary CPU temperature in Celsius, absent when no sensor is exposed.
    pub temperature_c: Option<f32>,
    pub memory: MemoryUsage,
    pub network: Vec<InterfaceThroughput>,
    pub storage: Vec<VolumeUsage>,
    /// Aggregate storage I/O rates, absent outside Linux or on read failure.
    pub disk_io: Option<DiskThroughput>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CpuLoad {
    /// Load percentage per logical core, index = core id.
    pub per_core: Vec<f32>,
    pub aggregate: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InterfaceThroughput {
    pub name: String,
    /// Instantaneous total throughput estimate (rx + tx), bytes per second.
    pub bandwidth_bps: f64,
    pub rx_bps: f64,
    pub tx_bps: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VolumeUsage {
    pub name: String,
    pub filesystem: String,
    pub mount_point: String,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiskThroughput {
    pub read_bps: f64,
    pub write_bps: f64,
}

/// Source of snapshots for the broadcast loop. Split out so tests can drive
/// ticks with fixed values instead of the live host.
pub trait Sample: Send {
    fn sample(&mut self) -> ClusterSnapshot;
}

/// Live sampler backed by `sysinfo` plus `/proc/diskstats` on Linux.
pub struct Sampler {
    sys: System,
    components: Components,
    networks: Networks,
    disks: Disks,
    last_disk_counters: Option<DiskCounters>,
    last_refresh: Instant,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            sys: System::new_all(),
            components: Components::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            last_disk_counters: DiskCounters::read().ok(),
            last_refresh: Instant::now(),
        }
    }

    fn cpu(&mut self) -> CpuLoad {
        self.sys.refresh_cpu_usage();
        CpuLoad {
            per_core: self.sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
            aggregate: self.sys.global_cpu_info().cpu_usage(),
        }
    }

    fn temperature(&mut self) -> Option<f32> {
        self.components.refresh();
        // Prefer an explicitly CPU-labelled sensor, fall back to the first one.
        let primary = self
            .components
            .iter()
            .find(|c| {
                let label = c.label().to_ascii_lowercase();
                label.contains("cpu") || label.contains("core") || label.contains("tctl")
            })
            .or_else(|| self.components.iter().next())?;
        let celsius = primary.temperature();
        (!celsius.is_nan()).then_some(celsius)
    }

    fn memory(&mut self) -> MemoryUsage {
        self.sys.refresh_memory();
        MemoryUsage {
            total_bytes: self.sys.total_memory(),
            used_bytes: self.sys.used_memory(),
            free_bytes: self.sys.free_memory(),
        }
    }

    fn network(&mut self, elapsed_secs: f64) -> Vec<InterfaceThroughput> {
        self.networks.refresh();
        self.networks
            .iter()
            .map(|(name, data)| {
                // received()/transmitted() are deltas since the last refresh
                let rx_bps = data.received() as f64 / elapsed_secs;
                let tx_bps = data.transmitted() as f64 / elapsed_secs;
                InterfaceThroughput {
                    name: name.clone(),
                    bandwidth_bps: rx_bps + tx_bps,
                    rx_bps,
                    tx_bps,
                }
            })
            .collect()
    }

    fn storage(&mut self) -> Vec<VolumeUsage> {
        self.disks.refresh();
        self.disks
            .iter()
            .map(|disk| {
                let size = disk.total_space();
                let available = disk.available_space();
                VolumeUsage {
                    name: disk.name().to_string_lossy().into_owned(),
                    filesystem: disk.file_system().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().to_string_lossy().into_owned(),
                    size_bytes: size,
                    used_bytes: size.saturating_sub(available),
                    available_bytes: available,
                }
            })
            .collect()
    }

    fn disk_io(&mut self, elapsed_secs: f64) -> Option<DiskThroughput> {
        let current = match DiskCounters::read() {
            Ok(counters) => counters,
            Err(e) => {
                debug!("disk counters unavailable: {e}");
                self.last_disk_counters = None;
                return None;
            }
        };
        let previous = self.last_disk_counters.replace(current.clone())?;
        Some(current.throughput_since(&previous, elapsed_secs))
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sample for Sampler {
    fn sample(&mut self) -> ClusterSnapshot {
        let elapsed_secs = self.last_refresh.elapsed().as_secs_f64().max(1e-3);
        self.last_refresh = Instant::now();

        // All sub-queries complete before the snapshot is assembled, so the
        // broadcast step never observes a partially populated value.
        let cpu = self.cpu();
        let temperature_c = self.temperature();
        let memory = self.memory();
        let network = self.network(elapsed_secs);
        let storage = self.storage();
        let disk_io = self.disk_io(elapsed_secs);

        ClusterSnapshot {
            cpu,
            temperature_c,
            memory,
            network,
            storage,
            disk_io,
            uptime_seconds: System::uptime(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_sample_has_consistent_fields() {
        let mut sampler = Sampler::new();
        let snapshot = sampler.sample();

        assert!(!snapshot.cpu.per_core.is_empty());
        assert!(snapshot.memory.total_bytes > 0);
        assert!(snapshot.memory.used_bytes <= snapshot.memory.total_bytes);
        assert!(
            snapshot.memory.used_bytes + snapshot.memory.free_bytes
                <= snapshot.memory.total_bytes
        );
        for volume in &snapshot.storage {
            assert!(volume.used_bytes + volume.available_bytes <= volume.size_bytes);
        }
    }

    #[test]
    fn repeated_samples_are_independent_values() {
        let mut sampler = Sampler::new();
        let first = sampler.sample();
        let second = sampler.sample();
        // fresh value objects each tick, same shape
        assert_eq!(first.cpu.per_core.len(), second.cpu.per_core.len());
    }

    #[test]
    fn snapshot_serializes_with_null_temperature() {
        let snapshot = ClusterSnapshot {
            cpu: CpuLoad {
                per_core: vec![10.0, 20.0],
                aggregate: 15.0,
            },
            temperature_c: None,
            memory: MemoryUsage {
                total_bytes: 1024,
                used_bytes: 512,
                free_bytes: 256,
            },
            network: vec![],
            storage: vec![],
            disk_io: None,
            uptime_seconds: 42,
        };
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
        assert!(v["temperature_c"].is_null());
        assert_eq!(v["cpu"]["per_core"][1], 20.0);
        assert_eq!(v["uptime_seconds"], 42);
    }
}
