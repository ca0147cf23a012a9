//! Aggregate block-device I/O counters from `/proc/diskstats`.
//!
//! `sysinfo` does not expose system-wide disk throughput, so this reads the
//! kernel counters directly. On platforms without procfs the read fails and
//! the caller reports the metric as absent.

use super::DiskThroughput;
use std::io;

/// `/proc/diskstats` reports sectors in fixed 512-byte units regardless of
/// the device's real sector size.
const SECTOR_BYTES: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCounters {
    pub sectors_read: u64,
    pub sectors_written: u64,
}

impl DiskCounters {
    pub fn read() -> io::Result<Self> {
        let text = std::fs::read_to_string("/proc/diskstats")?;
        Ok(Self::parse(&text))
    }

    /// Sum sector counters over whole physical disks. Partitions are skipped
    /// so their traffic is not counted twice.
    pub fn parse(text: &str) -> Self {
        let mut sectors_read = 0u64;
        let mut sectors_written = 0u64;

        for line in text.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // major minor name reads _ sectors_read _ writes _ sectors_written ...
            if fields.len() < 10 {
                continue;
            }
            if !is_whole_disk(fields[2]) {
                continue;
            }
            if let (Ok(read), Ok(written)) = (fields[5].parse::<u64>(), fields[9].parse::<u64>()) {
                sectors_read += read;
                sectors_written += written;
            }
        }

        DiskCounters {
            sectors_read,
            sectors_written,
        }
    }

    pub fn throughput_since(&self, previous: &DiskCounters, elapsed_secs: f64) -> DiskThroughput {
        let elapsed = elapsed_secs.max(1e-3);
        let read = self.sectors_read.saturating_sub(previous.sectors_read);
        let written = self.sectors_written.saturating_sub(previous.sectors_written);
        DiskThroughput {
            read_bps: (read * SECTOR_BYTES) as f64 / elapsed,
            write_bps: (written * SECTOR_BYTES) as f64 / elapsed,
        }
    }
}

/// Whole-disk heuristic over kernel device naming conventions.
fn is_whole_disk(name: &str) -> bool {
    for virtual_prefix in ["loop", "ram", "zram", "dm-", "md", "sr"] {
        if name.starts_with(virtual_prefix) {
            return false;
        }
    }
    if let Some(rest) = name.strip_prefix("nvme") {
        // nvme0n1 is a disk, nvme0n1p1 a partition
        return !rest.contains('p');
    }
    if name.starts_with("mmcblk") {
        return !name.contains('p');
    }
    for disk_prefix in ["sd", "hd", "vd", "xvd"] {
        if name.starts_with(disk_prefix) {
            return !name.ends_with(|c: char| c.is_ascii_digit());
        }
    }
    true
}
