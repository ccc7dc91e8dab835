//! Host health snapshot

use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use sysinfo::{Disks, System};

/// Usage percentage at or above which the host is reported unhealthy
pub const UNHEALTHY_PERCENT: f32 = 90.0;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub cpu_usage: String,
    pub ram_usage: String,
    pub available_ram: String,
    pub total_ram: String,
    pub disk_usage: String,
    pub available_disk: String,
    pub total_disk: String,
    pub load_average: LoadAverage,
    pub uptime: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadAverage {
    #[serde(rename = "1m")]
    pub one: String,
    #[serde(rename = "5m")]
    pub five: String,
    #[serde(rename = "15m")]
    pub fifteen: String,
}

/// Raw host figures, in bytes and seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSample {
    pub cpu_percent: f32,
    pub total_ram: u64,
    pub available_ram: u64,
    pub total_disk: u64,
    pub available_disk: u64,
    pub load: (f64, f64, f64),
    pub uptime_secs: u64,
}

fn used_percent(total: u64, available: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (total.saturating_sub(available) as f64 / total as f64 * 100.0) as f32
}

fn gigabytes(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / GIB)
}

impl HostSample {
    pub fn report(&self) -> HealthReport {
        let ram = used_percent(self.total_ram, self.available_ram);
        let disk = used_percent(self.total_disk, self.available_disk);
        let healthy = self.cpu_percent < UNHEALTHY_PERCENT
            && ram < UNHEALTHY_PERCENT
            && disk < UNHEALTHY_PERCENT;

        HealthReport {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            cpu_usage: format!("{:.1}%", self.cpu_percent),
            ram_usage: format!("{:.1}%", ram),
            available_ram: gigabytes(self.available_ram),
            total_ram: gigabytes(self.total_ram),
            disk_usage: format!("{:.1}%", disk),
            available_disk: gigabytes(self.available_disk),
            total_disk: gigabytes(self.total_disk),
            load_average: LoadAverage {
                one: format!("{:.2}", self.load.0),
                five: format!("{:.2}", self.load.1),
                fifteen: format!("{:.2}", self.load.2),
            },
            uptime: format!("{:.2} hours", self.uptime_secs as f64 / 3600.0),
        }
    }
}

/// Samples the host through `sysinfo`.
///
/// CPU usage is the delta since the previous sample, so the first report
/// after startup may read low.
pub struct HealthReporter {
    system: Mutex<System>,
}

impl HealthReporter {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn sample(&self) -> HostSample {
        let (cpu_percent, total_ram, available_ram) = match self.system.lock() {
            Ok(mut system) => {
                system.refresh_cpu();
                system.refresh_memory();
                (
                    system.global_cpu_info().cpu_usage(),
                    system.total_memory(),
                    system.available_memory(),
                )
            }
            Err(_) => (0.0, 0, 0),
        };

        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));
        let (total_disk, available_disk) = root
            .map(|d| (d.total_space(), d.available_space()))
            .unwrap_or((0, 0));

        let load = System::load_average();

        HostSample {
            cpu_percent,
            total_ram,
            available_ram,
            total_disk,
            available_disk,
            load: (load.one, load.five, load.fifteen),
            uptime_secs: System::uptime(),
        }
    }

    pub fn report(&self) -> HealthReport {
        self.sample().report()
    }
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;

    fn sample() -> HostSample {
        HostSample {
            cpu_percent: 12.5,
            total_ram: 16 * GB,
            available_ram: 12 * GB,
            total_disk: 100 * GB,
            available_disk: 40 * GB,
            load: (0.5, 0.25, 0.1),
            uptime_secs: 7200,
        }
    }

    #[test]
    fn test_report_formatting() {
        let report = sample().report();
        assert_eq!(report.status, "healthy");
        assert_eq!(report.cpu_usage, "12.5%");
        assert_eq!(report.ram_usage, "25.0%");
        assert_eq!(report.available_ram, "12.00 GB");
        assert_eq!(report.total_disk, "100.00 GB");
        assert_eq!(report.disk_usage, "60.0%");
        assert_eq!(report.uptime, "2.00 hours");
    }

    #[test]
    fn test_any_saturated_resource_is_unhealthy() {
        let mut busy = sample();
        busy.cpu_percent = 95.0;
        assert_eq!(busy.report().status, "unhealthy");

        let mut full_disk = sample();
        full_disk.available_disk = 5 * GB;
        assert_eq!(full_disk.report().status, "unhealthy");
    }

    #[test]
    fn test_load_average_keys() {
        let value = serde_json::to_value(sample().report()).unwrap();
        assert_eq!(value["load_average"]["1m"], "0.50");
        assert_eq!(value["load_average"]["5m"], "0.25");
        assert_eq!(value["load_average"]["15m"], "0.10");
    }

    #[test]
    fn test_live_sample_is_consistent() {
        let sample = HealthReporter::new().sample();
        assert!(sample.available_ram <= sample.total_ram);
    }
}
