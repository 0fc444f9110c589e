use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sysinfo::System;
use tracing::debug;

const UNKNOWN: &str = "Unknown";

/// Device metadata embedded in every report. Informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub model: String,
    pub system_name: String,
    pub system_version: String,
    pub device_name: String,
    /// Charge in `0.0..=1.0`, or `-1.0` when the level cannot be read.
    pub battery_level: f64,
    pub battery_state: String,
    /// Test id to whether the device has the hardware for it.
    #[serde(default)]
    pub capabilities: BTreeMap<String, bool>,
}

impl DeviceInfo {
    pub fn unknown() -> Self {
        Self {
            model: UNKNOWN.to_string(),
            system_name: UNKNOWN.to_string(),
            system_version: UNKNOWN.to_string(),
            device_name: UNKNOWN.to_string(),
            battery_level: -1.0,
            battery_state: UNKNOWN.to_string(),
            capabilities: BTreeMap::new(),
        }
    }

    /// Battery as shown to people, e.g. `80% (Charging)`.
    pub fn battery_summary(&self) -> String {
        if self.battery_level < 0.0 {
            format!("Unknown ({})", self.battery_state)
        } else {
            format!(
                "{}% ({})",
                (self.battery_level * 100.0).round() as i64,
                self.battery_state
            )
        }
    }
}

/// Source of device metadata at report time.
pub trait DeviceInfoProvider: Send + Sync {
    fn device_info(&self) -> DeviceInfo;
}

/// Reads metadata of the machine the process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDeviceInfo;

impl DeviceInfoProvider for HostDeviceInfo {
    fn device_info(&self) -> DeviceInfo {
        let sys = System::new_all();
        let brand = sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty());

        let info = DeviceInfo {
            model: brand.unwrap_or_else(|| std::env::consts::ARCH.to_string()),
            system_name: System::name().unwrap_or_else(|| UNKNOWN.to_string()),
            system_version: System::os_version().unwrap_or_else(|| UNKNOWN.to_string()),
            device_name: System::host_name().unwrap_or_else(|| UNKNOWN.to_string()),
            // No battery source on the host enumerator.
            battery_level: -1.0,
            battery_state: UNKNOWN.to_string(),
            capabilities: BTreeMap::new(),
        };
        debug!("Detected device: {} / {} {}", info.model, info.system_name, info.system_version);
        info
    }
}

impl<F> DeviceInfoProvider for F
where
    F: Fn() -> DeviceInfo + Send + Sync,
{
    fn device_info(&self) -> DeviceInfo {
        self()
    }
}
