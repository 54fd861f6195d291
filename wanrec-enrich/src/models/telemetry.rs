//! Gateway telemetry consumed per run

use serde::{Deserialize, Serialize};

use super::WanInterface;

/// Latest uplink snapshot for one site gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    pub network_name: String,
    pub device_serial: Option<String>,
    pub wan1_ip: Option<String>,
    pub wan2_ip: Option<String>,
    pub notes: String,
    /// Dynamic-DNS hostname configured on the gateway, if any
    pub ddns_hostname: Option<String>,
}

impl DeviceTelemetry {
    /// Trimmed uplink IP, empty when absent
    pub fn ip(&self, wan: WanInterface) -> &str {
        let ip = match wan {
            WanInterface::Wan1 => self.wan1_ip.as_deref(),
            WanInterface::Wan2 => self.wan2_ip.as_deref(),
        };
        ip.map(str::trim).unwrap_or("")
    }
}
