use anyhow::{bail, Context, Result};
use bus_transport::{Parity, SerialSettings, StopBits};
use device_registry::RegistrySettings;
use frame_codec::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSection {
    pub port: String,
    pub baud_rate: u32,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSection {
    pub first: u8,
    pub last: u8,
    pub probe_timeout_ms: u64,
    pub reply_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub serial: SerialSection,
    pub scan: ScanSection,
    pub update_interval_ms: u64,
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            serial: SerialSection {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
                parity: default_parity(),
                stop_bits: default_stop_bits(),
            },
            scan: ScanSection {
                first: Address::MIN,
                last: Address::MAX,
                probe_timeout_ms: 150,
                reply_timeout_ms: 500,
            },
            update_interval_ms: 1000,
        }
    }
}

impl HubConfig {
    pub fn serial_settings(&self) -> Result<SerialSettings> {
        let parity = match self.serial.parity.as_str() {
            "none" => Parity::None,
            "even" => Parity::Even,
            "odd" => Parity::Odd,
            other => bail!("unknown parity in settings: {other:?}"),
        };
        let stop_bits = match self.serial.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => bail!("stop_bits must be 1 or 2, got {other}"),
        };
        Ok(SerialSettings {
            path: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
            parity,
            stop_bits,
        })
    }

    pub fn registry_settings(&self) -> Result<RegistrySettings> {
        if Address::new(self.scan.first).is_none() || Address::new(self.scan.last).is_none() {
            bail!(
                "scan range {first}..={last} is outside the address space",
                first = self.scan.first,
                last = self.scan.last
            );
        }
        if self.scan.first > self.scan.last {
            bail!("scan range is empty");
        }
        Ok(RegistrySettings {
            scan_range: self.scan.first..=self.scan.last,
            probe_timeout: Duration::from_millis(self.scan.probe_timeout_ms),
            reply_timeout: Duration::from_millis(self.scan.reply_timeout_ms),
            update_interval: Duration::from_millis(self.update_interval_ms),
        })
    }
}

/// Load `hub.json` from the settings directory. A missing file is written
/// out with defaults and reported as an error so the operator can edit it
/// before the hub first touches the bus.
pub fn load_settings(dir: impl AsRef<Path>) -> Result<HubConfig> {
    let path = dir.as_ref().join("hub.json");
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating settings directory: {}", parent.display()))?;
        }
        let defaults = serde_json::to_string_pretty(&HubConfig::default())?;
        fs::write(&path, defaults)
            .with_context(|| format!("writing default settings: {}", path.display()))?;
        bail!(
            "settings file created at {path}; edit it before running",
            path = path.display()
        );
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("reading settings file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing settings: {}", path.display()))
}
