use frame_codec::Address;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;
use time::OffsetDateTime;

/// Identifier of one numeric property on a device.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataPointId(pub u8);

/// One device on the bus, owned by the registry. A data point missing from
/// `values` has no known value — it never defaults to zero.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    #[serde(serialize_with = "address_as_u8")]
    pub address: Address,
    pub product_id: u32,
    pub values: BTreeMap<DataPointId, i16>,
}

impl Device {
    pub fn new(address: Address, product_id: u32) -> Self {
        Self {
            address,
            product_id,
            values: BTreeMap::new(),
        }
    }
}

fn address_as_u8<S: Serializer>(address: &Address, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_u8(address.raw())
}

/// Read-only copy of the registry state, safe to hand to external
/// consumers while polling continues.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<String>,
    pub devices: Vec<Device>,
}

/// Pushed to subscribers when an unconfigured device gets its address.
#[derive(Debug, Clone)]
pub struct PairingEvent {
    pub device: Device,
    pub paired_at: OffsetDateTime,
}

/// Timing and address-space parameters for scanning and polling.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Addresses probed by a scan. Full-range scan time is bounded by
    /// `scan_range.len() * probe_timeout`, so keep the probe window short.
    pub scan_range: RangeInclusive<u8>,
    pub probe_timeout: Duration,
    pub reply_timeout: Duration,
    pub update_interval: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            scan_range: Address::MIN..=Address::MAX,
            probe_timeout: Duration::from_millis(150),
            reply_timeout: Duration::from_millis(500),
            update_interval: Duration::from_secs(1),
        }
    }
}
