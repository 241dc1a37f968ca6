use crate::{
    DataPointId, Device, DeviceSession, PairingEvent, ProductCatalog, RegistryError,
    RegistrySettings, RegistrySnapshot, Result,
};
use bus_transport::{HalfDuplexBus, TransportError};
use frame_codec::{Address, Command, Frame, FRAME_LEN};
use std::collections::BTreeMap;
use std::sync::mpsc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Owner of the bus handle and of every device record on it.
///
/// All frame exchanges run through `&mut self`, which serializes them: a
/// scan probe, a poll, and a set can never interleave on the line. Pairing
/// events and snapshots are copies published outside any bus activity, so
/// a slow consumer cannot stall polling.
pub struct DeviceRegistry<B> {
    bus: B,
    catalog: ProductCatalog,
    settings: RegistrySettings,
    devices: BTreeMap<Address, Device>,
    subscribers: Vec<mpsc::Sender<PairingEvent>>,
}

impl<B: HalfDuplexBus> DeviceRegistry<B> {
    pub fn new(bus: B, catalog: ProductCatalog, settings: RegistrySettings) -> Self {
        Self {
            bus,
            catalog,
            settings,
            devices: BTreeMap::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn device(&self, address: Address) -> Option<&Device> {
        self.devices.get(&address)
    }

    pub fn register(&mut self, device: Device) {
        self.devices.insert(device.address, device);
    }

    /// Open a per-call session for one address. The session borrows the
    /// bus, so only one can exist at a time.
    pub fn session(&mut self, address: Address) -> DeviceSession<'_, B> {
        DeviceSession::new(&mut self.bus, address, self.settings.reply_timeout)
    }

    /// Subscribe to pairing notifications. Each subscriber gets its own
    /// channel; delivery never blocks the registry.
    pub fn subscribe(&mut self) -> mpsc::Receiver<PairingEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Probe every address in the scan range, then adopt any unconfigured
    /// device answering on the broadcast sentinel. Returns how many
    /// devices the scan registered.
    ///
    /// Probing is strictly sequential; the half-duplex line rules out
    /// concurrent probes, so worst-case scan time is the range length
    /// times the probe timeout.
    pub fn scan(&mut self) -> Result<usize> {
        let range = self.settings.scan_range.clone();
        let mut found = 0usize;
        for raw in range {
            let Some(address) = Address::new(raw) else {
                continue;
            };
            match self.probe(address) {
                Ok(product_id) => {
                    debug!("device at {address} reports product {product_id}");
                    self.register(Device::new(address, product_id));
                    found += 1;
                }
                Err(RegistryError::Timeout) => {}
                Err(err @ RegistryError::Transport(_)) => return Err(err),
                Err(err) => warn!("probe of {address} failed: {err}"),
            }
        }
        // Unconfigured devices answer on the sentinel; pair them one at a
        // time until the sentinel goes quiet or addresses run out.
        for _ in 0..self.free_address_count() {
            match self.probe(Address::BROADCAST) {
                Ok(product_id) => {
                    self.pair_unconfigured(product_id)?;
                    found += 1;
                }
                Err(RegistryError::Timeout) => break,
                Err(err @ RegistryError::Transport(_)) => return Err(err),
                Err(err) => {
                    warn!("broadcast probe failed: {err}");
                    break;
                }
            }
        }
        Ok(found)
    }

    /// Hand the lowest free address to an unconfigured device and record
    /// it. The adoption instruction is an unconfirmed write, like every
    /// Set-class frame on this bus. The payload carries the product id's
    /// low bits so that only the device that announced itself adopts the
    /// address when several unconfigured ones share the sentinel.
    pub fn pair_unconfigured(&mut self, product_id: u32) -> Result<Address> {
        let address = self
            .lowest_free_address()
            .ok_or(RegistryError::AddressSpaceFull)?;
        let timeout = self.settings.reply_timeout;
        let [pid_hi, pid_lo] = (product_id as u16).to_be_bytes();
        DeviceSession::new(&mut self.bus, Address::BROADCAST, timeout)
            .send(Command::Assign, [address.raw(), pid_hi, pid_lo])?;
        let device = Device::new(address, product_id);
        self.devices.insert(address, device.clone());
        info!("paired product {product_id} as address {address}");
        self.publish(PairingEvent {
            device,
            paired_at: OffsetDateTime::now_utc(),
        });
        Ok(address)
    }

    /// Poll every declared data point of every device. A failed read
    /// leaves that data point unavailable and moves on; one unresponsive
    /// device must not stall the rest of the fleet.
    pub fn update_values(&mut self) {
        let targets: Vec<(Address, u32)> = self
            .devices
            .iter()
            .map(|(address, device)| (*address, device.product_id))
            .collect();
        for (address, product_id) in targets {
            let data_points = match self.catalog.get(product_id) {
                Some(product) => product.data_points.clone(),
                None => {
                    warn!("device {address}: product {product_id} not in catalog, skipping");
                    continue;
                }
            };
            for dp in data_points {
                let result = self.session(address).get_value(dp);
                match result {
                    Ok(value) => {
                        if let Some(device) = self.devices.get_mut(&address) {
                            device.values.insert(dp, value);
                        }
                    }
                    Err(err) => {
                        warn!("device {address}: data point {id} unavailable: {err}", id = dp.0);
                        if let Some(device) = self.devices.get_mut(&address) {
                            device.values.remove(&dp);
                        }
                    }
                }
            }
        }
    }

    /// Unconfirmed write of one data point. The cached value is updated
    /// once the bytes are out; the wire gives no delivery confirmation.
    pub fn set_value(&mut self, address: Address, dp: DataPointId, value: i16) -> Result<()> {
        if !self.devices.contains_key(&address) {
            return Err(RegistryError::UnknownAddress(address));
        }
        self.session(address).set_value(dp, value)?;
        if let Some(device) = self.devices.get_mut(&address) {
            device.values.insert(dp, value);
        }
        Ok(())
    }

    /// Copy of the device map for external consumers. Taking it involves
    /// no bus access and nothing that the polling path waits on.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            taken_at: OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .ok(),
            devices: self.devices.values().cloned().collect(),
        }
    }

    /// One discover exchange plus, for assigned addresses, a short extra
    /// window that catches a second device answering as the same address.
    fn probe(&mut self, address: Address) -> Result<u32> {
        let probe_timeout = self.settings.probe_timeout;
        let product_id =
            DeviceSession::new(&mut self.bus, address, probe_timeout).discover(probe_timeout)?;
        if !address.is_broadcast() {
            let mut extra = [0u8; FRAME_LEN];
            match self.bus.read_exact(&mut extra, probe_timeout) {
                Ok(()) => {
                    if let Ok(frame) = Frame::parse(extra) {
                        if frame.address() == address && frame.command() == Command::Return {
                            return Err(RegistryError::AddressConflict(address));
                        }
                    }
                }
                // A quiet window is the expected outcome; a broken bus is not
                Err(TransportError::Timeout) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(product_id)
    }

    fn lowest_free_address(&self) -> Option<Address> {
        self.settings
            .scan_range
            .clone()
            .filter_map(Address::new)
            .find(|address| !self.devices.contains_key(address))
    }

    fn free_address_count(&self) -> usize {
        self.settings
            .scan_range
            .clone()
            .filter_map(Address::new)
            .filter(|address| !self.devices.contains_key(address))
            .count()
    }

    fn publish(&mut self, event: PairingEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_catalog, Product};
    use bus_transport::{MockPort, Reply};
    use frame_codec::{pack_value, pack_wide};
    use std::time::Duration;

    fn addr(raw: u8) -> Address {
        Address::new(raw).unwrap()
    }

    fn return_frame(address: Address, payload: [u8; 3]) -> Reply {
        Reply::Frame(
            Frame::new(address, Command::Return, payload)
                .to_bytes()
                .to_vec(),
        )
    }

    fn settings(range: std::ops::RangeInclusive<u8>) -> RegistrySettings {
        RegistrySettings {
            scan_range: range,
            probe_timeout: Duration::from_millis(5),
            reply_timeout: Duration::from_millis(5),
            update_interval: Duration::from_millis(100),
        }
    }

    fn catalog_with(products: &[(u32, &[u8])]) -> ProductCatalog {
        let mut catalog = ProductCatalog::default();
        for (id, dps) in products {
            catalog.insert(Product {
                id: *id,
                name: None,
                data_points: dps.iter().map(|raw| DataPointId(*raw)).collect(),
            });
        }
        catalog
    }

    #[test]
    fn scan_registers_exactly_the_answering_addresses() {
        let mut port = MockPort::new();
        // Addresses 1..=10 probed in order; 3 and 7 answer. Every answer
        // is followed by the conflict-check window, then the broadcast
        // probe finds nothing.
        port.push_reply(Reply::Silence); // 1
        port.push_reply(Reply::Silence); // 2
        port.push_reply(return_frame(addr(3), pack_wide(258))); // 3
        port.push_reply(Reply::Silence); // 3: conflict window
        port.push_reply(Reply::Silence); // 4
        port.push_reply(Reply::Silence); // 5
        port.push_reply(Reply::Silence); // 6
        port.push_reply(return_frame(addr(7), pack_wide(512))); // 7
        port.push_reply(Reply::Silence); // 7: conflict window
        port.push_reply(Reply::Silence); // 8
        port.push_reply(Reply::Silence); // 9
        port.push_reply(Reply::Silence); // 10
        port.push_reply(Reply::Silence); // broadcast

        let mut registry = DeviceRegistry::new(port, ProductCatalog::default(), settings(1..=10));
        let found = registry.scan().unwrap();
        assert_eq!(found, 2);
        assert!(registry.device(addr(3)).is_some());
        assert!(registry.device(addr(7)).is_some());
        assert_eq!(registry.device(addr(3)).unwrap().product_id, 258);
        assert_eq!(registry.snapshot().devices.len(), 2);
    }

    #[test]
    fn a_second_answer_on_one_address_is_a_conflict() {
        let mut port = MockPort::new();
        port.push_reply(return_frame(addr(1), pack_wide(258))); // 1
        port.push_reply(return_frame(addr(1), pack_wide(258))); // 1: duplicate
        port.push_reply(Reply::Silence); // 2
        port.push_reply(Reply::Silence); // broadcast

        let mut registry = DeviceRegistry::new(port, ProductCatalog::default(), settings(1..=2));
        let found = registry.scan().unwrap();
        assert_eq!(found, 0);
        assert!(registry.device(addr(1)).is_none());
    }

    #[test]
    fn a_bus_fault_in_the_conflict_window_aborts_the_scan() {
        let mut port = MockPort::new();
        port.push_reply(return_frame(addr(1), pack_wide(258))); // 1
        port.push_reply(Reply::Fault("wire pulled".to_string())); // 1: conflict window

        let mut registry = DeviceRegistry::new(port, ProductCatalog::default(), settings(1..=2));
        let err = registry.scan().unwrap_err();
        assert!(matches!(err, RegistryError::Transport(_)));
    }

    #[test]
    fn scan_pairs_an_unconfigured_device() {
        let mut port = MockPort::new();
        port.push_reply(Reply::Silence); // 1
        port.push_reply(Reply::Silence); // 2
        port.push_reply(Reply::Silence); // 3
        port.push_reply(Reply::Silence); // 4
        port.push_reply(return_frame(Address::BROADCAST, pack_wide(258))); // sentinel answers
        port.push_reply(Reply::Silence); // sentinel quiet again

        let mut registry = DeviceRegistry::new(port, ProductCatalog::default(), settings(1..=4));
        let events = registry.subscribe();
        let found = registry.scan().unwrap();
        assert_eq!(found, 1);

        let paired = registry.device(addr(1)).unwrap();
        assert_eq!(paired.product_id, 258);

        let event = events.try_recv().unwrap();
        assert_eq!(event.device.address, addr(1));
        assert!(events.try_recv().is_err());

        // The adoption instruction went to the sentinel naming the new
        // address and the low bits of the product id that announced itself
        let writes = registry.bus.writes();
        let assign = writes
            .iter()
            .find(|w| w[0] == (5 << 5))
            .expect("assign frame written");
        assert_eq!(assign[1], 1);
        assert_eq!(&assign[2..4], &[0x01, 0x02]);
    }

    #[test]
    fn pairing_fails_once_the_address_space_is_full() {
        let port = MockPort::new();
        let mut registry = DeviceRegistry::new(port, ProductCatalog::default(), settings(1..=1));
        registry.register(Device::new(addr(1), 258));
        let err = registry.pair_unconfigured(512).unwrap_err();
        assert!(matches!(err, RegistryError::AddressSpaceFull));
    }

    #[test]
    fn polling_tolerates_per_data_point_failures() {
        let mut port = MockPort::new();
        // Device 5, product 258, data points {1, 2}: dp 1 times out,
        // dp 2 answers 100. Device 6, product 512, dp {1}: answers 7.
        let [hi, lo] = pack_value(100);
        port.push_reply(Reply::Silence); // 5/dp1
        port.push_reply(return_frame(addr(5), [2, hi, lo])); // 5/dp2
        let [hi, lo] = pack_value(7);
        port.push_reply(return_frame(addr(6), [1, hi, lo])); // 6/dp1

        let catalog = catalog_with(&[(258, &[1, 2]), (512, &[1])]);
        let mut registry = DeviceRegistry::new(port, catalog, settings(1..=10));
        registry.register(Device::new(addr(5), 258));
        registry.register(Device::new(addr(6), 512));

        registry.update_values();

        let snapshot = registry.snapshot();
        let dev5 = &snapshot.devices[0];
        assert_eq!(dev5.values.get(&DataPointId(2)), Some(&100));
        assert!(!dev5.values.contains_key(&DataPointId(1)));
        let dev6 = &snapshot.devices[1];
        assert_eq!(dev6.values.get(&DataPointId(1)), Some(&7));
    }

    #[test]
    fn a_failed_poll_clears_a_previously_known_value() {
        let mut port = MockPort::new();
        port.push_reply(Reply::Silence); // the one declared data point
        let catalog = catalog_with(&[(258, &[1])]);
        let mut registry = DeviceRegistry::new(port, catalog, settings(1..=10));
        let mut device = Device::new(addr(4), 258);
        device.values.insert(DataPointId(1), 42);
        registry.register(device);

        registry.update_values();
        assert!(!registry
            .device(addr(4))
            .unwrap()
            .values
            .contains_key(&DataPointId(1)));
    }

    #[test]
    fn set_value_updates_the_cache_on_success_only() {
        let port = MockPort::new();
        let catalog = catalog_with(&[(258, &[1])]);
        let mut registry = DeviceRegistry::new(port, catalog, settings(1..=10));
        registry.register(Device::new(addr(2), 258));

        registry.set_value(addr(2), DataPointId(1), -7).unwrap();
        assert_eq!(
            registry.device(addr(2)).unwrap().values.get(&DataPointId(1)),
            Some(&-7)
        );

        let err = registry
            .set_value(addr(9), DataPointId(1), 1)
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAddress(_)));
    }

    #[test]
    fn exchanges_never_overlap_on_the_line() {
        let mut port = MockPort::new();
        port.push_reply(return_frame(addr(1), pack_wide(258))); // probe 1
        port.push_reply(Reply::Silence); // conflict window
        port.push_reply(Reply::Silence); // probe 2
        port.push_reply(Reply::Silence); // broadcast
        let [hi, lo] = pack_value(3);
        port.push_reply(return_frame(addr(1), [1, hi, lo])); // poll

        let catalog = catalog_with(&[(258, &[1])]);
        let mut registry = DeviceRegistry::new(port, catalog, settings(1..=2));
        registry.scan().unwrap();
        registry.update_values();

        let journal = registry.bus.journal();
        assert!(journal.len() >= 2);
        for pair in journal.windows(2) {
            assert!(pair[0].exited <= pair[1].entered);
        }
    }

    #[test]
    fn snapshot_is_a_copy_not_a_view() {
        let port = MockPort::new();
        let mut registry =
            DeviceRegistry::new(port, ProductCatalog::default(), settings(1..=10));
        registry.register(Device::new(addr(1), 258));
        let snapshot = registry.snapshot();
        registry.register(Device::new(addr(2), 512));
        assert_eq!(snapshot.devices.len(), 1);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let port = MockPort::new();
        let mut registry =
            DeviceRegistry::new(port, ProductCatalog::default(), settings(1..=10));
        let mut device = Device::new(addr(3), 258);
        device.values.insert(DataPointId(2), -50);
        registry.register(device);
        let json = serde_json::to_string(&registry.snapshot()).unwrap();
        assert!(json.contains("\"address\":3"));
        assert!(json.contains("\"2\":-50"));
    }

    #[test]
    fn catalog_fixture_round_trips_through_the_parser() {
        let catalog = parse_catalog(
            r#"[{ "id": 258, "name": "thermostat", "data_points": [1, 2] }]"#,
        )
        .unwrap();
        assert_eq!(catalog.get(258).unwrap().data_points.len(), 2);
    }
}
