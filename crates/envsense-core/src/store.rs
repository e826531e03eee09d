//! The concurrent sensor store.
//!
//! A [`SensorStore`] maps sensor ids to [`SensorRecord`]s behind a single
//! lock. Every lookup refreshes the record from its device while holding
//! that lock, so no two refreshes ever run at the same time, even against
//! different devices sharing one bus.
//!
//! The store is blocking. Async callers should run it on a blocking pool
//! and apply their deadline around that; the lock is always released when
//! the refresh returns, whether or not anyone is still waiting for it.
//!
//! # Example
//!
//! ```
//! use envsense_core::{MockDriver, SensorStore};
//! use envsense_types::{Accuracy, SensorId};
//!
//! let store = SensorStore::bind([(MockDriver::new(SensorId(119)), Accuracy::High)]);
//! assert_eq!(store.ids(), vec![SensorId(119)]);
//!
//! let snapshot = store.get(SensorId(119))?;
//! assert_eq!(snapshot.id, SensorId(119));
//! # Ok::<(), envsense_core::Error>(())
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Mutex;

use tracing::{info, warn};

use envsense_types::{Accuracy, SensorId, SensorSnapshot};

use crate::error::{Error, Result};
use crate::record::SensorRecord;
use crate::traits::{BoxedDriver, DeviceDriver};
use crate::util::lock_unpoisoned;

/// Process-wide cache of sensor readings, refreshed on demand.
///
/// The set of sensors is fixed at construction.
pub struct SensorStore<D = BoxedDriver> {
    records: Mutex<BTreeMap<SensorId, SensorRecord<D>>>,
}

impl<D: DeviceDriver> SensorStore<D> {
    /// A store with no sensors. Every `get` fails with [`Error::NotFound`].
    pub fn empty() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Bind each device, run its initial refresh, and register it under the
    /// id it reports.
    ///
    /// Devices whose initial refresh fails are dropped. When two devices
    /// report the same id, the first one keeps it.
    pub fn bind<I>(devices: I) -> Self
    where
        I: IntoIterator<Item = (D, Accuracy)>,
    {
        let mut records = BTreeMap::new();

        for (device, accuracy) in devices {
            let mut record = SensorRecord::new(device, accuracy);
            let snapshot = match record.refresh() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping sensor, initial refresh failed: {}", e);
                    continue;
                }
            };

            match records.entry(snapshot.id) {
                Entry::Occupied(_) => {
                    warn!(
                        "Skipping sensor, id {} is already registered",
                        snapshot.id
                    );
                }
                Entry::Vacant(slot) => {
                    info!("Registered {}", snapshot);
                    slot.insert(record);
                }
            }
        }

        Self {
            records: Mutex::new(records),
        }
    }

    /// Refresh one sensor and return its new readings.
    ///
    /// Returns [`Error::NotFound`] for an unknown id and [`Error::Refresh`]
    /// when the device fails; in the latter case the record keeps its
    /// previous values and stays registered.
    pub fn get(&self, id: SensorId) -> Result<SensorSnapshot> {
        let mut records = lock_unpoisoned(&self.records);
        let record = records.get_mut(&id).ok_or(Error::NotFound(id))?;
        record.refresh()
    }

    /// Refresh every sensor, in ascending id order, under one lock.
    ///
    /// The first failure aborts the listing and no snapshots are returned,
    /// although records refreshed before the failure keep their new values.
    pub fn get_all(&self) -> Result<Vec<SensorSnapshot>> {
        let mut records = lock_unpoisoned(&self.records);
        records
            .values_mut()
            .map(SensorRecord::refresh)
            .collect()
    }

    /// The values from the last successful refresh, without touching the bus.
    pub fn cached(&self, id: SensorId) -> Option<SensorSnapshot> {
        lock_unpoisoned(&self.records)
            .get(&id)
            .and_then(SensorRecord::snapshot)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<SensorId> {
        lock_unpoisoned(&self.records).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_unpoisoned(&self.records).is_empty()
    }
}

impl<D: DeviceDriver> Default for SensorStore<D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<D> fmt::Debug for SensorStore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<SensorId> = lock_unpoisoned(&self.records).keys().copied().collect();
        f.debug_struct("SensorStore").field("ids", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::mock::{BusMonitor, MockDriver, MockHandle};
    use envsense_types::{Measurement, Quantity};
    use std::sync::Arc;
    use std::time::Duration;

    fn device_119() -> (MockDriver, MockHandle) {
        let mock = MockDriver::new(SensorId(119))
            .with_temperature(21.5)
            .with_pressure(101_300.0)
            .with_humidity(None)
            .with_altitude(12.3);
        let handle = mock.handle();
        (mock, handle)
    }

    #[test]
    fn test_empty_store() {
        let store = SensorStore::<MockDriver>::empty();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.get_all().unwrap().is_empty());
        assert!(store.get(SensorId(1)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_bind_registers_reported_ids_in_order() {
        let store = SensorStore::bind([
            (MockDriver::new(SensorId(30)), Accuracy::High),
            (MockDriver::new(SensorId(10)), Accuracy::Low),
            (MockDriver::new(SensorId(20)), Accuracy::Standard),
        ]);
        assert_eq!(store.ids(), vec![SensorId(10), SensorId(20), SensorId(30)]);

        let all = store.get_all().unwrap();
        let ids: Vec<_> = all.iter().map(|s| s.id).collect();
        assert_eq!(ids, store.ids());
    }

    #[test]
    fn test_bind_skips_failing_device() {
        let bad = MockDriver::new(SensorId(1));
        bad.handle().fail_next(Quantity::Temperature);
        let store = SensorStore::bind([
            (bad, Accuracy::High),
            (MockDriver::new(SensorId(2)), Accuracy::High),
        ]);
        assert_eq!(store.ids(), vec![SensorId(2)]);
    }

    #[test]
    fn test_bind_keeps_first_duplicate() {
        let first = MockDriver::new(SensorId(7)).with_temperature(1.0);
        let second = MockDriver::new(SensorId(7)).with_temperature(2.0);
        let second_handle = second.handle();

        let store = SensorStore::bind([(first, Accuracy::High), (second, Accuracy::High)]);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(SensorId(7)).unwrap().temperature,
            Measurement::Value(1.0)
        );
        // Only the bootstrap refresh ever reached the dropped device.
        assert_eq!(second_handle.read_count(), 5);
    }

    #[test]
    fn test_get_all_single_device_scenario() {
        let (mock, _handle) = device_119();
        let store = SensorStore::bind([(mock, Accuracy::High)]);

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        let snap = &all[0];
        assert_eq!(snap.id, SensorId(119));
        assert_eq!(snap.temperature, Measurement::Value(21.5));
        assert_eq!(snap.pressure, Measurement::Value(101_300.0));
        assert_eq!(snap.altitude, Measurement::Value(12.3));
        assert_eq!(snap.humidity.value(), None);

        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["id"], 119);
        assert_eq!(json["temperature"], 21.5);
        assert!(json.get("humidity").is_none());
    }

    #[test]
    fn test_get_refreshes_every_call() {
        let (mock, handle) = device_119();
        let store = SensorStore::bind([(mock, Accuracy::High)]);

        handle.set_temperature(22.0);
        assert_eq!(
            store.get(SensorId(119)).unwrap().temperature,
            Measurement::Value(22.0)
        );
        handle.set_temperature(23.0);
        assert_eq!(
            store.get(SensorId(119)).unwrap().temperature,
            Measurement::Value(23.0)
        );
        assert_eq!(handle.read_count(), 15);
    }

    #[test]
    fn test_get_fails_on_pressure_then_recovers() {
        let (mock, handle) = device_119();
        let store = SensorStore::bind([(mock, Accuracy::High)]);
        let before = store.get(SensorId(119)).unwrap();

        handle.set_temperature(25.0);
        handle.set_pressure(99_000.0);
        handle.set_altitude(100.0);
        handle.fail_next(Quantity::Pressure);

        let err = store.get(SensorId(119)).unwrap_err();
        assert!(matches!(
            err,
            Error::Refresh {
                quantity: Quantity::Pressure,
                ..
            }
        ));
        assert_eq!(store.cached(SensorId(119)), Some(before));
        assert_eq!(store.ids(), vec![SensorId(119)]);

        let after = store.get(SensorId(119)).unwrap();
        assert_eq!(after.temperature, Measurement::Value(25.0));
        assert_eq!(after.pressure, Measurement::Value(99_000.0));
        assert_eq!(after.altitude, Measurement::Value(100.0));
    }

    #[test]
    fn test_not_found_is_stable() {
        let (mock, handle) = device_119();
        let store = SensorStore::bind([(mock, Accuracy::High)]);
        let reads = handle.read_count();

        for _ in 0..3 {
            let err = store.get(SensorId(1)).unwrap_err();
            assert!(matches!(err, Error::NotFound(SensorId(1))));
        }
        assert_eq!(store.cached(SensorId(1)), None);
        // A miss never touches the bus.
        assert_eq!(handle.read_count(), reads);
    }

    #[test]
    fn test_get_all_is_all_or_nothing() {
        let a = MockDriver::new(SensorId(1)).with_temperature(10.0);
        let b = MockDriver::new(SensorId(2));
        let (a_handle, b_handle) = (a.handle(), b.handle());
        let store = SensorStore::bind([(a, Accuracy::High), (b, Accuracy::High)]);

        a_handle.set_temperature(11.0);
        b_handle.fail_next(Quantity::Humidity);

        let err = store.get_all().unwrap_err();
        assert!(matches!(
            err,
            Error::Refresh {
                quantity: Quantity::Humidity,
                ..
            }
        ));
        // A was refreshed internally even though the listing failed.
        assert_eq!(
            store.cached(SensorId(1)).unwrap().temperature,
            Measurement::Value(11.0)
        );
        assert_eq!(store.get_all().unwrap().len(), 2);
    }

    #[test]
    fn test_unsupported_humidity_survives_failure() {
        let (mock, handle) = device_119();
        let store = SensorStore::bind([(mock, Accuracy::High)]);

        handle.set_humidity(Some(50.0));
        handle.fail_next(Quantity::Altitude);
        assert!(store.get(SensorId(119)).is_err());
        assert_eq!(
            store.cached(SensorId(119)).unwrap().humidity,
            Measurement::Unsupported
        );

        assert_eq!(
            store.get(SensorId(119)).unwrap().humidity,
            Measurement::Value(50.0)
        );
    }

    #[test]
    fn test_reads_never_overlap() {
        let monitor = BusMonitor::new();
        let devices = (1..=3).map(|id| {
            let mock = MockDriver::new(SensorId(id))
                .with_latency(Duration::from_millis(1))
                .on_bus(Arc::clone(&monitor));
            (mock, Accuracy::High)
        });
        let store = Arc::new(SensorStore::bind(devices));

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        if i % 2 == 0 {
                            store.get_all().unwrap();
                        } else {
                            store.get(SensorId((i % 3) as u8 + 1)).unwrap();
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(monitor.overlaps(), 0);
        assert_eq!(monitor.max_concurrent(), 1);
        assert!(monitor.transactions() > 15);
    }

    #[test]
    fn test_readers_see_complete_cycles() {
        // Every cycle writes a pressure of exactly 1000 times the temperature.
        let mock = MockDriver::new(SensorId(1))
            .with_temperature(100.0)
            .with_pressure(100_000.0);
        let handle = mock.handle();
        let store = Arc::new(SensorStore::bind([(mock, Accuracy::High)]));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..50u16 {
                    let t = f32::from(i);
                    handle.set_temperature(t);
                    handle.set_pressure(t * 1000.0);
                    if i % 3 == 0 {
                        handle.fail_next(Quantity::Pressure);
                    }
                    let _ = store.get(SensorId(1));
                }
            })
        };

        for _ in 0..200 {
            let snap = store.cached(SensorId(1)).unwrap();
            let (Some(t), Some(p)) = (snap.temperature.value(), snap.pressure.value()) else {
                panic!("missing values in {snap:?}");
            };
            assert_eq!(p, t * 1000.0, "torn snapshot");
        }
        writer.join().unwrap();
    }

    /// Panics on every temperature read after the first.
    struct PanicsAfterBootstrap {
        reads: u32,
    }

    impl DeviceDriver for PanicsAfterBootstrap {
        fn read_id(&mut self) -> std::result::Result<SensorId, BusError> {
            Ok(SensorId(1))
        }

        fn read_temperature(&mut self, _: Accuracy) -> std::result::Result<f32, BusError> {
            self.reads += 1;
            if self.reads > 1 {
                panic!("driver bug");
            }
            Ok(20.0)
        }

        fn read_pressure(&mut self, _: Accuracy) -> std::result::Result<f32, BusError> {
            Ok(100_000.0)
        }

        fn read_humidity(&mut self, _: Accuracy) -> std::result::Result<Option<f32>, BusError> {
            Ok(None)
        }

        fn read_altitude(&mut self, _: Accuracy) -> std::result::Result<f32, BusError> {
            Ok(110.0)
        }
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let store: Arc<SensorStore> = Arc::new(SensorStore::bind([
            (
                Box::new(MockDriver::new(SensorId(0))) as BoxedDriver,
                Accuracy::High,
            ),
            (
                Box::new(PanicsAfterBootstrap { reads: 0 }) as BoxedDriver,
                Accuracy::High,
            ),
        ]));
        let bootstrapped = store.cached(SensorId(1)).unwrap();

        let panicked = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.get(SensorId(1))).join()
        };
        assert!(panicked.is_err());
        assert!(store.records.is_poisoned());

        assert_eq!(store.ids(), vec![SensorId(0), SensorId(1)]);
        assert_eq!(store.cached(SensorId(1)), Some(bootstrapped));
        assert!(store.get(SensorId(0)).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deadline_does_not_wedge_the_store() {
        let mock = MockDriver::new(SensorId(1));
        let handle = mock.handle();
        let store = Arc::new(SensorStore::bind([(mock, Accuracy::High)]));
        handle.set_latency(Duration::from_millis(40));

        let slow = {
            let store = Arc::clone(&store);
            tokio::task::spawn_blocking(move || store.get(SensorId(1)))
        };
        let waited = tokio::time::timeout(Duration::from_millis(10), slow).await;
        assert!(waited.is_err());

        handle.set_latency(Duration::ZERO);
        let store2 = Arc::clone(&store);
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            tokio::task::spawn_blocking(move || store2.get(SensorId(1))),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result.is_ok());
    }
}
