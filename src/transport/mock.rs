//! In-memory transport for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use super::{
    AddressType, BleLink, BleTransport, CharacteristicInfo, CharacteristicProperties,
    DeviceAddress, HandleMap,
};
use crate::errors::Error;
use crate::notification::NotificationSink;
use crate::runtime;

type Result<T> = std::result::Result<T, Error>;

/// Shared state between a [`MockTransport`] and the links it hands out.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub writes: Mutex<Vec<(u16, Vec<u8>)>>,
    pub connects: Mutex<Vec<(DeviceAddress, AddressType, usize)>>,
    pub sink: Mutex<Option<NotificationSink>>,
    pub fail_connect: AtomicBool,
    pub connect_delay: Mutex<Option<Duration>>,
    pub fail_write: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub disconnects: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    pub state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.state.writes.lock().unwrap().clone()
    }

    /// Push a notification the way the BLE stack would.
    pub fn notify(&self, handle: u16, payload: &[u8]) {
        if let Some(sink) = self.state.sink.lock().unwrap().as_ref() {
            sink.record(handle, payload.to_vec());
        }
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every connect take this long before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.state.fail_write.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state.fail_disconnect.store(fail, Ordering::SeqCst);
    }
}

impl BleTransport for MockTransport {
    type Link = MockLink;

    async fn connect(
        &self,
        address: &DeviceAddress,
        address_type: AddressType,
        adapter: usize,
        sink: NotificationSink,
    ) -> Result<MockLink> {
        let delay = *self.state.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            runtime::sleep(delay).await;
        }
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::DeviceNotFound(address.to_string()));
        }
        self.state
            .connects
            .lock()
            .unwrap()
            .push((address.clone(), address_type, adapter));
        *self.state.sink.lock().unwrap() = Some(sink);
        Ok(MockLink {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockLink {
    state: Arc<MockState>,
}

impl BleLink for MockLink {
    async fn write_characteristic(&self, handle: u16, bytes: &[u8]) -> Result<()> {
        if self.state.fail_write.load(Ordering::SeqCst) {
            return Err(Error::Transport("link lost".into()));
        }
        self.state
            .writes
            .lock()
            .unwrap()
            .push((handle, bytes.to_vec()));
        Ok(())
    }

    async fn services(&self) -> Result<Vec<CharacteristicInfo>> {
        let service_uuid = Uuid::from_u128(0x69400001_b5a3_f393_e0a9_e50e24dcca9e);
        Ok(vec![
            CharacteristicInfo {
                service_uuid,
                uuid: HandleMap::NEEWER_CONTROL_UUID,
                properties: CharacteristicProperties {
                    write_without_response: true,
                    write: true,
                    ..Default::default()
                },
                handle: Some(14),
            },
            CharacteristicInfo {
                service_uuid,
                uuid: HandleMap::NEEWER_NOTIFY_UUID,
                properties: CharacteristicProperties {
                    notify: true,
                    ..Default::default()
                },
                handle: Some(HandleMap::NEEWER_NOTIFY_HANDLE),
            },
        ])
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.state.sink.lock().unwrap() = None;
        if self.state.fail_disconnect.load(Ordering::SeqCst) {
            return Err(Error::Transport("already gone".into()));
        }
        Ok(())
    }
}
