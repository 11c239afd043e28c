//! btleplug transport implementation.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use btleplug::api::{
    BDAddr, Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use super::{
    AddressType, BleLink, BleTransport, CharacteristicInfo, CharacteristicProperties,
    DeviceAddress, HandleMap,
};
use crate::errors::Error;
use crate::notification::NotificationSink;
use crate::runtime;

type Result<T> = std::result::Result<T, Error>;

/// Handle reported for notifications on characteristics missing from the
/// [`HandleMap`]. ATT handles start at 1.
pub const UNKNOWN_HANDLE: u16 = 0;

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// BLE transport backed by btleplug.
///
/// btleplug connects to peripherals it has seen while scanning and lets the
/// platform stack pick the address type from the advertisement, so the
/// requested [`AddressType`] is only logged.
#[derive(Debug, Clone)]
pub struct BtleplugTransport {
    handles: HandleMap,
    scan_window: Duration,
    connect_timeout: Duration,
}

impl Default for BtleplugTransport {
    fn default() -> Self {
        Self::new(HandleMap::default())
    }
}

impl BtleplugTransport {
    const SCAN_WINDOW_MS: u64 = 10_000;
    const CONNECT_TIMEOUT_MS: u64 = 10_000;
    const SCAN_POLL_MS: u64 = 250;

    pub fn new(handles: HandleMap) -> Self {
        Self {
            handles,
            scan_window: Duration::from_millis(Self::SCAN_WINDOW_MS),
            connect_timeout: Duration::from_millis(Self::CONNECT_TIMEOUT_MS),
        }
    }

    /// How long to scan for the device before giving up.
    pub fn with_scan_window(mut self, scan_window: Duration) -> Self {
        self.scan_window = scan_window;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    async fn find_peripheral(&self, adapter: &Adapter, target: BDAddr) -> Result<Peripheral> {
        adapter.start_scan(ScanFilter::default()).await?;

        let found = runtime::timeout(self.scan_window, async {
            loop {
                let peripherals = adapter.peripherals().await?;
                if let Some(p) = peripherals.into_iter().find(|p| p.address() == target) {
                    return Ok::<_, Error>(p);
                }
                runtime::sleep(Duration::from_millis(Self::SCAN_POLL_MS)).await;
            }
        })
        .await;

        if let Err(e) = adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }

        match found {
            Ok(peripheral) => peripheral,
            Err(_) => Err(Error::DeviceNotFound(target.to_string())),
        }
    }

    /// Discovers services, opens the notification stream and subscribes.
    ///
    /// The stream is opened before subscribing so no early notification is
    /// missed.
    async fn setup(
        &self,
        peripheral: &Peripheral,
        sink: NotificationSink,
    ) -> Result<JoinHandle<()>> {
        peripheral.discover_services().await?;

        let mut stream = peripheral.notifications().await?;
        let handles = self.handles.clone();
        let listener = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let handle = handles
                    .handle_for(&notification.uuid)
                    .unwrap_or(UNKNOWN_HANDLE);
                sink.record(handle, notification.value);
            }
            debug!("Notification stream closed");
        });

        for characteristic in peripheral.characteristics() {
            if characteristic
                .properties
                .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
            {
                if let Err(e) = peripheral.subscribe(&characteristic).await {
                    warn!("Failed to subscribe to {}: {}", characteristic.uuid, e);
                }
            }
        }

        Ok(listener)
    }
}

impl BleTransport for BtleplugTransport {
    type Link = BtleplugLink;

    async fn connect(
        &self,
        address: &DeviceAddress,
        address_type: AddressType,
        adapter: usize,
        sink: NotificationSink,
    ) -> Result<BtleplugLink> {
        debug!(
            "Connecting to {} ({:?} address) on adapter {}",
            address, address_type, adapter
        );

        let target = BDAddr::from_str(address.as_str())
            .map_err(|_| Error::InvalidAddress(address.to_string()))?;

        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .nth(adapter)
            .ok_or(Error::AdapterNotFound(adapter))?;

        let peripheral = self.find_peripheral(&central, target).await?;

        let connected = runtime::timeout(self.connect_timeout, peripheral.connect())
            .await
            .map_err(|e| Error::Transport(e.to_string()))
            .and_then(|r| r.map_err(Error::from));
        let setup = match connected {
            Ok(()) => self.setup(&peripheral, sink).await,
            Err(e) => Err(e),
        };
        // The stack can finish connecting after the timeout fired, so every
        // failure past the scan disconnects the peripheral.
        let listener = disconnect_on_error(setup, peripheral.disconnect()).await?;

        info!("BLE link to {} is up", address);
        Ok(BtleplugLink {
            peripheral,
            handles: self.handles.clone(),
            listener,
        })
    }
}

/// An open btleplug connection.
pub struct BtleplugLink {
    peripheral: Peripheral,
    handles: HandleMap,
    listener: JoinHandle<()>,
}

impl BtleplugLink {
    fn characteristic(&self, handle: u16) -> Result<Characteristic> {
        let uuid = self
            .handles
            .uuid_for(handle)
            .ok_or(Error::UnknownHandle(handle))?;
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound(uuid))
    }
}

impl BleLink for BtleplugLink {
    async fn write_characteristic(&self, handle: u16, bytes: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(handle)?;
        self.peripheral
            .write(&characteristic, bytes, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn services(&self) -> Result<Vec<CharacteristicInfo>> {
        let mut out = Vec::new();
        for service in self.peripheral.services() {
            for characteristic in &service.characteristics {
                out.push(CharacteristicInfo {
                    service_uuid: service.uuid,
                    uuid: characteristic.uuid,
                    properties: properties(characteristic.properties),
                    handle: self.handles.handle_for(&characteristic.uuid),
                });
            }
        }
        Ok(out)
    }

    async fn disconnect(&self) -> Result<()> {
        self.listener.abort();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Passes `result` through, running `disconnect` first when it is an error.
async fn disconnect_on_error<T, D>(result: Result<T>, disconnect: D) -> Result<T>
where
    D: Future<Output = std::result::Result<(), btleplug::Error>>,
{
    if result.is_err() {
        if let Err(err) = disconnect.await {
            debug!("Failed to drop half-open link: {}", err);
        }
    }
    result
}

fn properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        broadcast: flags.contains(CharPropFlags::BROADCAST),
        read: flags.contains(CharPropFlags::READ),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        write: flags.contains(CharPropFlags::WRITE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
        authenticated_signed_writes: flags.contains(CharPropFlags::AUTHENTICATED_SIGNED_WRITES),
        extended_properties: flags.contains(CharPropFlags::EXTENDED_PROPERTIES),
    }
}
