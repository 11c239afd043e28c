//! BLE connection lifecycle for a single Neewer light.

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use tokio::sync::watch;

use crate::errors::Error;
use crate::frame::ProtocolFrame;
use crate::history::{HistorySummary, MessageHistory, MessageType};
use crate::notification::{NotificationRecord, NotificationSink};
use crate::runtime::Mutex;
use crate::transport::{AddressType, BleLink, BleTransport, CharacteristicInfo, DeviceAddress};

type Result<T> = std::result::Result<T, Error>;

/// Characteristic handle colour frames are written to.
pub const DEFAULT_HANDLE: u16 = 14;

/// Connection state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The BLE peripheral the bridge drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnection {
    address: DeviceAddress,
    adapter: usize,
}

impl DeviceConnection {
    pub fn new(address: DeviceAddress, adapter: usize) -> Self {
        Self { address, adapter }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Index of the local Bluetooth adapter to connect through.
    pub fn adapter(&self) -> usize {
        self.adapter
    }
}

/// Snapshot of the manager's state for diagnostics.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDiagnostics {
    pub address: String,
    pub adapter: usize,
    pub state: ConnectionState,
    pub last_notification: Option<NotificationRecord>,
    pub history: HistorySummary,
}

/// Owns the single BLE connection to a Neewer light.
///
/// Exactly one manager exists per device. It is shared by reference (usually
/// behind an [`std::sync::Arc`]) with whatever feeds it frames. Writes are
/// serialized through an async mutex around the link, so concurrent callers
/// never interleave characteristic writes.
///
/// Failures are reported, never retried: a failed [`connect`](Self::connect)
/// leaves the manager disconnected and a failed [`send`](Self::send) leaves
/// the state as it was.
pub struct ConnectionManager<T: BleTransport> {
    transport: T,
    device: DeviceConnection,
    link: Mutex<Option<T::Link>>,
    state: Mutex<ConnectionState>,
    sink: NotificationSink,
    history: Mutex<MessageHistory>,
}

impl<T: BleTransport> ConnectionManager<T> {
    pub fn new(transport: T, device: DeviceConnection) -> Self {
        ConnectionManager {
            transport,
            device,
            link: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            sink: NotificationSink::new(),
            history: Mutex::new(MessageHistory::new()),
        }
    }

    pub fn device(&self) -> &DeviceConnection {
        &self.device
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// The last notification the device pushed, if any.
    pub fn last_notification(&self) -> Option<NotificationRecord> {
        self.sink.latest()
    }

    /// A receiver woken on every new notification.
    pub fn notifications(&self) -> watch::Receiver<Option<NotificationRecord>> {
        self.sink.subscribe()
    }

    pub async fn history(&self) -> MessageHistory {
        self.history.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    pub async fn diagnostics(&self) -> ConnectionDiagnostics {
        ConnectionDiagnostics {
            address: self.device.address.to_string(),
            adapter: self.device.adapter,
            state: self.state().await,
            last_notification: self.last_notification(),
            history: self.history.lock().await.summary(),
        }
    }

    /// Connects to the configured device with a random address type.
    ///
    /// The notification sink is handed to the transport, so notifications
    /// start landing in [`last_notification`](Self::last_notification) as
    /// soon as the link is up. Connecting while connected does nothing.
    ///
    /// The link is not locked while the transport connects, so
    /// [`send`](Self::send) keeps failing fast with [`Error::NotConnected`]
    /// until the link is installed. A second `connect` issued while one is
    /// in flight fails instead of opening another link.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match *state {
                ConnectionState::Connected => {
                    debug!("Already connected to {}", self.device.address);
                    return Ok(());
                }
                ConnectionState::Connecting => {
                    return Err(Error::Connect {
                        address: self.device.address.to_string(),
                        reason: "connection already in progress".into(),
                    });
                }
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }

        debug!("Connecting to Neewer device...");
        let result = self
            .transport
            .connect(
                &self.device.address,
                AddressType::Random,
                self.device.adapter,
                self.sink.clone(),
            )
            .await;

        let mut link = self.link.lock().await;
        let mut state = self.state.lock().await;
        match result {
            Ok(new_link) if *state == ConnectionState::Connecting => {
                *link = Some(new_link);
                *state = ConnectionState::Connected;
                info!("Connected to Neewer device {}", self.device.address);
                Ok(())
            }
            Ok(new_link) => {
                // disconnect() ran while the link was coming up
                drop(state);
                drop(link);
                if let Err(e) = new_link.disconnect().await {
                    debug!("{}", Error::Disconnect(e.to_string()));
                }
                let err = Error::Connect {
                    address: self.device.address.to_string(),
                    reason: "disconnected while connecting".into(),
                };
                error!("Connection failed: {}", err);
                Err(err)
            }
            Err(e) => {
                *state = ConnectionState::Disconnected;
                let err = Error::connect(self.device.address.as_str(), &e);
                error!("Connection failed: {}", err);
                Err(err)
            }
        }
    }

    /// Writes a frame to the characteristic with the given handle.
    ///
    /// Sending while disconnected returns [`Error::NotConnected`]. A failed
    /// write returns [`Error::Write`] and does not touch the connection
    /// state; reconnecting is up to the caller.
    pub async fn send(&self, frame: &ProtocolFrame, handle: u16) -> Result<()> {
        let link = self.link.lock().await;
        let Some(link) = link.as_ref() else {
            return Err(Error::NotConnected);
        };

        match link.write_characteristic(handle, frame.as_bytes()).await {
            Ok(()) => {
                self.history
                    .lock()
                    .await
                    .record(MessageType::Send, handle, frame);
                Ok(())
            }
            Err(e) => {
                let err = Error::write(handle, &e);
                let mut history = self.history.lock().await;
                history.record(MessageType::Failure, handle, frame);
                history.record_error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Closes the link if one is open.
    ///
    /// Calling this while disconnected is fine. Errors from the transport
    /// while tearing down are logged and dropped.
    pub async fn disconnect(&self) {
        debug!("Disconnecting...");
        let mut link = self.link.lock().await;
        if let Some(old) = link.take() {
            if let Err(e) = old.disconnect().await {
                debug!("{}", Error::Disconnect(e.to_string()));
            }
        }
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Lists the services and characteristics the device exposes.
    pub async fn list_services_and_characteristics(&self) -> Result<Vec<CharacteristicInfo>> {
        let link = self.link.lock().await;
        let Some(link) = link.as_ref() else {
            return Err(Error::NotConnected);
        };
        link.services().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.lock().await = state;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::frame::encode;
    use crate::runtime;
    use crate::transport::mock::MockTransport;
    use crate::types::ColorCommand;

    fn manager(transport: &MockTransport) -> ConnectionManager<MockTransport> {
        let address = "D1:28:C0:6B:32:34".parse().unwrap();
        ConnectionManager::new(transport.clone(), DeviceConnection::new(address, 1))
    }

    fn red() -> ProtocolFrame {
        encode(&ColorCommand::rgb(255, 0, 0))
    }

    #[tokio::test]
    async fn test_new_manager_is_disconnected() {
        let m = manager(&MockTransport::new());
        assert_eq!(m.state().await, ConnectionState::Disconnected);
        assert!(m.last_notification().is_none());
    }

    #[tokio::test]
    async fn test_connect_uses_random_address() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        m.connect().await.unwrap();

        assert_eq!(m.state().await, ConnectionState::Connected);
        let connects = transport.state.connects.lock().unwrap().clone();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0].0.as_str(), "D1:28:C0:6B:32:34");
        assert_eq!(connects[0].1, AddressType::Random);
        assert_eq!(connects[0].2, 1);

        // second connect is a no-op
        m.connect().await.unwrap();
        assert_eq!(transport.state.connects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_stays_disconnected() {
        let transport = MockTransport::new();
        transport.set_fail_connect(true);
        let m = manager(&transport);

        let err = m.connect().await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        assert_eq!(m.state().await, ConnectionState::Disconnected);

        transport.set_fail_connect(false);
        m.connect().await.unwrap();
        assert!(m.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        assert_eq!(m.send(&red(), DEFAULT_HANDLE).await, Err(Error::NotConnected));
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn test_send_writes_frame() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        m.connect().await.unwrap();
        m.send(&red(), DEFAULT_HANDLE).await.unwrap();

        assert_eq!(
            transport.writes(),
            vec![(14, vec![0x78, 0x86, 0x04, 0x00, 0x00, 0x64, 0x64, 0xca])]
        );
        assert_eq!(m.history().await.summary().send_count, 1);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_state() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        m.connect().await.unwrap();
        transport.set_fail_write(true);

        let err = m.send(&red(), DEFAULT_HANDLE).await.unwrap_err();
        assert!(matches!(err, Error::Write { handle: 14, .. }));
        assert_eq!(m.state().await, ConnectionState::Connected);

        let summary = m.history().await.summary();
        assert_eq!(summary.failure_count, 1);
        assert!(summary.last_error.is_some());

        transport.set_fail_write(false);
        m.send(&red(), DEFAULT_HANDLE).await.unwrap();
        assert_eq!(transport.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        m.disconnect().await;
        assert_eq!(transport.state.disconnects.load(Ordering::SeqCst), 0);

        m.connect().await.unwrap();
        transport.set_fail_disconnect(true);
        m.disconnect().await;
        m.disconnect().await;
        assert_eq!(transport.state.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(m.state().await, ConnectionState::Disconnected);
        assert_eq!(m.send(&red(), DEFAULT_HANDLE).await, Err(Error::NotConnected));
    }

    #[tokio::test]
    async fn test_notifications_overwrite() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        m.connect().await.unwrap();

        transport.notify(14, &[0x78, 0x01, 0x01]);
        transport.notify(14, &[0x78, 0x02, 0x02]);
        assert_eq!(
            m.last_notification(),
            Some(NotificationRecord {
                handle: 14,
                payload: vec![0x78, 0x02, 0x02],
            })
        );
    }

    #[tokio::test]
    async fn test_list_services() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        assert_eq!(
            m.list_services_and_characteristics().await,
            Err(Error::NotConnected)
        );

        m.connect().await.unwrap();
        let services = m.list_services_and_characteristics().await.unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].handle, Some(DEFAULT_HANDLE));
        assert!(services[1].properties.notify);
        assert!(transport.writes().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_serialized() {
        let transport = MockTransport::new();
        let m = Arc::new(manager(&transport));
        m.connect().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let m = Arc::clone(&m);
            tasks.push(tokio::spawn(async move {
                m.send(&encode(&ColorCommand::rgb(i, 0, 255)), DEFAULT_HANDLE)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let writes = transport.writes();
        assert_eq!(writes.len(), 16);
        assert!(writes.iter().all(|(_, bytes)| bytes.len() == ProtocolFrame::LEN));
    }

    fn slow_transport() -> MockTransport {
        let transport = MockTransport::new();
        transport.set_connect_delay(Duration::from_millis(500));
        transport
    }

    async fn wait_for_state(m: &ConnectionManager<MockTransport>, state: ConnectionState) {
        runtime::timeout(Duration::from_secs(5), async {
            while m.state().await != state {
                runtime::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_send_fails_fast_while_connecting() {
        let transport = slow_transport();
        let m = Arc::new(manager(&transport));

        let connecting = tokio::spawn({
            let m = Arc::clone(&m);
            async move { m.connect().await }
        });
        wait_for_state(&m, ConnectionState::Connecting).await;

        let sent = runtime::timeout(Duration::from_millis(100), m.send(&red(), DEFAULT_HANDLE))
            .await
            .unwrap();
        assert_eq!(sent, Err(Error::NotConnected));
        let listed = runtime::timeout(
            Duration::from_millis(100),
            m.list_services_and_characteristics(),
        )
        .await
        .unwrap();
        assert_eq!(listed, Err(Error::NotConnected));

        connecting.await.unwrap().unwrap();
        assert!(m.is_connected().await);
        m.send(&red(), DEFAULT_HANDLE).await.unwrap();
        assert_eq!(transport.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_second_connect_while_connecting_fails() {
        let transport = slow_transport();
        let m = Arc::new(manager(&transport));

        let connecting = tokio::spawn({
            let m = Arc::clone(&m);
            async move { m.connect().await }
        });
        wait_for_state(&m, ConnectionState::Connecting).await;

        let err = m.connect().await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));

        connecting.await.unwrap().unwrap();
        assert_eq!(transport.state.connects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting_drops_new_link() {
        let transport = slow_transport();
        let m = Arc::new(manager(&transport));

        let connecting = tokio::spawn({
            let m = Arc::clone(&m);
            async move { m.connect().await }
        });
        wait_for_state(&m, ConnectionState::Connecting).await;
        m.disconnect().await;

        let err = connecting.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        assert_eq!(m.state().await, ConnectionState::Disconnected);
        assert_eq!(transport.state.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(m.send(&red(), DEFAULT_HANDLE).await, Err(Error::NotConnected));
    }

    #[tokio::test]
    async fn test_diagnostics() {
        let transport = MockTransport::new();
        let m = manager(&transport);
        m.connect().await.unwrap();
        m.send(&red(), DEFAULT_HANDLE).await.unwrap();

        let diag = m.diagnostics().await;
        assert_eq!(diag.address, "D1:28:C0:6B:32:34");
        assert_eq!(diag.state, ConnectionState::Connected);
        assert_eq!(diag.history.send_count, 1);

        let json = serde_json::to_value(&diag).unwrap();
        assert!(json.get("last_notification").is_none());
        assert_eq!(json["adapter"], 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.as_ref(), "connected");
    }
}
