//! UDP command bridge.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};

use crate::connection::{ConnectionManager, DEFAULT_HANDLE};
use crate::errors::Error;
use crate::frame::{ProtocolFrame, encode};
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};
use crate::transport::BleTransport;
use crate::types::ColorCommand;

type Result<T> = std::result::Result<T, Error>;

/// Default address the listener binds to.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
/// Default UDP port the listener binds to.
pub const DEFAULT_LISTEN_PORT: u16 = 1664;

/// Turns inbound RGB datagrams into frames written to the light.
///
/// Each datagram is handled on its own: a malformed payload or a failed
/// write is logged and the next datagram is served as usual. Datagrams are
/// processed one at a time; anything arriving meanwhile waits in the
/// socket's receive buffer.
///
/// # Example
///
/// ```ignore
/// let manager = Arc::new(ConnectionManager::new(transport, device));
/// manager.connect().await?;
/// CommandBridge::new(Arc::clone(&manager))
///     .serve_forever("0.0.0.0", 1664)
///     .await?;
/// ```
pub struct CommandBridge<T: BleTransport> {
    manager: Arc<ConnectionManager<T>>,
    handle: u16,
}

impl<T: BleTransport> CommandBridge<T> {
    const BUFFER_SIZE: usize = 1024;
    const RECEIVE_BACKOFF_MS: u64 = 100;

    pub fn new(manager: Arc<ConnectionManager<T>>) -> Self {
        Self {
            manager,
            handle: DEFAULT_HANDLE,
        }
    }

    /// Write frames to another characteristic handle.
    pub fn with_handle(mut self, handle: u16) -> Self {
        self.handle = handle;
        self
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<T>> {
        &self.manager
    }

    /// Binds a UDP socket and serves datagrams until the task is dropped.
    ///
    /// Only a bind failure is returned; it is fatal for the process.
    pub async fn serve_forever(&self, listen_address: &str, listen_port: u16) -> Result<()> {
        info!("Starting UDP server...");
        let addr = format!("{listen_address}:{listen_port}");
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|e| Error::bind(&addr, e))?;

        info!("UDP Server started.");
        info!("Please send your messages to {}:{}", listen_address, listen_port);
        self.serve(&socket).await
    }

    /// Serves datagrams from an already bound socket. Never returns.
    pub async fn serve<S: AsyncUdpSocket>(&self, socket: &S) -> Result<()> {
        let mut buffer = [0u8; Self::BUFFER_SIZE];
        loop {
            let (size, source) = match socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("{}", Error::socket("receive", e));
                    runtime::sleep(Duration::from_millis(Self::RECEIVE_BACKOFF_MS)).await;
                    continue;
                }
            };

            let payload = &buffer[..size];
            debug!("{} - {:02x?}", source, payload);

            if let Err(e) = self.handle_datagram(payload).await {
                error!("Failed to send message: {}", e);
            }
        }
    }

    /// Translates one payload and writes it to the device.
    ///
    /// Only the first three bytes are read; anything after them is ignored.
    pub async fn handle_datagram(&self, payload: &[u8]) -> Result<ProtocolFrame> {
        let command = ColorCommand::from_payload(payload)?;
        let frame = encode(&command);
        info!("msg+checksum={}", frame);

        self.manager.send(&frame, self.handle).await?;
        Ok(frame)
    }
}
